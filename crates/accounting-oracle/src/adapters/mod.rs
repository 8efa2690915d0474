//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound port traits.

mod in_memory;

pub use in_memory::{InMemoryProtocol, ProtocolSetup, WithdrawalRequest};
