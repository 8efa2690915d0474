//! # Shared Types Crate
//!
//! Primitive types used by every oracle crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: hash, address and amount types are defined once.
//! - **Fixed Widths**: hashes are 32 bytes, addresses 20 bytes, matching the
//!   on-chain representation the oracle reports against.

pub mod entities;

pub use entities::*;
