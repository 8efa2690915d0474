//! # accounting-oracle
//!
//! Report engine for a liquid-staking accounting oracle.
//!
//! ## Overview
//!
//! Once per frame the engine assembles the protocol's accounting report,
//! previews it, decides which withdrawal requests can be paid, gets the
//! committee to agree on the report hash and commits it in two phases:
//!
//! - **ChainClock**: frame schedule, current frame, bounded wait for the next one
//! - **ReportSnapshotBuilder**: live readings merged with caller overrides
//! - **ReportSimulator**: non-mutating preview, share rate and bunker mode
//! - **FinalizationBatchCalculator**: paginated batch search under a budget
//! - **ConsensusCoordinator**: fast-lane claim fan-out and quorum check
//! - **ReportCommitter**: main data, extra data, processing state verification
//!
//! ## Architecture
//!
//! ```text
//! AccountingOracleApi::report
//!     │
//!     ├── ChainClock ────────────────→ ChainReader
//!     ├── ReportSnapshotBuilder ─────→ ProtocolReader
//!     ├── ReportSimulator ───────────→ AccountingSimulator
//!     ├── FinalizationBatchCalculator → WithdrawalQueueGateway
//!     ├── ConsensusCoordinator ──────→ HashConsensusGateway
//!     └── ReportCommitter ───────────→ ReportProcessorGateway
//! ```
//!
//! The claim ledger and processing state belong to the protocol; the engine
//! only issues requests through the outbound ports and reads results.
//!
//! ## Example
//!
//! ```rust,ignore
//! use accounting_oracle::adapters::{InMemoryProtocol, ProtocolSetup};
//! use accounting_oracle::{AccountingOracleApi, AccountingOracleService, OracleConfig, OracleDependencies};
//!
//! let protocol = Arc::new(InMemoryProtocol::new(ProtocolSetup::default())?);
//! let service = AccountingOracleService::new(OracleDependencies {
//!     chain: protocol.clone(),
//!     protocol: protocol.clone(),
//!     simulator: protocol.clone(),
//!     withdrawal_queue: protocol.clone(),
//!     hash_consensus: protocol.clone(),
//!     processor: protocol,
//!     config: OracleConfig::from_env(),
//! });
//!
//! let outcome = service.report(ReportOverrides::default()).await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use domain::{
    BatchOutcome, ConsensusClaim, ExtraData, ExtraDataFormat, ExtraDataItem,
    FinalizationBatchState, Frame, FrameSchedule, ProcessingState, ReportData, ReportOverrides,
};
pub use error::{GatewayError, GatewayResult, OracleError, OracleResult, ReportStep};
pub use ports::inbound::AccountingOracleApi;
pub use service::{
    AccountingOracleService, CommitReceipt, ConsensusOutcome, OracleConfig, OracleDependencies,
    ReportOutcome, SimulationOutcome,
};
