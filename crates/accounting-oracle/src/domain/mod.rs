//! Domain module for the accounting oracle
//!
//! ## Core Modules
//! - frame: Frame schedule and reference slot arithmetic
//! - report: Report data and canonical hash
//! - extra_data: Second-phase payload encoding
//! - overrides: Caller overrides and default resolution
//! - simulation: Preview inputs/outputs, share rate, bunker mode
//! - batches: Finalization batch search state
//! - ledger: Committee claim ledger
//! - processing: Committed processing state and verification

pub mod batches;
pub mod extra_data;
pub mod frame;
pub mod ledger;
pub mod overrides;
pub mod processing;
pub mod report;
pub mod simulation;

pub use batches::{BatchBudget, BatchOutcome, BatchProgressError, FinalizationBatchState};
pub use extra_data::{
    decode_items, encode_items, ExtraData, ExtraDataError, ExtraDataFormat, ExtraDataItem,
    ExtraDataItemType,
};
pub use frame::{Frame, FrameSchedule};
pub use ledger::{
    ClaimError, ClaimLedger, ClaimReceipt, ConsensusClaim, ConsensusPhase, ConsensusReport,
};
pub use overrides::{LiveReadings, ReportOverrides};
pub use processing::{FieldMismatch, ProcessingError, ProcessingField, ProcessingState};
pub use report::{ReportData, ReportValidationError};
pub use simulation::{is_bunker_mode, share_rate_precision, SimulatedTotals, SimulationParams};
