//! Error types for the accounting oracle
//!
//! Every failure reaching the orchestration boundary names the ref slot and
//! the step of the cycle it happened in. Nothing is recovered locally.

use crate::domain::{
    BatchProgressError, ClaimError, FieldMismatch, ProcessingError, ReportValidationError,
};
use std::fmt;
use thiserror::Error;

/// Step of a report cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportStep {
    WaitFrame,
    BuildSnapshot,
    Simulate,
    ComputeBatches,
    FinalizeReport,
    ReachConsensus,
    SubmitMainData,
    SubmitExtraData,
    VerifyCommit,
}

impl ReportStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitFrame => "wait_frame",
            Self::BuildSnapshot => "build_snapshot",
            Self::Simulate => "simulate",
            Self::ComputeBatches => "compute_batches",
            Self::FinalizeReport => "finalize_report",
            Self::ReachConsensus => "reach_consensus",
            Self::SubmitMainData => "submit_main_data",
            Self::SubmitExtraData => "submit_extra_data",
            Self::VerifyCommit => "verify_commit",
        }
    }
}

impl fmt::Display for ReportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of calls to the external protocol collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Collaborator unreachable or timed out
    #[error("{call} unavailable: {reason}")]
    Unavailable { call: &'static str, reason: String },

    /// Committee rejected a claim
    #[error("Claim rejected: {0}")]
    Claim(#[from] ClaimError),

    /// Report processor rejected a submission
    #[error("Submission rejected: {0}")]
    Processing(#[from] ProcessingError),

    /// Any other collaborator-side rejection
    #[error("{call} rejected: {reason}")]
    Rejected { call: &'static str, reason: String },
}

/// Result type for collaborator calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Accounting oracle errors
#[derive(Debug, Error)]
pub enum OracleError {
    /// An external call failed
    #[error("Report cycle for ref slot {ref_slot:?} failed at {step}: {source}")]
    Transport {
        step: ReportStep,
        ref_slot: Option<u64>,
        #[source]
        source: GatewayError,
    },

    /// The accounting collaborator could not produce a preview
    #[error("Simulation failed for ref slot {ref_slot}: {reason}")]
    SimulationFailure { ref_slot: u64, reason: String },

    /// Batch search returned an inconsistent cursor or did not terminate
    #[error("Finalization batch calculation failed for ref slot {ref_slot}: {reason}")]
    BatchCalculation { ref_slot: u64, reason: String },

    /// Report violates a structural invariant
    #[error("Invalid report for ref slot {ref_slot} at {step}: {source}")]
    InvalidReport {
        ref_slot: u64,
        /// Snapshot merge or finalization
        step: ReportStep,
        #[source]
        source: ReportValidationError,
    },

    /// Committee does not hold the submitted hash
    #[error("Consensus mismatch for ref slot {ref_slot}: submitted {expected}, ledger holds {actual}")]
    ConsensusMismatch {
        ref_slot: u64,
        expected: String,
        actual: String,
    },

    /// No committee member could submit
    #[error("No committee member submitted a claim for ref slot {ref_slot} ({failed} failed)")]
    NoSubmitter { ref_slot: u64, failed: usize },

    /// Stored processing state differs from what was committed
    #[error("Commit verification failed for ref slot {ref_slot}: {}", format_failure(.mismatches, .cause))]
    CommitVerificationFailure {
        ref_slot: u64,
        mismatches: Vec<FieldMismatch>,
        /// Submission error that preceded verification, if any
        cause: Option<GatewayError>,
    },

    /// Next frame did not open in time
    #[error("Frame after ref slot {last_ref_slot} did not open within {waited_secs}s")]
    FrameWaitTimeout { last_ref_slot: u64, waited_secs: u64 },

    /// Open frame already reported
    #[error("Ref slot {ref_slot} already processed (last {last_processed})")]
    StaleRefSlot { ref_slot: u64, last_processed: u64 },
}

fn format_failure(mismatches: &[FieldMismatch], cause: &Option<GatewayError>) -> String {
    let fields = if mismatches.is_empty() {
        "no field mismatches".to_string()
    } else {
        mismatches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    };
    match cause {
        Some(cause) => format!("{} (after {})", fields, cause),
        None => fields,
    }
}

impl OracleError {
    pub(crate) fn transport(step: ReportStep, ref_slot: Option<u64>, source: GatewayError) -> Self {
        Self::Transport {
            step,
            ref_slot,
            source,
        }
    }

    /// Step of the cycle that failed.
    pub fn step(&self) -> ReportStep {
        match self {
            Self::Transport { step, .. } => *step,
            Self::SimulationFailure { .. } => ReportStep::Simulate,
            Self::BatchCalculation { .. } => ReportStep::ComputeBatches,
            Self::InvalidReport { step, .. } => *step,
            Self::ConsensusMismatch { .. } | Self::NoSubmitter { .. } => {
                ReportStep::ReachConsensus
            }
            Self::CommitVerificationFailure { .. } => ReportStep::VerifyCommit,
            Self::FrameWaitTimeout { .. } | Self::StaleRefSlot { .. } => ReportStep::WaitFrame,
        }
    }

    /// Ref slot of the failed cycle, when known.
    pub fn ref_slot(&self) -> Option<u64> {
        match self {
            Self::Transport { ref_slot, .. } => *ref_slot,
            Self::SimulationFailure { ref_slot, .. }
            | Self::BatchCalculation { ref_slot, .. }
            | Self::InvalidReport { ref_slot, .. }
            | Self::ConsensusMismatch { ref_slot, .. }
            | Self::NoSubmitter { ref_slot, .. }
            | Self::CommitVerificationFailure { ref_slot, .. }
            | Self::StaleRefSlot { ref_slot, .. } => Some(*ref_slot),
            Self::FrameWaitTimeout { .. } => None,
        }
    }

    /// Whether the main report may already be stored on-chain.
    pub fn is_post_commit(&self) -> bool {
        matches!(
            self,
            Self::CommitVerificationFailure { .. }
                | Self::Transport {
                    step: ReportStep::SubmitExtraData | ReportStep::VerifyCommit,
                    ..
                }
        )
    }
}

/// Result type for oracle operations
pub type OracleResult<T> = Result<T, OracleError>;
