//! Withdrawal finalization batches
//!
//! The batch search walks the withdrawal queue page by page. Its cursor is an
//! explicit value ([`FinalizationBatchState`]) handed to the queue and replaced
//! by the queue's response on every call, so each step can be recorded and
//! replayed.

use serde::{Deserialize, Serialize};
use shared_types::Wei;
use thiserror::Error;

/// Violations of the page-to-page progress rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchProgressError {
    #[error("Remaining budget increased from {before} to {after}")]
    BudgetIncreased { before: Wei, after: Wei },

    #[error("Batch count decreased from {before} to {after}")]
    CountDecreased { before: usize, after: usize },

    #[error("Batch capacity changed from {before} to {after}")]
    CapacityChanged { before: usize, after: usize },

    #[error("Batch count {count} exceeds capacity {capacity}")]
    CountOverCapacity { count: usize, capacity: usize },

    #[error("Queried again after the search finished")]
    AlreadyFinished,
}

/// Iteration state of the paginated batch search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationBatchState {
    /// Funds not yet allocated to a boundary
    pub remaining_budget: Wei,
    pub finished: bool,
    /// Fixed-capacity boundary array; slots past `batches_length` are zero
    pub batches: Vec<u64>,
    pub batches_length: usize,
}

impl FinalizationBatchState {
    /// Fresh state for a search with `budget` to spend.
    pub fn initial(budget: Wei, capacity: usize) -> Self {
        Self {
            remaining_budget: budget,
            finished: false,
            batches: vec![0; capacity],
            batches_length: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.batches.len()
    }

    /// Filled boundaries, trailing empty slots stripped.
    pub fn boundaries(&self) -> Vec<u64> {
        let filled = &self.batches[..self.batches_length.min(self.batches.len())];
        let end = filled
            .iter()
            .rposition(|b| *b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        filled[..end].to_vec()
    }

    /// Validate the transition from `self` to the queue's response.
    pub fn check_progress(&self, next: &Self) -> Result<(), BatchProgressError> {
        if self.finished {
            return Err(BatchProgressError::AlreadyFinished);
        }
        if next.remaining_budget > self.remaining_budget {
            return Err(BatchProgressError::BudgetIncreased {
                before: self.remaining_budget,
                after: next.remaining_budget,
            });
        }
        if next.batches_length < self.batches_length {
            return Err(BatchProgressError::CountDecreased {
                before: self.batches_length,
                after: next.batches_length,
            });
        }
        if next.capacity() != self.capacity() {
            return Err(BatchProgressError::CapacityChanged {
                before: self.capacity(),
                after: next.capacity(),
            });
        }
        if next.batches_length > next.capacity() {
            return Err(BatchProgressError::CountOverCapacity {
                count: next.batches_length,
                capacity: next.capacity(),
            });
        }
        Ok(())
    }
}

/// Funds available to finalize withdrawals this frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchBudget {
    /// Withdrawal vault amount the simulation allows to be used
    pub limited_withdrawals: Wei,
    /// EL rewards vault amount the simulation allows to be used
    pub limited_el_rewards: Wei,
    pub buffered: Wei,
    pub unfinalized_queue: Wei,
}

impl BatchBudget {
    /// Only the part of the buffer the queue actually needs is reserved.
    pub fn total(&self) -> Wei {
        self.limited_withdrawals
            .saturating_add(self.limited_el_rewards)
            .saturating_add(self.buffered.min(self.unfinalized_queue))
    }
}

/// Result of the batch calculation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing to spend; no page was fetched
    NoBudget,
    /// Batches supplied by the caller
    Provided(Vec<u64>),
    /// Withdrawals skipped on request
    Skipped,
    Computed { batches: Vec<u64>, pages: usize },
}

impl BatchOutcome {
    pub fn batches(&self) -> Vec<u64> {
        match self {
            Self::NoBudget | Self::Skipped => Vec::new(),
            Self::Provided(batches) => batches.clone(),
            Self::Computed { batches, .. } => batches.clone(),
        }
    }

    pub fn pages(&self) -> usize {
        match self {
            Self::Computed { pages, .. } => *pages,
            _ => 0,
        }
    }
}
