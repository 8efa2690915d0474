//! FinalizationBatchCalculator: paginated, budget-bounded batch search
//!
//! ```text
//! budget = limitedWithdrawals + limitedElRewards + min(buffered, unfinalizedQueue)
//! budget == 0 ──→ NoBudget (no page fetched)
//! otherwise   ──→ page(state) → state' ... until state'.finished
//! ```
//!
//! A failed page aborts the whole search; a truncated batch list would
//! under-pay withdrawals.

use crate::domain::{BatchBudget, BatchOutcome, FinalizationBatchState, SimulatedTotals};
use crate::error::{OracleError, OracleResult, ReportStep};
use crate::metrics;
use crate::ports::outbound::{ProtocolReader, WithdrawalQueueGateway};
use shared_types::U256;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs the batch search against the withdrawal queue.
pub struct FinalizationBatchCalculator<Q: WithdrawalQueueGateway, P: ProtocolReader> {
    queue: Arc<Q>,
    protocol: Arc<P>,
    max_requests_per_call: u64,
    max_pages: usize,
}

impl<Q: WithdrawalQueueGateway, P: ProtocolReader> FinalizationBatchCalculator<Q, P> {
    pub fn new(
        queue: Arc<Q>,
        protocol: Arc<P>,
        max_requests_per_call: u64,
        max_pages: usize,
    ) -> Self {
        Self {
            queue,
            protocol,
            max_requests_per_call,
            max_pages,
        }
    }

    /// Read the budget inputs for a simulated report.
    pub async fn budget(&self, ref_slot: u64, totals: &SimulatedTotals) -> OracleResult<BatchBudget> {
        let step = ReportStep::ComputeBatches;
        let buffered = self
            .protocol
            .buffered_ether()
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;
        let unfinalized_queue = self
            .protocol
            .unfinalized_queue_value()
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;

        Ok(BatchBudget {
            limited_withdrawals: totals.withdrawals,
            limited_el_rewards: totals.el_rewards,
            buffered,
            unfinalized_queue,
        })
    }

    /// Compute the payable batch boundaries.
    ///
    /// `now` is the current chain time; requests newer than
    /// `now - request_timestamp_margin` are excluded.
    pub async fn calculate(
        &self,
        ref_slot: u64,
        share_rate: U256,
        budget: BatchBudget,
        now: u64,
    ) -> OracleResult<BatchOutcome> {
        let step = ReportStep::ComputeBatches;
        let total = budget.total();
        if total == 0 {
            debug!(ref_slot, "[oracle] No budget for withdrawal finalization");
            return Ok(BatchOutcome::NoBudget);
        }

        if self.max_requests_per_call == 0 {
            return Err(OracleError::BatchCalculation {
                ref_slot,
                reason: "page size is zero".to_string(),
            });
        }

        let limits = self
            .protocol
            .withdrawal_limits()
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;
        let max_timestamp = now.saturating_sub(limits.request_timestamp_margin);

        let mut state = FinalizationBatchState::initial(total, limits.max_batches);
        let mut pages = 0usize;

        while !state.finished {
            if pages >= self.max_pages {
                return Err(OracleError::BatchCalculation {
                    ref_slot,
                    reason: format!("search not finished after {} pages", pages),
                });
            }

            let next = self
                .queue
                .next_batch_page(
                    share_rate,
                    max_timestamp,
                    self.max_requests_per_call,
                    state.clone(),
                )
                .await
                .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;

            state
                .check_progress(&next)
                .map_err(|e| OracleError::BatchCalculation {
                    ref_slot,
                    reason: e.to_string(),
                })?;

            pages += 1;
            metrics::record_batch_page();
            debug!(
                ref_slot,
                page = pages,
                remaining_budget = %next.remaining_budget,
                batches = next.batches_length,
                finished = next.finished,
                "[oracle] Batch page"
            );
            state = next;
        }

        let batches = state.boundaries();
        info!(
            ref_slot,
            pages,
            batches = batches.len(),
            budget = %total,
            "[oracle] Finalization batches computed"
        );
        Ok(BatchOutcome::Computed { batches, pages })
    }
}
