//! ReportSimulator: non-mutating accounting preview

use crate::domain::{
    is_bunker_mode, FrameSchedule, ReportData, SimulatedTotals, SimulationParams,
};
use crate::error::{OracleError, OracleResult, ReportStep};
use crate::ports::outbound::{AccountingSimulator, ProtocolReader};
use shared_types::{Wei, U256};
use std::sync::Arc;
use tracing::debug;

/// Preview result with the values the report derives from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub totals: SimulatedTotals,
    pub pre_total_pooled_ether: Wei,
    pub share_rate: U256,
    pub is_bunker_mode: bool,
}

/// Calls the accounting collaborator's preview entry point.
pub struct ReportSimulator<S: AccountingSimulator, P: ProtocolReader> {
    simulator: Arc<S>,
    protocol: Arc<P>,
}

impl<S: AccountingSimulator, P: ProtocolReader> ReportSimulator<S, P> {
    pub fn new(simulator: Arc<S>, protocol: Arc<P>) -> Self {
        Self {
            simulator,
            protocol,
        }
    }

    /// Preview `report`. Any failure aborts the cycle before anything is submitted.
    pub async fn simulate(
        &self,
        report: &ReportData,
        schedule: &FrameSchedule,
    ) -> OracleResult<SimulationOutcome> {
        let ref_slot = report.ref_slot;
        let params = SimulationParams::from_report(
            report,
            schedule.report_timestamp(ref_slot),
            schedule.time_elapsed(),
        );

        let pre_total_pooled_ether = self
            .protocol
            .total_pooled_ether()
            .await
            .map_err(|e| OracleError::transport(ReportStep::Simulate, Some(ref_slot), e))?;

        let totals = self
            .simulator
            .simulate(&params)
            .await
            .map_err(|e| OracleError::SimulationFailure {
                ref_slot,
                reason: e.to_string(),
            })?;

        let share_rate = totals
            .share_rate()
            .ok_or_else(|| OracleError::SimulationFailure {
                ref_slot,
                reason: "simulated total shares is zero".to_string(),
            })?;
        let bunker = is_bunker_mode(pre_total_pooled_ether, totals.post_total_pooled_ether);

        debug!(
            ref_slot,
            pre_total = %pre_total_pooled_ether,
            post_total = %totals.post_total_pooled_ether,
            post_shares = %totals.post_total_shares,
            share_rate = %share_rate,
            bunker,
            "[oracle] Simulation complete"
        );

        Ok(SimulationOutcome {
            totals,
            pre_total_pooled_ether,
            share_rate,
            is_bunker_mode: bunker,
        })
    }
}
