//! ReportSnapshotBuilder: live reads merged with caller overrides

use super::clock::ChainClock;
use crate::domain::{LiveReadings, ReportData, ReportOverrides};
use crate::error::{OracleError, OracleResult, ReportStep};
use crate::ports::outbound::{ChainReader, ProtocolReader};
use std::sync::Arc;
use tracing::{debug, warn};

/// Assembles an unfinalized [`ReportData`]. Never submits anything.
pub struct ReportSnapshotBuilder<C: ChainReader, P: ProtocolReader> {
    clock: Arc<ChainClock<C>>,
    protocol: Arc<P>,
}

impl<C: ChainReader, P: ProtocolReader> ReportSnapshotBuilder<C, P> {
    pub fn new(clock: Arc<ChainClock<C>>, protocol: Arc<P>) -> Self {
        Self { clock, protocol }
    }

    /// Read live values and resolve `overrides` against them.
    pub async fn build(
        &self,
        overrides: &ReportOverrides,
        consensus_version: u64,
    ) -> OracleResult<ReportData> {
        let live = self.read_live().await?;

        if overrides.vault_flags_overridden() {
            warn!(
                ref_slot = live.ref_slot,
                "[oracle] exclude_vault_balances set: reporting zero for both vaults, per-vault inputs ignored"
            );
        }

        let report = overrides
            .resolve(&live, consensus_version)
            .map_err(|source| OracleError::InvalidReport {
                ref_slot: live.ref_slot,
                step: ReportStep::BuildSnapshot,
                source,
            })?;

        debug!(
            ref_slot = report.ref_slot,
            validators = report.num_validators,
            cl_balance_gwei = report.cl_balance_gwei,
            withdrawal_vault = %report.withdrawal_vault_balance,
            el_rewards_vault = %report.el_rewards_vault_balance,
            "[oracle] Snapshot built"
        );
        Ok(report)
    }

    async fn read_live(&self) -> OracleResult<LiveReadings> {
        let frame = self.clock.current_frame().await?;
        let ref_slot = Some(frame.ref_slot);
        let step = ReportStep::BuildSnapshot;

        let beacon = self
            .protocol
            .beacon_stat()
            .await
            .map_err(|e| OracleError::transport(step, ref_slot, e))?;
        let vaults = self
            .protocol
            .vault_balances()
            .await
            .map_err(|e| OracleError::transport(step, ref_slot, e))?;
        let shares_requested_to_burn = self
            .protocol
            .shares_requested_to_burn()
            .await
            .map_err(|e| OracleError::transport(step, ref_slot, e))?;

        Ok(LiveReadings {
            ref_slot: frame.ref_slot,
            beacon_validators: beacon.validators,
            beacon_balance_gwei: beacon.balance_gwei,
            withdrawal_vault_balance: vaults.withdrawal_vault,
            el_rewards_vault_balance: vaults.el_rewards_vault,
            shares_requested_to_burn,
        })
    }
}
