//! Report simulation inputs and outputs
//!
//! The accounting collaborator previews a report without applying it. The
//! engine only derives two things from the preview: the share rate the report
//! carries and whether the report puts the protocol into bunker mode.

use super::report::ReportData;
use serde::{Deserialize, Serialize};
use shared_types::{Gwei, Wei, U256};

/// Share rate precision: 27 decimals.
pub fn share_rate_precision() -> U256 {
    U256::exp10(27)
}

/// Inputs of the non-mutating preview call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub report_timestamp: u64,
    pub time_elapsed: u64,
    pub cl_validators: u64,
    pub cl_balance_gwei: Gwei,
    pub withdrawal_vault_balance: Wei,
    pub el_rewards_vault_balance: Wei,
    pub shares_requested_to_burn: u128,
    pub staking_module_ids_with_newly_exited_validators: Vec<u64>,
    pub num_exited_validators_by_staking_module: Vec<u64>,
}

impl SimulationParams {
    pub fn from_report(report: &ReportData, report_timestamp: u64, time_elapsed: u64) -> Self {
        Self {
            report_timestamp,
            time_elapsed,
            cl_validators: report.num_validators,
            cl_balance_gwei: report.cl_balance_gwei,
            withdrawal_vault_balance: report.withdrawal_vault_balance,
            el_rewards_vault_balance: report.el_rewards_vault_balance,
            shares_requested_to_burn: report.shares_requested_to_burn,
            staking_module_ids_with_newly_exited_validators: report
                .staking_module_ids_with_newly_exited_validators
                .clone(),
            num_exited_validators_by_staking_module: report
                .num_exited_validators_by_staking_module
                .clone(),
        }
    }
}

/// Hypothetical post-report totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedTotals {
    pub post_total_pooled_ether: Wei,
    pub post_total_shares: u128,
    /// Withdrawal vault funds the report may use
    pub withdrawals: Wei,
    /// EL rewards vault funds the report may use
    pub el_rewards: Wei,
}

impl SimulatedTotals {
    /// Post-report ether per share, 1e27 precision. `None` with no shares.
    pub fn share_rate(&self) -> Option<U256> {
        if self.post_total_shares == 0 {
            return None;
        }
        Some(
            U256::from(self.post_total_pooled_ether) * share_rate_precision()
                / U256::from(self.post_total_shares),
        )
    }
}

/// A loss is signalled when the report would lower the recorded total.
pub fn is_bunker_mode(pre_total_pooled_ether: Wei, post_total_pooled_ether: Wei) -> bool {
    post_total_pooled_ether < pre_total_pooled_ether
}
