//! Report overrides
//!
//! Every field is optional; an absent field means "read the live value". The
//! single merge point is [`ReportOverrides::resolve`].
//!
//! Vault precedence: `exclude_vault_balances` forces both vault balances to
//! zero, beating explicit balances and the per-vault `report_*` flags. Without
//! it, an explicit balance wins, then the flag decides between the live
//! balance (default) and zero.

use super::extra_data::ExtraData;
use super::report::{ReportData, ReportValidationError};
use serde::{Deserialize, Serialize};
use shared_types::{Gwei, Wei, U256};

/// Caller-supplied deltas and overrides for one report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOverrides {
    pub ref_slot: Option<u64>,
    /// Signed change to the live consensus-layer balance, gwei
    pub cl_diff_gwei: Option<i128>,
    /// Validators that appeared since the last report
    pub cl_appeared_validators: Option<u64>,
    pub el_rewards_vault_balance: Option<Wei>,
    pub withdrawal_vault_balance: Option<Wei>,
    pub shares_requested_to_burn: Option<u128>,
    /// Explicit batches; skips the batch calculation
    pub withdrawal_finalization_batches: Option<Vec<u64>>,
    /// Explicit share rate; skips the derivation from the simulation
    pub share_rate: Option<U256>,
    pub is_bunker_mode: Option<bool>,
    pub exclude_vault_balances: bool,
    /// Report the live EL rewards vault balance (default true)
    pub report_el_vault: Option<bool>,
    /// Report the live withdrawal vault balance (default true)
    pub report_withdrawals_vault: Option<bool>,
    pub skip_withdrawals: bool,
    pub staking_module_ids_with_newly_exited_validators: Option<Vec<u64>>,
    pub num_exited_validators_by_staking_module: Option<Vec<u64>>,
    pub extra_data: Option<ExtraData>,
    /// Stop after building the report; nothing is submitted
    pub dry_run: bool,
}

/// Live protocol values the snapshot defaults to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveReadings {
    pub ref_slot: u64,
    pub beacon_validators: u64,
    pub beacon_balance_gwei: Gwei,
    pub withdrawal_vault_balance: Wei,
    pub el_rewards_vault_balance: Wei,
    pub shares_requested_to_burn: u128,
}

impl ReportOverrides {
    /// Vault inputs that `exclude_vault_balances` silently overrides.
    pub fn vault_flags_overridden(&self) -> bool {
        self.exclude_vault_balances
            && (self.report_el_vault == Some(true)
                || self.report_withdrawals_vault == Some(true)
                || self.el_rewards_vault_balance.is_some()
                || self.withdrawal_vault_balance.is_some())
    }

    /// Merge overrides with live readings into an unfinalized report.
    ///
    /// Share rate, bunker flag and batches are left at their neutral values;
    /// they are derived later in the cycle.
    pub fn resolve(
        &self,
        live: &LiveReadings,
        consensus_version: u64,
    ) -> Result<ReportData, ReportValidationError> {
        let cl_balance_gwei = match self.cl_diff_gwei {
            Some(diff) => {
                let balance = i128::from(live.beacon_balance_gwei) + diff;
                Gwei::try_from(balance).map_err(|_| ReportValidationError::ClBalanceUnderflow {
                    balance: live.beacon_balance_gwei,
                    diff,
                })?
            }
            None => live.beacon_balance_gwei,
        };

        let (withdrawal_vault_balance, el_rewards_vault_balance) = if self.exclude_vault_balances
        {
            (0, 0)
        } else {
            let withdrawals = self.withdrawal_vault_balance.unwrap_or(
                if self.report_withdrawals_vault.unwrap_or(true) {
                    live.withdrawal_vault_balance
                } else {
                    0
                },
            );
            let el_rewards = self.el_rewards_vault_balance.unwrap_or(
                if self.report_el_vault.unwrap_or(true) {
                    live.el_rewards_vault_balance
                } else {
                    0
                },
            );
            (withdrawals, el_rewards)
        };

        Ok(ReportData {
            consensus_version,
            ref_slot: self.ref_slot.unwrap_or(live.ref_slot),
            num_validators: live
                .beacon_validators
                .saturating_add(self.cl_appeared_validators.unwrap_or(0)),
            cl_balance_gwei,
            staking_module_ids_with_newly_exited_validators: self
                .staking_module_ids_with_newly_exited_validators
                .clone()
                .unwrap_or_default(),
            num_exited_validators_by_staking_module: self
                .num_exited_validators_by_staking_module
                .clone()
                .unwrap_or_default(),
            withdrawal_vault_balance,
            el_rewards_vault_balance,
            shares_requested_to_burn: self
                .shares_requested_to_burn
                .unwrap_or(live.shares_requested_to_burn),
            withdrawal_finalization_batches: Vec::new(),
            share_rate: U256::zero(),
            is_bunker_mode: false,
            extra_data: self.extra_data.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::GWEI_PER_ETHER;

    fn live() -> LiveReadings {
        LiveReadings {
            ref_slot: 1000,
            beacon_validators: 100,
            beacon_balance_gwei: 3_200 * GWEI_PER_ETHER,
            withdrawal_vault_balance: 11,
            el_rewards_vault_balance: 22,
            shares_requested_to_burn: 33,
        }
    }

    #[test]
    fn test_defaults_read_live_values() {
        let report = ReportOverrides::default().resolve(&live(), 2).unwrap();
        assert_eq!(report.ref_slot, 1000);
        assert_eq!(report.num_validators, 100);
        assert_eq!(report.cl_balance_gwei, 3_200 * GWEI_PER_ETHER);
        assert_eq!(report.withdrawal_vault_balance, 11);
        assert_eq!(report.el_rewards_vault_balance, 22);
        assert_eq!(report.shares_requested_to_burn, 33);
        assert_eq!(report.consensus_version, 2);
        assert!(report.extra_data.is_empty());
    }

    #[test]
    fn test_cl_deltas_applied() {
        let overrides = ReportOverrides {
            cl_diff_gwei: Some(160 * i128::from(GWEI_PER_ETHER)),
            cl_appeared_validators: Some(5),
            ..Default::default()
        };
        let report = overrides.resolve(&live(), 2).unwrap();
        assert_eq!(report.num_validators, 105);
        assert_eq!(report.cl_balance_gwei, 3_360 * GWEI_PER_ETHER);
    }

    #[test]
    fn test_negative_balance_rejected() {
        let overrides = ReportOverrides {
            cl_diff_gwei: Some(-(3_201 * i128::from(GWEI_PER_ETHER))),
            ..Default::default()
        };
        assert!(matches!(
            overrides.resolve(&live(), 2),
            Err(ReportValidationError::ClBalanceUnderflow { .. })
        ));
    }

    #[test]
    fn test_exclude_vaults_wins_over_flags() {
        let overrides = ReportOverrides {
            exclude_vault_balances: true,
            report_el_vault: Some(true),
            report_withdrawals_vault: Some(true),
            el_rewards_vault_balance: Some(500),
            ..Default::default()
        };
        assert!(overrides.vault_flags_overridden());

        let report = overrides.resolve(&live(), 2).unwrap();
        assert_eq!(report.withdrawal_vault_balance, 0);
        assert_eq!(report.el_rewards_vault_balance, 0);
    }

    #[test]
    fn test_vault_flags_without_exclusion() {
        let overrides = ReportOverrides {
            report_el_vault: Some(false),
            withdrawal_vault_balance: Some(7),
            report_withdrawals_vault: Some(false),
            ..Default::default()
        };
        assert!(!overrides.vault_flags_overridden());

        let report = overrides.resolve(&live(), 2).unwrap();
        // explicit balance beats the flag, the flag zeroes the live value
        assert_eq!(report.withdrawal_vault_balance, 7);
        assert_eq!(report.el_rewards_vault_balance, 0);
    }
}
