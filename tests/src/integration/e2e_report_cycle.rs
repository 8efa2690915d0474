//! # End-to-End Report Cycle Tests
//!
//! Drives complete cycles through `AccountingOracleApi`:
//!
//! ```text
//! [ChainClock] ──frame──→ [Snapshot] ──report──→ [Simulator]
//!                                                    │
//!                                       share rate, bunker mode
//!                                                    ↓
//!                                          [Batch calculator]
//!                                                    │
//!                                                    ↓
//!                          [Consensus: fast lane claims, quorum]
//!                                                    │
//!                                                    ↓
//!                     [Commit: main data → extra data → verify]
//! ```
//!
//! ## Test Categories
//!
//! 1. **Happy Path**: committed report matches the processing state
//! 2. **Withdrawals**: vault funds finalize queued requests
//! 3. **Overrides**: vault exclusion
//! 4. **Failures**: corrupted commit, foreign claims, metrics on failure

#[cfg(test)]
use accounting_oracle::adapters::ProtocolSetup;

#[cfg(test)]
use accounting_oracle::ports::outbound::BeaconStat;

#[cfg(test)]
use shared_types::{GWEI_PER_ETHER, WEI_PER_ETHER};

/// Protocol at ref slot 1000: 10 validators holding 320 ETH and five
/// deposits not yet visible on the beacon chain.
#[cfg(test)]
fn frame_1000_setup() -> ProtocolSetup {
    ProtocolSetup {
        ref_slot: 1000,
        beacon: BeaconStat {
            validators: 10,
            balance_gwei: 320 * GWEI_PER_ETHER,
        },
        deposited_validators: 15,
        buffered_ether: 32 * WEI_PER_ETHER,
        total_shares: 512 * WEI_PER_ETHER,
        ..ProtocolSetup::default()
    }
}

// =============================================================================
// INTEGRATION TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::harness;
    use accounting_oracle::domain::{
        share_rate_precision, ConsensusClaim, ExtraDataFormat, ProcessingField,
    };
    use accounting_oracle::ports::outbound::{ProtocolReader, ReportProcessorGateway};
    use accounting_oracle::{
        AccountingOracleApi, BatchOutcome, OracleError, ReportOverrides, ReportStep,
    };
    use shared_types::{keccak256, MemberId};

    /// Five appeared validators carrying their 160 ETH of deposits.
    fn appeared_validators() -> ReportOverrides {
        ReportOverrides {
            cl_diff_gwei: Some(160 * i128::from(GWEI_PER_ETHER)),
            cl_appeared_validators: Some(5),
            ..Default::default()
        }
    }

    /// Test: Complete cycle at ref slot 1000 (happy path)
    #[tokio::test]
    async fn test_e2e_report_cycle_at_ref_slot_1000() {
        let (protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());

        let outcome = oracle.report(appeared_validators()).await.unwrap();

        // Step 1: Snapshot taken at the open frame
        assert_eq!(outcome.ref_slot, 1000);
        assert_eq!(outcome.report.num_validators, 15);
        assert_eq!(outcome.report.cl_balance_gwei, 480 * GWEI_PER_ETHER);

        // Step 2: Deposits moving onto the beacon chain keep the total flat
        assert_eq!(outcome.report.share_rate, share_rate_precision());
        assert!(!outcome.report.is_bunker_mode);

        // Step 3: Empty vaults and queue leave nothing to finalize
        assert_eq!(outcome.batch_outcome, BatchOutcome::NoBudget);
        assert_eq!(protocol.page_calls(), 0);

        // Step 4: Fast lane reaches quorum, lowest member commits
        let consensus = outcome.consensus.as_ref().unwrap();
        assert_eq!(consensus.submitted.len(), 3);
        assert_eq!(consensus.quorum, 3);
        assert_eq!(consensus.submitter, MemberId::from_index(0));
        assert_eq!(consensus.report.report_hash, Some(outcome.report_hash));

        // Step 5: Processing state reflects both phases
        let state = protocol.processing_state(1000).await.unwrap();
        assert!(state.main_data_submitted);
        assert!(state.extra_data_submitted);
        assert_eq!(state.main_data_hash, outcome.report_hash);
        assert_eq!(state.extra_data_format, ExtraDataFormat::Empty);
        assert_eq!(state.extra_data_items_count, 0);
        assert!(state.mismatches(&outcome.report, outcome.report_hash).is_empty());

        assert_eq!(oracle.last_processed_ref_slot().await, Some(1000));
    }

    /// Test: Vault funds pay out queued withdrawal requests
    #[tokio::test]
    async fn test_e2e_vaults_finalize_withdrawals() {
        let (protocol, oracle) = harness::oracle(ProtocolSetup::default(), harness::config());
        protocol.set_vaults(2 * WEI_PER_ETHER, WEI_PER_ETHER);
        for _ in 0..3 {
            protocol.enqueue_withdrawal(WEI_PER_ETHER, WEI_PER_ETHER);
        }
        protocol.advance_time(8_000);

        let outcome = oracle.report(ReportOverrides::default()).await.unwrap();

        assert_eq!(outcome.report.withdrawal_vault_balance, 2 * WEI_PER_ETHER);
        assert_eq!(outcome.report.el_rewards_vault_balance, WEI_PER_ETHER);
        assert!(outcome.report.share_rate > share_rate_precision());
        assert_eq!(outcome.report.withdrawal_finalization_batches, vec![3]);
        assert_eq!(protocol.last_finalized_request(), 3);

        // 3 ETH swept from the vaults, 3 ETH locked for the requests
        assert_eq!(
            protocol.buffered_ether().await.unwrap(),
            32 * WEI_PER_ETHER
        );
        assert_eq!(protocol.unfinalized_queue_value().await.unwrap(), 0);
    }

    /// Test: Vault exclusion overrides explicit vault flags
    #[tokio::test]
    async fn test_e2e_excluded_vaults_are_not_reported() {
        let (protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());
        protocol.set_vaults(10 * WEI_PER_ETHER, 2 * WEI_PER_ETHER);

        let outcome = oracle
            .report(ReportOverrides {
                exclude_vault_balances: true,
                report_el_vault: Some(true),
                report_withdrawals_vault: Some(true),
                ..appeared_validators()
            })
            .await
            .unwrap();

        assert_eq!(outcome.report.withdrawal_vault_balance, 0);
        assert_eq!(outcome.report.el_rewards_vault_balance, 0);
        assert!(outcome.is_committed());

        let vaults = protocol.vault_balances().await.unwrap();
        assert_eq!(vaults.withdrawal_vault, 10 * WEI_PER_ETHER);
        assert_eq!(vaults.el_rewards_vault, 2 * WEI_PER_ETHER);
    }

    /// Test: A corrupted stored hash is caught after commit and counted
    #[tokio::test]
    async fn test_e2e_corrupted_commit_reported() {
        let (protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());
        protocol.corrupt_extra_data_hash();

        let err = oracle.report(appeared_validators()).await.unwrap_err();

        assert_eq!(err.step(), ReportStep::VerifyCommit);
        assert!(err.is_post_commit());
        match err {
            OracleError::CommitVerificationFailure {
                ref_slot,
                mismatches,
                cause,
            } => {
                assert_eq!(ref_slot, 1000);
                assert!(cause.is_none());
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].field, ProcessingField::ExtraDataHash);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(oracle.last_processed_ref_slot().await, None);

        let scrape = oracle_telemetry::encode_metrics().unwrap();
        assert!(scrape.contains("oracle_report_cycles_failed_total"));
        assert!(scrape.contains("step=\"verify_commit\""));
    }

    /// Test: A foreign claim for another hash does not block the fast lane
    #[tokio::test]
    async fn test_e2e_foreign_claim_outvoted() {
        let (protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());
        protocol
            .submit_external_claim(ConsensusClaim {
                member: MemberId::from_index(4),
                ref_slot: 1000,
                report_hash: keccak256(b"some other report"),
                consensus_version: 1,
            })
            .unwrap();

        let outcome = oracle.report(appeared_validators()).await.unwrap();

        let consensus = outcome.consensus.unwrap();
        assert_eq!(consensus.report.report_hash, Some(outcome.report_hash));
        assert_eq!(consensus.report.support, 3);
        assert!(outcome.commit.is_some());
    }

    /// Test: Dry run and real cycle agree on the hash
    #[tokio::test]
    async fn test_e2e_dry_run_matches_commit() {
        let (protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());

        let (dry_report, dry_hash) = oracle.dry_run(appeared_validators()).await.unwrap();
        assert_eq!(protocol.claim_calls(), 0);

        let outcome = oracle.report(appeared_validators()).await.unwrap();
        assert_eq!(outcome.report, dry_report);
        assert_eq!(outcome.report_hash, dry_hash);
    }

    /// Test: Successful cycles show up in the scrape output
    #[tokio::test]
    async fn test_e2e_metrics_exposed() {
        let (_protocol, oracle) = harness::oracle(frame_1000_setup(), harness::config());
        oracle.report(appeared_validators()).await.unwrap();

        let scrape = oracle_telemetry::encode_metrics().unwrap();
        assert!(scrape.contains("oracle_report_cycles_started_total"));
        assert!(scrape.contains("oracle_report_cycles_succeeded_total"));
        assert!(scrape.contains("oracle_claims_submitted_total"));
    }
}
