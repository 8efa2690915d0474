//! ReportCommitter: two-phase commit and verification
//!
//! ```text
//! submit_main_data ──→ submit_extra_data_{empty,list} ──→ processing_state == report ?
//! ```
//!
//! Nothing here retries. Once main data is accepted every failure, including
//! a failed re-read of the processing state, is reported as a verification
//! failure, since the stored state is no longer known.

use crate::domain::{ExtraDataFormat, FieldMismatch, ReportData};
use crate::error::{GatewayError, OracleError, OracleResult, ReportStep};
use crate::ports::outbound::ReportProcessorGateway;
use serde::{Deserialize, Serialize};
use shared_types::{short_hex, Hash, MemberId, TxHash};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Transactions of a verified commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub main_tx: TxHash,
    pub extra_tx: TxHash,
}

pub struct ReportCommitter<R: ReportProcessorGateway> {
    processor: Arc<R>,
}

impl<R: ReportProcessorGateway> ReportCommitter<R> {
    pub fn new(processor: Arc<R>) -> Self {
        Self { processor }
    }

    /// Submit `report` as `submitter` and verify the stored processing state.
    pub async fn commit(
        &self,
        report: &ReportData,
        report_hash: Hash,
        submitter: MemberId,
        contract_version: u64,
    ) -> OracleResult<CommitReceipt> {
        let ref_slot = report.ref_slot;

        let main_tx = self
            .processor
            .submit_main_data(submitter, report, contract_version)
            .await
            .map_err(|e| OracleError::transport(ReportStep::SubmitMainData, Some(ref_slot), e))?;
        debug!(
            ref_slot,
            submitter = %submitter,
            tx = %short_hex(&main_tx),
            "[oracle] Main data submitted"
        );

        let extra_tx = match self.submit_extra(report, submitter).await {
            Ok(tx) => tx,
            Err(cause) => {
                error!(
                    ref_slot,
                    error = %cause,
                    "[oracle] Extra data submission failed after main data was accepted"
                );
                let mismatches = match self.read_mismatches(report, report_hash).await {
                    Ok(mismatches) => mismatches,
                    Err(read_error) => {
                        error!(
                            ref_slot,
                            error = %read_error,
                            "[oracle] Processing state unreadable after failed extra data"
                        );
                        Vec::new()
                    }
                };
                return Err(OracleError::CommitVerificationFailure {
                    ref_slot,
                    mismatches,
                    cause: Some(cause),
                });
            }
        };

        let mismatches = self
            .read_mismatches(report, report_hash)
            .await
            .map_err(|cause| {
                error!(
                    ref_slot,
                    error = %cause,
                    "[oracle] Processing state unreadable after commit"
                );
                OracleError::CommitVerificationFailure {
                    ref_slot,
                    mismatches: Vec::new(),
                    cause: Some(cause),
                }
            })?;
        if !mismatches.is_empty() {
            error!(
                ref_slot,
                mismatches = mismatches.len(),
                "[oracle] Processing state does not match committed report"
            );
            return Err(OracleError::CommitVerificationFailure {
                ref_slot,
                mismatches,
                cause: None,
            });
        }

        info!(
            ref_slot,
            hash = %short_hex(&report_hash),
            format = ?report.extra_data.format,
            items = report.extra_data.items_count,
            "[oracle] Report committed and verified"
        );
        Ok(CommitReceipt { main_tx, extra_tx })
    }

    /// Re-read the processing state and list every field that differs from `report`.
    pub async fn verify(
        &self,
        report: &ReportData,
        report_hash: Hash,
    ) -> OracleResult<Vec<FieldMismatch>> {
        self.read_mismatches(report, report_hash)
            .await
            .map_err(|e| {
                OracleError::transport(ReportStep::VerifyCommit, Some(report.ref_slot), e)
            })
    }

    async fn read_mismatches(
        &self,
        report: &ReportData,
        report_hash: Hash,
    ) -> Result<Vec<FieldMismatch>, GatewayError> {
        let state = self.processor.processing_state(report.ref_slot).await?;
        Ok(state.mismatches(report, report_hash))
    }

    async fn submit_extra(
        &self,
        report: &ReportData,
        submitter: MemberId,
    ) -> Result<TxHash, GatewayError> {
        match report.extra_data.format {
            ExtraDataFormat::Empty => self.processor.submit_extra_data_empty(submitter).await,
            ExtraDataFormat::List => {
                self.processor
                    .submit_extra_data_list(submitter, &report.extra_data.payload)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExtraData, ExtraDataItem, ProcessingError, ProcessingField, ProcessingState};
    use crate::error::GatewayResult;
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use shared_types::{keccak256, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records submissions straight into a processing state.
    #[derive(Default)]
    struct MockProcessor {
        state: RwLock<ProcessingState>,
        main_calls: AtomicUsize,
        extra_calls: AtomicUsize,
        reject_extra: bool,
        drop_extra_flag: bool,
        fail_read: bool,
    }

    #[async_trait]
    impl ReportProcessorGateway for MockProcessor {
        async fn submit_main_data(
            &self,
            _submitter: MemberId,
            report: &ReportData,
            _contract_version: u64,
        ) -> GatewayResult<TxHash> {
            self.main_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.write();
            *state = ProcessingState::expected_for(report, report.hash());
            state.extra_data_submitted = false;
            state.extra_data_items_submitted = 0;
            Ok(keccak256(b"main"))
        }

        async fn submit_extra_data_empty(&self, _submitter: MemberId) -> GatewayResult<TxHash> {
            self.extra_calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_extra {
                return Err(ProcessingError::UnexpectedExtraDataFormat {
                    expected: ExtraDataFormat::List,
                    actual: ExtraDataFormat::Empty,
                }
                .into());
            }
            self.state.write().extra_data_submitted = !self.drop_extra_flag;
            Ok(keccak256(b"empty"))
        }

        async fn submit_extra_data_list(
            &self,
            _submitter: MemberId,
            _payload: &[u8],
        ) -> GatewayResult<TxHash> {
            self.extra_calls.fetch_add(1, Ordering::SeqCst);
            let mut state = self.state.write();
            state.extra_data_submitted = true;
            state.extra_data_items_submitted = state.extra_data_items_count;
            Ok(keccak256(b"list"))
        }

        async fn processing_state(&self, _ref_slot: u64) -> GatewayResult<ProcessingState> {
            if self.fail_read {
                return Err(GatewayError::Unavailable {
                    call: "processing_state",
                    reason: "timeout".into(),
                });
            }
            Ok(self.state.read().clone())
        }
    }

    fn report(extra_data: ExtraData) -> ReportData {
        ReportData {
            consensus_version: 1,
            ref_slot: 1000,
            num_validators: 10,
            cl_balance_gwei: 320_000_000_000,
            staking_module_ids_with_newly_exited_validators: vec![],
            num_exited_validators_by_staking_module: vec![],
            withdrawal_vault_balance: 0,
            el_rewards_vault_balance: 0,
            shares_requested_to_burn: 0,
            withdrawal_finalization_batches: vec![],
            share_rate: U256::exp10(27),
            is_bunker_mode: false,
            extra_data,
        }
    }

    #[tokio::test]
    async fn test_commit_empty_extra_data() {
        let processor = Arc::new(MockProcessor::default());
        let committer = ReportCommitter::new(processor.clone());
        let report = report(ExtraData::empty());

        let receipt = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap();
        assert_eq!(receipt.extra_tx, keccak256(b"empty"));
        assert_eq!(processor.main_calls.load(Ordering::SeqCst), 1);
        assert_eq!(processor.extra_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commit_list_extra_data() {
        let processor = Arc::new(MockProcessor::default());
        let committer = ReportCommitter::new(processor.clone());
        let extra = ExtraData::from_items(vec![ExtraDataItem::exited(1, vec![0, 3], vec![2, 1])])
            .unwrap();
        let report = report(extra);

        let receipt = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap();
        assert_eq!(receipt.extra_tx, keccak256(b"list"));
    }

    #[tokio::test]
    async fn test_missing_extra_phase_fails_verification() {
        let processor = Arc::new(MockProcessor {
            drop_extra_flag: true,
            ..Default::default()
        });
        let committer = ReportCommitter::new(processor);
        let report = report(ExtraData::empty());

        let err = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap_err();
        match err {
            OracleError::CommitVerificationFailure {
                mismatches, cause, ..
            } => {
                assert!(cause.is_none());
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].field, ProcessingField::ExtraDataSubmitted);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejected_extra_phase_still_verifies() {
        let processor = Arc::new(MockProcessor {
            reject_extra: true,
            ..Default::default()
        });
        let committer = ReportCommitter::new(processor.clone());
        let report = report(ExtraData::empty());

        let err = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap_err();
        assert!(err.is_post_commit());
        match err {
            OracleError::CommitVerificationFailure {
                mismatches, cause, ..
            } => {
                assert!(matches!(cause, Some(GatewayError::Processing(_))));
                assert!(mismatches
                    .iter()
                    .any(|m| m.field == ProcessingField::ExtraDataSubmitted));
            }
            other => panic!("unexpected error {:?}", other),
        }
        // No retry of either phase
        assert_eq!(processor.main_calls.load(Ordering::SeqCst), 1);
        assert_eq!(processor.extra_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreadable_state_after_commit_is_post_commit() {
        let processor = Arc::new(MockProcessor {
            fail_read: true,
            ..Default::default()
        });
        let committer = ReportCommitter::new(processor.clone());
        let report = report(ExtraData::empty());

        let err = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap_err();
        assert!(err.is_post_commit());
        assert_eq!(err.step(), ReportStep::VerifyCommit);
        match err {
            OracleError::CommitVerificationFailure {
                mismatches, cause, ..
            } => {
                assert!(mismatches.is_empty());
                assert!(matches!(cause, Some(GatewayError::Unavailable { .. })));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(processor.extra_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_extra_phase_keeps_cause_when_state_unreadable() {
        let processor = Arc::new(MockProcessor {
            reject_extra: true,
            fail_read: true,
            ..Default::default()
        });
        let committer = ReportCommitter::new(processor);
        let report = report(ExtraData::empty());

        let err = committer
            .commit(&report, report.hash(), MemberId::from_index(0), 2)
            .await
            .unwrap_err();
        match err {
            OracleError::CommitVerificationFailure {
                mismatches, cause, ..
            } => {
                assert!(mismatches.is_empty());
                assert!(matches!(cause, Some(GatewayError::Processing(_))));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
