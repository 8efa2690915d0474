//! ConsensusCoordinator: quorum submission across the fast lane
//!
//! ```text
//! fast lane [m0, m1, m2] ──submit_claim──→ ledger
//!                 │
//!                 └── submitter = lowest index that succeeded
//!
//! ledger.consensus_state(ref_slot).report_hash == report_hash ?
//! ```

use crate::domain::{ClaimReceipt, ConsensusClaim, ConsensusReport};
use crate::error::{GatewayResult, OracleError, OracleResult, ReportStep};
use crate::metrics;
use crate::ports::outbound::HashConsensusGateway;
use futures::future::join_all;
use shared_types::{short_hex, Hash, MemberId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful consensus round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusOutcome {
    /// Member that performs the commit
    pub submitter: MemberId,
    /// Members whose claims were newly recorded
    pub submitted: Vec<MemberId>,
    /// Members whose identical claim was already held
    pub duplicates: Vec<MemberId>,
    /// Members whose submission failed, with the reason
    pub failed: Vec<(MemberId, String)>,
    pub quorum: usize,
    /// Ledger view after all submissions
    pub report: ConsensusReport,
}

/// Drives claim submission and confirms the ledger agrees.
pub struct ConsensusCoordinator<H: HashConsensusGateway> {
    gateway: Arc<H>,
    concurrent: bool,
}

impl<H: HashConsensusGateway> ConsensusCoordinator<H> {
    /// `concurrent` fans claims out at once; otherwise members submit in order.
    pub fn new(gateway: Arc<H>, concurrent: bool) -> Self {
        Self {
            gateway,
            concurrent,
        }
    }

    /// Submit the claim for every fast-lane member and check the agreed hash.
    pub async fn reach_consensus(
        &self,
        ref_slot: u64,
        report_hash: Hash,
        consensus_version: u64,
    ) -> OracleResult<ConsensusOutcome> {
        let step = ReportStep::ReachConsensus;
        let members = self
            .gateway
            .fast_lane_members()
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;
        let quorum = self
            .gateway
            .quorum()
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;

        let claims: Vec<ConsensusClaim> = members
            .iter()
            .map(|member| ConsensusClaim {
                member: *member,
                ref_slot,
                report_hash,
                consensus_version,
            })
            .collect();

        let results = self.submit_all(claims).await;

        let mut submitted = Vec::new();
        let mut duplicates = Vec::new();
        let mut failed = Vec::new();
        let mut submitter = None;

        // Results are in committee order, so the first success is the lowest index.
        for (member, result) in members.iter().zip(results) {
            match result {
                Ok(receipt) => {
                    submitter.get_or_insert(*member);
                    match receipt {
                        ClaimReceipt::Recorded => {
                            metrics::record_claim("recorded");
                            submitted.push(*member);
                        }
                        ClaimReceipt::Duplicate => {
                            metrics::record_claim("duplicate");
                            duplicates.push(*member);
                        }
                    }
                    debug!(ref_slot, member = %member, ?receipt, "[oracle] Claim accepted");
                }
                Err(e) => {
                    metrics::record_claim("failed");
                    warn!(ref_slot, member = %member, error = %e, "[oracle] Claim submission failed");
                    failed.push((*member, e.to_string()));
                }
            }
        }

        let submitter = submitter.ok_or(OracleError::NoSubmitter {
            ref_slot,
            failed: failed.len(),
        })?;

        let report = self
            .gateway
            .consensus_state(ref_slot)
            .await
            .map_err(|e| OracleError::transport(step, Some(ref_slot), e))?;

        if report.report_hash != Some(report_hash) {
            return Err(OracleError::ConsensusMismatch {
                ref_slot,
                expected: short_hex(&report_hash),
                actual: report
                    .report_hash
                    .map(|h| short_hex(&h))
                    .unwrap_or_else(|| "no agreed hash".to_string()),
            });
        }

        info!(
            ref_slot,
            hash = %short_hex(&report_hash),
            submitter = %submitter,
            support = report.support,
            quorum,
            "[oracle] Consensus reached"
        );

        Ok(ConsensusOutcome {
            submitter,
            submitted,
            duplicates,
            failed,
            quorum,
            report,
        })
    }

    async fn submit_all(&self, claims: Vec<ConsensusClaim>) -> Vec<GatewayResult<ClaimReceipt>> {
        if self.concurrent {
            let gateway = &self.gateway;
            return join_all(claims.into_iter().map(|claim| gateway.submit_claim(claim))).await;
        }

        let mut results = Vec::with_capacity(claims.len());
        for claim in claims {
            results.push(self.gateway.submit_claim(claim).await);
        }
        results
    }
}
