//! Accounting Oracle Service - report cycle orchestration
//!
//! ```text
//! wait frame → snapshot → simulate → batches → finalize → consensus → commit → verify
//! ```
//!
//! Steps run strictly in order; only claim submission fans out. Any failure
//! aborts the cycle and is returned with its ref slot and step.

pub mod clock;
pub mod committer;
pub mod consensus;
pub mod finalization;
pub mod simulator;
pub mod snapshot;


pub use clock::ChainClock;
pub use committer::{CommitReceipt, ReportCommitter};
pub use consensus::{ConsensusCoordinator, ConsensusOutcome};
pub use finalization::FinalizationBatchCalculator;
pub use simulator::{ReportSimulator, SimulationOutcome};
pub use snapshot::ReportSnapshotBuilder;

use crate::domain::{BatchOutcome, Frame, ReportData, ReportOverrides, ReportValidationError};
use crate::error::{OracleError, OracleResult, ReportStep};
use crate::metrics;
use crate::ports::inbound::AccountingOracleApi;
use crate::ports::outbound::{
    AccountingSimulator, ChainReader, HashConsensusGateway, ProtocolReader,
    ReportProcessorGateway, WithdrawalQueueGateway,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{short_hex, Hash, MemberId};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, field, info, info_span, Instrument, Span};
use uuid::Uuid;

/// Accounting oracle configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleConfig {
    /// Page size of the batch search
    pub max_requests_per_call: u64,
    /// Upper bound on batch search pages per cycle
    pub max_batch_pages: usize,
    pub frame_poll_interval: Duration,
    pub max_frame_wait: Duration,
    /// Wait for a frame newer than the last processed one before reporting
    pub wait_for_next_frame: bool,
    /// Report processor contract version sent with the main data
    pub contract_version: u64,
    /// Submit member claims concurrently
    pub concurrent_submissions: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_requests_per_call: 1_000,
            max_batch_pages: 1_000,
            frame_poll_interval: Duration::from_secs(12),
            // One mainnet frame: 225 epochs * 32 slots * 12 s
            max_frame_wait: Duration::from_secs(86_400),
            wait_for_next_frame: true,
            contract_version: 2,
            concurrent_submissions: true,
        }
    }
}

impl OracleConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ORACLE_MAX_REQUESTS_PER_CALL`: Batch search page size (default: 1000)
    /// - `ORACLE_MAX_BATCH_PAGES`: Batch search page limit (default: 1000)
    /// - `ORACLE_FRAME_POLL_SECS`: Frame poll interval (default: 12)
    /// - `ORACLE_MAX_FRAME_WAIT_SECS`: Frame wait limit (default: 86400)
    /// - `ORACLE_WAIT_NEXT_FRAME`: Wait for a new frame (default: true)
    /// - `ORACLE_CONTRACT_VERSION`: Processor contract version (default: 2)
    /// - `ORACLE_CONCURRENT_SUBMISSIONS`: Fan out claims (default: true)
    ///
    /// Unparseable values, and a zero page size or page limit, fall back to
    /// the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_requests_per_call: parse_env("ORACLE_MAX_REQUESTS_PER_CALL")
                .filter(|&size: &u64| size > 0)
                .unwrap_or(defaults.max_requests_per_call),
            max_batch_pages: parse_env("ORACLE_MAX_BATCH_PAGES")
                .filter(|&pages: &usize| pages > 0)
                .unwrap_or(defaults.max_batch_pages),
            frame_poll_interval: parse_env("ORACLE_FRAME_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.frame_poll_interval),
            max_frame_wait: parse_env("ORACLE_MAX_FRAME_WAIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_frame_wait),
            wait_for_next_frame: flag_env("ORACLE_WAIT_NEXT_FRAME")
                .unwrap_or(defaults.wait_for_next_frame),
            contract_version: parse_env("ORACLE_CONTRACT_VERSION")
                .unwrap_or(defaults.contract_version),
            concurrent_submissions: flag_env("ORACLE_CONCURRENT_SUBMISSIONS")
                .unwrap_or(defaults.concurrent_submissions),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn flag_env(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        })
}

/// Dependencies for AccountingOracleService
pub struct OracleDependencies<C, P, S, Q, H, R> {
    pub chain: Arc<C>,
    pub protocol: Arc<P>,
    pub simulator: Arc<S>,
    pub withdrawal_queue: Arc<Q>,
    pub hash_consensus: Arc<H>,
    pub processor: Arc<R>,
    pub config: OracleConfig,
}

/// Result of one report cycle.
#[derive(Clone, Debug)]
pub struct ReportOutcome {
    pub cycle_id: Uuid,
    pub ref_slot: u64,
    /// Finished report, as hashed and committed
    pub report: ReportData,
    pub report_hash: Hash,
    pub simulation: SimulationOutcome,
    pub batch_outcome: BatchOutcome,
    /// Absent for dry runs
    pub consensus: Option<ConsensusOutcome>,
    /// Absent for dry runs
    pub commit: Option<CommitReceipt>,
}

impl ReportOutcome {
    pub fn submitter(&self) -> Option<MemberId> {
        self.consensus.as_ref().map(|c| c.submitter)
    }

    pub fn is_committed(&self) -> bool {
        self.commit.is_some()
    }
}

/// Accounting oracle service
pub struct AccountingOracleService<C, P, S, Q, H, R>
where
    C: ChainReader,
    P: ProtocolReader,
    S: AccountingSimulator,
    Q: WithdrawalQueueGateway,
    H: HashConsensusGateway,
    R: ReportProcessorGateway,
{
    config: OracleConfig,
    protocol: Arc<P>,
    clock: Arc<ChainClock<C>>,
    snapshot: ReportSnapshotBuilder<C, P>,
    simulator: ReportSimulator<S, P>,
    batches: FinalizationBatchCalculator<Q, P>,
    consensus: ConsensusCoordinator<H>,
    committer: ReportCommitter<R>,
    last_processed: RwLock<Option<u64>>,
    /// Held for the whole cycle so cycles never overlap
    cycle_lock: tokio::sync::Mutex<()>,
}

impl<C, P, S, Q, H, R> AccountingOracleService<C, P, S, Q, H, R>
where
    C: ChainReader,
    P: ProtocolReader,
    S: AccountingSimulator,
    Q: WithdrawalQueueGateway,
    H: HashConsensusGateway,
    R: ReportProcessorGateway,
{
    pub fn new(deps: OracleDependencies<C, P, S, Q, H, R>) -> Self {
        let config = deps.config;
        let clock = Arc::new(ChainClock::new(
            deps.chain,
            config.frame_poll_interval,
            config.max_frame_wait,
        ));

        Self {
            snapshot: ReportSnapshotBuilder::new(clock.clone(), deps.protocol.clone()),
            simulator: ReportSimulator::new(deps.simulator, deps.protocol.clone()),
            batches: FinalizationBatchCalculator::new(
                deps.withdrawal_queue,
                deps.protocol.clone(),
                config.max_requests_per_call,
                config.max_batch_pages,
            ),
            consensus: ConsensusCoordinator::new(
                deps.hash_consensus,
                config.concurrent_submissions,
            ),
            committer: ReportCommitter::new(deps.processor),
            protocol: deps.protocol,
            clock,
            last_processed: RwLock::new(None),
            cycle_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    /// Resume after a restart without re-reporting `ref_slot`.
    pub fn with_last_processed(self, ref_slot: u64) -> Self {
        *self.last_processed.write() = Some(ref_slot);
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    async fn run_cycle(
        &self,
        cycle_id: Uuid,
        overrides: &ReportOverrides,
        submit: bool,
    ) -> OracleResult<ReportOutcome> {
        let frame = self.open_frame(overrides, submit).await?;
        Span::current().record("ref_slot", frame.ref_slot);
        info!(
            ref_slot = frame.ref_slot,
            deadline_slot = frame.report_processing_deadline_slot,
            dry_run = !submit,
            "[oracle] Report cycle started"
        );

        let consensus_version = self.protocol.consensus_version().await.map_err(|e| {
            OracleError::transport(ReportStep::BuildSnapshot, Some(frame.ref_slot), e)
        })?;
        let mut report = self.snapshot.build(overrides, consensus_version).await?;
        let ref_slot = report.ref_slot;

        let schedule = self.clock.frame_schedule().await?;
        let simulation = self.simulator.simulate(&report, &schedule).await?;
        let share_rate = overrides.share_rate.unwrap_or(simulation.share_rate);
        let is_bunker_mode = overrides
            .is_bunker_mode
            .unwrap_or(simulation.is_bunker_mode);

        let batch_outcome = if let Some(batches) = &overrides.withdrawal_finalization_batches {
            BatchOutcome::Provided(batches.clone())
        } else if overrides.skip_withdrawals {
            BatchOutcome::Skipped
        } else {
            let budget = self.batches.budget(ref_slot, &simulation.totals).await?;
            let now = self.clock.current_time().await?;
            self.batches
                .calculate(ref_slot, share_rate, budget, now)
                .await?
        };

        report.finalize(share_rate, is_bunker_mode, batch_outcome.batches());
        report
            .validate()
            .map_err(|source| OracleError::InvalidReport {
                ref_slot,
                step: ReportStep::FinalizeReport,
                source,
            })?;
        if submit && ref_slot != frame.ref_slot {
            return Err(OracleError::InvalidReport {
                ref_slot,
                step: ReportStep::FinalizeReport,
                source: ReportValidationError::RefSlotMismatch {
                    ref_slot,
                    frame_ref_slot: frame.ref_slot,
                },
            });
        }
        let report_hash = report.hash();
        info!(
            ref_slot,
            hash = %short_hex(&report_hash),
            validators = report.num_validators,
            batches = report.withdrawal_finalization_batches.len(),
            bunker = report.is_bunker_mode,
            "[oracle] Report finalized"
        );

        let mut outcome = ReportOutcome {
            cycle_id,
            ref_slot,
            report,
            report_hash,
            simulation,
            batch_outcome,
            consensus: None,
            commit: None,
        };
        if !submit {
            return Ok(outcome);
        }

        let consensus = self
            .consensus
            .reach_consensus(ref_slot, report_hash, consensus_version)
            .await?;
        let commit = self
            .committer
            .commit(
                &outcome.report,
                report_hash,
                consensus.submitter,
                self.config.contract_version,
            )
            .await?;

        *self.last_processed.write() = Some(ref_slot);
        outcome.consensus = Some(consensus);
        outcome.commit = Some(commit);
        Ok(outcome)
    }

    /// Frame the cycle reports on.
    async fn open_frame(&self, overrides: &ReportOverrides, submit: bool) -> OracleResult<Frame> {
        let last = *self.last_processed.read();

        if !submit || overrides.ref_slot.is_some() {
            return self.clock.current_frame().await;
        }
        if self.config.wait_for_next_frame {
            return self.clock.wait_for_next_frame(last).await;
        }

        let frame = self.clock.current_frame().await?;
        match last {
            Some(last_processed) if frame.ref_slot <= last_processed => {
                Err(OracleError::StaleRefSlot {
                    ref_slot: frame.ref_slot,
                    last_processed,
                })
            }
            _ => Ok(frame),
        }
    }
}

#[async_trait]
impl<C, P, S, Q, H, R> AccountingOracleApi for AccountingOracleService<C, P, S, Q, H, R>
where
    C: ChainReader,
    P: ProtocolReader,
    S: AccountingSimulator,
    Q: WithdrawalQueueGateway,
    H: HashConsensusGateway,
    R: ReportProcessorGateway,
{
    async fn report(&self, overrides: ReportOverrides) -> OracleResult<ReportOutcome> {
        let _guard = self.cycle_lock.lock().await;
        let cycle_id = Uuid::new_v4();
        let submit = !overrides.dry_run;
        let span = info_span!("report_cycle", %cycle_id, ref_slot = field::Empty);

        metrics::record_cycle_started();
        let result = self
            .run_cycle(cycle_id, &overrides, submit)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(outcome) if outcome.is_committed() => {
                metrics::record_cycle_succeeded(
                    outcome.ref_slot,
                    outcome.report.withdrawal_finalization_batches.len(),
                );
                info!(
                    ref_slot = outcome.ref_slot,
                    submitter = ?outcome.submitter(),
                    "[oracle] Report cycle committed"
                );
            }
            Ok(outcome) => {
                info!(ref_slot = outcome.ref_slot, "[oracle] Dry run finished");
            }
            Err(e) => {
                metrics::record_cycle_failed(e.step().as_str());
                error!(
                    ref_slot = ?e.ref_slot(),
                    step = %e.step(),
                    post_commit = e.is_post_commit(),
                    error = %e,
                    "[oracle] Report cycle failed"
                );
            }
        });
        result
    }

    async fn dry_run(&self, overrides: ReportOverrides) -> OracleResult<(ReportData, Hash)> {
        let outcome = self
            .report(ReportOverrides {
                dry_run: true,
                ..overrides
            })
            .await?;
        Ok((outcome.report, outcome.report_hash))
    }

    async fn last_processed_ref_slot(&self) -> Option<u64> {
        *self.last_processed.read()
    }
}
