//! Driving Ports (API - Inbound)

use crate::domain::{ReportData, ReportOverrides};
use crate::error::OracleResult;
use crate::service::ReportOutcome;
use async_trait::async_trait;
use shared_types::Hash;

/// Primary accounting oracle API
///
/// One call runs one complete report cycle: wait for the next frame, build the
/// snapshot, simulate, compute batches, finalize, reach consensus, commit and
/// verify. Cycles never overlap.
#[async_trait]
pub trait AccountingOracleApi: Send + Sync {
    /// Run a report cycle
    async fn report(&self, overrides: ReportOverrides) -> OracleResult<ReportOutcome>;

    /// Build the finished report without submitting anything
    async fn dry_run(&self, overrides: ReportOverrides) -> OracleResult<(ReportData, Hash)>;

    /// Ref slot of the last committed and verified report
    async fn last_processed_ref_slot(&self) -> Option<u64>;
}
