//! # Concurrency Tests
//!
//! Overlapping `report` calls on one oracle and a cycle waiting for the
//! next frame while the chain advances underneath it.

#[cfg(test)]
mod tests {
    use crate::integration::harness;
    use accounting_oracle::adapters::ProtocolSetup;
    use accounting_oracle::{AccountingOracleApi, OracleConfig, OracleError, ReportOverrides};
    use std::time::Duration;

    /// Test: Overlapping cycles for one frame commit exactly once
    #[tokio::test]
    async fn test_overlapping_cycles_commit_once() {
        let (protocol, oracle) = harness::oracle(
            ProtocolSetup::default(),
            OracleConfig {
                wait_for_next_frame: false,
                ..harness::config()
            },
        );
        let ref_slot = protocol.frame().ref_slot;

        let results = futures::future::join_all(
            (0..3).map(|_| oracle.report(ReportOverrides::default())),
        )
        .await;

        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1, "one cycle should commit");
        for result in results.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                result,
                Err(OracleError::StaleRefSlot { ref_slot: r, .. }) if *r == ref_slot
            ));
        }
        // The committing cycle's fast lane only
        assert_eq!(protocol.claim_calls(), 3);
    }

    /// Test: A waiting cycle picks up the frame that opens while it sleeps
    #[tokio::test]
    async fn test_waiting_cycle_reports_next_frame() {
        let (protocol, oracle) = harness::oracle(ProtocolSetup::default(), harness::config());
        let first = oracle.report(ReportOverrides::default()).await.unwrap();

        let advance = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            protocol.advance_frame();
        };
        let (second, ()) = tokio::join!(oracle.report(ReportOverrides::default()), advance);

        let second = second.unwrap();
        assert!(second.ref_slot > first.ref_slot);
        assert!(second.is_committed());
        assert_eq!(oracle.last_processed_ref_slot().await, Some(second.ref_slot));
    }
}
