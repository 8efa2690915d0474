//! Cross-crate report cycle scenarios.

pub mod concurrency;
pub mod e2e_report_cycle;

#[cfg(test)]
pub(crate) mod harness {
    use accounting_oracle::adapters::{InMemoryProtocol, ProtocolSetup};
    use accounting_oracle::{AccountingOracleService, OracleConfig, OracleDependencies};
    use std::sync::Arc;
    use std::time::Duration;

    pub type Oracle = AccountingOracleService<
        InMemoryProtocol,
        InMemoryProtocol,
        InMemoryProtocol,
        InMemoryProtocol,
        InMemoryProtocol,
        InMemoryProtocol,
    >;

    pub fn config() -> OracleConfig {
        OracleConfig {
            max_frame_wait: Duration::from_secs(60),
            frame_poll_interval: Duration::from_millis(10),
            ..OracleConfig::default()
        }
    }

    /// One in-memory protocol wired into every port of a new oracle.
    pub fn oracle(setup: ProtocolSetup, config: OracleConfig) -> (Arc<InMemoryProtocol>, Oracle) {
        let protocol = Arc::new(InMemoryProtocol::new(setup).unwrap());
        let oracle = AccountingOracleService::new(OracleDependencies {
            chain: protocol.clone(),
            protocol: protocol.clone(),
            simulator: protocol.clone(),
            withdrawal_queue: protocol.clone(),
            hash_consensus: protocol.clone(),
            processor: protocol.clone(),
            config,
        });
        (protocol, oracle)
    }
}
