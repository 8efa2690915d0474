//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The engine owns none of the shared state it reports on. The committee's
//! claim ledger and the processing state belong to the external protocol; these
//! traits are the only way the engine issues requests and reads results.
//! None of them retry: every call succeeds or returns a [`GatewayError`].
//!
//! [`GatewayError`]: crate::error::GatewayError

use crate::domain::{
    ClaimReceipt, ConsensusClaim, ConsensusReport, FinalizationBatchState, Frame, FrameSchedule,
    ProcessingState, ReportData, SimulatedTotals, SimulationParams,
};
use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_types::{Gwei, MemberId, TxHash, Wei, U256};

/// Chain time and frame reads
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current block timestamp
    async fn current_time(&self) -> GatewayResult<u64>;

    /// Frame currently open for reporting
    async fn current_frame(&self) -> GatewayResult<Frame>;

    /// Chain and frame constants
    async fn frame_schedule(&self) -> GatewayResult<FrameSchedule>;
}

/// Validator count and balance as last reported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconStat {
    pub validators: u64,
    pub balance_gwei: Gwei,
}

/// Current vault balances
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBalances {
    pub withdrawal_vault: Wei,
    pub el_rewards_vault: Wei,
}

/// Withdrawal queue limits published by the protocol
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalLimits {
    /// Requests younger than this (seconds) are never finalized
    pub request_timestamp_margin: u64,
    /// Capacity of the batch boundary array
    pub max_batches: usize,
}

impl Default for WithdrawalLimits {
    fn default() -> Self {
        Self {
            request_timestamp_margin: 7_680,
            max_batches: 36,
        }
    }
}

/// Live protocol reads
#[async_trait]
pub trait ProtocolReader: Send + Sync {
    async fn beacon_stat(&self) -> GatewayResult<BeaconStat>;

    async fn vault_balances(&self) -> GatewayResult<VaultBalances>;

    async fn shares_requested_to_burn(&self) -> GatewayResult<u128>;

    /// Total value currently recorded by the protocol
    async fn total_pooled_ether(&self) -> GatewayResult<Wei>;

    /// Deposit buffer not yet sent to validators
    async fn buffered_ether(&self) -> GatewayResult<Wei>;

    /// Value locked in unfinalized withdrawal requests
    async fn unfinalized_queue_value(&self) -> GatewayResult<Wei>;

    async fn withdrawal_limits(&self) -> GatewayResult<WithdrawalLimits>;

    /// Consensus version the committee expects
    async fn consensus_version(&self) -> GatewayResult<u64>;
}

/// Accounting preview
#[async_trait]
pub trait AccountingSimulator: Send + Sync {
    /// Preview post-report totals. Must not mutate protocol state.
    async fn simulate(&self, params: &SimulationParams) -> GatewayResult<SimulatedTotals>;
}

/// Paginated withdrawal batch search
#[async_trait]
pub trait WithdrawalQueueGateway: Send + Sync {
    /// Advance the search by at most `max_requests` requests.
    ///
    /// Requests created after `max_timestamp` are never eligible.
    async fn next_batch_page(
        &self,
        share_rate: U256,
        max_timestamp: u64,
        max_requests: u64,
        state: FinalizationBatchState,
    ) -> GatewayResult<FinalizationBatchState>;
}

/// Committee membership and claim ledger
#[async_trait]
pub trait HashConsensusGateway: Send + Sync {
    /// Members expected to submit promptly this frame, in committee order
    async fn fast_lane_members(&self) -> GatewayResult<Vec<MemberId>>;

    async fn quorum(&self) -> GatewayResult<usize>;

    /// Submit a claim under the claim's member identity. Idempotent.
    async fn submit_claim(&self, claim: ConsensusClaim) -> GatewayResult<ClaimReceipt>;

    /// Ledger view for `ref_slot`
    async fn consensus_state(&self, ref_slot: u64) -> GatewayResult<ConsensusReport>;
}

/// Two-phase report commit and processing state
#[async_trait]
pub trait ReportProcessorGateway: Send + Sync {
    /// Phase one: the irreversible main data transition
    async fn submit_main_data(
        &self,
        submitter: MemberId,
        report: &ReportData,
        contract_version: u64,
    ) -> GatewayResult<TxHash>;

    /// Phase two for `format = none`
    async fn submit_extra_data_empty(&self, submitter: MemberId) -> GatewayResult<TxHash>;

    /// Phase two for `format = list`
    async fn submit_extra_data_list(
        &self,
        submitter: MemberId,
        payload: &[u8],
    ) -> GatewayResult<TxHash>;

    async fn processing_state(&self, ref_slot: u64) -> GatewayResult<ProcessingState>;
}
