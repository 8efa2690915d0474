//! In-memory protocol collaborator
//!
//! Implements every outbound port against a single shared state: chain
//! clock, beacon and vault readings, an accounting preview, a withdrawal
//! queue with paginated batch search, the committee claim ledger and the
//! report processor. Used by the service tests and the end-to-end suite.
//!
//! Fault hooks let tests break one collaborator at a time.

use crate::domain::{
    decode_items, share_rate_precision, ClaimLedger, ClaimReceipt, ConsensusClaim,
    ConsensusReport, ExtraDataFormat, FinalizationBatchState, Frame, FrameSchedule,
    ProcessingError, ProcessingState, ReportData, SimulatedTotals, SimulationParams,
};
use crate::error::{GatewayError, GatewayResult};
use crate::ports::outbound::{
    AccountingSimulator, BeaconStat, ChainReader, HashConsensusGateway, ProtocolReader,
    ReportProcessorGateway, VaultBalances, WithdrawalLimits, WithdrawalQueueGateway,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{
    gwei_to_wei, keccak256, Hash, MemberId, TxHash, Wei, U256, WEI_PER_ETHER, ZERO_HASH,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Deposit per validator.
const DEPOSIT_SIZE: Wei = 32 * WEI_PER_ETHER;

/// Initial protocol state.
#[derive(Clone, Debug)]
pub struct ProtocolSetup {
    pub schedule: FrameSchedule,
    /// Ref slot of the frame open at start
    pub ref_slot: u64,
    pub committee_size: u8,
    /// Leading committee members in the fast lane
    pub fast_lane: usize,
    pub quorum: usize,
    pub consensus_version: u64,
    pub contract_version: u64,
    pub beacon: BeaconStat,
    /// Validators deposited but possibly not yet visible on the beacon chain
    pub deposited_validators: u64,
    pub buffered_ether: Wei,
    pub total_shares: u128,
    pub limits: WithdrawalLimits,
}

impl Default for ProtocolSetup {
    fn default() -> Self {
        let schedule = FrameSchedule::default();
        Self {
            ref_slot: schedule.slots_per_frame() - 1,
            schedule,
            committee_size: 5,
            fast_lane: 3,
            quorum: 3,
            consensus_version: 1,
            contract_version: 2,
            beacon: BeaconStat::default(),
            deposited_validators: 0,
            buffered_ether: DEPOSIT_SIZE,
            total_shares: DEPOSIT_SIZE,
            limits: WithdrawalLimits::default(),
        }
    }
}

/// A queued withdrawal request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: u64,
    pub amount_of_ether: Wei,
    pub shares: u128,
    pub timestamp: u64,
}

#[derive(Default)]
struct Faults {
    simulation: Option<String>,
    members: HashSet<MemberId>,
    corrupt_extra_data_hash: bool,
}

struct ProtocolState {
    schedule: FrameSchedule,
    frame: Frame,
    now: u64,
    consensus_version: u64,
    contract_version: u64,
    beacon: BeaconStat,
    deposited_validators: u64,
    vaults: VaultBalances,
    buffered_ether: Wei,
    total_shares: u128,
    shares_requested_to_burn: u128,
    requests: Vec<WithdrawalRequest>,
    last_finalized_request: u64,
    limits: WithdrawalLimits,
    fast_lane: Vec<MemberId>,
    ledger: ClaimLedger,
    processing: BTreeMap<u64, ProcessingState>,
    faults: Faults,
}

impl ProtocolState {
    fn total_pooled_ether(&self) -> Wei {
        let transient = Wei::from(
            self.deposited_validators
                .saturating_sub(self.beacon.validators),
        ) * DEPOSIT_SIZE;
        self.buffered_ether
            .saturating_add(gwei_to_wei(self.beacon.balance_gwei))
            .saturating_add(transient)
    }

    fn unfinalized_queue_value(&self) -> Wei {
        self.requests
            .iter()
            .filter(|r| r.id > self.last_finalized_request)
            .map(|r| r.amount_of_ether)
            .sum()
    }

    fn current_processing(&self) -> ProcessingState {
        self.processing
            .get(&self.frame.ref_slot)
            .cloned()
            .unwrap_or_else(|| {
                ProcessingState::for_frame(
                    self.frame.ref_slot,
                    self.frame.report_processing_deadline_slot,
                )
            })
    }

    fn ensure_member(&self, member: MemberId) -> GatewayResult<()> {
        if self.ledger.is_member(&member) {
            Ok(())
        } else {
            Err(ProcessingError::SenderNotAllowed(member).into())
        }
    }

    fn move_to(&mut self, now: u64) {
        self.now = now;
        if self.schedule.slots_per_frame() == 0 {
            return;
        }
        loop {
            let next = self.schedule.next_ref_slot(self.frame.ref_slot);
            if self.now < self.schedule.frame_start_time(next) {
                break;
            }
            self.frame = Frame::new(next, &self.schedule);
        }
    }

    /// Ether a request locks at `share_rate`, and whether it is discounted.
    fn request_cost(request: &WithdrawalRequest, share_rate: U256) -> (Wei, bool) {
        let request_rate = U256::from(request.amount_of_ether) * share_rate_precision()
            / U256::from(request.shares);
        if request_rate > share_rate {
            let discounted = U256::from(request.shares) * share_rate / share_rate_precision();
            (discounted.low_u128(), true)
        } else {
            (request.amount_of_ether, false)
        }
    }

    fn apply_report(&mut self, report: &ReportData) {
        self.beacon = BeaconStat {
            validators: report.num_validators,
            balance_gwei: report.cl_balance_gwei,
        };
        self.deposited_validators = self.deposited_validators.max(report.num_validators);

        let withdrawals = report
            .withdrawal_vault_balance
            .min(self.vaults.withdrawal_vault);
        let el_rewards = report
            .el_rewards_vault_balance
            .min(self.vaults.el_rewards_vault);
        self.vaults.withdrawal_vault -= withdrawals;
        self.vaults.el_rewards_vault -= el_rewards;
        self.buffered_ether = self
            .buffered_ether
            .saturating_add(withdrawals)
            .saturating_add(el_rewards);

        let burnt = report
            .shares_requested_to_burn
            .min(self.shares_requested_to_burn);
        self.shares_requested_to_burn -= burnt;
        self.total_shares = self.total_shares.saturating_sub(burnt);

        if let Some(last) = report.withdrawal_finalization_batches.last() {
            let locked: Wei = self
                .requests
                .iter()
                .filter(|r| r.id > self.last_finalized_request && r.id <= *last)
                .map(|r| Self::request_cost(r, report.share_rate).0)
                .sum();
            self.buffered_ether = self.buffered_ether.saturating_sub(locked);
            self.last_finalized_request = *last;
        }
    }
}

/// In-memory implementation of every outbound port.
pub struct InMemoryProtocol {
    state: RwLock<ProtocolState>,
    simulations: AtomicUsize,
    page_calls: AtomicUsize,
    claim_calls: AtomicUsize,
}

impl InMemoryProtocol {
    /// Create a protocol; fails when the committee quorum is invalid.
    pub fn new(setup: ProtocolSetup) -> GatewayResult<Self> {
        let members: Vec<MemberId> = (0..setup.committee_size).map(MemberId::from_index).collect();
        let fast_lane = members
            .iter()
            .take(setup.fast_lane)
            .copied()
            .collect::<Vec<_>>();
        let ledger = ClaimLedger::new(members, setup.quorum, setup.consensus_version)?;
        let frame = Frame::new(setup.ref_slot, &setup.schedule);

        Ok(Self {
            state: RwLock::new(ProtocolState {
                now: setup.schedule.frame_start_time(setup.ref_slot),
                schedule: setup.schedule,
                frame,
                consensus_version: setup.consensus_version,
                contract_version: setup.contract_version,
                beacon: setup.beacon,
                deposited_validators: setup.deposited_validators,
                vaults: VaultBalances::default(),
                buffered_ether: setup.buffered_ether,
                total_shares: setup.total_shares,
                shares_requested_to_burn: 0,
                requests: Vec::new(),
                last_finalized_request: 0,
                limits: setup.limits,
                fast_lane,
                ledger,
                processing: BTreeMap::new(),
                faults: Faults::default(),
            }),
            simulations: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            claim_calls: AtomicUsize::new(0),
        })
    }

    // === Chain ===

    /// Open the frame anchored at `ref_slot` and move the clock to its start.
    pub fn open_frame(&self, ref_slot: u64) {
        let mut state = self.state.write();
        state.frame = Frame::new(ref_slot, &state.schedule);
        state.now = state.schedule.frame_start_time(ref_slot);
    }

    /// Move the clock forward, opening any frames passed on the way.
    pub fn advance_time(&self, seconds: u64) {
        let mut state = self.state.write();
        let now = state.now.saturating_add(seconds);
        state.move_to(now);
    }

    /// Jump to the start of the next frame.
    pub fn advance_frame(&self) {
        let mut state = self.state.write();
        let next = state.schedule.next_ref_slot(state.frame.ref_slot);
        let start = state.schedule.frame_start_time(next);
        state.move_to(start);
    }

    pub fn frame(&self) -> Frame {
        self.state.read().frame
    }

    pub fn now(&self) -> u64 {
        self.state.read().now
    }

    // === Protocol readings ===

    pub fn set_beacon(&self, validators: u64, balance_gwei: u64) {
        self.state.write().beacon = BeaconStat {
            validators,
            balance_gwei,
        };
    }

    pub fn set_deposited_validators(&self, deposited: u64) {
        self.state.write().deposited_validators = deposited;
    }

    pub fn set_vaults(&self, withdrawal_vault: Wei, el_rewards_vault: Wei) {
        self.state.write().vaults = VaultBalances {
            withdrawal_vault,
            el_rewards_vault,
        };
    }

    pub fn set_buffered_ether(&self, amount: Wei) {
        self.state.write().buffered_ether = amount;
    }

    pub fn request_burn(&self, shares: u128) {
        self.state.write().shares_requested_to_burn += shares;
    }

    /// Queue a withdrawal request at the current time; returns its id.
    pub fn enqueue_withdrawal(&self, amount_of_ether: Wei, shares: u128) -> u64 {
        let mut state = self.state.write();
        let id = state.requests.last().map(|r| r.id).unwrap_or(0) + 1;
        let timestamp = state.now;
        state.requests.push(WithdrawalRequest {
            id,
            amount_of_ether,
            shares: shares.max(1),
            timestamp,
        });
        id
    }

    pub fn last_finalized_request(&self) -> u64 {
        self.state.read().last_finalized_request
    }

    pub fn fast_lane(&self) -> Vec<MemberId> {
        self.state.read().fast_lane.clone()
    }

    // === Fault injection ===

    /// Make every simulation call fail with `reason`.
    pub fn fail_simulation(&self, reason: &str) {
        self.state.write().faults.simulation = Some(reason.to_string());
    }

    /// Make claim submissions by `member` fail.
    pub fn fail_member(&self, member: MemberId) {
        self.state.write().faults.members.insert(member);
    }

    /// Store a wrong extra data hash when main data is processed.
    pub fn corrupt_extra_data_hash(&self) {
        self.state.write().faults.corrupt_extra_data_hash = true;
    }

    /// Record a claim directly, bypassing the fault hooks.
    pub fn submit_external_claim(&self, claim: ConsensusClaim) -> GatewayResult<ClaimReceipt> {
        Ok(self.state.write().ledger.submit(claim)?)
    }

    // === Call counters ===

    pub fn simulation_calls(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }
}

fn tx_hash(payload_hash: &Hash, tag: &[u8]) -> TxHash {
    let mut data = payload_hash.to_vec();
    data.extend_from_slice(tag);
    keccak256(&data)
}

#[async_trait]
impl ChainReader for InMemoryProtocol {
    async fn current_time(&self) -> GatewayResult<u64> {
        Ok(self.state.read().now)
    }

    async fn current_frame(&self) -> GatewayResult<Frame> {
        Ok(self.state.read().frame)
    }

    async fn frame_schedule(&self) -> GatewayResult<FrameSchedule> {
        Ok(self.state.read().schedule)
    }
}

#[async_trait]
impl ProtocolReader for InMemoryProtocol {
    async fn beacon_stat(&self) -> GatewayResult<BeaconStat> {
        Ok(self.state.read().beacon)
    }

    async fn vault_balances(&self) -> GatewayResult<VaultBalances> {
        Ok(self.state.read().vaults)
    }

    async fn shares_requested_to_burn(&self) -> GatewayResult<u128> {
        Ok(self.state.read().shares_requested_to_burn)
    }

    async fn total_pooled_ether(&self) -> GatewayResult<Wei> {
        Ok(self.state.read().total_pooled_ether())
    }

    async fn buffered_ether(&self) -> GatewayResult<Wei> {
        Ok(self.state.read().buffered_ether)
    }

    async fn unfinalized_queue_value(&self) -> GatewayResult<Wei> {
        Ok(self.state.read().unfinalized_queue_value())
    }

    async fn withdrawal_limits(&self) -> GatewayResult<WithdrawalLimits> {
        Ok(self.state.read().limits)
    }

    async fn consensus_version(&self) -> GatewayResult<u64> {
        Ok(self.state.read().consensus_version)
    }
}

#[async_trait]
impl AccountingSimulator for InMemoryProtocol {
    async fn simulate(&self, params: &SimulationParams) -> GatewayResult<SimulatedTotals> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        if let Some(reason) = &state.faults.simulation {
            return Err(GatewayError::Unavailable {
                call: "simulate",
                reason: reason.clone(),
            });
        }

        let withdrawals = params
            .withdrawal_vault_balance
            .min(state.vaults.withdrawal_vault);
        let el_rewards = params
            .el_rewards_vault_balance
            .min(state.vaults.el_rewards_vault);
        let transient = Wei::from(
            state
                .deposited_validators
                .saturating_sub(params.cl_validators),
        ) * DEPOSIT_SIZE;

        let post_total_pooled_ether = state
            .buffered_ether
            .saturating_add(gwei_to_wei(params.cl_balance_gwei))
            .saturating_add(transient)
            .saturating_add(withdrawals)
            .saturating_add(el_rewards);
        let burnt = params
            .shares_requested_to_burn
            .min(state.shares_requested_to_burn);

        Ok(SimulatedTotals {
            post_total_pooled_ether,
            post_total_shares: state.total_shares.saturating_sub(burnt),
            withdrawals,
            el_rewards,
        })
    }
}

#[async_trait]
impl WithdrawalQueueGateway for InMemoryProtocol {
    async fn next_batch_page(
        &self,
        share_rate: U256,
        max_timestamp: u64,
        max_requests: u64,
        mut batch_state: FinalizationBatchState,
    ) -> GatewayResult<FinalizationBatchState> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();

        if batch_state.finished {
            return Err(GatewayError::Rejected {
                call: "next_batch_page",
                reason: "batch search already finished".into(),
            });
        }
        if batch_state.capacity() != state.limits.max_batches
            || batch_state.batches_length > batch_state.capacity()
        {
            return Err(GatewayError::Rejected {
                call: "next_batch_page",
                reason: "invalid batch state".into(),
            });
        }

        let mut length = batch_state.batches_length;
        let start = if length == 0 {
            state.last_finalized_request
        } else {
            batch_state.batches[length - 1]
        };
        let mut previous_discounted = state
            .requests
            .iter()
            .find(|r| length > 0 && r.id == start)
            .map(|r| ProtocolState::request_cost(r, share_rate).1);

        let mut processed = 0u64;
        for request in state.requests.iter().filter(|r| r.id > start) {
            if processed == max_requests {
                batch_state.batches_length = length;
                return Ok(batch_state);
            }
            if request.timestamp > max_timestamp {
                break;
            }
            let (cost, discounted) = ProtocolState::request_cost(request, share_rate);
            if cost > batch_state.remaining_budget {
                break;
            }
            if previous_discounted != Some(discounted) {
                if length == batch_state.capacity() {
                    break;
                }
                length += 1;
            }
            batch_state.batches[length - 1] = request.id;
            batch_state.remaining_budget -= cost;
            previous_discounted = Some(discounted);
            processed += 1;
        }

        batch_state.batches_length = length;
        batch_state.finished = true;
        Ok(batch_state)
    }
}

#[async_trait]
impl HashConsensusGateway for InMemoryProtocol {
    async fn fast_lane_members(&self) -> GatewayResult<Vec<MemberId>> {
        Ok(self.state.read().fast_lane.clone())
    }

    async fn quorum(&self) -> GatewayResult<usize> {
        Ok(self.state.read().ledger.quorum())
    }

    async fn submit_claim(&self, claim: ConsensusClaim) -> GatewayResult<ClaimReceipt> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write();
        if state.faults.members.contains(&claim.member) {
            return Err(GatewayError::Unavailable {
                call: "submit_claim",
                reason: format!("member {} unreachable", claim.member),
            });
        }
        let receipt = state.ledger.submit(claim)?;
        debug!(member = %claim.member, ref_slot = claim.ref_slot, ?receipt, "In-memory claim");
        Ok(receipt)
    }

    async fn consensus_state(&self, ref_slot: u64) -> GatewayResult<ConsensusReport> {
        Ok(self.state.read().ledger.report(ref_slot))
    }
}

#[async_trait]
impl ReportProcessorGateway for InMemoryProtocol {
    async fn submit_main_data(
        &self,
        submitter: MemberId,
        report: &ReportData,
        contract_version: u64,
    ) -> GatewayResult<TxHash> {
        let mut state = self.state.write();
        state.ensure_member(submitter)?;

        if contract_version != state.contract_version {
            return Err(ProcessingError::UnexpectedContractVersion {
                expected: state.contract_version,
                actual: contract_version,
            }
            .into());
        }
        if report.consensus_version != state.consensus_version {
            return Err(ProcessingError::UnexpectedConsensusVersion {
                expected: state.consensus_version,
                actual: report.consensus_version,
            }
            .into());
        }
        if report.ref_slot != state.frame.ref_slot {
            return Err(ProcessingError::UnexpectedRefSlot {
                expected: state.frame.ref_slot,
                actual: report.ref_slot,
            }
            .into());
        }

        let report_hash = report.hash();
        match state.ledger.report(report.ref_slot).report_hash {
            None => return Err(ProcessingError::NoConsensusReport(report.ref_slot).into()),
            Some(agreed) if agreed != report_hash => {
                return Err(ProcessingError::UnexpectedDataHash.into())
            }
            Some(_) => {}
        }

        let current = state.current_processing();
        if current.main_data_submitted {
            if current.main_data_hash == report_hash {
                return Ok(tx_hash(&report_hash, b"main"));
            }
            return Err(ProcessingError::ConflictingMainData.into());
        }

        let extra = &report.extra_data;
        let descriptor_valid = match extra.format {
            ExtraDataFormat::Empty => extra.hash == ZERO_HASH && extra.items_count == 0,
            ExtraDataFormat::List => extra.hash != ZERO_HASH && extra.items_count > 0,
        };
        if !descriptor_valid {
            return Err(ProcessingError::InvalidExtraDataDescriptor.into());
        }

        let mut extra_data_hash = extra.hash;
        if state.faults.corrupt_extra_data_hash {
            extra_data_hash[0] ^= 0xff;
        }

        state.apply_report(report);
        let processing = ProcessingState {
            main_data_hash: report_hash,
            main_data_submitted: true,
            extra_data_hash,
            extra_data_format: extra.format,
            extra_data_submitted: false,
            extra_data_items_count: extra.items_count,
            extra_data_items_submitted: 0,
            ..current
        };
        state.processing.insert(report.ref_slot, processing);
        Ok(tx_hash(&report_hash, b"main"))
    }

    async fn submit_extra_data_empty(&self, submitter: MemberId) -> GatewayResult<TxHash> {
        let mut state = self.state.write();
        state.ensure_member(submitter)?;

        let mut processing = state.current_processing();
        if !processing.main_data_submitted {
            return Err(ProcessingError::MainDataNotSubmitted.into());
        }
        if processing.extra_data_format != ExtraDataFormat::Empty {
            return Err(ProcessingError::UnexpectedExtraDataFormat {
                expected: processing.extra_data_format,
                actual: ExtraDataFormat::Empty,
            }
            .into());
        }

        let tx = tx_hash(&processing.main_data_hash, b"extra-empty");
        if !processing.extra_data_submitted {
            processing.extra_data_submitted = true;
            state
                .processing
                .insert(processing.current_frame_ref_slot, processing);
        }
        Ok(tx)
    }

    async fn submit_extra_data_list(
        &self,
        submitter: MemberId,
        payload: &[u8],
    ) -> GatewayResult<TxHash> {
        let mut state = self.state.write();
        state.ensure_member(submitter)?;

        let mut processing = state.current_processing();
        if !processing.main_data_submitted {
            return Err(ProcessingError::MainDataNotSubmitted.into());
        }
        if processing.extra_data_format != ExtraDataFormat::List {
            return Err(ProcessingError::UnexpectedExtraDataFormat {
                expected: processing.extra_data_format,
                actual: ExtraDataFormat::List,
            }
            .into());
        }

        let payload_hash = keccak256(payload);
        if payload_hash != processing.extra_data_hash {
            return Err(ProcessingError::UnexpectedExtraDataHash.into());
        }
        let items = decode_items(payload)
            .map_err(|e| ProcessingError::MalformedExtraData(e.to_string()))?;
        let count = items.len() as u64;
        if count != processing.extra_data_items_count {
            return Err(ProcessingError::UnexpectedExtraDataItemsCount {
                expected: processing.extra_data_items_count,
                actual: count,
            }
            .into());
        }

        let tx = tx_hash(&payload_hash, b"extra-list");
        if !processing.extra_data_submitted {
            processing.extra_data_submitted = true;
            processing.extra_data_items_submitted = count;
            state
                .processing
                .insert(processing.current_frame_ref_slot, processing);
        }
        Ok(tx)
    }

    async fn processing_state(&self, ref_slot: u64) -> GatewayResult<ProcessingState> {
        let state = self.state.read();
        Ok(state.processing.get(&ref_slot).cloned().unwrap_or_else(|| {
            let frame = Frame::new(ref_slot, &state.schedule);
            ProcessingState::for_frame(ref_slot, frame.report_processing_deadline_slot)
        }))
    }
}
