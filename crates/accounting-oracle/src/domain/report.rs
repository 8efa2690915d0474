//! Report data and its canonical hash
//!
//! The report hash is the object the committee agrees on. It is the Keccak-256
//! digest of the ABI encoding of the fields below, in this exact order:
//!
//! ```text
//! (consensusVersion, refSlot, numValidators, clBalanceGwei,
//!  stakingModuleIdsWithNewlyExitedValidators[], numExitedValidatorsByStakingModule[],
//!  withdrawalVaultBalance, elRewardsVaultBalance, sharesRequestedToBurn,
//!  withdrawalFinalizationBatches[], shareRate, isBunkerMode,
//!  extraDataFormat, extraDataHash, extraDataItemsCount)
//! ```
//!
//! Changing the order is a wire change and requires a consensus version bump.
//! The extra data payload itself is not part of the hash; it is bound through
//! `extraDataHash`.

use super::extra_data::{ExtraData, ExtraDataFormat};
use serde::{Deserialize, Serialize};
use shared_types::{keccak256, Gwei, Hash, Wei, U256};
use thiserror::Error;

/// Report validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportValidationError {
    #[error("Exited validators arrays differ in length: {ids} module ids, {counts} counts")]
    ExitedArraysLengthMismatch { ids: usize, counts: usize },

    #[error("Staking module ids not strictly ascending at position {position}")]
    ModuleIdsNotSorted { position: usize },

    #[error("Finalization batches not strictly increasing at position {position}")]
    BatchesNotIncreasing { position: usize },

    #[error("Finalization batch boundary at position {position} is zero")]
    ZeroBatchBoundary { position: usize },

    #[error("Extra data descriptor does not match its payload")]
    InconsistentExtraData,

    #[error("Ref slot {ref_slot} does not match open frame {frame_ref_slot}")]
    RefSlotMismatch { ref_slot: u64, frame_ref_slot: u64 },

    #[error("Consensus-layer balance underflow: {balance} gwei with diff {diff}")]
    ClBalanceUnderflow { balance: Gwei, diff: i128 },

    #[error("Invalid extra data: {0}")]
    ExtraData(#[from] super::extra_data::ExtraDataError),
}

/// The canonical report record for one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportData {
    pub consensus_version: u64,
    pub ref_slot: u64,
    pub num_validators: u64,
    pub cl_balance_gwei: Gwei,
    pub staking_module_ids_with_newly_exited_validators: Vec<u64>,
    pub num_exited_validators_by_staking_module: Vec<u64>,
    pub withdrawal_vault_balance: Wei,
    pub el_rewards_vault_balance: Wei,
    pub shares_requested_to_burn: u128,
    /// Strictly increasing withdrawal request id upper bounds
    pub withdrawal_finalization_batches: Vec<u64>,
    /// Share rate with 27 decimals of precision
    pub share_rate: U256,
    pub is_bunker_mode: bool,
    pub extra_data: ExtraData,
}

impl ReportData {
    /// Set the fields derived after simulation and batch calculation.
    pub fn finalize(&mut self, share_rate: U256, is_bunker_mode: bool, batches: Vec<u64>) {
        self.share_rate = share_rate;
        self.is_bunker_mode = is_bunker_mode;
        self.withdrawal_finalization_batches = batches;
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ReportValidationError> {
        let ids = &self.staking_module_ids_with_newly_exited_validators;
        let counts = &self.num_exited_validators_by_staking_module;
        if ids.len() != counts.len() {
            return Err(ReportValidationError::ExitedArraysLengthMismatch {
                ids: ids.len(),
                counts: counts.len(),
            });
        }
        if let Some(position) = ids.windows(2).position(|w| w[0] >= w[1]) {
            return Err(ReportValidationError::ModuleIdsNotSorted {
                position: position + 1,
            });
        }

        let batches = &self.withdrawal_finalization_batches;
        if let Some(position) = batches.iter().position(|b| *b == 0) {
            return Err(ReportValidationError::ZeroBatchBoundary { position });
        }
        if let Some(position) = batches.windows(2).position(|w| w[0] >= w[1]) {
            return Err(ReportValidationError::BatchesNotIncreasing {
                position: position + 1,
            });
        }

        if !self.extra_data.is_consistent() {
            return Err(ReportValidationError::InconsistentExtraData);
        }
        Ok(())
    }

    /// ABI encoding of the hashed field tuple.
    pub fn encode(&self) -> Vec<u8> {
        let tokens = vec![
            Token::Uint(U256::from(self.consensus_version)),
            Token::Uint(U256::from(self.ref_slot)),
            Token::Uint(U256::from(self.num_validators)),
            Token::Uint(U256::from(self.cl_balance_gwei)),
            Token::Array(words(&self.staking_module_ids_with_newly_exited_validators)),
            Token::Array(words(&self.num_exited_validators_by_staking_module)),
            Token::Uint(U256::from(self.withdrawal_vault_balance)),
            Token::Uint(U256::from(self.el_rewards_vault_balance)),
            Token::Uint(U256::from(self.shares_requested_to_burn)),
            Token::Array(words(&self.withdrawal_finalization_batches)),
            Token::Uint(self.share_rate),
            Token::Bool(self.is_bunker_mode),
            Token::Uint(U256::from(self.extra_data.format.code())),
            Token::FixedBytes(self.extra_data.hash),
            Token::Uint(U256::from(self.extra_data.items_count)),
        ];
        // abi.encode(struct) wraps the tuple behind a single offset word
        let mut out = word(U256::from(32u64)).to_vec();
        out.extend(encode_tuple(&tokens));
        out
    }

    /// Canonical report hash.
    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    pub fn extra_data_format(&self) -> ExtraDataFormat {
        self.extra_data.format
    }
}

enum Token {
    Uint(U256),
    Bool(bool),
    FixedBytes(Hash),
    Array(Vec<U256>),
}

fn words(values: &[u64]) -> Vec<U256> {
    values.iter().map(|v| U256::from(*v)).collect()
}

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Head/tail tuple encoding: static values inline, arrays behind offsets.
fn encode_tuple(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&word(*value)),
            Token::Bool(flag) => head.extend_from_slice(&word(U256::from(u8::from(*flag)))),
            Token::FixedBytes(bytes) => head.extend_from_slice(bytes),
            Token::Array(items) => {
                head.extend_from_slice(&word(U256::from(head_len + tail.len())));
                tail.extend_from_slice(&word(U256::from(items.len())));
                for item in items {
                    tail.extend_from_slice(&word(*item));
                }
            }
        }
    }

    head.extend(tail);
    head
}
