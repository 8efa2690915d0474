//! Extra data: the second-phase report payload
//!
//! Per-node-operator validator counts that are too large to fit in the main
//! report. Items are packed into a flat byte list:
//!
//! ```text
//! itemIndex(3) | itemType(2) | moduleId(3) | nodeOpsCount(8) |
//!     nodeOperatorIds(8 * n) | validatorCounts(16 * n)
//! ```
//!
//! All integers are big-endian. Items are ordered strictly ascending by
//! `(itemType, moduleId, firstNodeOperatorId)` and node operator ids are strictly
//! ascending within an item.

use serde::{Deserialize, Serialize};
use shared_types::{keccak256, Hash, ZERO_HASH};
use thiserror::Error;

const ITEM_INDEX_BYTES: usize = 3;
const ITEM_TYPE_BYTES: usize = 2;
const MODULE_ID_BYTES: usize = 3;
const NODE_OPS_COUNT_BYTES: usize = 8;
const NODE_OPERATOR_ID_BYTES: usize = 8;
const VALIDATORS_COUNT_BYTES: usize = 16;

const ITEM_HEADER_BYTES: usize =
    ITEM_INDEX_BYTES + ITEM_TYPE_BYTES + MODULE_ID_BYTES + NODE_OPS_COUNT_BYTES;

/// Largest value representable in a 3-byte field.
pub const MAX_UINT24: u32 = (1 << 24) - 1;

/// Extra data errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtraDataError {
    #[error("Extra data item {index}: unknown item type {item_type}")]
    UnknownItemType { index: usize, item_type: u16 },

    #[error("Extra data item {index}: node operator ids and counts differ in length")]
    LengthMismatch { index: usize },

    #[error("Extra data item {index}: no node operators")]
    EmptyItem { index: usize },

    #[error("Extra data item {index}: module id {module_id} exceeds 24 bits")]
    ModuleIdTooLarge { index: usize, module_id: u32 },

    #[error("Extra data item {index}: node operator ids not strictly ascending")]
    NodeOperatorsNotSorted { index: usize },

    #[error("Extra data item {index}: items not strictly ascending")]
    ItemsNotSorted { index: usize },

    #[error("Extra data item {index}: expected index {expected}")]
    UnexpectedIndex { index: usize, expected: usize },

    #[error("Extra data truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Too many extra data items: {count}")]
    TooManyItems { count: usize },
}

/// Item type tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExtraDataItemType {
    StuckValidators,
    ExitedValidators,
}

impl ExtraDataItemType {
    pub fn code(self) -> u16 {
        match self {
            Self::StuckValidators => 1,
            Self::ExitedValidators => 2,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::StuckValidators),
            2 => Some(Self::ExitedValidators),
            _ => None,
        }
    }
}

/// Validator counts for a set of node operators of one staking module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraDataItem {
    pub item_type: ExtraDataItemType,
    pub module_id: u32,
    pub node_operator_ids: Vec<u64>,
    pub validator_counts: Vec<u128>,
}

impl ExtraDataItem {
    pub fn exited(module_id: u32, node_operator_ids: Vec<u64>, validator_counts: Vec<u128>) -> Self {
        Self {
            item_type: ExtraDataItemType::ExitedValidators,
            module_id,
            node_operator_ids,
            validator_counts,
        }
    }

    fn sort_key(&self) -> (u16, u32, u64) {
        (
            self.item_type.code(),
            self.module_id,
            self.node_operator_ids.first().copied().unwrap_or(0),
        )
    }

    fn check(&self, index: usize) -> Result<(), ExtraDataError> {
        if self.node_operator_ids.is_empty() {
            return Err(ExtraDataError::EmptyItem { index });
        }
        if self.node_operator_ids.len() != self.validator_counts.len() {
            return Err(ExtraDataError::LengthMismatch { index });
        }
        if self.module_id > MAX_UINT24 {
            return Err(ExtraDataError::ModuleIdTooLarge {
                index,
                module_id: self.module_id,
            });
        }
        if self.node_operator_ids.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ExtraDataError::NodeOperatorsNotSorted { index });
        }
        Ok(())
    }
}

/// Pack items into the extra data byte list.
///
/// Items must already be in canonical order.
pub fn encode_items(items: &[ExtraDataItem]) -> Result<Vec<u8>, ExtraDataError> {
    if items.len() > MAX_UINT24 as usize {
        return Err(ExtraDataError::TooManyItems { count: items.len() });
    }

    let mut out = Vec::new();
    for (index, item) in items.iter().enumerate() {
        item.check(index)?;
        if index > 0 && items[index - 1].sort_key() >= item.sort_key() {
            return Err(ExtraDataError::ItemsNotSorted { index });
        }

        out.extend_from_slice(&(index as u32).to_be_bytes()[1..]);
        out.extend_from_slice(&item.item_type.code().to_be_bytes());
        out.extend_from_slice(&item.module_id.to_be_bytes()[1..]);
        out.extend_from_slice(&(item.node_operator_ids.len() as u64).to_be_bytes());
        for id in &item.node_operator_ids {
            out.extend_from_slice(&id.to_be_bytes());
        }
        for count in &item.validator_counts {
            out.extend_from_slice(&count.to_be_bytes());
        }
    }
    Ok(out)
}

/// Unpack and validate an extra data byte list.
pub fn decode_items(bytes: &[u8]) -> Result<Vec<ExtraDataItem>, ExtraDataError> {
    let mut items: Vec<ExtraDataItem> = Vec::new();
    let mut reader = ByteReader { bytes, offset: 0 };

    while !reader.is_done() {
        let index = items.len();
        let item_index = reader.read_uint(ITEM_INDEX_BYTES)? as usize;
        if item_index != index {
            return Err(ExtraDataError::UnexpectedIndex {
                index: item_index,
                expected: index,
            });
        }

        let type_code = reader.read_uint(ITEM_TYPE_BYTES)? as u16;
        let item_type = ExtraDataItemType::from_code(type_code).ok_or(
            ExtraDataError::UnknownItemType {
                index,
                item_type: type_code,
            },
        )?;
        let module_id = reader.read_uint(MODULE_ID_BYTES)? as u32;
        let count = reader.read_uint(NODE_OPS_COUNT_BYTES)? as usize;

        if count == 0 {
            return Err(ExtraDataError::EmptyItem { index });
        }
        // Refuse counts the remaining bytes cannot possibly hold
        let needed = count.saturating_mul(NODE_OPERATOR_ID_BYTES + VALIDATORS_COUNT_BYTES);
        if needed > reader.remaining() {
            return Err(ExtraDataError::Truncated {
                offset: bytes.len(),
            });
        }

        let node_operator_ids = (0..count)
            .map(|_| reader.read_uint(NODE_OPERATOR_ID_BYTES).map(|v| v as u64))
            .collect::<Result<Vec<_>, _>>()?;
        let validator_counts = (0..count)
            .map(|_| reader.read_uint(VALIDATORS_COUNT_BYTES))
            .collect::<Result<Vec<_>, _>>()?;

        let item = ExtraDataItem {
            item_type,
            module_id,
            node_operator_ids,
            validator_counts,
        };
        item.check(index)?;
        if let Some(prev) = items.last() {
            if prev.sort_key() >= item.sort_key() {
                return Err(ExtraDataError::ItemsNotSorted { index });
            }
        }
        items.push(item);
    }

    Ok(items)
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl ByteReader<'_> {
    fn is_done(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    fn read_uint(&mut self, width: usize) -> Result<u128, ExtraDataError> {
        let end = self.offset + width;
        let chunk = self
            .bytes
            .get(self.offset..end)
            .ok_or(ExtraDataError::Truncated {
                offset: self.offset,
            })?;
        self.offset = end;
        Ok(chunk.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b)))
    }
}

/// Extra data format declared in the main report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExtraDataFormat {
    /// No extra data; an explicit empty marker is submitted in phase two
    #[default]
    Empty,
    /// A packed item list is submitted in phase two
    List,
}

impl ExtraDataFormat {
    pub fn code(self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::List => 1,
        }
    }
}

/// Extra data descriptor carried by a report, plus the payload when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtraData {
    pub format: ExtraDataFormat,
    pub hash: Hash,
    pub items_count: u64,
    pub payload: Vec<u8>,
}

impl ExtraData {
    /// The `format = none` descriptor.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a list descriptor from items, sorting them canonically.
    ///
    /// An empty item list yields the empty descriptor.
    pub fn from_items(mut items: Vec<ExtraDataItem>) -> Result<Self, ExtraDataError> {
        if items.is_empty() {
            return Ok(Self::empty());
        }
        items.sort_by_key(|item| item.sort_key());
        let payload = encode_items(&items)?;
        Ok(Self {
            format: ExtraDataFormat::List,
            hash: keccak256(&payload),
            items_count: items.len() as u64,
            payload,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.format == ExtraDataFormat::Empty
    }

    /// Check the descriptor agrees with its own payload.
    pub fn is_consistent(&self) -> bool {
        match self.format {
            ExtraDataFormat::Empty => {
                self.hash == ZERO_HASH && self.items_count == 0 && self.payload.is_empty()
            }
            ExtraDataFormat::List => {
                !self.payload.is_empty()
                    && self.items_count > 0
                    && keccak256(&self.payload) == self.hash
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exited(module_id: u32, ops: &[u64]) -> ExtraDataItem {
        ExtraDataItem::exited(
            module_id,
            ops.to_vec(),
            ops.iter().map(|op| u128::from(*op) + 1).collect(),
        )
    }

    #[test]
    fn test_item_layout() {
        let bytes = encode_items(&[exited(1, &[7])]).unwrap();
        assert_eq!(bytes.len(), ITEM_HEADER_BYTES + 8 + 16);
        // index 0, type 2, module 1, one operator
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 2, 0, 0, 1]);
        assert_eq!(&bytes[8..16], &1u64.to_be_bytes());
        assert_eq!(&bytes[16..24], &7u64.to_be_bytes());
        assert_eq!(&bytes[24..40], &8u128.to_be_bytes());
    }

    #[test]
    fn test_from_items_sorts_and_decodes() {
        let extra = ExtraData::from_items(vec![exited(2, &[1]), exited(1, &[3, 9])]).unwrap();
        assert_eq!(extra.format, ExtraDataFormat::List);
        assert_eq!(extra.items_count, 2);
        assert!(extra.is_consistent());

        let decoded = decode_items(&extra.payload).unwrap();
        assert_eq!(decoded[0].module_id, 1);
        assert_eq!(decoded[0].node_operator_ids, vec![3, 9]);
        assert_eq!(decoded[1].module_id, 2);
    }

    #[test]
    fn test_unsorted_items_rejected() {
        let result = encode_items(&[exited(2, &[1]), exited(1, &[1])]);
        assert_eq!(result, Err(ExtraDataError::ItemsNotSorted { index: 1 }));

        let result = encode_items(&[exited(1, &[5, 5])]);
        assert_eq!(result, Err(ExtraDataError::NodeOperatorsNotSorted { index: 0 }));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let bytes = encode_items(&[exited(1, &[1, 2])]).unwrap();
        let result = decode_items(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(ExtraDataError::Truncated { .. })));
    }

    #[test]
    fn test_empty_descriptor_consistency() {
        let mut extra = ExtraData::empty();
        assert!(extra.is_consistent());

        extra.hash[0] = 1;
        assert!(!extra.is_consistent());
    }

    #[test]
    fn test_tampered_payload_breaks_consistency() {
        let mut extra = ExtraData::from_items(vec![exited(1, &[1])]).unwrap();
        let last = extra.payload.len() - 1;
        extra.payload[last] ^= 0xff;
        assert!(!extra.is_consistent());
    }
}
