//! Report processing state
//!
//! The committed, queryable result of a report cycle. After a successful
//! two-phase commit every field equals the corresponding field of the
//! committed report. Main data submitted with extra data pending is a valid
//! intermediate state, never a terminal one.

use super::extra_data::ExtraDataFormat;
use super::report::ReportData;
use serde::{Deserialize, Serialize};
use shared_types::{Hash, MemberId, ZERO_HASH};
use std::fmt;
use thiserror::Error;

/// Rejections raised by the report processor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    #[error("Sender {0} may not submit reports")]
    SenderNotAllowed(MemberId),

    #[error("Unexpected contract version: expected {expected}, got {actual}")]
    UnexpectedContractVersion { expected: u64, actual: u64 },

    #[error("Unexpected consensus version: expected {expected}, got {actual}")]
    UnexpectedConsensusVersion { expected: u64, actual: u64 },

    #[error("Ref slot {actual} is not the open frame {expected}")]
    UnexpectedRefSlot { expected: u64, actual: u64 },

    #[error("No consensus report for ref slot {0}")]
    NoConsensusReport(u64),

    #[error("Report data hash does not match the consensus hash")]
    UnexpectedDataHash,

    #[error("Main data already processed with a different hash")]
    ConflictingMainData,

    #[error("Extra data submitted before main data")]
    MainDataNotSubmitted,

    #[error("Extra data format mismatch: expected {expected:?}, got {actual:?}")]
    UnexpectedExtraDataFormat {
        expected: ExtraDataFormat,
        actual: ExtraDataFormat,
    },

    #[error("Extra data hash mismatch")]
    UnexpectedExtraDataHash,

    #[error("Extra data items count mismatch: expected {expected}, got {actual}")]
    UnexpectedExtraDataItemsCount { expected: u64, actual: u64 },

    #[error("Invalid extra data descriptor in main data")]
    InvalidExtraDataDescriptor,

    #[error("Malformed extra data: {0}")]
    MalformedExtraData(String),
}

/// Processing state of the current frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingState {
    pub current_frame_ref_slot: u64,
    pub processing_deadline_slot: u64,
    pub main_data_hash: Hash,
    pub main_data_submitted: bool,
    pub extra_data_hash: Hash,
    pub extra_data_format: ExtraDataFormat,
    pub extra_data_submitted: bool,
    pub extra_data_items_count: u64,
    pub extra_data_items_submitted: u64,
}

/// Field of [`ProcessingState`] checked after commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingField {
    RefSlot,
    MainDataHash,
    MainDataSubmitted,
    ExtraDataHash,
    ExtraDataFormat,
    ExtraDataSubmitted,
    ExtraDataItemsCount,
    ExtraDataItemsSubmitted,
}

impl fmt::Display for ProcessingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RefSlot => "ref_slot",
            Self::MainDataHash => "main_data_hash",
            Self::MainDataSubmitted => "main_data_submitted",
            Self::ExtraDataHash => "extra_data_hash",
            Self::ExtraDataFormat => "extra_data_format",
            Self::ExtraDataSubmitted => "extra_data_submitted",
            Self::ExtraDataItemsCount => "extra_data_items_count",
            Self::ExtraDataItemsSubmitted => "extra_data_items_submitted",
        };
        f.write_str(name)
    }
}

/// A stored field that differs from what was committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: ProcessingField,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, got {}",
            self.field, self.expected, self.actual
        )
    }
}

impl ProcessingState {
    /// State a fully committed `report` must leave behind.
    pub fn expected_for(report: &ReportData, report_hash: Hash) -> Self {
        let extra = &report.extra_data;
        Self {
            current_frame_ref_slot: report.ref_slot,
            processing_deadline_slot: 0,
            main_data_hash: report_hash,
            main_data_submitted: true,
            extra_data_hash: extra.hash,
            extra_data_format: extra.format,
            extra_data_submitted: true,
            extra_data_items_count: extra.items_count,
            extra_data_items_submitted: extra.items_count,
        }
    }

    /// Whether both commit phases completed.
    pub fn is_complete(&self) -> bool {
        self.main_data_submitted && self.extra_data_submitted
    }

    /// Compare against the state `report` should have produced.
    ///
    /// The processing deadline is not part of the report and is ignored.
    pub fn mismatches(&self, report: &ReportData, report_hash: Hash) -> Vec<FieldMismatch> {
        let expected = Self::expected_for(report, report_hash);
        let mut out = Vec::new();

        let mut check = |field, want: String, got: String| {
            if want != got {
                out.push(FieldMismatch {
                    field,
                    expected: want,
                    actual: got,
                });
            }
        };

        check(
            ProcessingField::RefSlot,
            expected.current_frame_ref_slot.to_string(),
            self.current_frame_ref_slot.to_string(),
        );
        check(
            ProcessingField::MainDataHash,
            hex::encode(expected.main_data_hash),
            hex::encode(self.main_data_hash),
        );
        check(
            ProcessingField::MainDataSubmitted,
            expected.main_data_submitted.to_string(),
            self.main_data_submitted.to_string(),
        );
        check(
            ProcessingField::ExtraDataHash,
            hex::encode(expected.extra_data_hash),
            hex::encode(self.extra_data_hash),
        );
        check(
            ProcessingField::ExtraDataFormat,
            format!("{:?}", expected.extra_data_format),
            format!("{:?}", self.extra_data_format),
        );
        check(
            ProcessingField::ExtraDataSubmitted,
            expected.extra_data_submitted.to_string(),
            self.extra_data_submitted.to_string(),
        );
        check(
            ProcessingField::ExtraDataItemsCount,
            expected.extra_data_items_count.to_string(),
            self.extra_data_items_count.to_string(),
        );
        check(
            ProcessingField::ExtraDataItemsSubmitted,
            expected.extra_data_items_submitted.to_string(),
            self.extra_data_items_submitted.to_string(),
        );

        out
    }

    /// Fresh state for a newly opened frame.
    pub fn for_frame(ref_slot: u64, processing_deadline_slot: u64) -> Self {
        Self {
            current_frame_ref_slot: ref_slot,
            processing_deadline_slot,
            main_data_hash: ZERO_HASH,
            ..Self::default()
        }
    }
}
