//! Committee claim ledger
//!
//! Model of the hash-consensus committee's shared ledger. Each member holds at
//! most one claim per ref slot; a report hash reaches consensus once `quorum`
//! distinct members claim it.
//!
//! ```text
//! [OPEN] ──first claim──→ [COLLECTING] ──quorum on one hash──→ [REACHED]
//!   ↑                                                              │
//!   └──────────────────────── newer ref slot ──────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use shared_types::{Hash, MemberId, ZERO_HASH};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Claim rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("Member {0} is not in the committee")]
    UnauthorizedMember(MemberId),

    #[error("Claim for ref slot {ref_slot} is older than open ref slot {current}")]
    StaleRefSlot { ref_slot: u64, current: u64 },

    #[error("Member {0} already claimed a different hash for this ref slot")]
    ConflictingClaim(MemberId),

    #[error("Consensus version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    #[error("Empty report hash")]
    ZeroHash,

    #[error("Quorum {quorum} invalid for {members} members")]
    InvalidQuorum { quorum: usize, members: usize },
}

/// One member's assertion about a frame's report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusClaim {
    pub member: MemberId,
    pub ref_slot: u64,
    pub report_hash: Hash,
    pub consensus_version: u64,
}

/// Outcome of an accepted submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimReceipt {
    Recorded,
    /// Same claim already held; ledger unchanged
    Duplicate,
}

/// Consensus progress for a ref slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusPhase {
    Open,
    Collecting,
    Reached { report_hash: Hash },
}

/// Read view of the ledger for one ref slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub ref_slot: u64,
    /// Agreed hash, if quorum was reached
    pub report_hash: Option<Hash>,
    /// Members backing the agreed hash
    pub support: usize,
}

/// Committee ledger for the currently open ref slot.
#[derive(Clone, Debug)]
pub struct ClaimLedger {
    members: Vec<MemberId>,
    quorum: usize,
    consensus_version: u64,
    ref_slot: Option<u64>,
    claims: BTreeMap<MemberId, Hash>,
    support: HashMap<Hash, usize>,
    reached: Option<Hash>,
}

impl ClaimLedger {
    /// Create a ledger; quorum must be a strict majority of the members.
    pub fn new(
        members: Vec<MemberId>,
        quorum: usize,
        consensus_version: u64,
    ) -> Result<Self, ClaimError> {
        if quorum == 0 || quorum > members.len() || quorum * 2 <= members.len() {
            return Err(ClaimError::InvalidQuorum {
                quorum,
                members: members.len(),
            });
        }
        Ok(Self {
            members,
            quorum,
            consensus_version,
            ref_slot: None,
            claims: BTreeMap::new(),
            support: HashMap::new(),
            reached: None,
        })
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn consensus_version(&self) -> u64 {
        self.consensus_version
    }

    pub fn is_member(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// Record a claim.
    ///
    /// Resubmitting an identical claim is a no-op. Claims are never retracted,
    /// so a member cannot switch to a different hash within a ref slot.
    pub fn submit(&mut self, claim: ConsensusClaim) -> Result<ClaimReceipt, ClaimError> {
        if !self.is_member(&claim.member) {
            return Err(ClaimError::UnauthorizedMember(claim.member));
        }
        if claim.consensus_version != self.consensus_version {
            return Err(ClaimError::VersionMismatch {
                expected: self.consensus_version,
                actual: claim.consensus_version,
            });
        }
        if claim.report_hash == ZERO_HASH {
            return Err(ClaimError::ZeroHash);
        }

        match self.ref_slot {
            Some(current) if claim.ref_slot < current => {
                return Err(ClaimError::StaleRefSlot {
                    ref_slot: claim.ref_slot,
                    current,
                });
            }
            Some(current) if claim.ref_slot == current => {}
            _ => self.open(claim.ref_slot),
        }

        if let Some(existing) = self.claims.get(&claim.member) {
            if *existing == claim.report_hash {
                return Ok(ClaimReceipt::Duplicate);
            }
            return Err(ClaimError::ConflictingClaim(claim.member));
        }

        self.claims.insert(claim.member, claim.report_hash);
        let support = self.support.entry(claim.report_hash).or_insert(0);
        *support += 1;
        if self.reached.is_none() && *support >= self.quorum {
            self.reached = Some(claim.report_hash);
        }
        Ok(ClaimReceipt::Recorded)
    }

    /// Phase of consensus for `ref_slot`.
    pub fn phase(&self, ref_slot: u64) -> ConsensusPhase {
        if self.ref_slot != Some(ref_slot) || self.claims.is_empty() {
            return ConsensusPhase::Open;
        }
        match self.reached {
            Some(report_hash) => ConsensusPhase::Reached { report_hash },
            None => ConsensusPhase::Collecting,
        }
    }

    /// Ledger view for `ref_slot`.
    pub fn report(&self, ref_slot: u64) -> ConsensusReport {
        let report_hash = match self.phase(ref_slot) {
            ConsensusPhase::Reached { report_hash } => Some(report_hash),
            _ => None,
        };
        ConsensusReport {
            ref_slot,
            report_hash,
            support: report_hash.map(|h| self.support_for(&h)).unwrap_or(0),
        }
    }

    /// Members currently claiming `hash`.
    pub fn support_for(&self, hash: &Hash) -> usize {
        self.support.get(hash).copied().unwrap_or(0)
    }

    fn open(&mut self, ref_slot: u64) {
        self.ref_slot = Some(ref_slot);
        self.claims.clear();
        self.support.clear();
        self.reached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(n: u8) -> Vec<MemberId> {
        (0..n).map(MemberId::from_index).collect()
    }

    fn claim(member: u8, ref_slot: u64, hash_byte: u8) -> ConsensusClaim {
        ConsensusClaim {
            member: MemberId::from_index(member),
            ref_slot,
            report_hash: [hash_byte; 32],
            consensus_version: 1,
        }
    }

    #[test]
    fn test_quorum_must_be_majority() {
        assert!(ClaimLedger::new(members(5), 2, 1).is_err());
        assert!(ClaimLedger::new(members(5), 6, 1).is_err());
        assert!(ClaimLedger::new(members(5), 3, 1).is_ok());
    }

    #[test]
    fn test_reached_at_quorum_not_before() {
        let mut ledger = ClaimLedger::new(members(5), 3, 1).unwrap();
        assert_eq!(ledger.phase(100), ConsensusPhase::Open);

        ledger.submit(claim(0, 100, 0xaa)).unwrap();
        ledger.submit(claim(1, 100, 0xaa)).unwrap();
        // Dissenting members do not help the majority hash
        ledger.submit(claim(2, 100, 0xbb)).unwrap();
        ledger.submit(claim(3, 100, 0xbb)).unwrap();
        assert_eq!(ledger.phase(100), ConsensusPhase::Collecting);
        assert_eq!(ledger.report(100).report_hash, None);

        ledger.submit(claim(4, 100, 0xaa)).unwrap();
        assert_eq!(
            ledger.phase(100),
            ConsensusPhase::Reached {
                report_hash: [0xaa; 32]
            }
        );
        assert_eq!(ledger.report(100).support, 3);
    }

    #[test]
    fn test_resubmission_is_idempotent() {
        let mut ledger = ClaimLedger::new(members(3), 2, 1).unwrap();
        assert_eq!(
            ledger.submit(claim(0, 7, 0xaa)).unwrap(),
            ClaimReceipt::Recorded
        );
        assert_eq!(
            ledger.submit(claim(0, 7, 0xaa)).unwrap(),
            ClaimReceipt::Duplicate
        );
        assert_eq!(ledger.support_for(&[0xaa; 32]), 1);
        assert_eq!(ledger.phase(7), ConsensusPhase::Collecting);
    }

    #[test]
    fn test_claims_are_not_retracted() {
        let mut ledger = ClaimLedger::new(members(3), 2, 1).unwrap();
        ledger.submit(claim(0, 7, 0xaa)).unwrap();
        assert_eq!(
            ledger.submit(claim(0, 7, 0xbb)),
            Err(ClaimError::ConflictingClaim(MemberId::from_index(0)))
        );
    }

    #[test]
    fn test_new_ref_slot_resets_segment() {
        let mut ledger = ClaimLedger::new(members(3), 2, 1).unwrap();
        ledger.submit(claim(0, 7, 0xaa)).unwrap();
        ledger.submit(claim(1, 7, 0xaa)).unwrap();
        assert!(matches!(ledger.phase(7), ConsensusPhase::Reached { .. }));

        ledger.submit(claim(0, 14, 0xcc)).unwrap();
        assert_eq!(ledger.phase(14), ConsensusPhase::Collecting);
        assert_eq!(ledger.phase(7), ConsensusPhase::Open);
        assert_eq!(
            ledger.submit(claim(2, 7, 0xaa)),
            Err(ClaimError::StaleRefSlot {
                ref_slot: 7,
                current: 14
            })
        );
    }

    #[test]
    fn test_unauthorized_and_version_checks() {
        let mut ledger = ClaimLedger::new(members(3), 2, 1).unwrap();
        assert!(matches!(
            ledger.submit(claim(9, 7, 0xaa)),
            Err(ClaimError::UnauthorizedMember(_))
        ));

        let mut wrong_version = claim(0, 7, 0xaa);
        wrong_version.consensus_version = 2;
        assert_eq!(
            ledger.submit(wrong_version),
            Err(ClaimError::VersionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }
}
