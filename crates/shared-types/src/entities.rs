//! # Core Entities
//!
//! Hashes, identities and denominations shared between the report engine,
//! its collaborators and the test suites.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

// Re-export U256 from primitive-types for share rates and ABI words
pub use primitive_types::U256;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// The canonical "nothing here" hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// A 20-byte Ethereum-style address.
pub type Address = [u8; 20];

/// Identifier of a submitted transaction.
pub type TxHash = Hash;

/// Amount in wei.
pub type Wei = u128;

/// Amount in gwei (consensus-layer denomination).
pub type Gwei = u64;

/// Wei in one gwei.
pub const WEI_PER_GWEI: Wei = 1_000_000_000;

/// Wei in one ether.
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Gwei in one ether.
pub const GWEI_PER_ETHER: Gwei = 1_000_000_000;

/// Compute Keccak256 hash.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Convert a consensus-layer gwei amount into wei.
pub fn gwei_to_wei(amount: Gwei) -> Wei {
    Wei::from(amount) * WEI_PER_GWEI
}

/// Abbreviated `0x`-prefixed hex of a hash, for log lines.
pub fn short_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(&hash[..6]))
}

/// Identity of an oracle committee member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct MemberId(pub Address);

impl MemberId {
    /// Deterministic member address for tests and fixtures.
    pub fn from_index(index: u8) -> Self {
        let mut address = [0u8; 20];
        address[0] = 0xaa;
        address[19] = index;
        Self(address)
    }
}

impl From<Address> for MemberId {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
