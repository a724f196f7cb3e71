//! Stable content hashes.
//!
//! Seed words and probe pairs are identified by SHA-256 of their text, so
//! identity survives restarts, reordering of the seed list and upgrades of
//! the toolchain.

use driftnet_core::{CandidateName, RegionCode};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of `text`.
#[must_use]
pub fn stable_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Compact key of a (candidate, region) pair: the first 64 bits of
/// SHA-256 over `candidate:region`.
#[must_use]
pub fn pair_key(candidate: &CandidateName, region: RegionCode) -> u64 {
    let digest = Sha256::digest(format!("{candidate}:{region}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_known_value() {
        assert_eq!(
            stable_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_pair_key_distinguishes_regions() {
        let name = CandidateName::new("acme-prod").expect("valid bucket");
        let east = pair_key(&name, RegionCode::UsEast1);
        assert_eq!(east, pair_key(&name, RegionCode::UsEast1));
        assert_ne!(east, pair_key(&name, RegionCode::EuWest1));
    }
}
