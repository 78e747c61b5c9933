// Hash primitives

use crate::core::Hash256;
use sha2::{Digest, Sha256};

/// SHA256 double hash
/// hash256 = SHA256(SHA256(data))
pub fn hash256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&second);
    Hash256::new(bytes)
}

/// Double hash of two concatenated nodes, used for Merkle parents
pub fn hash256_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut combined = [0u8; 64];
    combined[..32].copy_from_slice(left.as_bytes());
    combined[32..].copy_from_slice(right.as_bytes());
    hash256(&combined)
}

/// Single SHA256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut result = [0u8; 32];
    result.copy_from_slice(&Sha256::digest(data));
    result
}

/// RIPEMD160(SHA256(data)), the public key hash behind P2PKH addresses
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    let mut result = [0u8; 20];
    result.copy_from_slice(&Ripemd160::digest(sha));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_known_vector() {
        // double sha256 of the empty string
        let hash = hash256(b"");
        assert_eq!(
            hex::encode(hash.as_bytes()),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_hash256_pair_matches_concatenation() {
        let left = Hash256::new([1; 32]);
        let right = Hash256::new([2; 32]);

        let mut data = vec![1u8; 32];
        data.extend_from_slice(&[2u8; 32]);
        assert_eq!(hash256_pair(&left, &right), hash256(&data));
        assert_ne!(hash256_pair(&left, &right), hash256_pair(&right, &left));
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash160() {
        let hash = hash160(b"test data");
        assert_eq!(hash.len(), 20);
        assert_eq!(hash, hash160(b"test data"));
    }
}
