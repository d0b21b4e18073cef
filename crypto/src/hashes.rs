use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// Keccak-256 as used by the host chain (signature hashing, curve-point
/// derivation seeds).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
