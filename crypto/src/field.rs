//! Helpers for the BN254 scalar field, the field every commitment,
//! nullifier, and curve coordinate in the protocol lives in.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use num_bigint::BigUint;
use rand::RngCore;

use crate::error::CryptoError;

/// Secrets, blindings, and nullifier preimages are sampled as uniform
/// 31-byte integers so they always fit below the field modulus.
pub const SECRET_BYTES: usize = 31;

static FR_MODULUS: OnceLock<BigUint> = OnceLock::new();

/// The BN254 scalar field prime as a big integer.
pub fn fr_modulus() -> &'static BigUint {
    FR_MODULUS.get_or_init(|| BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be()))
}

/// Big-endian 32-byte encoding of a field element.
pub fn fr_to_bytes(value: &Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_be());
    out
}

/// Parse big-endian bytes, reducing modulo the field.
pub fn fr_from_bytes_reduced(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Parse a canonical big-endian encoding; encodings at or above the
/// modulus are rejected rather than silently reduced.
pub fn fr_from_bytes_strict(bytes: &[u8; 32]) -> Result<Fr, CryptoError> {
    if BigUint::from_bytes_be(bytes) >= *fr_modulus() {
        return Err(CryptoError::InvalidScalar);
    }
    Ok(Fr::from_be_bytes_mod_order(bytes))
}

pub fn fr_to_biguint(value: &Fr) -> BigUint {
    BigUint::from_bytes_be(&value.into_bigint().to_bytes_be())
}

/// Convert a big integer into the field, reducing modulo the prime.
pub fn fr_from_biguint(value: &BigUint) -> Fr {
    Fr::from_le_bytes_mod_order(&value.to_bytes_le())
}

pub(crate) fn fr_from_dec(literal: &str) -> Fr {
    let value = BigUint::parse_bytes(literal.as_bytes(), 10).expect("decimal field literal");
    fr_from_biguint(&value)
}

/// Sample a uniform 31-byte field element (248 bits, always below the
/// modulus without reduction bias).
pub fn random_field_248<R: RngCore + ?Sized>(rng: &mut R) -> Fr {
    let mut bytes = [0u8; SECRET_BYTES];
    rng.fill_bytes(&mut bytes);
    Fr::from_be_bytes_mod_order(&bytes)
}
