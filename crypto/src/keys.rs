//! Baby Jubjub keypairs and the deterministic derivation path that lets
//! a user recover the same shielded key from a host-chain signature on
//! any client.

use ark_bn254::Fr;
use ark_ff::PrimeField;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::babyjubjub::{base8, subgroup_order, Point};
use crate::error::CryptoError;
use crate::hashes::keccak256;

/// ASCII prefix of the message a host wallet signs to derive its
/// shielded key. The full message is the prefix followed by the
/// lowercased hex address, and must match bit-for-bit across clients.
pub const KEY_MESSAGE_PREFIX: &str = "zktoken-shielded-key-v1:";

/// A private scalar in `[1, L-1]`, stored big-endian and wiped on drop.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretScalar([u8; 32]);

impl SecretScalar {
    fn from_biguint(value: &BigUint) -> Self {
        let mut bytes = [0u8; 32];
        let be = value.to_bytes_be();
        bytes[32 - be.len()..].copy_from_slice(&be);
        Self(bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Embed into the BN254 scalar field. Exact, since `L < p`.
    pub fn as_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct KeyPair {
    secret: SecretScalar,
    public: Point,
}

impl KeyPair {
    /// Sample a private scalar uniformly in `[1, L-1]` by rejection.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self, CryptoError> {
        let order = subgroup_order();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let candidate = BigUint::from_bytes_be(&bytes);
            if !candidate.is_zero() && candidate < *order {
                return Self::from_scalar(candidate);
            }
        }
    }

    /// Build a keypair from an existing private scalar.
    pub fn from_private(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let value = BigUint::from_bytes_be(&bytes);
        if value.is_zero() || value >= *subgroup_order() {
            return Err(CryptoError::InvalidScalar);
        }
        Self::from_scalar(value)
    }

    /// Deterministic derivation from a host-chain signature over
    /// [`shielded_key_message`]: `priv = keccak256(signature) mod L`,
    /// mapping zero to one. Idempotent for a fixed wallet.
    pub fn from_host_signature(signature: &[u8]) -> Result<Self, CryptoError> {
        let digest = keccak256(signature);
        let mut scalar = BigUint::from_bytes_be(&digest) % subgroup_order();
        if scalar.is_zero() {
            scalar = BigUint::one();
        }
        Self::from_scalar(scalar)
    }

    fn from_scalar(value: BigUint) -> Result<Self, CryptoError> {
        let secret = SecretScalar::from_biguint(&value);
        let public = base8().mul_scalar(&value)?;
        Ok(Self { secret, public })
    }

    pub fn secret(&self) -> &SecretScalar {
        &self.secret
    }

    pub fn public(&self) -> Point {
        self.public
    }

    /// Diffie-Hellman over the curve: both sides land on the same point.
    pub fn ecdh(&self, their_public: &Point) -> Result<Point, CryptoError> {
        their_public.validate()?;
        their_public.mul_scalar(&self.secret.to_biguint())
    }
}

/// The exact ASCII message a host wallet signs for key derivation.
pub fn shielded_key_message(address: &str) -> String {
    format!("{}{}", KEY_MESSAGE_PREFIX, address.to_lowercase())
}
