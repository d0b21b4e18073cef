//! Note lifecycle: creation, Pedersen and note commitments,
//! finalization against an assigned leaf index, and the memo bridge.
//!
//! A note is born either by deposit (minted locally, finalized once the
//! chain reports its leaf index) or by receipt (reconstructed from a
//! decrypted memo). Notes are never destroyed; spending only flips the
//! `spent` flag once the nullifier is observed on-chain.

use std::fmt;

use ark_bn254::Fr;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use zktoken_crypto::babyjubjub::{pedersen_commitment, Point};
use zktoken_crypto::field::random_field_248;
use zktoken_crypto::memo::MemoSecrets;
use zktoken_crypto::poseidon::{poseidon3, poseidon5};

use crate::error::WalletError;

/// Opaque tag partitioning notes by token.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TokenAddress(pub [u8; 20]);

impl TokenAddress {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub amount: u64,
    #[serde(with = "crate::serde_fr")]
    pub blinding: Fr,
    #[serde(with = "crate::serde_fr")]
    pub secret: Fr,
    #[serde(with = "crate::serde_fr")]
    pub nullifier_preimage: Fr,
    pub owner_pub: Point,
    pub token: TokenAddress,
    /// Position in the on-chain tree; unset until the chain assigns it.
    pub leaf_index: Option<u64>,
    /// Derived only once the leaf index is known.
    #[serde(with = "crate::serde_fr::opt")]
    pub nullifier: Option<Fr>,
    pub spent: bool,
}

impl Note {
    /// Mint a fresh note with uniformly sampled secrets. The amount
    /// must be non-zero (the full domain is `[1, 2^64)`).
    pub fn create<R: RngCore + ?Sized>(
        amount: u64,
        owner_pub: Point,
        token: TokenAddress,
        rng: &mut R,
    ) -> Result<Self, WalletError> {
        if amount == 0 {
            return Err(WalletError::AmountOutOfRange(amount));
        }
        owner_pub.validate()?;
        Ok(Self {
            amount,
            blinding: random_field_248(rng),
            secret: random_field_248(rng),
            nullifier_preimage: random_field_248(rng),
            owner_pub,
            token,
            leaf_index: None,
            nullifier: None,
            spent: false,
        })
    }

    /// `amount*G + blinding*H`.
    pub fn pedersen(&self) -> Result<Point, WalletError> {
        Ok(pedersen_commitment(self.amount, &self.blinding)?)
    }

    /// The tree leaf: `poseidon5(ped.x, ped.y, secret, preimage, owner.x)`.
    pub fn commitment(&self) -> Result<Fr, WalletError> {
        let pedersen = self.pedersen()?;
        Ok(poseidon5([
            pedersen.x,
            pedersen.y,
            self.secret,
            self.nullifier_preimage,
            self.owner_pub.x,
        ]))
    }

    pub fn is_finalized(&self) -> bool {
        self.leaf_index.is_some()
    }

    /// Bind the note to its assigned tree position and derive the
    /// nullifier. Returns a new value; the original is untouched.
    /// Folding the leaf index in keeps nullifiers distinct even when
    /// two deposits reuse identical secrets.
    pub fn finalize(&self, leaf_index: u64) -> Note {
        let nullifier = poseidon3(self.nullifier_preimage, self.secret, Fr::from(leaf_index));
        Note {
            leaf_index: Some(leaf_index),
            nullifier: Some(nullifier),
            spent: false,
            ..self.clone()
        }
    }

    /// The four secrets a memo carries to the recipient.
    pub fn memo_secrets(&self) -> MemoSecrets {
        MemoSecrets {
            amount: self.amount,
            blinding: self.blinding,
            secret: self.secret,
            nullifier_preimage: self.nullifier_preimage,
        }
    }

    /// Rebuild a received note from decrypted memo secrets, finalized
    /// against the event's leaf index.
    pub fn from_memo(
        secrets: &MemoSecrets,
        owner_pub: Point,
        leaf_index: u64,
        token: TokenAddress,
    ) -> Note {
        let note = Note {
            amount: secrets.amount,
            blinding: secrets.blinding,
            secret: secrets.secret,
            nullifier_preimage: secrets.nullifier_preimage,
            owner_pub,
            token,
            leaf_index: None,
            nullifier: None,
            spent: false,
        };
        note.finalize(leaf_index)
    }
}
