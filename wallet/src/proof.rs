//! Groth16 proof wire codec and the seam to the external prover.
//!
//! The proof travels as the 256-byte ABI tuple
//! `(uint256[2], uint256[2][2], uint256[2])`. The prover library emits
//! each Fq2 coordinate of `pi_b` as `[c0, c1]`, while the on-chain
//! pairing precompile reads `[c1, c0]`; the codec performs that
//! inner-pair swap on both the x and y components. A proof encoded
//! without the swap verifies off-chain and fails on-chain, so the swap
//! lives in exactly one place: here.

use std::sync::OnceLock;

use num_bigint::BigUint;

use crate::error::WalletError;
use crate::witness::{TransferWitness, WithdrawWitness};

/// Encoded proof length, always exact.
pub const PROOF_BYTES: usize = 256;

/// BN254 base field modulus: the coordinate field of G1/G2, distinct
/// from the scalar field the witness lives in.
const BASE_FIELD_MODULUS_DEC: &str =
    "21888242871839275222246405745257275088696311157297823662689037894645226208583";

static BASE_FIELD_MODULUS: OnceLock<BigUint> = OnceLock::new();

fn base_field_modulus() -> &'static BigUint {
    BASE_FIELD_MODULUS.get_or_init(|| {
        BigUint::parse_bytes(BASE_FIELD_MODULUS_DEC.as_bytes(), 10)
            .expect("base field modulus literal")
    })
}

/// Affine G1 element as two big-endian coordinate words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct G1Point {
    pub x: [u8; 32],
    pub y: [u8; 32],
}

/// Affine G2 element; each coordinate is an Fq2 pair held in the
/// prover's `[c0, c1]` order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct G2Point {
    pub x: [[u8; 32]; 2],
    pub y: [[u8; 32]; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Groth16Proof {
    pub a: G1Point,
    pub b: G2Point,
    pub c: G1Point,
}

impl Groth16Proof {
    /// ABI-encode for the on-chain verifier. Deterministic, exactly
    /// [`PROOF_BYTES`] long, with the G2 inner pairs swapped.
    pub fn encode(&self) -> Result<[u8; PROOF_BYTES], WalletError> {
        let words: [&[u8; 32]; 8] = [
            &self.a.x,
            &self.a.y,
            &self.b.x[1],
            &self.b.x[0],
            &self.b.y[1],
            &self.b.y[0],
            &self.c.x,
            &self.c.y,
        ];
        let mut out = [0u8; PROOF_BYTES];
        for (slot, word) in words.iter().enumerate() {
            check_coordinate(word)?;
            out[slot * 32..(slot + 1) * 32].copy_from_slice(*word);
        }
        Ok(out)
    }

    /// Parse verifier-format bytes back into prover coordinate order.
    pub fn decode(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != PROOF_BYTES {
            return Err(WalletError::ProofEncodeMalformed);
        }
        let word = |slot: usize| -> Result<[u8; 32], WalletError> {
            let word: [u8; 32] = bytes[slot * 32..(slot + 1) * 32]
                .try_into()
                .expect("length checked");
            check_coordinate(&word)?;
            Ok(word)
        };
        Ok(Self {
            a: G1Point {
                x: word(0)?,
                y: word(1)?,
            },
            b: G2Point {
                // Undo the on-wire [c1, c0] ordering.
                x: [word(3)?, word(2)?],
                y: [word(5)?, word(4)?],
            },
            c: G1Point {
                x: word(6)?,
                y: word(7)?,
            },
        })
    }
}

fn check_coordinate(word: &[u8; 32]) -> Result<(), WalletError> {
    if BigUint::from_bytes_be(word) >= *base_field_modulus() {
        return Err(WalletError::ProofEncodeMalformed);
    }
    Ok(())
}

/// The fixed, externally-supplied Groth16 routine. The engine only
/// assembles the witness it consumes and encodes the proof it returns.
pub trait SnarkProver {
    fn prove_transfer(&self, witness: &TransferWitness) -> Result<Groth16Proof, WalletError>;
    fn prove_withdraw(&self, witness: &WithdrawWitness) -> Result<Groth16Proof, WalletError>;
}
