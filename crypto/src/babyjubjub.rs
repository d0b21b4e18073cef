//! Baby Jubjub: a twisted Edwards curve whose base field is the BN254
//! scalar field, so curve coordinates embed directly into Poseidon
//! inputs and circuit signals.
//!
//! The group law is the unified twisted Edwards addition; scalar
//! multiplication always runs a fixed-length ladder so private-scalar
//! operations do not branch on scalar bits.

use std::sync::OnceLock;

use ark_bn254::Fr;
use ark_ff::{Field, One, Zero};
use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CryptoError;
use crate::field::{fr_from_bytes_strict, fr_from_dec, fr_to_bytes, fr_to_biguint};
use crate::hashes::keccak256;

/// Twisted Edwards coefficient `a` in `a*x^2 + y^2 = 1 + d*x^2*y^2`.
pub const EDWARDS_A: u64 = 168700;
/// Twisted Edwards coefficient `d`.
pub const EDWARDS_D: u64 = 168696;

/// Order of the prime-order subgroup (cofactor 8).
const SUBGROUP_ORDER_DEC: &str =
    "2736030358979909402780800718157159386076813972158567259200215660948447373041";

/// Fixed generator of the full group.
const GENERATOR_X_DEC: &str =
    "995203441582195749578291179787384436505546430278305826713579947235728471134";
const GENERATOR_Y_DEC: &str =
    "5472060717959818805561601436314318772137091100104008585924551046643952123905";

/// Seed for deriving the independent Pedersen base `H`. Nobody knows
/// `log_G(H)` because `H` comes out of a hash, not a scalar multiple.
const PEDERSEN_H_SEED: &[u8] = b"zktoken_pedersen_h";

/// Every scalar multiplication walks this many ladder steps, enough for
/// any field element and independent of the scalar's actual bit length.
const SCALAR_BITS: usize = 254;

static SUBGROUP_ORDER: OnceLock<BigUint> = OnceLock::new();
static GENERATOR: OnceLock<Point> = OnceLock::new();
static BASE8: OnceLock<Point> = OnceLock::new();
static PEDERSEN_H: OnceLock<Point> = OnceLock::new();

/// Order of the prime-order subgroup as a big integer.
pub fn subgroup_order() -> &'static BigUint {
    SUBGROUP_ORDER.get_or_init(|| {
        BigUint::parse_bytes(SUBGROUP_ORDER_DEC.as_bytes(), 10).expect("subgroup order literal")
    })
}

/// The curve generator `G`.
pub fn generator() -> Point {
    *GENERATOR.get_or_init(|| Point {
        x: fr_from_dec(GENERATOR_X_DEC),
        y: fr_from_dec(GENERATOR_Y_DEC),
    })
}

/// `Base8 = 8*G`, the standard base for keypairs: multiplying by the
/// cofactor keeps every derived public key inside the prime-order
/// subgroup.
pub fn base8() -> Point {
    *BASE8.get_or_init(|| {
        generator()
            .double()
            .and_then(|p| p.double())
            .and_then(|p| p.double())
            .expect("generator doubling is complete")
    })
}

/// The independent Pedersen base `H`, derived once by try-and-increment
/// hash-to-curve over the fixed seed, then cofactor-cleared.
pub fn pedersen_h() -> Point {
    *PEDERSEN_H.get_or_init(|| {
        let mut counter: u32 = 0;
        loop {
            let mut material = Vec::with_capacity(PEDERSEN_H_SEED.len() + 4);
            material.extend_from_slice(PEDERSEN_H_SEED);
            material.extend_from_slice(&counter.to_be_bytes());
            let digest = keccak256(&material);
            let x = crate::field::fr_from_bytes_reduced(&digest);
            if let Some(candidate) = solve_for_y(x) {
                let cleared = candidate
                    .double()
                    .and_then(|p| p.double())
                    .and_then(|p| p.double());
                if let Ok(point) = cleared {
                    if !point.is_identity() {
                        return point;
                    }
                }
            }
            counter += 1;
        }
    })
}

/// Affine point on Baby Jubjub. The identity is `(0, 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: Fr,
    pub y: Fr,
}

impl Point {
    pub fn identity() -> Self {
        Point {
            x: Fr::zero(),
            y: Fr::one(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.x.is_zero() && self.y.is_one()
    }

    /// Unified twisted Edwards addition. A vanishing denominator can
    /// only come from a point outside the prime-order subgroup and is
    /// fatal to the calling operation.
    pub fn add(&self, other: &Point) -> Result<Point, CryptoError> {
        let a = Fr::from(EDWARDS_A);
        let d = Fr::from(EDWARDS_D);
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let cross = d * x1x2 * y1y2;
        let x_num = self.x * other.y + self.y * other.x;
        let y_num = y1y2 - a * x1x2;
        let x_den = Fr::one() + cross;
        let y_den = Fr::one() - cross;
        // One inversion for both denominators.
        let inv = (x_den * y_den)
            .inverse()
            .ok_or(CryptoError::InverseOfZero)?;
        Ok(Point {
            x: x_num * inv * y_den,
            y: y_num * inv * x_den,
        })
    }

    pub fn double(&self) -> Result<Point, CryptoError> {
        self.add(self)
    }

    /// Left-to-right double-and-add over a fixed number of bits. The
    /// addition is computed on every step regardless of the bit value.
    pub fn mul_bits(&self, scalar: &BigUint, bits: usize) -> Result<Point, CryptoError> {
        let scalar_bits = le_bits(scalar, bits);
        let mut acc = Point::identity();
        for bit in scalar_bits.iter().rev() {
            acc = acc.double()?;
            let with_base = acc.add(self)?;
            if *bit {
                acc = with_base;
            }
        }
        Ok(acc)
    }

    /// Full-width scalar multiplication.
    pub fn mul_scalar(&self, scalar: &BigUint) -> Result<Point, CryptoError> {
        self.mul_bits(scalar, SCALAR_BITS)
    }

    pub fn is_on_curve(&self) -> bool {
        let a = Fr::from(EDWARDS_A);
        let d = Fr::from(EDWARDS_D);
        let x2 = self.x.square();
        let y2 = self.y.square();
        a * x2 + y2 == Fr::one() + d * x2 * y2
    }

    pub fn is_in_subgroup(&self) -> bool {
        matches!(self.mul_scalar(subgroup_order()), Ok(p) if p.is_identity())
    }

    /// Reject points the engine must refuse to use.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if !self.is_on_curve() {
            return Err(CryptoError::PointNotOnCurve);
        }
        if !self.is_in_subgroup() {
            return Err(CryptoError::PointNotInSubgroup);
        }
        Ok(())
    }
}

/// `amount*G + blinding*H`. The value side runs a 64-bit ladder and the
/// blinding side a 254-bit ladder, matching the in-circuit
/// decompositions so witness shapes line up.
pub fn pedersen_commitment(amount: u64, blinding: &Fr) -> Result<Point, CryptoError> {
    let value_part = generator().mul_bits(&BigUint::from(amount), 64)?;
    let blinding_part = pedersen_h().mul_bits(&fr_to_biguint(blinding), SCALAR_BITS)?;
    value_part.add(&blinding_part)
}

/// Solve the curve equation for `y` given `x`, choosing the
/// lexicographically smaller root so derivation is deterministic.
fn solve_for_y(x: Fr) -> Option<Point> {
    let a = Fr::from(EDWARDS_A);
    let d = Fr::from(EDWARDS_D);
    let x2 = x.square();
    let numerator = Fr::one() - a * x2;
    let denominator = Fr::one() - d * x2;
    let y2 = numerator * denominator.inverse()?;
    let y = y2.sqrt()?;
    let y_alt = -y;
    let y = if fr_to_biguint(&y) <= fr_to_biguint(&y_alt) {
        y
    } else {
        y_alt
    };
    Some(Point { x, y })
}

/// Little-endian bit decomposition, zero-padded to `bits`.
fn le_bits(scalar: &BigUint, bits: usize) -> Vec<bool> {
    let bytes = scalar.to_bytes_le();
    (0..bits)
        .map(|i| {
            let byte = bytes.get(i / 8).copied().unwrap_or(0);
            (byte >> (i % 8)) & 1 == 1
        })
        .collect()
}

impl Serialize for Point {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&fr_to_bytes(&self.x));
        bytes[32..].copy_from_slice(&fr_to_bytes(&self.y));
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::<u8>::deserialize(deserializer)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::custom("expected 64 bytes"));
        }
        let x_bytes: [u8; 32] = bytes[..32].try_into().expect("length checked");
        let y_bytes: [u8; 32] = bytes[32..].try_into().expect("length checked");
        let x = fr_from_bytes_strict(&x_bytes)
            .map_err(|_| serde::de::Error::custom("x coordinate out of range"))?;
        let y = fr_from_bytes_strict(&y_bytes)
            .map_err(|_| serde::de::Error::custom("y coordinate out of range"))?;
        Ok(Point { x, y })
    }
}
