//! ECDH-sealed memos: the channel that carries a note's four secrets
//! from sender to recipient through the public event log.
//!
//! Wire format, fixed length regardless of content:
//!
//! ```text
//! | ephemeral pub x (32B) | ephemeral pub y (32B) | nonce (12B) | ciphertext+tag (144B) |
//! ```
//!
//! Decryption failures of any kind collapse into the single opaque
//! [`CryptoError::MemoReject`] so a scan over foreign memos leaks
//! nothing about why a candidate was not ours.

use ark_bn254::Fr;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, KeyInit};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;

use crate::babyjubjub::Point;
use crate::error::CryptoError;
use crate::field::{fr_from_bytes_strict, fr_to_bytes};
use crate::keys::{KeyPair, SecretScalar};

const POINT_BYTES: usize = 64;
const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

/// Four 32-byte big-endian words: amount, blinding, secret, preimage.
pub const MEMO_PLAINTEXT_BYTES: usize = 128;

/// Total sealed memo length.
pub const MEMO_BYTES: usize = POINT_BYTES + NONCE_BYTES + MEMO_PLAINTEXT_BYTES + TAG_BYTES;

/// HKDF info string pinning the memo key schedule.
const MEMO_INFO: &[u8] = b"zktoken-memo-v1";

/// The note secrets a memo transports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoSecrets {
    pub amount: u64,
    pub blinding: Fr,
    pub secret: Fr,
    pub nullifier_preimage: Fr,
}

impl MemoSecrets {
    fn to_plaintext(&self) -> [u8; MEMO_PLAINTEXT_BYTES] {
        let mut out = [0u8; MEMO_PLAINTEXT_BYTES];
        out[24..32].copy_from_slice(&self.amount.to_be_bytes());
        out[32..64].copy_from_slice(&fr_to_bytes(&self.blinding));
        out[64..96].copy_from_slice(&fr_to_bytes(&self.secret));
        out[96..128].copy_from_slice(&fr_to_bytes(&self.nullifier_preimage));
        out
    }

    fn from_plaintext(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != MEMO_PLAINTEXT_BYTES {
            return Err(CryptoError::MemoReject);
        }
        // The amount word carries a u64: the upper 24 bytes must be zero.
        if bytes[..24].iter().any(|&b| b != 0) {
            return Err(CryptoError::MemoReject);
        }
        let amount = u64::from_be_bytes(bytes[24..32].try_into().expect("length checked"));
        let parse = |range: std::ops::Range<usize>| -> Result<Fr, CryptoError> {
            let word: [u8; 32] = bytes[range].try_into().expect("length checked");
            fr_from_bytes_strict(&word).map_err(|_| CryptoError::MemoReject)
        };
        Ok(Self {
            amount,
            blinding: parse(32..64)?,
            secret: parse(64..96)?,
            nullifier_preimage: parse(96..128)?,
        })
    }
}

/// Seal note secrets to a recipient public key.
pub fn seal<R: RngCore + ?Sized>(
    recipient: &Point,
    secrets: &MemoSecrets,
    rng: &mut R,
) -> Result<[u8; MEMO_BYTES], CryptoError> {
    recipient.validate()?;
    let ephemeral = KeyPair::generate(rng)?;
    let shared = ephemeral.ecdh(recipient)?;
    let key = derive_memo_key(&shared);

    let mut nonce = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(&key.into());
    let ciphertext = cipher
        .encrypt(&nonce.into(), secrets.to_plaintext().as_slice())
        .map_err(|_| CryptoError::MemoReject)?;

    let mut out = [0u8; MEMO_BYTES];
    out[..32].copy_from_slice(&fr_to_bytes(&ephemeral.public().x));
    out[32..64].copy_from_slice(&fr_to_bytes(&ephemeral.public().y));
    out[64..64 + NONCE_BYTES].copy_from_slice(&nonce);
    out[64 + NONCE_BYTES..].copy_from_slice(&ciphertext);
    Ok(out)
}

/// Attempt to open a sealed memo with a private scalar. Every failure
/// mode returns the same opaque rejection.
pub fn open(secret: &SecretScalar, memo: &[u8]) -> Result<MemoSecrets, CryptoError> {
    if memo.len() != MEMO_BYTES {
        return Err(CryptoError::MemoReject);
    }
    let x_bytes: [u8; 32] = memo[..32].try_into().expect("length checked");
    let y_bytes: [u8; 32] = memo[32..64].try_into().expect("length checked");
    let ephemeral = Point {
        x: fr_from_bytes_strict(&x_bytes).map_err(|_| CryptoError::MemoReject)?,
        y: fr_from_bytes_strict(&y_bytes).map_err(|_| CryptoError::MemoReject)?,
    };
    if ephemeral.validate().is_err() {
        return Err(CryptoError::MemoReject);
    }
    let shared = ephemeral
        .mul_scalar(&secret.to_biguint())
        .map_err(|_| CryptoError::MemoReject)?;
    let key = derive_memo_key(&shared);

    let nonce: [u8; NONCE_BYTES] = memo[64..64 + NONCE_BYTES]
        .try_into()
        .expect("length checked");
    let cipher = ChaCha20Poly1305::new(&key.into());
    let plaintext = cipher
        .decrypt(&nonce.into(), &memo[64 + NONCE_BYTES..])
        .map_err(|_| CryptoError::MemoReject)?;
    MemoSecrets::from_plaintext(&plaintext)
}

/// HKDF-SHA-256 over the shared point's x-coordinate.
fn derive_memo_key(shared: &Point) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(None, &fr_to_bytes(&shared.x));
    let mut key = [0u8; 32];
    hkdf.expand(MEMO_INFO, &mut key)
        .expect("32 bytes is a valid HKDF-SHA-256 output length");
    key
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn sample_secrets(rng: &mut StdRng) -> MemoSecrets {
        MemoSecrets {
            amount: 1_000_000,
            blinding: crate::field::random_field_248(rng),
            secret: crate::field::random_field_248(rng),
            nullifier_preimage: crate::field::random_field_248(rng),
        }
    }

    #[test]
    fn round_trip() {
        let mut rng = StdRng::seed_from_u64(11);
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let secrets = sample_secrets(&mut rng);
        let sealed = seal(&recipient.public(), &secrets, &mut rng).unwrap();
        assert_eq!(sealed.len(), MEMO_BYTES);
        let opened = open(recipient.secret(), &sealed).unwrap();
        assert_eq!(opened, secrets);
    }

    #[test]
    fn wrong_key_rejects() {
        let mut rng = StdRng::seed_from_u64(12);
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let eavesdropper = KeyPair::generate(&mut rng).unwrap();
        let secrets = sample_secrets(&mut rng);
        let sealed = seal(&recipient.public(), &secrets, &mut rng).unwrap();
        assert_eq!(
            open(eavesdropper.secret(), &sealed),
            Err(CryptoError::MemoReject)
        );
    }

    #[test]
    fn bit_flip_rejects() {
        let mut rng = StdRng::seed_from_u64(13);
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let secrets = sample_secrets(&mut rng);
        let sealed = seal(&recipient.public(), &secrets, &mut rng).unwrap();
        // Flip one bit in each region: point, nonce, ciphertext, tag.
        for &position in &[5usize, 40, 70, 100, MEMO_BYTES - 1] {
            let mut corrupted = sealed;
            corrupted[position] ^= 0x01;
            assert_eq!(
                open(recipient.secret(), &corrupted),
                Err(CryptoError::MemoReject),
                "flip at byte {position} must reject"
            );
        }
    }

    #[test]
    fn truncated_memo_rejects() {
        let mut rng = StdRng::seed_from_u64(14);
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let secrets = sample_secrets(&mut rng);
        let sealed = seal(&recipient.public(), &secrets, &mut rng).unwrap();
        assert_eq!(
            open(recipient.secret(), &sealed[..MEMO_BYTES - 1]),
            Err(CryptoError::MemoReject)
        );
        assert_eq!(open(recipient.secret(), &[]), Err(CryptoError::MemoReject));
    }

    #[test]
    fn length_is_content_independent() {
        let mut rng = StdRng::seed_from_u64(15);
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let small = MemoSecrets {
            amount: 1,
            blinding: Fr::from(1u64),
            secret: Fr::from(1u64),
            nullifier_preimage: Fr::from(1u64),
        };
        let large = sample_secrets(&mut rng);
        let sealed_small = seal(&recipient.public(), &small, &mut rng).unwrap();
        let sealed_large = seal(&recipient.public(), &large, &mut rng).unwrap();
        assert_eq!(sealed_small.len(), sealed_large.len());
    }
}
