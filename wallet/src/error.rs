use thiserror::Error;

use pool_merkle::MerkleError;
use zktoken_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("cryptography error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("merkle tree error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("amount {0} is outside the 64-bit spendable range")]
    AmountOutOfRange(u64),

    #[error("conservation violation: {0}")]
    ConservationViolation(&'static str),

    #[error("merkle path does not open to the supplied root")]
    MerklePathInvalid,

    #[error("proof pieces are not the expected field shape")]
    ProofEncodeMalformed,

    #[error("chain rejected the submission: {0}")]
    ChainReject(String),

    #[error("insufficient funds (needed {needed}, available {available})")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("invalid wallet state: {0}")]
    InvalidState(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}
