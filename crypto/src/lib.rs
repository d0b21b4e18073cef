pub mod babyjubjub;
pub mod error;
pub mod field;
pub mod hashes;
pub mod keys;
pub mod memo;
pub mod poseidon;

pub use error::CryptoError;
