pub mod error;
pub mod notes;
pub mod proof;
pub mod scanner;
mod serde_fr;
pub mod spend;
pub mod store;
pub mod sync;
pub mod witness;

pub use error::WalletError;
pub use notes::{Note, TokenAddress};
pub use proof::{G1Point, G2Point, Groth16Proof, SnarkProver, PROOF_BYTES};
pub use scanner::{MemoEvent, NoteScanner, ScanResult, ScannerStats, SharedScanner};
pub use spend::{SpendJob, SpendPhase};
pub use store::NoteStore;
pub use sync::{OutputRecord, PoolEvent, SyncEngine, SyncOutcome};
pub use witness::{
    build_transfer, build_withdraw, OutputAssignment, TransferBuild, TransferWitness,
    WithdrawBuild, WithdrawWitness,
};
