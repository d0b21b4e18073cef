//! Chain-ordered event ingestion: the glue between the public event
//! log and the local tree + note store.
//!
//! Events must be applied in block order; the mirrored tree only
//! produces the on-chain root when its leaves arrive in exactly the
//! order the contract assigned them. For each new output commitment the
//! engine first tries to finalize a locally minted deposit, then falls
//! back to trial-decrypting the memo. Observed nullifiers mark notes
//! spent; this is the only path that ever flips the flag.

use serde::{Deserialize, Serialize};

use ark_bn254::Fr;
use pool_merkle::{MerklePath, PoolTree};
use rand::RngCore;
use zktoken_crypto::keys::KeyPair;

use crate::error::WalletError;
use crate::notes::{Note, TokenAddress};
use crate::scanner::{MemoEvent, NoteScanner};
use crate::store::NoteStore;

/// One new output note as the contract reported it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(with = "crate::serde_fr")]
    pub commitment: Fr,
    pub leaf_index: u64,
    pub memo: Vec<u8>,
}

/// One pool event in the contract's emission order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolEvent {
    pub block: u64,
    #[serde(with = "crate::serde_fr::vec")]
    pub spent_nullifiers: Vec<Fr>,
    pub outputs: Vec<OutputRecord>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Commitments inserted into the mirrored tree.
    pub inserted: usize,
    /// Locally minted deposits that received their leaf index.
    pub finalized: usize,
    /// Notes recovered from memos addressed to us.
    pub recovered: usize,
    /// Notes marked spent from observed nullifiers.
    pub spent: usize,
}

/// Single-writer engine owning the mirrored tree and the note store.
#[derive(Debug)]
pub struct SyncEngine {
    tree: PoolTree,
    store: NoteStore,
    scanner: NoteScanner,
    token: TokenAddress,
    last_block: Option<u64>,
}

impl SyncEngine {
    pub fn new(keys: KeyPair, token: TokenAddress) -> Self {
        Self {
            tree: PoolTree::new(),
            store: NoteStore::new(),
            scanner: NoteScanner::new(keys, token),
            token,
            last_block: None,
        }
    }

    pub fn tree(&self) -> &PoolTree {
        &self.tree
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn keys(&self) -> &KeyPair {
        self.scanner.keys()
    }

    pub fn token(&self) -> TokenAddress {
        self.token
    }

    /// Authentication path for a leaf of the mirrored tree.
    pub fn path(&self, leaf_index: u64) -> Result<MerklePath, WalletError> {
        Ok(self.tree.path(leaf_index)?)
    }

    /// Mint a deposit note to our own key and park it in the store
    /// until its commitment comes back from the chain with a leaf
    /// index. Returns the note and the commitment to submit.
    pub fn prepare_deposit<R: RngCore + ?Sized>(
        &self,
        amount: u64,
        rng: &mut R,
    ) -> Result<(Note, Fr), WalletError> {
        let note = Note::create(amount, self.scanner.keys().public(), self.token, rng)?;
        let commitment = note.commitment()?;
        self.store.save(note.clone())?;
        Ok((note, commitment))
    }

    /// Apply one pool event. Events must arrive in block order and
    /// leaf indices must be contiguous with the mirrored tree.
    pub fn apply(&mut self, event: &PoolEvent) -> Result<SyncOutcome, WalletError> {
        if let Some(last_block) = self.last_block {
            if event.block < last_block {
                return Err(WalletError::InvalidState(
                    "events must be applied in block order",
                ));
            }
        }
        let mut outcome = SyncOutcome::default();

        for nullifier in &event.spent_nullifiers {
            if self.store.mark_spent(nullifier)? {
                outcome.spent += 1;
            }
        }

        for output in &event.outputs {
            if output.leaf_index != self.tree.next_index() {
                return Err(WalletError::InvalidState("commitment leaf index mismatch"));
            }
            self.tree.insert(output.commitment)?;
            outcome.inserted += 1;

            if self
                .store
                .finalize_deposit(&output.commitment, output.leaf_index)?
                .is_some()
            {
                outcome.finalized += 1;
                continue;
            }

            let candidate = MemoEvent {
                memo: output.memo.clone(),
                commitment: output.commitment,
                leaf_index: output.leaf_index,
                block: event.block,
            };
            if let Some(note) = self.scanner.scan_event(&candidate) {
                if self.store.save(note)? {
                    outcome.recovered += 1;
                }
            }
        }

        self.last_block = Some(event.block);
        Ok(outcome)
    }
}
