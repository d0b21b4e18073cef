//! In-memory note store, partitioned by token and indexed by nullifier
//! so spend-side events resolve in O(1).
//!
//! The store is the engine's one long-lived piece of mutable state:
//! writers go through a single mutex, readers get snapshots. Durable
//! persistence is the embedding application's concern.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use ark_bn254::Fr;
use zktoken_crypto::field::fr_to_bytes;

use crate::error::WalletError;
use crate::notes::{Note, TokenAddress};

#[derive(Debug, Default)]
pub struct NoteStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    notes: BTreeMap<TokenAddress, Vec<StoredNote>>,
    /// nullifier bytes -> (token, position in its partition).
    by_nullifier: HashMap<[u8; 32], (TokenAddress, usize)>,
    /// commitment bytes -> (token, position in its partition).
    by_commitment: HashMap<[u8; 32], (TokenAddress, usize)>,
}

#[derive(Clone, Debug)]
struct StoredNote {
    note: Note,
    commitment: [u8; 32],
    /// Reserved by an in-flight spend; cleared on confirm or reject.
    pending_spend: bool,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a note, deduplicating by commitment so repeated scans of
    /// the same event stream are idempotent. Returns whether the note
    /// was newly added.
    pub fn save(&self, note: Note) -> Result<bool, WalletError> {
        let commitment = fr_to_bytes(&note.commitment()?);
        self.with_mut(|state| {
            if state.by_commitment.contains_key(&commitment) {
                return Ok(false);
            }
            let token = note.token;
            let partition = state.notes.entry(token).or_default();
            let position = partition.len();
            if let Some(nullifier) = &note.nullifier {
                state
                    .by_nullifier
                    .insert(fr_to_bytes(nullifier), (token, position));
            }
            state.by_commitment.insert(commitment, (token, position));
            partition.push(StoredNote {
                note,
                commitment,
                pending_spend: false,
            });
            Ok(true)
        })
    }

    /// Finalize a locally minted deposit note once the chain assigns
    /// its leaf index. Returns the finalized note, or `None` when the
    /// commitment is not one of ours.
    pub fn finalize_deposit(
        &self,
        commitment: &Fr,
        leaf_index: u64,
    ) -> Result<Option<Note>, WalletError> {
        let key = fr_to_bytes(commitment);
        self.with_mut(|state| {
            let Some(&(token, position)) = state.by_commitment.get(&key) else {
                return Ok(None);
            };
            let stored = state
                .notes
                .get_mut(&token)
                .and_then(|partition| partition.get_mut(position))
                .ok_or(WalletError::InvalidState("commitment index desynchronized"))?;
            if stored.note.is_finalized() {
                return Ok(None);
            }
            let finalized = stored.note.finalize(leaf_index);
            let nullifier = finalized
                .nullifier
                .ok_or(WalletError::InvalidState("finalized note lacks nullifier"))?;
            stored.note = finalized.clone();
            state
                .by_nullifier
                .insert(fr_to_bytes(&nullifier), (token, position));
            Ok(Some(finalized))
        })
    }

    /// Snapshot of every note, optionally restricted to one token.
    pub fn all(&self, token: Option<&TokenAddress>) -> Result<Vec<Note>, WalletError> {
        self.with_state(|state| {
            Ok(state
                .partitions(token)
                .flat_map(|partition| partition.iter().map(|stored| stored.note.clone()))
                .collect())
        })
    }

    /// Snapshot of spendable notes: finalized, unspent, not reserved.
    pub fn unspent(&self, token: Option<&TokenAddress>) -> Result<Vec<Note>, WalletError> {
        self.with_state(|state| {
            Ok(state
                .partitions(token)
                .flat_map(|partition| {
                    partition
                        .iter()
                        .filter(|stored| {
                            stored.note.is_finalized()
                                && !stored.note.spent
                                && !stored.pending_spend
                        })
                        .map(|stored| stored.note.clone())
                })
                .collect())
        })
    }

    /// Mark the note carrying this nullifier as spent. Must be driven
    /// by on-chain observation of the nullifier, never by local
    /// submission. Returns whether a note was updated.
    pub fn mark_spent(&self, nullifier: &Fr) -> Result<bool, WalletError> {
        let key = fr_to_bytes(nullifier);
        self.with_mut(|state| {
            let Some(&(token, position)) = state.by_nullifier.get(&key) else {
                return Ok(false);
            };
            let stored = state
                .notes
                .get_mut(&token)
                .and_then(|partition| partition.get_mut(position))
                .ok_or(WalletError::InvalidState("nullifier index desynchronized"))?;
            if stored.note.spent {
                return Ok(false);
            }
            stored.note.spent = true;
            stored.pending_spend = false;
            Ok(true)
        })
    }

    /// Reserve (or release) a note for an in-flight spend.
    pub fn mark_pending(&self, nullifier: &Fr, pending: bool) -> Result<bool, WalletError> {
        let key = fr_to_bytes(nullifier);
        self.with_mut(|state| {
            let Some(&(token, position)) = state.by_nullifier.get(&key) else {
                return Ok(false);
            };
            let stored = state
                .notes
                .get_mut(&token)
                .and_then(|partition| partition.get_mut(position))
                .ok_or(WalletError::InvalidState("nullifier index desynchronized"))?;
            stored.pending_spend = pending;
            Ok(true)
        })
    }

    /// Total unspent value per token.
    pub fn balances(&self) -> Result<BTreeMap<TokenAddress, u64>, WalletError> {
        self.with_state(|state| {
            let mut totals: BTreeMap<TokenAddress, u64> = BTreeMap::new();
            for (token, partition) in &state.notes {
                for stored in partition {
                    if stored.note.is_finalized() && !stored.note.spent && !stored.pending_spend {
                        let entry = totals.entry(*token).or_default();
                        *entry = entry.saturating_add(stored.note.amount);
                    }
                }
            }
            Ok(totals)
        })
    }

    fn with_state<F, T>(&self, func: F) -> Result<T, WalletError>
    where
        F: FnOnce(&StoreState) -> Result<T, WalletError>,
    {
        let state = self
            .state
            .lock()
            .map_err(|_| WalletError::InvalidState("note store poisoned"))?;
        func(&state)
    }

    fn with_mut<F, T>(&self, func: F) -> Result<T, WalletError>
    where
        F: FnOnce(&mut StoreState) -> Result<T, WalletError>,
    {
        let mut state = self
            .state
            .lock()
            .map_err(|_| WalletError::InvalidState("note store poisoned"))?;
        func(&mut state)
    }
}

impl StoreState {
    fn partitions<'a>(
        &'a self,
        token: Option<&TokenAddress>,
    ) -> Box<dyn Iterator<Item = &'a Vec<StoredNote>> + 'a> {
        match token {
            Some(token) => Box::new(self.notes.get(token).into_iter()),
            None => Box::new(self.notes.values()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};
    use zktoken_crypto::keys::KeyPair;

    use super::*;

    fn finalized_note(rng: &mut StdRng, amount: u64, token: TokenAddress, leaf: u64) -> Note {
        let keys = KeyPair::generate(rng).unwrap();
        Note::create(amount, keys.public(), token, rng)
            .unwrap()
            .finalize(leaf)
    }

    #[test]
    fn save_and_query_by_token() {
        let mut rng = StdRng::seed_from_u64(1);
        let store = NoteStore::new();
        let token_a = TokenAddress([1u8; 20]);
        let token_b = TokenAddress([2u8; 20]);
        store
            .save(finalized_note(&mut rng, 100, token_a, 0))
            .unwrap();
        store
            .save(finalized_note(&mut rng, 200, token_a, 1))
            .unwrap();
        store
            .save(finalized_note(&mut rng, 300, token_b, 2))
            .unwrap();

        assert_eq!(store.all(None).unwrap().len(), 3);
        assert_eq!(store.all(Some(&token_a)).unwrap().len(), 2);
        assert_eq!(store.unspent(Some(&token_b)).unwrap().len(), 1);
        assert_eq!(store.balances().unwrap()[&token_a], 300);
    }

    #[test]
    fn save_is_idempotent_by_commitment() {
        let mut rng = StdRng::seed_from_u64(2);
        let store = NoteStore::new();
        let note = finalized_note(&mut rng, 50, TokenAddress::default(), 0);
        assert!(store.save(note.clone()).unwrap());
        assert!(!store.save(note).unwrap());
        assert_eq!(store.all(None).unwrap().len(), 1);
    }

    #[test]
    fn mark_spent_via_nullifier() {
        let mut rng = StdRng::seed_from_u64(3);
        let store = NoteStore::new();
        let note = finalized_note(&mut rng, 75, TokenAddress::default(), 0);
        let nullifier = note.nullifier.unwrap();
        store.save(note).unwrap();

        assert!(store.mark_spent(&nullifier).unwrap());
        assert!(store.unspent(None).unwrap().is_empty());
        // Second observation of the same nullifier is a no-op.
        assert!(!store.mark_spent(&nullifier).unwrap());

        let unknown = Fr::from(99u64);
        assert!(!store.mark_spent(&unknown).unwrap());
    }

    #[test]
    fn pending_notes_are_not_spendable() {
        let mut rng = StdRng::seed_from_u64(4);
        let store = NoteStore::new();
        let note = finalized_note(&mut rng, 75, TokenAddress::default(), 0);
        let nullifier = note.nullifier.unwrap();
        store.save(note).unwrap();

        assert!(store.mark_pending(&nullifier, true).unwrap());
        assert!(store.unspent(None).unwrap().is_empty());
        assert!(store.mark_pending(&nullifier, false).unwrap());
        assert_eq!(store.unspent(None).unwrap().len(), 1);
    }

    #[test]
    fn deposit_finalization_indexes_nullifier() {
        let mut rng = StdRng::seed_from_u64(5);
        let store = NoteStore::new();
        let keys = KeyPair::generate(&mut rng).unwrap();
        let note = Note::create(1_000, keys.public(), TokenAddress::default(), &mut rng).unwrap();
        let commitment = note.commitment().unwrap();
        store.save(note).unwrap();

        // Unfinalized deposits are not spendable yet.
        assert!(store.unspent(None).unwrap().is_empty());

        let finalized = store.finalize_deposit(&commitment, 9).unwrap().unwrap();
        assert_eq!(finalized.leaf_index, Some(9));
        assert_eq!(store.unspent(None).unwrap().len(), 1);
        assert!(store.mark_spent(&finalized.nullifier.unwrap()).unwrap());

        // Unknown commitments are ignored.
        assert!(store
            .finalize_deposit(&Fr::from(5u64), 10)
            .unwrap()
            .is_none());
    }
}
