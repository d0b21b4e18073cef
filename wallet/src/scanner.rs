//! Memo scanning: trial-decrypt every event memo with the wallet's
//! private scalar and recover the notes addressed to it.
//!
//! Decryption failure carries no information by design; a memo that is
//! not ours looks exactly like a corrupted one. A memo that decrypts
//! but whose reconstructed commitment disagrees with the event's
//! commitment is discarded rather than trusted.

use ark_bn254::Fr;
use serde::{Deserialize, Serialize};

use zktoken_crypto::keys::KeyPair;
use zktoken_crypto::memo;

use crate::notes::{Note, TokenAddress};

/// One decrypt-candidate event from the chain's log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoEvent {
    pub memo: Vec<u8>,
    #[serde(with = "crate::serde_fr")]
    pub commitment: Fr,
    pub leaf_index: u64,
    pub block: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ScanResult {
    /// Recovered notes addressed to this wallet, finalized against
    /// their event leaf indices.
    pub notes: Vec<Note>,
    pub total_scanned: usize,
    pub not_ours: usize,
    /// Decrypted fine but the commitment did not match the event.
    pub mismatched: usize,
}

enum ScanOutcome {
    Ours(Box<Note>),
    NotOurs,
    Mismatched,
}

#[derive(Debug)]
pub struct NoteScanner {
    keys: KeyPair,
    token: TokenAddress,
}

impl NoteScanner {
    pub fn new(keys: KeyPair, token: TokenAddress) -> Self {
        Self { keys, token }
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Attempt to recover a note from one event.
    pub fn scan_event(&self, event: &MemoEvent) -> Option<Note> {
        match self.scan_inner(event) {
            ScanOutcome::Ours(note) => Some(*note),
            _ => None,
        }
    }

    /// Scan an ordered event stream.
    pub fn scan(&self, events: &[MemoEvent]) -> ScanResult {
        let mut result = ScanResult {
            total_scanned: events.len(),
            ..ScanResult::default()
        };
        for event in events {
            match self.scan_inner(event) {
                ScanOutcome::Ours(note) => result.notes.push(*note),
                ScanOutcome::NotOurs => result.not_ours += 1,
                ScanOutcome::Mismatched => result.mismatched += 1,
            }
        }
        result
    }

    /// Scan only events at or past a starting leaf index. Useful when
    /// resuming from a previous sync position.
    pub fn scan_incremental(&self, events: &[MemoEvent], start_leaf_index: u64) -> ScanResult {
        let filtered: Vec<MemoEvent> = events
            .iter()
            .filter(|event| event.leaf_index >= start_leaf_index)
            .cloned()
            .collect();
        self.scan(&filtered)
    }

    fn scan_inner(&self, event: &MemoEvent) -> ScanOutcome {
        let Ok(secrets) = memo::open(self.keys.secret(), &event.memo) else {
            return ScanOutcome::NotOurs;
        };
        let note = Note::from_memo(&secrets, self.keys.public(), event.leaf_index, self.token);
        match note.commitment() {
            Ok(commitment) if commitment == event.commitment => ScanOutcome::Ours(Box::new(note)),
            _ => ScanOutcome::Mismatched,
        }
    }
}

/// Shared scanner for concurrent access. Memo trial decryption is pure,
/// so readers can fan a batch out across threads while the store keeps
/// its single writer.
#[derive(Clone, Debug)]
pub struct SharedScanner {
    inner: std::sync::Arc<NoteScanner>,
}

impl SharedScanner {
    pub fn new(scanner: NoteScanner) -> Self {
        Self {
            inner: std::sync::Arc::new(scanner),
        }
    }

    pub fn scan(&self, events: &[MemoEvent]) -> ScanResult {
        self.inner.scan(events)
    }

    pub fn inner(&self) -> &NoteScanner {
        &self.inner
    }
}

/// Running totals across scan batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScannerStats {
    pub total_scanned: u64,
    pub total_recovered: u64,
    pub total_mismatched: u64,
}

impl ScannerStats {
    pub fn record(&mut self, result: &ScanResult) {
        self.total_scanned += result.total_scanned as u64;
        self.total_recovered += result.notes.len() as u64;
        self.total_mismatched += result.mismatched as u64;
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn event_for(
        recipient: &KeyPair,
        amount: u64,
        leaf_index: u64,
        token: TokenAddress,
        rng: &mut StdRng,
    ) -> MemoEvent {
        let note = Note::create(amount, recipient.public(), token, rng).unwrap();
        let sealed = memo::seal(&recipient.public(), &note.memo_secrets(), rng).unwrap();
        MemoEvent {
            memo: sealed.to_vec(),
            commitment: note.commitment().unwrap(),
            leaf_index,
            block: leaf_index,
        }
    }

    #[test]
    fn scan_recovers_only_our_notes() {
        let mut rng = StdRng::seed_from_u64(21);
        let token = TokenAddress([9u8; 20]);
        let ours = KeyPair::generate(&mut rng).unwrap();
        let theirs = KeyPair::generate(&mut rng).unwrap();

        // 3 events for us, 7 for the other key, interleaved.
        let mut events = Vec::new();
        for index in 0..10u64 {
            let recipient = if index % 4 == 0 { &ours } else { &theirs };
            events.push(event_for(recipient, 100 + index, index, token, &mut rng));
        }

        let scanner = NoteScanner::new(ours, token);
        let result = scanner.scan(&events);
        assert_eq!(result.total_scanned, 10);
        assert_eq!(result.notes.len(), 3);
        assert_eq!(result.not_ours, 7);
        assert_eq!(result.mismatched, 0);
        for note in &result.notes {
            assert!(note.is_finalized());
            assert_eq!(note.token, token);
        }
    }

    #[test]
    fn commitment_mismatch_is_discarded() {
        let mut rng = StdRng::seed_from_u64(22);
        let token = TokenAddress::default();
        let ours = KeyPair::generate(&mut rng).unwrap();
        let mut event = event_for(&ours, 500, 0, token, &mut rng);
        // Event advertises a commitment the memo secrets cannot rebuild.
        event.commitment = Fr::from(1234u64);

        let scanner = NoteScanner::new(ours, token);
        let result = scanner.scan(std::slice::from_ref(&event));
        assert!(result.notes.is_empty());
        assert_eq!(result.mismatched, 1);
    }

    #[test]
    fn incremental_scan_skips_earlier_leaves() {
        let mut rng = StdRng::seed_from_u64(24);
        let token = TokenAddress::default();
        let ours = KeyPair::generate(&mut rng).unwrap();
        let events: Vec<MemoEvent> = (0..4u64)
            .map(|index| event_for(&ours, 10 + index, index, token, &mut rng))
            .collect();
        let scanner = NoteScanner::new(ours, token);
        let result = scanner.scan_incremental(&events, 2);
        assert_eq!(result.total_scanned, 2);
        assert_eq!(result.notes.len(), 2);
        assert_eq!(result.notes[0].leaf_index, Some(2));
    }

    #[test]
    fn stats_accumulate_across_batches() {
        let mut rng = StdRng::seed_from_u64(25);
        let token = TokenAddress::default();
        let ours = KeyPair::generate(&mut rng).unwrap();
        let event = event_for(&ours, 5, 0, token, &mut rng);
        let scanner = SharedScanner::new(NoteScanner::new(ours, token));

        let mut stats = ScannerStats::default();
        stats.record(&scanner.scan(std::slice::from_ref(&event)));
        stats.record(&scanner.scan(std::slice::from_ref(&event)));
        assert_eq!(stats.total_scanned, 2);
        assert_eq!(stats.total_recovered, 2);
        assert_eq!(stats.total_mismatched, 0);
    }

    #[test]
    fn garbage_memo_is_silently_not_ours() {
        let mut rng = StdRng::seed_from_u64(23);
        let ours = KeyPair::generate(&mut rng).unwrap();
        let event = MemoEvent {
            memo: vec![0u8; 37],
            commitment: Fr::from(1u64),
            leaf_index: 0,
            block: 0,
        };
        let scanner = NoteScanner::new(ours, TokenAddress::default());
        let result = scanner.scan(std::slice::from_ref(&event));
        assert!(result.notes.is_empty());
        assert_eq!(result.not_ours, 1);
    }
}
