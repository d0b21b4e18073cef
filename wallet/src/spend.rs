//! The spend state machine.
//!
//! One [`SpendJob`] drives one spend attempt end to end:
//!
//! ```text
//! idle -> building_witness -> proving -> encoding_proof -> submitted
//!                                                            |
//!                                            confirmed <-----+-----> rejected
//! ```
//!
//! Everything up to submission is local and cancellable; the sampled
//! output secrets simply drop. Once submitted, the job owns a pending
//! reservation on the input note until the chain resolves it: a
//! confirmation assigns the outputs' leaf indices and marks the input
//! spent, a rejection releases the input back to unspent.

use ark_bn254::Fr;
use rand::RngCore;

use pool_merkle::MerklePath;
use zktoken_crypto::babyjubjub::Point;
use zktoken_crypto::keys::KeyPair;
use zktoken_crypto::memo;

use crate::error::WalletError;
use crate::notes::Note;
use crate::proof::{Groth16Proof, SnarkProver, PROOF_BYTES};
use crate::store::NoteStore;
use crate::witness::{build_transfer, build_withdraw, TransferWitness, WithdrawWitness};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendPhase {
    /// No spend in flight.
    Idle,
    BuildingWitness,
    Proving,
    EncodingProof,
    Submitted,
    Confirmed,
    Rejected,
}

#[derive(Clone, Debug)]
enum SpendWitness {
    Transfer(TransferWitness),
    Withdraw(WithdrawWitness),
}

#[derive(Debug)]
pub struct SpendJob {
    phase: SpendPhase,
    input_nullifier: Fr,
    witness: SpendWitness,
    output_notes: Vec<Note>,
    output_memos: Vec<Vec<u8>>,
    proof: Option<Groth16Proof>,
    encoded: Option<[u8; PROOF_BYTES]>,
}

impl SpendJob {
    /// Build a transfer spend: witness assembly plus sealed memos for
    /// both outputs (recipient's to their key, change to our own).
    pub fn transfer<R: RngCore + ?Sized>(
        input: &Note,
        path: &MerklePath,
        owner: &KeyPair,
        recipient_pub: Point,
        amount: u64,
        rng: &mut R,
    ) -> Result<Self, WalletError> {
        let build = build_transfer(input, path, owner, recipient_pub, amount, rng)?;
        let recipient_memo = memo::seal(&recipient_pub, &build.recipient_note.memo_secrets(), rng)?;
        let change_memo = memo::seal(&owner.public(), &build.change_note.memo_secrets(), rng)?;
        Ok(Self {
            phase: SpendPhase::BuildingWitness,
            input_nullifier: build.witness.nullifier_hash,
            witness: SpendWitness::Transfer(build.witness),
            output_notes: vec![build.recipient_note, build.change_note],
            output_memos: vec![recipient_memo.to_vec(), change_memo.to_vec()],
            proof: None,
            encoded: None,
        })
    }

    /// Build a withdraw spend. Only a partial withdrawal produces an
    /// output note (the shielded change) and its memo.
    pub fn withdraw<R: RngCore + ?Sized>(
        input: &Note,
        path: &MerklePath,
        owner: &KeyPair,
        amount: u64,
        rng: &mut R,
    ) -> Result<Self, WalletError> {
        let build = build_withdraw(input, path, owner, amount, rng)?;
        let mut output_notes = Vec::new();
        let mut output_memos = Vec::new();
        if let Some(change_note) = build.change_note {
            let change_memo = memo::seal(&owner.public(), &change_note.memo_secrets(), rng)?;
            output_notes.push(change_note);
            output_memos.push(change_memo.to_vec());
        }
        Ok(Self {
            phase: SpendPhase::BuildingWitness,
            input_nullifier: build.witness.nullifier_hash,
            witness: SpendWitness::Withdraw(build.witness),
            output_notes,
            output_memos,
            proof: None,
            encoded: None,
        })
    }

    pub fn phase(&self) -> SpendPhase {
        self.phase
    }

    pub fn input_nullifier(&self) -> Fr {
        self.input_nullifier
    }

    /// Public signals in verifier order for this spend's statement.
    pub fn public_signals(&self) -> [Fr; 4] {
        match &self.witness {
            SpendWitness::Transfer(witness) => witness.public_signals(),
            SpendWitness::Withdraw(witness) => witness.public_signals(),
        }
    }

    /// Output notes in statement order (unfinalized until confirm).
    pub fn output_notes(&self) -> &[Note] {
        &self.output_notes
    }

    /// Sealed memos, one per output note.
    pub fn output_memos(&self) -> &[Vec<u8>] {
        &self.output_memos
    }

    /// Run the external prover over the assembled witness.
    pub fn prove<P: SnarkProver + ?Sized>(&mut self, prover: &P) -> Result<(), WalletError> {
        if self.phase != SpendPhase::BuildingWitness {
            return Err(WalletError::InvalidState("spend is not ready to prove"));
        }
        let proof = match &self.witness {
            SpendWitness::Transfer(witness) => prover.prove_transfer(witness)?,
            SpendWitness::Withdraw(witness) => prover.prove_withdraw(witness)?,
        };
        self.proof = Some(proof);
        self.phase = SpendPhase::Proving;
        Ok(())
    }

    /// Encode the proof into verifier wire format.
    pub fn encode_proof(&mut self) -> Result<[u8; PROOF_BYTES], WalletError> {
        if self.phase != SpendPhase::Proving {
            return Err(WalletError::InvalidState("no proof to encode"));
        }
        let proof = self
            .proof
            .as_ref()
            .ok_or(WalletError::InvalidState("no proof to encode"))?;
        let encoded = proof.encode()?;
        self.encoded = Some(encoded);
        self.phase = SpendPhase::EncodingProof;
        Ok(encoded)
    }

    pub fn encoded_proof(&self) -> Option<&[u8; PROOF_BYTES]> {
        self.encoded.as_ref()
    }

    /// Record the submission: the input note is reserved until the
    /// chain resolves this spend.
    pub fn submit(&mut self, store: &NoteStore) -> Result<(), WalletError> {
        if self.phase != SpendPhase::EncodingProof {
            return Err(WalletError::InvalidState(
                "proof must be encoded before submission",
            ));
        }
        store.mark_pending(&self.input_nullifier, true)?;
        self.phase = SpendPhase::Submitted;
        Ok(())
    }

    /// Abandon a spend that has not been submitted. Dropping the job
    /// discards the sampled output secrets; nothing on-chain changed.
    /// A submitted job is handed back unchanged: it owns a pending
    /// reservation that only a confirmation or rejection may release.
    pub fn cancel(self) -> Result<(), SpendJob> {
        match self.phase {
            SpendPhase::Submitted => Err(self),
            _ => Ok(()),
        }
    }

    /// Resolve a submitted spend from the confirmation event: each
    /// output commitment gets its assigned leaf index, and the input
    /// note is marked spent now that its nullifier is on-chain.
    /// Returns the finalized output notes.
    pub fn confirm(
        &mut self,
        store: &NoteStore,
        assigned: &[(Fr, u64)],
    ) -> Result<Vec<Note>, WalletError> {
        if self.phase != SpendPhase::Submitted {
            return Err(WalletError::InvalidState("only submitted spends confirm"));
        }
        let mut finalized = Vec::with_capacity(self.output_notes.len());
        for note in &self.output_notes {
            let commitment = note.commitment()?;
            let Some((_, leaf_index)) = assigned
                .iter()
                .find(|(assigned_commitment, _)| *assigned_commitment == commitment)
            else {
                return Err(WalletError::InvalidState(
                    "confirmation is missing an output commitment",
                ));
            };
            finalized.push(note.finalize(*leaf_index));
        }
        store.mark_spent(&self.input_nullifier)?;
        self.phase = SpendPhase::Confirmed;
        Ok(finalized)
    }

    /// Resolve a chain rejection (unknown root, spent nullifier, ...):
    /// the input note returns to the unspent set.
    pub fn reject(&mut self, store: &NoteStore) -> Result<(), WalletError> {
        if self.phase != SpendPhase::Submitted {
            return Err(WalletError::InvalidState(
                "only submitted spends can be rejected",
            ));
        }
        store.mark_pending(&self.input_nullifier, false)?;
        self.phase = SpendPhase::Rejected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pool_merkle::PoolTree;
    use rand::{rngs::StdRng, SeedableRng};

    use crate::notes::TokenAddress;
    use crate::proof::{G1Point, G2Point};

    use super::*;

    struct FixtureProver;

    impl SnarkProver for FixtureProver {
        fn prove_transfer(&self, _witness: &TransferWitness) -> Result<Groth16Proof, WalletError> {
            Ok(fixture_proof())
        }

        fn prove_withdraw(&self, _witness: &WithdrawWitness) -> Result<Groth16Proof, WalletError> {
            Ok(fixture_proof())
        }
    }

    fn fixture_proof() -> Groth16Proof {
        let word = |tag: u8| {
            let mut out = [0u8; 32];
            out[31] = tag;
            out
        };
        Groth16Proof {
            a: G1Point {
                x: word(1),
                y: word(2),
            },
            b: G2Point {
                x: [word(3), word(4)],
                y: [word(5), word(6)],
            },
            c: G1Point {
                x: word(7),
                y: word(8),
            },
        }
    }

    struct Fixture {
        store: NoteStore,
        owner: KeyPair,
        recipient: KeyPair,
        note: Note,
        path: MerklePath,
    }

    fn fixture(seed: u64) -> Fixture {
        let mut rng = StdRng::seed_from_u64(seed);
        let owner = KeyPair::generate(&mut rng).unwrap();
        let recipient = KeyPair::generate(&mut rng).unwrap();
        let note =
            Note::create(1_000, owner.public(), TokenAddress::default(), &mut rng).unwrap();
        let mut tree = PoolTree::new();
        let (index, _) = tree.insert(note.commitment().unwrap()).unwrap();
        let note = note.finalize(index);
        let path = tree.path(index).unwrap();
        let store = NoteStore::new();
        store.save(note.clone()).unwrap();
        Fixture {
            store,
            owner,
            recipient,
            note,
            path,
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let fx = fixture(1);
        let mut rng = StdRng::seed_from_u64(50);
        let mut job = SpendJob::transfer(
            &fx.note,
            &fx.path,
            &fx.owner,
            fx.recipient.public(),
            400,
            &mut rng,
        )
        .unwrap();
        assert_eq!(job.phase(), SpendPhase::BuildingWitness);

        // Cannot encode before proving.
        assert!(job.encode_proof().is_err());

        job.prove(&FixtureProver).unwrap();
        assert_eq!(job.phase(), SpendPhase::Proving);

        let encoded = job.encode_proof().unwrap();
        assert_eq!(encoded.len(), PROOF_BYTES);
        assert_eq!(job.phase(), SpendPhase::EncodingProof);

        job.submit(&fx.store).unwrap();
        assert_eq!(job.phase(), SpendPhase::Submitted);
        // Input is reserved while the spend is in flight.
        assert!(fx.store.unspent(None).unwrap().is_empty());
    }

    #[test]
    fn confirm_assigns_indices_and_spends_input() {
        let fx = fixture(2);
        let mut rng = StdRng::seed_from_u64(51);
        let mut job = SpendJob::transfer(
            &fx.note,
            &fx.path,
            &fx.owner,
            fx.recipient.public(),
            400,
            &mut rng,
        )
        .unwrap();
        job.prove(&FixtureProver).unwrap();
        job.encode_proof().unwrap();
        job.submit(&fx.store).unwrap();

        let assigned: Vec<(ark_bn254::Fr, u64)> = job
            .output_notes()
            .iter()
            .enumerate()
            .map(|(offset, note)| (note.commitment().unwrap(), 1 + offset as u64))
            .collect();
        let finalized = job.confirm(&fx.store, &assigned).unwrap();
        assert_eq!(job.phase(), SpendPhase::Confirmed);
        assert_eq!(finalized.len(), 2);
        assert_eq!(finalized[0].leaf_index, Some(1));
        assert_eq!(finalized[1].leaf_index, Some(2));
        // The input stays in the store as an audit record, marked spent.
        assert!(fx.store.unspent(None).unwrap().is_empty());
        let all = fx.store.all(None).unwrap();
        assert!(all.iter().any(|note| note.spent));
    }

    #[test]
    fn reject_restores_input_to_unspent() {
        let fx = fixture(3);
        let mut rng = StdRng::seed_from_u64(52);
        let mut job = SpendJob::transfer(
            &fx.note,
            &fx.path,
            &fx.owner,
            fx.recipient.public(),
            400,
            &mut rng,
        )
        .unwrap();
        job.prove(&FixtureProver).unwrap();
        job.encode_proof().unwrap();
        job.submit(&fx.store).unwrap();
        assert!(fx.store.unspent(None).unwrap().is_empty());

        job.reject(&fx.store).unwrap();
        assert_eq!(job.phase(), SpendPhase::Rejected);
        assert_eq!(fx.store.unspent(None).unwrap().len(), 1);
    }

    #[test]
    fn cancellation_is_local_before_submission() {
        let fx = fixture(4);
        let mut rng = StdRng::seed_from_u64(53);
        let job = SpendJob::transfer(
            &fx.note,
            &fx.path,
            &fx.owner,
            fx.recipient.public(),
            400,
            &mut rng,
        )
        .unwrap();
        job.cancel().unwrap();
        // The input note was never reserved.
        assert_eq!(fx.store.unspent(None).unwrap().len(), 1);
    }

    #[test]
    fn submitted_jobs_cannot_cancel() {
        let fx = fixture(5);
        let mut rng = StdRng::seed_from_u64(54);
        let mut job = SpendJob::transfer(
            &fx.note,
            &fx.path,
            &fx.owner,
            fx.recipient.public(),
            400,
            &mut rng,
        )
        .unwrap();
        job.prove(&FixtureProver).unwrap();
        job.encode_proof().unwrap();
        job.submit(&fx.store).unwrap();
        assert!(job.cancel().is_err());
    }

    #[test]
    fn withdraw_job_full_has_no_outputs() {
        let fx = fixture(6);
        let mut rng = StdRng::seed_from_u64(55);
        let job =
            SpendJob::withdraw(&fx.note, &fx.path, &fx.owner, 1_000, &mut rng).unwrap();
        assert!(job.output_notes().is_empty());
        assert!(job.output_memos().is_empty());
    }
}
