//! Witness assembly for the two spend statements.
//!
//! The assembler validates every algebraic precondition before the
//! external prover runs: failing here is cheap, failing inside the
//! prover is opaque. The one subtlety worth spelling out: blinding
//! conservation is an integer identity checked by the circuit in the
//! BN254 scalar field, so the recipient blinding is drawn uniformly
//! from `[0, blinding_in)` and the change blinding is the integer
//! difference. Reducing modulo the curve subgroup order here would
//! produce witnesses the circuit rejects.

use ark_bn254::Fr;
use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::RngCore;

use pool_merkle::{MerklePath, PoolTree, TREE_DEPTH};
use zktoken_crypto::babyjubjub::Point;
use zktoken_crypto::field::{fr_from_biguint, fr_to_biguint, random_field_248};
use zktoken_crypto::keys::KeyPair;
use zktoken_crypto::poseidon::poseidon3;

use crate::error::WalletError;
use crate::notes::Note;

/// One output slot of a spend statement.
#[derive(Clone, Debug)]
pub struct OutputAssignment {
    pub amount: u64,
    pub blinding: Fr,
    pub secret: Fr,
    pub nullifier_preimage: Fr,
    pub owner_pub: Point,
    pub commitment: Fr,
}

impl OutputAssignment {
    fn from_note(note: &Note) -> Result<Self, WalletError> {
        Ok(Self {
            amount: note.amount,
            blinding: note.blinding,
            secret: note.secret,
            nullifier_preimage: note.nullifier_preimage,
            owner_pub: note.owner_pub,
            commitment: note.commitment()?,
        })
    }
}

/// Witness for the two-output transfer statement.
///
/// Public signals, in verifier order:
/// `[merkle_root, nullifier_hash, new_commitment_1, new_commitment_2]`.
#[derive(Clone, Debug)]
pub struct TransferWitness {
    pub merkle_root: Fr,
    pub nullifier_hash: Fr,
    pub amount_in: u64,
    pub blinding_in: Fr,
    pub secret: Fr,
    pub nullifier_preimage: Fr,
    pub owner_priv: Fr,
    pub leaf_index: u64,
    pub merkle_path: Vec<Fr>,
    pub path_indices: Vec<u8>,
    pub outputs: [OutputAssignment; 2],
}

impl TransferWitness {
    pub fn public_signals(&self) -> [Fr; 4] {
        [
            self.merkle_root,
            self.nullifier_hash,
            self.outputs[0].commitment,
            self.outputs[1].commitment,
        ]
    }

    /// Flattened field assignment in the order the compiled circuit
    /// consumes: the four public signals, then the input-note privates,
    /// then both output slots.
    pub fn assignment(&self) -> Vec<Fr> {
        let mut assignment = Vec::with_capacity(4 + 6 + 2 * TREE_DEPTH + 12);
        assignment.extend_from_slice(&self.public_signals());
        assignment.push(Fr::from(self.amount_in));
        assignment.push(self.blinding_in);
        assignment.push(self.secret);
        assignment.push(self.nullifier_preimage);
        assignment.push(self.owner_priv);
        assignment.push(Fr::from(self.leaf_index));
        assignment.extend_from_slice(&self.merkle_path);
        assignment.extend(self.path_indices.iter().map(|bit| Fr::from(u64::from(*bit))));
        for output in &self.outputs {
            assignment.push(Fr::from(output.amount));
            assignment.push(output.blinding);
            assignment.push(output.secret);
            assignment.push(output.nullifier_preimage);
            assignment.push(output.owner_pub.x);
            assignment.push(output.owner_pub.y);
        }
        assignment
    }
}

/// Witness for the withdraw statement, where the withdrawn amount is a
/// public signal and only the change output stays shielded.
///
/// Public signals, in verifier order:
/// `[merkle_root, nullifier_hash, amount, change_commitment]`.
#[derive(Clone, Debug)]
pub struct WithdrawWitness {
    pub merkle_root: Fr,
    pub nullifier_hash: Fr,
    pub amount: u64,
    /// Zero on a full withdrawal.
    pub change_commitment: Fr,
    pub amount_in: u64,
    pub blinding_in: Fr,
    pub secret: Fr,
    pub nullifier_preimage: Fr,
    pub owner_priv: Fr,
    pub leaf_index: u64,
    pub merkle_path: Vec<Fr>,
    pub path_indices: Vec<u8>,
    /// The change slot is always assigned; the withdrawn portion
    /// carries no blinding because its amount is public, so the full
    /// input blinding stays with the change.
    pub change: OutputAssignment,
}

impl WithdrawWitness {
    pub fn public_signals(&self) -> [Fr; 4] {
        [
            self.merkle_root,
            self.nullifier_hash,
            Fr::from(self.amount),
            self.change_commitment,
        ]
    }

    pub fn assignment(&self) -> Vec<Fr> {
        let mut assignment = Vec::with_capacity(4 + 6 + 2 * TREE_DEPTH + 6);
        assignment.extend_from_slice(&self.public_signals());
        assignment.push(Fr::from(self.amount_in));
        assignment.push(self.blinding_in);
        assignment.push(self.secret);
        assignment.push(self.nullifier_preimage);
        assignment.push(self.owner_priv);
        assignment.push(Fr::from(self.leaf_index));
        assignment.extend_from_slice(&self.merkle_path);
        assignment.extend(self.path_indices.iter().map(|bit| Fr::from(u64::from(*bit))));
        assignment.push(Fr::from(self.change.amount));
        assignment.push(self.change.blinding);
        assignment.push(self.change.secret);
        assignment.push(self.change.nullifier_preimage);
        assignment.push(self.change.owner_pub.x);
        assignment.push(self.change.owner_pub.y);
        assignment
    }
}

#[derive(Clone, Debug)]
pub struct TransferBuild {
    pub witness: TransferWitness,
    pub recipient_note: Note,
    pub change_note: Note,
}

#[derive(Clone, Debug)]
pub struct WithdrawBuild {
    pub witness: WithdrawWitness,
    /// Present only when the withdrawal is partial.
    pub change_note: Option<Note>,
}

/// Assemble a transfer witness splitting `input` into a recipient
/// output and a change output back to the owner.
pub fn build_transfer<R: RngCore + ?Sized>(
    input: &Note,
    path: &MerklePath,
    owner: &KeyPair,
    recipient_pub: Point,
    recipient_amount: u64,
    rng: &mut R,
) -> Result<TransferBuild, WalletError> {
    let leaf_index = check_input(input, path, owner)?;
    if recipient_amount == 0 {
        return Err(WalletError::AmountOutOfRange(recipient_amount));
    }
    let change_amount =
        input
            .amount
            .checked_sub(recipient_amount)
            .ok_or(WalletError::InsufficientFunds {
                needed: recipient_amount,
                available: input.amount,
            })?;
    check_output_key(&recipient_pub)?;

    // Integer split of the blinding; the difference stays non-negative
    // because the recipient share is drawn below the input blinding.
    let blinding_in = fr_to_biguint(&input.blinding);
    let recipient_blinding = if blinding_in.is_zero() {
        BigUint::zero()
    } else {
        rng.gen_biguint_below(&blinding_in)
    };
    let change_blinding = &blinding_in - &recipient_blinding;

    let recipient_note = Note {
        amount: recipient_amount,
        blinding: fr_from_biguint(&recipient_blinding),
        secret: random_field_248(rng),
        nullifier_preimage: random_field_248(rng),
        owner_pub: recipient_pub,
        token: input.token,
        leaf_index: None,
        nullifier: None,
        spent: false,
    };
    let change_note = Note {
        amount: change_amount,
        blinding: fr_from_biguint(&change_blinding),
        secret: random_field_248(rng),
        nullifier_preimage: random_field_248(rng),
        owner_pub: owner.public(),
        token: input.token,
        leaf_index: None,
        nullifier: None,
        spent: false,
    };

    // Conservation is structural at this point; check it anyway so a
    // future refactoring bug fails loudly here instead of in the prover.
    let output_sum = recipient_note
        .amount
        .checked_add(change_note.amount)
        .ok_or(WalletError::ConservationViolation("output amounts overflow"))?;
    if output_sum != input.amount {
        return Err(WalletError::ConservationViolation("amounts do not balance"));
    }
    if &recipient_blinding + &change_blinding != blinding_in {
        return Err(WalletError::ConservationViolation("blindings do not balance"));
    }

    let witness = TransferWitness {
        merkle_root: path.root,
        nullifier_hash: poseidon3(
            input.nullifier_preimage,
            input.secret,
            Fr::from(leaf_index),
        ),
        amount_in: input.amount,
        blinding_in: input.blinding,
        secret: input.secret,
        nullifier_preimage: input.nullifier_preimage,
        owner_priv: owner.secret().as_field(),
        leaf_index,
        merkle_path: path.elements.clone(),
        path_indices: path.indices.clone(),
        outputs: [
            OutputAssignment::from_note(&recipient_note)?,
            OutputAssignment::from_note(&change_note)?,
        ],
    };

    Ok(TransferBuild {
        witness,
        recipient_note,
        change_note,
    })
}

/// Assemble a withdraw witness revealing `amount` publicly. Partial
/// withdrawals keep the remainder shielded in a change note carrying
/// the entire input blinding.
pub fn build_withdraw<R: RngCore + ?Sized>(
    input: &Note,
    path: &MerklePath,
    owner: &KeyPair,
    amount: u64,
    rng: &mut R,
) -> Result<WithdrawBuild, WalletError> {
    let leaf_index = check_input(input, path, owner)?;
    if amount == 0 {
        return Err(WalletError::AmountOutOfRange(amount));
    }
    let change_amount = input
        .amount
        .checked_sub(amount)
        .ok_or(WalletError::InsufficientFunds {
            needed: amount,
            available: input.amount,
        })?;

    let change_note = Note {
        amount: change_amount,
        blinding: input.blinding,
        secret: random_field_248(rng),
        nullifier_preimage: random_field_248(rng),
        owner_pub: owner.public(),
        token: input.token,
        leaf_index: None,
        nullifier: None,
        spent: false,
    };
    let change = OutputAssignment::from_note(&change_note)?;

    if amount
        .checked_add(change_amount)
        .map_or(true, |sum| sum != input.amount)
    {
        return Err(WalletError::ConservationViolation("amounts do not balance"));
    }
    if change.blinding != input.blinding {
        return Err(WalletError::ConservationViolation("blindings do not balance"));
    }

    let change_commitment = if change_amount == 0 {
        Fr::from(0u64)
    } else {
        change.commitment
    };

    let witness = WithdrawWitness {
        merkle_root: path.root,
        nullifier_hash: poseidon3(
            input.nullifier_preimage,
            input.secret,
            Fr::from(leaf_index),
        ),
        amount,
        change_commitment,
        amount_in: input.amount,
        blinding_in: input.blinding,
        secret: input.secret,
        nullifier_preimage: input.nullifier_preimage,
        owner_priv: owner.secret().as_field(),
        leaf_index,
        merkle_path: path.elements.clone(),
        path_indices: path.indices.clone(),
        change,
    };

    Ok(WithdrawBuild {
        witness,
        change_note: (change_amount > 0).then_some(change_note),
    })
}

/// Shared input-side preconditions: ownership, finalization, spent
/// flag, nullifier consistency, and the Merkle opening.
fn check_input(input: &Note, path: &MerklePath, owner: &KeyPair) -> Result<u64, WalletError> {
    let leaf_index = input
        .leaf_index
        .ok_or(WalletError::InvalidState("input note is not finalized"))?;
    if input.spent {
        return Err(WalletError::InvalidState("input note is already spent"));
    }
    if owner.public() != input.owner_pub {
        return Err(WalletError::InvalidArgument(
            "spending key does not own the input note",
        ));
    }
    let expected_nullifier = poseidon3(
        input.nullifier_preimage,
        input.secret,
        Fr::from(leaf_index),
    );
    if input.nullifier != Some(expected_nullifier) {
        return Err(WalletError::InvalidState("input nullifier desynchronized"));
    }
    let commitment = input.commitment()?;
    if path.leaf_index != leaf_index || !PoolTree::verify_against(commitment, path, path.root) {
        return Err(WalletError::MerklePathInvalid);
    }
    Ok(leaf_index)
}

/// Only x binds the owner inside the commitment hash, so refuse the
/// degenerate keys where that binding would be ambiguous: off-curve,
/// small-order, identity, or `y = 0` points.
fn check_output_key(key: &Point) -> Result<(), WalletError> {
    key.validate()?;
    if key.is_identity() {
        return Err(WalletError::InvalidArgument(
            "output key must not be the identity",
        ));
    }
    if key.y == Fr::from(0u64) {
        return Err(WalletError::InvalidArgument(
            "output key y-coordinate must be non-zero",
        ));
    }
    Ok(())
}
