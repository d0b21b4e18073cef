//! Poseidon over the BN254 scalar field with the canonical circom
//! parameter sets (x^5 S-box, Grain-LFSR constants). Parity with the
//! on-chain hash is the hard requirement here: any deviation silently
//! invalidates every proof the engine produces.
//!
//! Arities in use: 2 inputs (t = 3) for Merkle nodes, 3 inputs (t = 4)
//! for nullifiers, 5 inputs (t = 6) for note commitments.

use std::cell::RefCell;

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonHasher};

thread_local! {
    static HASHER_2: RefCell<Poseidon<Fr>> =
        RefCell::new(Poseidon::<Fr>::new_circom(2).expect("canonical 2-input parameters"));
    static HASHER_3: RefCell<Poseidon<Fr>> =
        RefCell::new(Poseidon::<Fr>::new_circom(3).expect("canonical 3-input parameters"));
    static HASHER_5: RefCell<Poseidon<Fr>> =
        RefCell::new(Poseidon::<Fr>::new_circom(5).expect("canonical 5-input parameters"));
}

/// Two-input Poseidon (t = 3): Merkle tree nodes and the zero table.
pub fn poseidon2(left: Fr, right: Fr) -> Fr {
    HASHER_2.with(|hasher| {
        hasher
            .borrow_mut()
            .hash(&[left, right])
            .expect("two inputs match the 2-input instance")
    })
}

/// Three-input Poseidon (t = 4): nullifiers.
pub fn poseidon3(a: Fr, b: Fr, c: Fr) -> Fr {
    HASHER_3.with(|hasher| {
        hasher
            .borrow_mut()
            .hash(&[a, b, c])
            .expect("three inputs match the 3-input instance")
    })
}

/// Five-input Poseidon (t = 6): note commitments.
pub fn poseidon5(inputs: [Fr; 5]) -> Fr {
    HASHER_5.with(|hasher| {
        hasher
            .borrow_mut()
            .hash(&inputs)
            .expect("five inputs match the 5-input instance")
    })
}
