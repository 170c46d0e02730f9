//! MiMC Tree Hash
//!
//! Two-to-one compression for the commitment tree. The construction:
//! - BN254 scalar field (Fr)
//! - x^7 permutation (standard MiMC)
//! - 91 rounds
//! - Sponge construction with domain separation

use ark_bn254::Fr;

use crate::field::FieldElement;

/// Number of MiMC rounds
const MIMC_ROUNDS: u32 = 91;

/// Domain separator for two-to-one node hashing
const NODE_DOMAIN: u64 = 2;

/// Filler for unpopulated leaves (big-endian)
///
/// keccak256 of a fixed label reduced mod p. Only the leaf constant is
/// shared with other pools; the roots above it depend on [`hash_pair`].
const ZERO_LEAF: [u8; 32] = [
    0x2f, 0xe5, 0x4c, 0x60, 0xd3, 0xac, 0xab, 0xf3,
    0x34, 0x3a, 0x35, 0xb6, 0xeb, 0xa1, 0x5d, 0xb4,
    0x82, 0x1b, 0x34, 0x0f, 0x76, 0xe7, 0x41, 0xe2,
    0x24, 0x96, 0x85, 0xed, 0x48, 0x99, 0xaf, 0x6c,
];

/// Compute round constant for round i
///
/// RC[i] = (i+1)^3 + (i+1)
fn round_constant(i: u32) -> Fr {
    let idx = Fr::from(u64::from(i) + 1);
    let idx_cubed = idx * idx * idx;
    idx_cubed + idx
}

/// MiMC round function: x -> (x + k + c)^7
fn mimc_round(x: Fr, k: Fr, c: Fr) -> Fr {
    let t = x + k + c;
    let t2 = t * t;
    let t4 = t2 * t2;
    let t6 = t4 * t2;
    t6 * t
}

/// MiMC permutation: encrypts x with key k
fn mimc_permute(x: Fr, k: Fr) -> Fr {
    let mut state = x;
    for i in 0..MIMC_ROUNDS {
        state = mimc_round(state, k, round_constant(i));
    }
    state + k
}

fn mimc_sponge_absorb(inputs: &[Fr]) -> Fr {
    let mut state = Fr::from(0u64);
    for input in inputs {
        state = mimc_permute(state + input, Fr::from(0u64));
    }
    state
}

/// Hash two children to get their parent
pub fn hash_pair(left: &FieldElement, right: &FieldElement) -> FieldElement {
    let parent = mimc_sponge_absorb(&[Fr::from(NODE_DOMAIN), left.to_fr(), right.to_fr()]);
    FieldElement::from_fr(parent)
}

/// The empty leaf as a field element
pub fn zero_leaf() -> FieldElement {
    FieldElement::from_canonical(ZERO_LEAF)
}

/// Empty subtree roots for levels `0..=height`
///
/// `zeros[0]` is the empty leaf, `zeros[i + 1] = hash_pair(zeros[i], zeros[i])`.
pub fn zero_roots(height: usize) -> Vec<FieldElement> {
    let mut zeros = Vec::with_capacity(height + 1);
    let mut current = zero_leaf();
    zeros.push(current);
    for _ in 0..height {
        current = hash_pair(&current, &current);
        zeros.push(current);
    }
    zeros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = FieldElement::from_u64(123);
        let b = FieldElement::from_u64(456);
        assert_eq!(hash_pair(&a, &b), hash_pair(&a, &b), "hash should be deterministic");
    }

    #[test]
    fn test_hash_order_matters() {
        let a = FieldElement::from_u64(1);
        let b = FieldElement::from_u64(2);
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a), "order should matter");
    }

    #[test]
    fn test_round_constant() {
        // RC[0] = 1^3 + 1 = 2
        assert_eq!(round_constant(0), Fr::from(2u64));
        // RC[1] = 2^3 + 2 = 10
        assert_eq!(round_constant(1), Fr::from(10u64));
        // RC[2] = 3^3 + 3 = 30
        assert_eq!(round_constant(2), Fr::from(30u64));
    }

    #[test]
    fn test_zero_leaf_is_canonical() {
        assert_eq!(
            zero_leaf().to_hex(),
            "0x2fe54c60d3acabf3343a35b6eba15db4821b340f76e741e2249685ed4899af6c"
        );
        assert!(FieldElement::from_be_bytes(ZERO_LEAF).is_ok());
    }

    #[test]
    fn test_zero_roots_chain() {
        let zeros = zero_roots(3);
        assert_eq!(zeros.len(), 4);
        for level in 0..3 {
            assert_eq!(zeros[level + 1], hash_pair(&zeros[level], &zeros[level]));
        }
    }
}
