//! Note Hash
//!
//! Poseidon sponge over the BN254 scalar field, used for both the note
//! commitment and the nullifier hash.
//!
//! ```text
//! H(bytes) = Poseidon(len(bytes), limb_0, limb_1, ...)
//! limb_i   = bytes[31*i .. 31*(i+1)] as little-endian integer
//! ```
//!
//! The byte length is absorbed first, so a 31-byte nullifier and the same
//! nullifier padded to 32 bytes hash differently.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge, find_poseidon_ark_and_mds},
};
use ark_ff::PrimeField;

use crate::field::{FieldElement, SECRET_BYTES};

/// Poseidon hasher for note preimages
#[derive(Clone)]
pub struct NoteHasher {
    config: PoseidonConfig<Fr>,
}

impl NoteHasher {
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    /// Hash an arbitrary byte string
    pub fn hash_bytes(&self, data: &[u8]) -> FieldElement {
        let mut sponge = PoseidonSponge::new(&self.config);

        sponge.absorb(&Fr::from(data.len() as u64));
        for limb in data.chunks(SECRET_BYTES) {
            sponge.absorb(&Fr::from_le_bytes_mod_order(limb));
        }

        let result: Vec<Fr> = sponge.squeeze_field_elements(1);
        FieldElement::from_fr(result[0])
    }
}

impl Default for NoteHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Poseidon configuration for Shade
///
/// Field: BN254 Fr (254 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits: u64 = 254;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let hasher = NoteHasher::new();
        let h1 = hasher.hash_bytes(b"shade");
        let h2 = hasher.hash_bytes(b"shade");
        assert_eq!(h1, h2, "same bytes should hash identically");
    }

    #[test]
    fn test_length_is_bound() {
        let hasher = NoteHasher::new();
        let short = [7u8; 31];
        let mut padded = [0u8; 32];
        padded[..31].copy_from_slice(&short);

        assert_ne!(
            hasher.hash_bytes(&short),
            hasher.hash_bytes(&padded),
            "zero padding must change the hash"
        );
    }

    #[test]
    fn test_limb_order_matters() {
        let hasher = NoteHasher::new();
        let mut ab = [0u8; 62];
        ab[0] = 1;
        ab[31] = 2;
        let mut ba = [0u8; 62];
        ba[0] = 2;
        ba[31] = 1;
        assert_ne!(hasher.hash_bytes(&ab), hasher.hash_bytes(&ba));
    }
}
