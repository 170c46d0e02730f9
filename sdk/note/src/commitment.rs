//! Note Commitments
//!
//! Derives the public values of a deposit from its two secret scalars.
//!
//! ```text
//! preimage      = nullifier (31 B, LE) || secret (31 B, LE)
//! commitment    = H(preimage)
//! nullifierHash = H(nullifier (31 B, LE))
//! ```
//!
//! The commitment is published at deposit time. The nullifier hash is only
//! revealed at withdrawal, where the ledger uses it to refuse a second spend.

use rand::Rng;
use std::fmt;

use crate::field::{FieldElement, SECRET_BYTES, SecretScalar};
use crate::hash::NoteHasher;

/// Width of a note preimage in bytes
pub const PREIMAGE_BYTES: usize = 2 * SECRET_BYTES;

/// A deposit: secret material plus everything derived from it
#[derive(Clone, PartialEq, Eq)]
pub struct Deposit {
    nullifier: SecretScalar,
    secret: SecretScalar,
    preimage: [u8; PREIMAGE_BYTES],
    commitment: FieldElement,
    nullifier_hash: FieldElement,
}

impl Deposit {
    pub fn nullifier(&self) -> &SecretScalar {
        &self.nullifier
    }

    pub fn secret(&self) -> &SecretScalar {
        &self.secret
    }

    pub fn preimage(&self) -> &[u8; PREIMAGE_BYTES] {
        &self.preimage
    }

    /// Published on deposit
    pub fn commitment(&self) -> FieldElement {
        self.commitment
    }

    /// Revealed on withdrawal
    pub fn nullifier_hash(&self) -> FieldElement {
        self.nullifier_hash
    }
}

impl fmt::Debug for Deposit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deposit")
            .field("commitment", &self.commitment)
            .field("nullifier_hash", &self.nullifier_hash)
            .finish_non_exhaustive()
    }
}

/// Commitment scheme using the Poseidon note hash
#[derive(Clone, Default)]
pub struct CommitmentScheme {
    hasher: NoteHasher,
}

impl CommitmentScheme {
    pub fn new() -> Self {
        Self {
            hasher: NoteHasher::new(),
        }
    }

    /// Derive a deposit from its secret material
    pub fn derive(&self, nullifier: SecretScalar, secret: SecretScalar) -> Deposit {
        let mut preimage = [0u8; PREIMAGE_BYTES];
        preimage[..SECRET_BYTES].copy_from_slice(&nullifier.to_le_bytes());
        preimage[SECRET_BYTES..].copy_from_slice(&secret.to_le_bytes());

        let commitment = self.hasher.hash_bytes(&preimage);
        let nullifier_hash = self.nullifier_hash(&nullifier);

        Deposit {
            nullifier,
            secret,
            preimage,
            commitment,
            nullifier_hash,
        }
    }

    /// Re-derive a deposit from a parsed note preimage
    pub fn from_preimage(&self, preimage: &[u8; PREIMAGE_BYTES]) -> Deposit {
        let (nullifier_bytes, secret_bytes) = preimage.split_at(SECRET_BYTES);
        let mut nullifier = [0u8; SECRET_BYTES];
        let mut secret = [0u8; SECRET_BYTES];
        nullifier.copy_from_slice(nullifier_bytes);
        secret.copy_from_slice(secret_bytes);

        self.derive(
            SecretScalar::from_le_bytes(nullifier),
            SecretScalar::from_le_bytes(secret),
        )
    }

    /// Sample fresh secret material and derive the deposit
    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Deposit {
        let nullifier = SecretScalar::random(rng);
        let secret = SecretScalar::random(rng);
        self.derive(nullifier, secret)
    }

    /// Hash of the nullifier alone, over exactly 31 bytes
    pub fn nullifier_hash(&self, nullifier: &SecretScalar) -> FieldElement {
        self.hasher.hash_bytes(&nullifier.to_le_bytes())
    }

    /// Commitment of an already assembled preimage
    pub fn commitment(&self, preimage: &[u8; PREIMAGE_BYTES]) -> FieldElement {
        self.hasher.hash_bytes(preimage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::NoteHasher;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_derive_deterministic() {
        let scheme = CommitmentScheme::new();
        let d1 = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));
        let d2 = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));

        assert_eq!(d1.commitment(), d2.commitment(), "same inputs should produce same commitment");
        assert_eq!(d1.nullifier_hash(), d2.nullifier_hash());
    }

    #[test]
    fn test_preimage_layout() {
        let scheme = CommitmentScheme::new();
        let deposit = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));
        let preimage = deposit.preimage();

        assert_eq!(preimage.len(), 62);
        assert_eq!(preimage[0], 7, "nullifier comes first, little-endian");
        assert!(preimage[1..31].iter().all(|b| *b == 0));
        assert_eq!(preimage[31], 42, "secret starts at byte 31");
        assert!(preimage[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_commitment_hiding() {
        let scheme = CommitmentScheme::new();
        let c1 = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(1));
        let c2 = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(2));

        assert_ne!(
            c1.commitment(),
            c2.commitment(),
            "different secrets should produce different commitments"
        );
        assert_eq!(
            c1.nullifier_hash(),
            c2.nullifier_hash(),
            "nullifier hash depends on the nullifier only"
        );
    }

    #[test]
    fn test_nullifier_hash_width() {
        let scheme = CommitmentScheme::new();
        let hasher = NoteHasher::new();
        let nullifier = SecretScalar::from_u64(7);

        let mut padded = [0u8; 32];
        padded[..31].copy_from_slice(&nullifier.to_le_bytes());

        let expected = hasher.hash_bytes(&nullifier.to_le_bytes());
        assert_eq!(scheme.nullifier_hash(&nullifier), expected);
        assert_ne!(
            scheme.nullifier_hash(&nullifier),
            hasher.hash_bytes(&padded),
            "hashing a 32-byte nullifier is a different function"
        );
        assert_ne!(
            scheme.nullifier_hash(&nullifier),
            hasher.hash_bytes(&7u64.to_le_bytes()),
            "an unpadded nullifier must not match either"
        );
    }

    #[test]
    fn test_from_preimage_roundtrip() {
        let scheme = CommitmentScheme::new();
        let mut rng = StdRng::seed_from_u64(1);
        let deposit = scheme.random(&mut rng);

        let restored = scheme.from_preimage(deposit.preimage());
        assert_eq!(restored, deposit);
        assert_eq!(scheme.commitment(deposit.preimage()), deposit.commitment());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let scheme = CommitmentScheme::new();
        let deposit = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));
        let shown = format!("{deposit:?}");
        assert!(shown.contains("commitment"));
        assert!(!shown.contains("preimage"));
        assert!(!shown.contains("secret"));
    }
}
