//! Prover Integration
//!
//! Interface to the proving subsystem for withdrawal proofs.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Withdrawal Proof                         │
//! │                                                           │
//! │  Public:  root, nullifierHash, recipient, relayer,        │
//! │           fee, refund                                     │
//! │  Private: nullifier, secret, pathElements, pathIndices    │
//! │                                                           │
//! │  Statement:                                               │
//! │   • H(nullifier || secret) is a leaf under `root`         │
//! │   • H(nullifier) == nullifierHash                         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The real prover is an external collaborator. [`MockProver`] checks the
//! statement in the clear and emits a transcript bound to the proving key and
//! the public inputs, which [`MockVerifier`] recomputes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Instant;

use crate::commitment::CommitmentScheme;
use crate::error::{ProtocolError, Result};
use crate::merkle::MembershipWitness;
use crate::withdrawal::{ProofInputs, PublicInputs};

/// Size of a mock proof (same as a serialized Groth16 proof on BN254)
pub const MOCK_PROOF_BYTES: usize = 256;

const MOCK_TRANSCRIPT_CONTEXT: &str = "shade mock withdraw proof v1";

// ============================================================================
// Proof Types
// ============================================================================

/// A proof in the byte layout the ledger's withdraw entry point expects
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedProof(Vec<u8>);

impl SerializedProof {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// `0x`-prefixed hex, the form passed to the ledger
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| ProtocolError::InvalidDomain("proof must start with 0x".into()))?;
        hex::decode(digits)
            .map(Self)
            .map_err(|e| ProtocolError::InvalidDomain(format!("proof: {e}")))
    }
}

impl fmt::Debug for SerializedProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedProof({} bytes)", self.0.len())
    }
}

/// Circuit description and proving key
#[derive(Clone)]
pub struct CircuitArtifacts {
    circuit: Vec<u8>,
    proving_key: Vec<u8>,
}

impl CircuitArtifacts {
    pub fn new(circuit: Vec<u8>, proving_key: Vec<u8>) -> Self {
        Self {
            circuit,
            proving_key,
        }
    }

    /// Read both artifacts from disk
    pub fn load(circuit_path: &Path, proving_key_path: &Path) -> Result<Self> {
        let read = |what: &'static str, path: &Path| {
            std::fs::read(path).map_err(|source| ProtocolError::ArtifactLoad {
                what,
                path: path.to_path_buf(),
                source,
            })
        };
        let circuit = read("circuit", circuit_path)?;
        let proving_key = read("proving key", proving_key_path)?;
        log::info!(
            "Loaded circuit ({} bytes) and proving key ({} bytes)",
            circuit.len(),
            proving_key.len()
        );
        Ok(Self::new(circuit, proving_key))
    }

    pub fn circuit(&self) -> &[u8] {
        &self.circuit
    }

    pub fn proving_key(&self) -> &[u8] {
        &self.proving_key
    }

    /// Digest binding a proof to these exact artifacts
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.circuit.len() as u64).to_le_bytes());
        hasher.update(&self.circuit);
        hasher.update(&self.proving_key);
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Debug for CircuitArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitArtifacts")
            .field("circuit_bytes", &self.circuit.len())
            .field("proving_key_bytes", &self.proving_key.len())
            .finish()
    }
}

// ============================================================================
// Prover Traits
// ============================================================================

/// Trait for withdrawal proof generation
pub trait Prover: Send + Sync {
    /// Generate a proof; failures surface as [`ProtocolError::ProofGeneration`]
    fn prove(&self, inputs: &ProofInputs, artifacts: &CircuitArtifacts) -> Result<SerializedProof>;
}

/// Trait for withdrawal proof verification (ledger side)
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &SerializedProof, public: &PublicInputs) -> bool;
}

// ============================================================================
// Mock Prover
// ============================================================================

fn mock_transcript(artifacts_digest: &[u8; 32], public: &PublicInputs) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new_derive_key(MOCK_TRANSCRIPT_CONTEXT);
    hasher.update(artifacts_digest);
    for element in public.to_field_elements() {
        hasher.update(element.as_bytes());
    }
    let mut proof = vec![0u8; MOCK_PROOF_BYTES];
    hasher.finalize_xof().fill(&mut proof);
    proof
}

/// Mock prover - checks the statement in the clear
///
/// Fails exactly where a real prover would fail to find a satisfying
/// witness, so callers exercise the same error paths.
#[derive(Clone, Default)]
pub struct MockProver {
    scheme: CommitmentScheme,
}

impl MockProver {
    pub fn new() -> Self {
        Self {
            scheme: CommitmentScheme::new(),
        }
    }
}

impl Prover for MockProver {
    fn prove(&self, inputs: &ProofInputs, artifacts: &CircuitArtifacts) -> Result<SerializedProof> {
        let started = Instant::now();
        let private = &inputs.private;
        let public = &inputs.public;

        let deposit = self
            .scheme
            .derive(private.nullifier.clone(), private.secret.clone());

        if deposit.nullifier_hash() != public.nullifier_hash {
            return Err(ProtocolError::ProofGeneration(
                "nullifier hash does not match the private nullifier".into(),
            ));
        }

        let witness = MembershipWitness {
            leaf: deposit.commitment(),
            leaf_index: 0,
            root: public.root,
            path_elements: private.path_elements.clone(),
            path_indices: private.path_indices.clone(),
        };
        if !witness.verify() {
            return Err(ProtocolError::ProofGeneration(
                "commitment is not a leaf under the public root".into(),
            ));
        }

        let proof = SerializedProof(mock_transcript(&artifacts.digest(), public));
        log::debug!(
            "Mock proof generated in {} ms",
            started.elapsed().as_millis()
        );
        Ok(proof)
    }
}

/// Verifier for [`MockProver`] proofs
#[derive(Debug, Clone)]
pub struct MockVerifier {
    artifacts_digest: [u8; 32],
}

impl MockVerifier {
    pub fn new(artifacts: &CircuitArtifacts) -> Self {
        Self {
            artifacts_digest: artifacts.digest(),
        }
    }
}

impl ProofVerifier for MockVerifier {
    fn verify(&self, proof: &SerializedProof, public: &PublicInputs) -> bool {
        proof.as_bytes() == mock_transcript(&self.artifacts_digest, public).as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Address, FieldElement, SecretScalar};
    use crate::merkle::TreeSnapshot;
    use crate::withdrawal::build_proof_inputs;

    fn artifacts() -> CircuitArtifacts {
        CircuitArtifacts::new(b"withdraw circuit".to_vec(), b"proving key".to_vec())
    }

    fn inputs() -> ProofInputs {
        let scheme = CommitmentScheme::new();
        let deposit = scheme.derive(SecretScalar::from_u64(7), SecretScalar::from_u64(42));
        let tree = TreeSnapshot::build(
            4,
            vec![(0, FieldElement::from_u64(1)), (1, deposit.commitment())],
        )
        .unwrap();
        let witness = tree.path(1).unwrap();
        build_proof_inputs(
            &deposit,
            &witness,
            Address::from_bytes([1u8; 20]),
            Address::ZERO,
            0,
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_prove_and_verify() {
        let prover = MockProver::new();
        let verifier = MockVerifier::new(&artifacts());
        let inputs = inputs();

        let proof = prover.prove(&inputs, &artifacts()).unwrap();
        assert_eq!(proof.as_bytes().len(), MOCK_PROOF_BYTES);
        assert!(verifier.verify(&proof, &inputs.public));
    }

    #[test]
    fn test_proof_bound_to_public_inputs() {
        let prover = MockProver::new();
        let verifier = MockVerifier::new(&artifacts());
        let inputs = inputs();
        let proof = prover.prove(&inputs, &artifacts()).unwrap();

        let mut redirected = inputs.public.clone();
        redirected.recipient = Address::from_bytes([2u8; 20]);
        assert!(!verifier.verify(&proof, &redirected), "recipient is bound");

        let mut fee_bumped = inputs.public.clone();
        fee_bumped.fee = FieldElement::from_u64(1);
        assert!(!verifier.verify(&proof, &fee_bumped), "fee is bound");
    }

    #[test]
    fn test_proof_bound_to_artifacts() {
        let prover = MockProver::new();
        let inputs = inputs();
        let proof = prover.prove(&inputs, &artifacts()).unwrap();

        let other = CircuitArtifacts::new(b"withdraw circuit".to_vec(), b"other key".to_vec());
        assert!(!MockVerifier::new(&other).verify(&proof, &inputs.public));
    }

    #[test]
    fn test_prove_rejects_wrong_root() {
        let prover = MockProver::new();
        let mut inputs = inputs();
        inputs.public.root = FieldElement::from_u64(123);
        assert!(matches!(
            prover.prove(&inputs, &artifacts()),
            Err(ProtocolError::ProofGeneration(_))
        ));
    }

    #[test]
    fn test_prove_rejects_wrong_nullifier_hash() {
        let prover = MockProver::new();
        let mut inputs = inputs();
        inputs.private.nullifier = SecretScalar::from_u64(8);
        assert!(matches!(
            prover.prove(&inputs, &artifacts()),
            Err(ProtocolError::ProofGeneration(_))
        ));
    }

    #[test]
    fn test_load_reports_missing_artifact() {
        let dir = std::env::temp_dir();
        let circuit = dir.join(format!("shade-circuit-{}.bin", std::process::id()));
        std::fs::write(&circuit, b"circuit").unwrap();
        let missing = dir.join("shade-no-such-proving-key.bin");

        let result = CircuitArtifacts::load(&circuit, &missing);
        let _ = std::fs::remove_file(&circuit);

        match result {
            Err(ProtocolError::ArtifactLoad { what, path, .. }) => {
                assert_eq!(what, "proving key");
                assert_eq!(path, missing);
            }
            other => panic!("expected ArtifactLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_proof_hex_roundtrip() {
        let proof = SerializedProof::from_bytes(vec![0xde, 0xad]);
        assert_eq!(proof.to_hex(), "0xdead");
        assert_eq!(SerializedProof::from_hex("0xdead").unwrap(), proof);
        assert!(SerializedProof::from_hex("dead").is_err());
    }
}
