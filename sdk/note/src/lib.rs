//! Shade Note SDK
//!
//! Fixed-denomination shielded pool: deposit a commitment, later withdraw to
//! any address by proving membership without revealing which deposit it was.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Note Lifecycle                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Commitment  │  │  Note Token  │  │   Anonymity Set       │  │
//! │  │  H(n || s)   │  │  bearer form │  │   (MiMC Merkle tree)  │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │              Withdrawal Proof                           │    │
//! │  │  • Commitment is a leaf under a known root              │    │
//! │  │  • Nullifier hash matches the committed nullifier       │    │
//! │  │  • Bound to recipient, relayer, fee, refund             │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod commitment;
pub mod error;
pub mod field;
pub mod hash;
pub mod ledger;
pub mod merkle;
pub mod mimc;
pub mod note;
pub mod prover;
pub mod withdrawal;

pub use client::{ClientContext, IssuedNote, PendingNote, RetryPolicy, WithdrawalClient};
pub use commitment::{CommitmentScheme, Deposit, PREIMAGE_BYTES};
pub use error::{NoteFormatError, ProtocolError, Result};
pub use field::{Address, FieldElement, SecretScalar};
pub use hash::NoteHasher;
pub use ledger::{
    DEFAULT_ROOT_HISTORY, DepositEvent, InMemoryLedger, Ledger, LedgerState, StatePersister,
    WithdrawalReceipt,
};
pub use merkle::{
    DEFAULT_TREE_HEIGHT, MembershipWitness, RootHistory, TreeFrontier, TreeSnapshot,
};
pub use mimc::{hash_pair, zero_leaf, zero_roots};
pub use note::{DEFAULT_NOTE_PREFIX, NoteCodec, ParsedNote, Pool};
pub use prover::{
    CircuitArtifacts, MockProver, MockVerifier, ProofVerifier, Prover, SerializedProof,
};
pub use withdrawal::{
    LedgerArgs, ProofInputs, PublicInputs, WithdrawalRequest, build_ledger_args,
    build_proof_inputs,
};
