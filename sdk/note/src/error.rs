//! Protocol Errors
//!
//! Every core operation returns a [`ProtocolError`] instead of recovering on
//! its own. Whether to refetch, retry or abort is decided by the caller;
//! [`ProtocolError::is_retryable`] tells it which failures can clear up.

use std::path::PathBuf;
use thiserror::Error;

/// Why a note token failed to parse (or could not be encoded)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteFormatError {
    #[error("expected prefix `{expected}`")]
    WrongPrefix { expected: String },

    #[error("missing `-` delimiter after {field}")]
    MissingDelimiter { field: &'static str },

    #[error("{field} is empty")]
    EmptyField { field: &'static str },

    #[error("{field} contains invalid character {found:?}")]
    InvalidCharacter { field: &'static str, found: char },

    #[error("amount `{0}` is not a decimal number")]
    InvalidAmount(String),

    #[error("network id `{0}` is not a valid u64")]
    InvalidNetworkId(String),

    #[error("secret segment must start with `0x`")]
    MissingHexPrefix,

    #[error("secret segment has {found} hex characters, expected {expected}")]
    WrongHexLength { expected: usize, found: usize },

    #[error("secret segment contains non-hex character {0:?}")]
    NonHexCharacter(char),
}

/// Note protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed note: {0}")]
    MalformedNote(#[from] NoteFormatError),

    #[error("value outside the field domain: {0}")]
    InvalidDomain(String),

    #[error("commitment {commitment} not found in the anonymity set")]
    CommitmentNotFound { commitment: String },

    #[error("leaf index {index} out of range: {populated} leaves populated")]
    IndexOutOfRange { index: u64, populated: u64 },

    #[error("leaf indices not contiguous: expected {expected}, found {found}")]
    NonContiguousLeaves { expected: u64, found: u64 },

    #[error("tree of height {height} is full ({capacity} leaves)")]
    TreeFull { height: usize, capacity: u64 },

    #[error("unsupported tree height {0}")]
    InvalidTreeHeight(usize),

    #[error("witness does not match note: {0}")]
    WitnessMismatch(String),

    #[error("merkle root {root} is not known to the ledger")]
    StaleRoot { root: String },

    #[error("note already spent (nullifier hash {nullifier_hash})")]
    AlreadySpent { nullifier_hash: String },

    #[error("commitment {commitment} has already been deposited")]
    DuplicateCommitment { commitment: String },

    #[error("note is for pool {found}, expected {expected}")]
    PoolMismatch { expected: String, found: String },

    #[error("proof generation failed: {0}")]
    ProofGeneration(String),

    #[error("failed to read {what} {}", .path.display())]
    ArtifactLoad {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("proof rejected by verifier")]
    InvalidProof,

    #[error("ledger error: {0}")]
    Ledger(String),
}

impl ProtocolError {
    /// True when the same request can succeed later without changing inputs.
    ///
    /// Only a missing commitment qualifies: the deposit may simply not be
    /// indexed yet. Everything else is final for the attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CommitmentNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
