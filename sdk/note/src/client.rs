//! Withdrawal Client
//!
//! Orchestrates the note lifecycle against a [`Ledger`] and a [`Prover`]:
//!
//! ```text
//! deposit:   sample secrets ─► commitment ─► ledger.deposit ─► note token
//!
//! withdraw:  parse token ─► pool check ─► fetch events ─► TreeSnapshot
//!              ─► preflight (known root, unspent, located) ─► witness
//!              ─► proof inputs ─► prover ─► ledger args ─► submit
//! ```
//!
//! Every attempt builds its own snapshot from freshly fetched events and keeps
//! nothing once it returns. Retrying is a policy of this client, never of the
//! core operations.

use rand::Rng;
use std::time::Duration;

use crate::commitment::{CommitmentScheme, Deposit};
use crate::error::{ProtocolError, Result};
use crate::ledger::{Ledger, WithdrawalReceipt};
use crate::merkle::{MembershipWitness, TreeSnapshot};
use crate::note::{NoteCodec, Pool};
use crate::prover::{CircuitArtifacts, Prover};
use crate::withdrawal::{WithdrawalRequest, build_ledger_args, build_proof_inputs};

/// Backoff for retryable preflight failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each one
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Everything the client needs to know about its pool
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub pool: Pool,
    pub tree_height: usize,
    pub retry: RetryPolicy,
}

/// A note whose commitment has not been published yet
#[derive(Debug)]
pub struct PendingNote {
    pub deposit: Deposit,
    pub token: String,
}

/// A freshly issued note
#[derive(Debug)]
pub struct IssuedNote {
    pub deposit: Deposit,
    /// The bearer token; whoever holds it can withdraw
    pub token: String,
    pub leaf_index: u64,
}

/// Client for one pool
pub struct WithdrawalClient<L, P> {
    context: ClientContext,
    scheme: CommitmentScheme,
    codec: NoteCodec,
    artifacts: CircuitArtifacts,
    ledger: L,
    prover: P,
}

impl<L: Ledger, P: Prover> WithdrawalClient<L, P> {
    pub fn new(
        context: ClientContext,
        codec: NoteCodec,
        artifacts: CircuitArtifacts,
        ledger: L,
        prover: P,
    ) -> Self {
        Self {
            context,
            scheme: CommitmentScheme::new(),
            codec,
            artifacts,
            ledger,
            prover,
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn codec(&self) -> &NoteCodec {
        &self.codec
    }

    /// Create a note and publish its commitment
    pub async fn deposit<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<IssuedNote> {
        let pending = self.create_note(rng)?;
        self.submit_deposit(pending).await
    }

    /// Draw a note and encode its token without touching the ledger
    ///
    /// Callers that must store the token somewhere durable do so before
    /// [`Self::submit_deposit`], so a funded commitment never lacks its note.
    pub fn create_note<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PendingNote> {
        let deposit = self.scheme.random(rng);
        let token = self.codec.encode_deposit(&self.context.pool, &deposit)?;
        Ok(PendingNote { deposit, token })
    }

    /// Publish a pending note's commitment
    pub async fn submit_deposit(&self, pending: PendingNote) -> Result<IssuedNote> {
        let PendingNote { deposit, token } = pending;
        let leaf_index = self.ledger.deposit(deposit.commitment()).await?;

        log::info!(
            "Deposited into {} at leaf {leaf_index} (commitment {})",
            self.context.pool,
            deposit.commitment()
        );
        Ok(IssuedNote {
            deposit,
            token,
            leaf_index,
        })
    }

    /// Build a membership witness for `deposit` from a fresh snapshot
    ///
    /// Checks, in order: the snapshot root is known to the ledger, the
    /// nullifier hash is unspent, the commitment is in the set.
    pub async fn prepare(&self, deposit: &Deposit) -> Result<MembershipWitness> {
        let events = self.ledger.deposit_events().await?;
        let tree = TreeSnapshot::build(
            self.context.tree_height,
            events
                .into_iter()
                .map(|event| (event.leaf_index, event.commitment)),
        )?;

        let root = tree.root();
        if !self.ledger.is_known_root(&root).await? {
            return Err(ProtocolError::StaleRoot {
                root: root.to_hex(),
            });
        }

        let nullifier_hash = deposit.nullifier_hash();
        if self.ledger.is_spent(&nullifier_hash).await? {
            return Err(ProtocolError::AlreadySpent {
                nullifier_hash: nullifier_hash.to_hex(),
            });
        }

        let leaf_index = tree.locate(&deposit.commitment())?;
        log::debug!("Commitment found at leaf {leaf_index} of {}", tree.len());
        tree.path(leaf_index)
    }

    /// [`Self::prepare`], retrying retryable failures with exponential backoff
    pub async fn prepare_with_retry(&self, deposit: &Deposit) -> Result<MembershipWitness> {
        let policy = self.context.retry;
        let mut attempt = 0;
        loop {
            match self.prepare(deposit).await {
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.delay(attempt);
                    log::warn!(
                        "{e}; retrying in {} ms ({}/{})",
                        delay.as_millis(),
                        attempt + 1,
                        policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Withdraw the note in `token`
    pub async fn withdraw(
        &self,
        token: &str,
        request: &WithdrawalRequest,
    ) -> Result<WithdrawalReceipt> {
        let parsed = self.codec.parse(token)?;
        if parsed.pool != self.context.pool {
            return Err(ProtocolError::PoolMismatch {
                expected: self.context.pool.to_string(),
                found: parsed.pool.to_string(),
            });
        }
        let deposit = parsed.deposit(&self.scheme);

        let witness = self.prepare_with_retry(&deposit).await?;
        let inputs = build_proof_inputs(
            &deposit,
            &witness,
            request.recipient,
            request.relayer,
            request.fee,
            request.refund,
        )?;

        log::info!("Generating withdrawal proof");
        let proof = self.prover.prove(&inputs, &self.artifacts)?;
        let args = build_ledger_args(&inputs.public);

        self.ledger.submit_withdrawal(&proof, &args).await
    }
}
