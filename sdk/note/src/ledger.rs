//! Ledger Integration
//!
//! The ledger is the pool's authoritative state: the ordered deposit log, the
//! recent roots, and the spent nullifier hashes. The client only talks to it
//! through [`Ledger`].
//!
//! [`InMemoryLedger`] is a complete implementation used by tests and by the
//! file-backed CLI. All state sits behind one mutex, so the spent check and
//! the spent insert in [`Ledger::submit_withdrawal`] cannot interleave with
//! another withdrawal of the same note. With a [`StatePersister`] attached,
//! every change is written out under that same lock before it is reported,
//! and rolled back if the write fails.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use tokio::sync::Mutex;

use crate::error::{ProtocolError, Result};
use crate::field::{Address, FieldElement};
use crate::merkle::{RootHistory, TreeFrontier};
use crate::prover::{ProofVerifier, SerializedProof};
use crate::withdrawal::LedgerArgs;

/// Number of recent roots a withdrawal may reference
pub const DEFAULT_ROOT_HISTORY: usize = 30;

/// A `Deposit` event from the ledger's log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositEvent {
    pub leaf_index: u64,
    pub commitment: FieldElement,
}

/// Record of an accepted withdrawal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub nullifier_hash: FieldElement,
    pub recipient: Address,
    pub relayer: Address,
    pub fee: FieldElement,
    pub refund: FieldElement,
}

/// Ledger operations the client depends on
pub trait Ledger: Send + Sync {
    /// Publish a commitment, returning its leaf index
    fn deposit(&self, commitment: FieldElement) -> impl Future<Output = Result<u64>> + Send;

    /// Every deposit event so far, in any order
    fn deposit_events(&self) -> impl Future<Output = Result<Vec<DepositEvent>>> + Send;

    fn is_known_root(&self, root: &FieldElement) -> impl Future<Output = Result<bool>> + Send;

    fn is_spent(&self, nullifier_hash: &FieldElement)
    -> impl Future<Output = Result<bool>> + Send;

    /// Verify and settle a withdrawal
    fn submit_withdrawal(
        &self,
        proof: &SerializedProof,
        args: &LedgerArgs,
    ) -> impl Future<Output = Result<WithdrawalReceipt>> + Send;
}

/// Durable storage for ledger state
pub trait StatePersister: Send + Sync {
    /// Write the full state; an error aborts the change that produced it
    fn persist(&self, state: &LedgerState) -> Result<()>;
}

/// Serializable ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub height: usize,
    pub root_history: usize,
    pub events: Vec<DepositEvent>,
    pub spent: Vec<FieldElement>,
    pub withdrawals: Vec<WithdrawalReceipt>,
}

struct LedgerInner {
    frontier: TreeFrontier,
    history: RootHistory,
    events: Vec<DepositEvent>,
    commitments: HashSet<FieldElement>,
    spent: HashSet<FieldElement>,
    withdrawals: Vec<WithdrawalReceipt>,
}

impl LedgerInner {
    fn new(height: usize, root_history: usize) -> Result<Self> {
        let frontier = TreeFrontier::new(height)?;
        let mut history = RootHistory::new(root_history);
        history.push(frontier.root());
        Ok(Self {
            frontier,
            history,
            events: Vec::new(),
            commitments: HashSet::new(),
            spent: HashSet::new(),
            withdrawals: Vec::new(),
        })
    }

    fn to_state(&self, height: usize, root_history: usize) -> LedgerState {
        let mut spent: Vec<FieldElement> = self.spent.iter().copied().collect();
        spent.sort();
        LedgerState {
            height,
            root_history,
            events: self.events.clone(),
            spent,
            withdrawals: self.withdrawals.clone(),
        }
    }

    fn append(&mut self, commitment: FieldElement) -> Result<u64> {
        if self.commitments.contains(&commitment) {
            return Err(ProtocolError::DuplicateCommitment {
                commitment: commitment.to_hex(),
            });
        }
        let leaf_index = self.frontier.append(commitment)?;
        self.history.push(self.frontier.root());
        self.commitments.insert(commitment);
        self.events.push(DepositEvent {
            leaf_index,
            commitment,
        });
        Ok(leaf_index)
    }
}

/// In-process ledger
pub struct InMemoryLedger<V> {
    inner: Mutex<LedgerInner>,
    verifier: V,
    persister: Option<Box<dyn StatePersister>>,
    height: usize,
    root_history: usize,
}

impl<V: ProofVerifier> InMemoryLedger<V> {
    pub fn new(height: usize, root_history: usize, verifier: V) -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(LedgerInner::new(height, root_history)?),
            verifier,
            persister: None,
            height,
            root_history,
        })
    }

    /// Rebuild a ledger by replaying exported state
    pub fn restore(state: LedgerState, verifier: V) -> Result<Self> {
        let mut inner = LedgerInner::new(state.height, state.root_history)?;

        let mut events = state.events;
        events.sort_by_key(|event| event.leaf_index);
        for event in events {
            let leaf_index = inner.append(event.commitment)?;
            if leaf_index != event.leaf_index {
                return Err(ProtocolError::NonContiguousLeaves {
                    expected: leaf_index,
                    found: event.leaf_index,
                });
            }
        }
        inner.spent.extend(state.spent);
        inner.withdrawals = state.withdrawals;

        log::info!(
            "Restored ledger: {} deposits, {} spent, root {}",
            inner.events.len(),
            inner.spent.len(),
            inner.frontier.root()
        );

        Ok(Self {
            inner: Mutex::new(inner),
            verifier,
            persister: None,
            height: state.height,
            root_history: state.root_history,
        })
    }

    /// Persist every accepted deposit and withdrawal before it is reported
    pub fn with_persister(mut self, persister: impl StatePersister + 'static) -> Self {
        self.persister = Some(Box::new(persister));
        self
    }

    pub async fn export_state(&self) -> LedgerState {
        self.inner
            .lock()
            .await
            .to_state(self.height, self.root_history)
    }

    fn persist(&self, inner: &LedgerInner) -> Result<()> {
        match &self.persister {
            Some(persister) => persister.persist(&inner.to_state(self.height, self.root_history)),
            None => Ok(()),
        }
    }

    /// Latest root
    pub async fn current_root(&self) -> FieldElement {
        self.inner.lock().await.frontier.root()
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

impl<V: ProofVerifier> Ledger for InMemoryLedger<V> {
    async fn deposit(&self, commitment: FieldElement) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        let (frontier, history) = (inner.frontier.clone(), inner.history.clone());
        let leaf_index = inner.append(commitment)?;

        if let Err(e) = self.persist(&inner) {
            inner.frontier = frontier;
            inner.history = history;
            inner.commitments.remove(&commitment);
            inner.events.pop();
            log::error!("Deposit {commitment} rolled back: {e}");
            return Err(e);
        }

        log::info!("Deposit {commitment} at leaf {leaf_index}");
        Ok(leaf_index)
    }

    async fn deposit_events(&self) -> Result<Vec<DepositEvent>> {
        Ok(self.inner.lock().await.events.clone())
    }

    async fn is_known_root(&self, root: &FieldElement) -> Result<bool> {
        Ok(self.inner.lock().await.history.is_known(root))
    }

    async fn is_spent(&self, nullifier_hash: &FieldElement) -> Result<bool> {
        Ok(self.inner.lock().await.spent.contains(nullifier_hash))
    }

    async fn submit_withdrawal(
        &self,
        proof: &SerializedProof,
        args: &LedgerArgs,
    ) -> Result<WithdrawalReceipt> {
        let public = args.to_public_inputs()?;
        let mut inner = self.inner.lock().await;

        if !inner.history.is_known(&public.root) {
            return Err(ProtocolError::StaleRoot {
                root: public.root.to_hex(),
            });
        }
        if inner.spent.contains(&public.nullifier_hash) {
            return Err(ProtocolError::AlreadySpent {
                nullifier_hash: public.nullifier_hash.to_hex(),
            });
        }
        if !self.verifier.verify(proof, &public) {
            log::warn!("Rejected withdrawal proof for {}", public.nullifier_hash);
            return Err(ProtocolError::InvalidProof);
        }

        inner.spent.insert(public.nullifier_hash);
        let receipt = WithdrawalReceipt {
            nullifier_hash: public.nullifier_hash,
            recipient: public.recipient,
            relayer: public.relayer,
            fee: public.fee,
            refund: public.refund,
        };
        inner.withdrawals.push(receipt.clone());

        if let Err(e) = self.persist(&inner) {
            inner.spent.remove(&public.nullifier_hash);
            inner.withdrawals.pop();
            log::error!(
                "Withdrawal for {} rolled back: {e}",
                public.nullifier_hash
            );
            return Err(e);
        }

        log::info!(
            "Withdrawal to {} settled (nullifier hash {})",
            receipt.recipient,
            receipt.nullifier_hash
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment::{CommitmentScheme, Deposit};
    use crate::field::SecretScalar;
    use crate::merkle::TreeSnapshot;
    use crate::prover::{CircuitArtifacts, MockProver, MockVerifier, Prover};
    use crate::withdrawal::{build_ledger_args, build_proof_inputs};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    const HEIGHT: usize = 4;

    fn artifacts() -> CircuitArtifacts {
        CircuitArtifacts::new(b"circuit".to_vec(), b"key".to_vec())
    }

    fn ledger() -> InMemoryLedger<MockVerifier> {
        InMemoryLedger::new(HEIGHT, DEFAULT_ROOT_HISTORY, MockVerifier::new(&artifacts())).unwrap()
    }

    fn deposit(n: u64) -> Deposit {
        CommitmentScheme::new().derive(SecretScalar::from_u64(n), SecretScalar::from_u64(n + 100))
    }

    async fn withdrawal_for(
        ledger: &InMemoryLedger<MockVerifier>,
        deposit: &Deposit,
    ) -> (SerializedProof, LedgerArgs) {
        let events = ledger.deposit_events().await.unwrap();
        let tree = TreeSnapshot::build(
            HEIGHT,
            events.iter().map(|e| (e.leaf_index, e.commitment)),
        )
        .unwrap();
        let index = tree.locate(&deposit.commitment()).unwrap();
        let witness = tree.path(index).unwrap();
        let inputs = build_proof_inputs(
            deposit,
            &witness,
            Address::from_bytes([9u8; 20]),
            Address::ZERO,
            0,
            0,
        )
        .unwrap();
        let proof = MockProver::new().prove(&inputs, &artifacts()).unwrap();
        (proof, build_ledger_args(&inputs.public))
    }

    #[tokio::test]
    async fn test_deposit_assigns_contiguous_indices() {
        let ledger = ledger();
        for i in 0..3 {
            assert_eq!(ledger.deposit(deposit(i).commitment()).await.unwrap(), i);
        }
        let events = ledger.deposit_events().await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].commitment, deposit(2).commitment());
    }

    #[tokio::test]
    async fn test_duplicate_commitment_rejected() {
        let ledger = ledger();
        let c = deposit(1).commitment();
        ledger.deposit(c).await.unwrap();
        assert!(matches!(
            ledger.deposit(c).await,
            Err(ProtocolError::DuplicateCommitment { .. })
        ));
        assert_eq!(ledger.deposit_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_root_tracks_snapshot() {
        let ledger = ledger();
        let empty_root = ledger.current_root().await;
        assert!(ledger.is_known_root(&empty_root).await.unwrap());

        for i in 0..5 {
            ledger.deposit(deposit(i).commitment()).await.unwrap();
        }
        let events = ledger.deposit_events().await.unwrap();
        let tree =
            TreeSnapshot::build(HEIGHT, events.iter().map(|e| (e.leaf_index, e.commitment)))
                .unwrap();
        assert_eq!(ledger.current_root().await, tree.root());
        assert!(ledger.is_known_root(&tree.root()).await.unwrap());
    }

    #[tokio::test]
    async fn test_root_history_window() {
        let ledger = InMemoryLedger::new(HEIGHT, 2, MockVerifier::new(&artifacts())).unwrap();
        let empty_root = ledger.current_root().await;
        ledger.deposit(deposit(0).commitment()).await.unwrap();
        assert!(ledger.is_known_root(&empty_root).await.unwrap());

        ledger.deposit(deposit(1).commitment()).await.unwrap();
        assert!(
            !ledger.is_known_root(&empty_root).await.unwrap(),
            "root older than the window is forgotten"
        );
    }

    #[tokio::test]
    async fn test_withdrawal_settles_once() {
        let ledger = ledger();
        let note = deposit(7);
        ledger.deposit(note.commitment()).await.unwrap();
        let (proof, args) = withdrawal_for(&ledger, &note).await;

        let receipt = ledger.submit_withdrawal(&proof, &args).await.unwrap();
        assert_eq!(receipt.nullifier_hash, note.nullifier_hash());
        assert!(ledger.is_spent(&note.nullifier_hash()).await.unwrap());

        assert!(matches!(
            ledger.submit_withdrawal(&proof, &args).await,
            Err(ProtocolError::AlreadySpent { .. })
        ));
    }

    #[tokio::test]
    async fn test_withdrawal_rejects_unknown_root() {
        let ledger = ledger();
        let note = deposit(7);
        ledger.deposit(note.commitment()).await.unwrap();
        let (proof, args) = withdrawal_for(&ledger, &note).await;

        let mut raw: Vec<String> = args.as_slice().to_vec();
        raw[0] = FieldElement::from_u64(77).to_hex();
        let forged: [String; 6] = raw.try_into().unwrap();

        assert!(matches!(
            ledger.submit_withdrawal(&proof, &LedgerArgs::from(forged)).await,
            Err(ProtocolError::StaleRoot { .. })
        ));
    }

    #[tokio::test]
    async fn test_withdrawal_rejects_bad_proof() {
        let ledger = ledger();
        let note = deposit(7);
        ledger.deposit(note.commitment()).await.unwrap();
        let (_, args) = withdrawal_for(&ledger, &note).await;

        let bogus = SerializedProof::from_bytes(vec![0u8; 256]);
        assert!(matches!(
            ledger.submit_withdrawal(&bogus, &args).await,
            Err(ProtocolError::InvalidProof)
        ));
        assert!(
            !ledger.is_spent(&note.nullifier_hash()).await.unwrap(),
            "rejected withdrawal must not mark the note spent"
        );
    }

    #[tokio::test]
    async fn test_export_and_restore() {
        let ledger = ledger();
        let note = deposit(7);
        for i in 0..3 {
            ledger.deposit(deposit(i).commitment()).await.unwrap();
        }
        ledger.deposit(note.commitment()).await.unwrap();
        let (proof, args) = withdrawal_for(&ledger, &note).await;
        ledger.submit_withdrawal(&proof, &args).await.unwrap();

        let state = ledger.export_state().await;
        let json = serde_json::to_string(&state).unwrap();
        let state: LedgerState = serde_json::from_str(&json).unwrap();

        let restored = InMemoryLedger::restore(state.clone(), MockVerifier::new(&artifacts())).unwrap();
        assert_eq!(restored.current_root().await, ledger.current_root().await);
        assert!(restored.is_spent(&note.nullifier_hash()).await.unwrap());
        assert_eq!(restored.export_state().await, state);
    }

    /// Records every persisted state, failing on demand
    #[derive(Clone, Default)]
    struct RecordingPersister {
        states: Arc<StdMutex<Vec<LedgerState>>>,
        fail: Arc<AtomicBool>,
    }

    impl StatePersister for RecordingPersister {
        fn persist(&self, state: &LedgerState) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ProtocolError::Ledger("disk full".into()));
            }
            self.states.lock().unwrap().push(state.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_changes_persisted_before_success() {
        let persister = RecordingPersister::default();
        let ledger = ledger().with_persister(persister.clone());
        let note = deposit(7);

        ledger.deposit(note.commitment()).await.unwrap();
        let (proof, args) = withdrawal_for(&ledger, &note).await;
        ledger.submit_withdrawal(&proof, &args).await.unwrap();

        let states = persister.states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].events.len(), 1);
        assert_eq!(states[1].spent, vec![note.nullifier_hash()]);
        assert_eq!(states[1].withdrawals.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_withdrawal() {
        let persister = RecordingPersister::default();
        let ledger = ledger().with_persister(persister.clone());
        let note = deposit(7);
        ledger.deposit(note.commitment()).await.unwrap();
        let (proof, args) = withdrawal_for(&ledger, &note).await;

        persister.fail.store(true, Ordering::SeqCst);
        assert!(matches!(
            ledger.submit_withdrawal(&proof, &args).await,
            Err(ProtocolError::Ledger(_))
        ));
        assert!(!ledger.is_spent(&note.nullifier_hash()).await.unwrap());
        assert!(ledger.export_state().await.withdrawals.is_empty());

        // Once storage recovers the same withdrawal settles exactly once
        persister.fail.store(false, Ordering::SeqCst);
        ledger.submit_withdrawal(&proof, &args).await.unwrap();
        assert!(matches!(
            ledger.submit_withdrawal(&proof, &args).await,
            Err(ProtocolError::AlreadySpent { .. })
        ));
        let last = persister.states.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.spent, vec![note.nullifier_hash()]);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_deposit() {
        let persister = RecordingPersister::default();
        let ledger = ledger().with_persister(persister.clone());
        let root_before = ledger.current_root().await;

        persister.fail.store(true, Ordering::SeqCst);
        let c = deposit(1).commitment();
        assert!(ledger.deposit(c).await.is_err());
        assert!(ledger.deposit_events().await.unwrap().is_empty());
        assert_eq!(ledger.current_root().await, root_before);

        persister.fail.store(false, Ordering::SeqCst);
        assert_eq!(ledger.deposit(c).await.unwrap(), 0, "index is reused after rollback");
    }

    #[tokio::test]
    async fn test_restore_rejects_gapped_log() {
        let state = LedgerState {
            height: HEIGHT,
            root_history: DEFAULT_ROOT_HISTORY,
            events: vec![DepositEvent {
                leaf_index: 1,
                commitment: deposit(0).commitment(),
            }],
            spent: Vec::new(),
            withdrawals: Vec::new(),
        };
        assert!(matches!(
            InMemoryLedger::restore(state, MockVerifier::new(&artifacts())),
            Err(ProtocolError::NonContiguousLeaves { .. })
        ));
    }
}
