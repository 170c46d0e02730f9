//! Local Pool State
//!
//! File-backed ledger and prover artifacts for running a pool on one machine.

use anyhow::{Context, Result};
use shade_config::ShadeConfig;
use shade_note::{
    CircuitArtifacts, ClientContext, InMemoryLedger, LedgerState, MockProver, MockVerifier,
    NoteCodec, Pool, ProtocolError, RetryPolicy, StatePersister, WithdrawalClient,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub type LocalClient = WithdrawalClient<InMemoryLedger<MockVerifier>, MockProver>;

const DEV_CIRCUIT: &[u8] = b"shade dev withdraw circuit";
const DEV_PROVING_KEY: &[u8] = b"shade dev proving key";

/// Load artifacts from the configured paths, or fall back to dev artifacts
pub fn load_artifacts(config: &ShadeConfig) -> Result<CircuitArtifacts> {
    match (&config.prover.circuit_path, &config.prover.proving_key_path) {
        (Some(circuit), Some(key)) => {
            CircuitArtifacts::load(Path::new(circuit), Path::new(key))
                .context("Failed to load prover artifacts")
        }
        _ => {
            log::warn!("No prover artifacts configured, using built-in dev artifacts");
            Ok(CircuitArtifacts::new(
                DEV_CIRCUIT.to_vec(),
                DEV_PROVING_KEY.to_vec(),
            ))
        }
    }
}

/// Ledger state persisted as JSON between CLI invocations
///
/// Opened ledgers write through to the file on every deposit and withdrawal.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the ledger, creating an empty one if the file does not exist
    pub fn open(
        &self,
        config: &ShadeConfig,
        verifier: MockVerifier,
    ) -> Result<InMemoryLedger<MockVerifier>> {
        if !self.path.exists() {
            log::info!("Creating new ledger at {}", self.path.display());
            let ledger =
                InMemoryLedger::new(config.tree.height, config.ledger.root_history, verifier)
                    .context("Failed to create ledger")?;
            return Ok(ledger.with_persister(self.clone()));
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read ledger: {}", self.path.display()))?;
        let state: LedgerState = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse ledger: {}", self.path.display()))?;

        if state.height != config.tree.height {
            anyhow::bail!(
                "Ledger {} has tree height {}, config says {}",
                self.path.display(),
                state.height,
                config.tree.height
            );
        }

        let ledger = InMemoryLedger::restore(state, verifier)
            .with_context(|| format!("Ledger {} is inconsistent", self.path.display()))?;
        Ok(ledger.with_persister(self.clone()))
    }
}

impl StatePersister for LedgerStore {
    /// Replace the file atomically
    fn persist(&self, state: &LedgerState) -> shade_note::Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| ProtocolError::Ledger(format!("failed to encode ledger: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| {
            ProtocolError::Ledger(format!("failed to write {}: {e}", tmp.display()))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ProtocolError::Ledger(format!("failed to replace {}: {e}", self.path.display()))
        })?;
        log::debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }
}

/// Build a client for the configured pool
pub fn open_client(config: &ShadeConfig, store: &LedgerStore) -> Result<LocalClient> {
    let artifacts = load_artifacts(config)?;
    let ledger = store.open(config, MockVerifier::new(&artifacts))?;
    let codec = NoteCodec::new(config.pool.note_prefix.clone())
        .context("Invalid note prefix in config")?;

    let context = ClientContext {
        pool: Pool::new(
            config.pool.asset.clone(),
            config.pool.denomination.clone(),
            config.pool.network_id,
        ),
        tree_height: config.tree.height,
        retry: RetryPolicy {
            max_retries: config.retry.max_retries,
            base_delay: Duration::from_millis(config.retry.base_delay_ms),
        },
    };

    Ok(WithdrawalClient::new(
        context,
        codec,
        artifacts,
        ledger,
        MockProver::new(),
    ))
}
