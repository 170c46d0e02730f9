//! Shade Configuration
//!
//! Configuration for the Shade client and CLI.
//!
//! Handles loading configuration from:
//! 1. SHADE_CONFIG env var (explicit path)
//! 2. ./shade.toml (current directory)
//! 3. ~/.shade/config.toml (user home)
//!
//! Environment variables take precedence over TOML config.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

const CONFIG_FILE_NAME: &str = "shade.toml";
const CONFIG_DIR_NAME: &str = ".shade";
const HOME_CONFIG_FILE_NAME: &str = "config.toml";

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_NOTE_PREFIX: &str = "shade";
const DEFAULT_ASSET: &str = "eth";
const DEFAULT_DENOMINATION: &str = "0.1";
const DEFAULT_NETWORK_ID: u64 = 1;
const DEFAULT_TREE_HEIGHT: usize = 20;
const MAX_TREE_HEIGHT: usize = 32;
const DEFAULT_LEDGER_PATH: &str = "./shade-ledger.json";
const DEFAULT_ROOT_HISTORY: usize = 30;
const MAX_ROOT_HISTORY: usize = 4096;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_BASE_MS: u64 = 500;

// ============================================================================
// Config Structs
// ============================================================================

/// Root configuration structure (matches TOML layout)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadeConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub tree: TreeConfig,
    #[serde(default)]
    pub prover: ProverConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Which pool notes belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_note_prefix")]
    pub note_prefix: String,
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_denomination")]
    pub denomination: String,
    #[serde(default = "default_network_id")]
    pub network_id: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            note_prefix: DEFAULT_NOTE_PREFIX.into(),
            asset: DEFAULT_ASSET.into(),
            denomination: DEFAULT_DENOMINATION.into(),
            network_id: DEFAULT_NETWORK_ID,
        }
    }
}

fn default_note_prefix() -> String {
    DEFAULT_NOTE_PREFIX.into()
}
fn default_asset() -> String {
    DEFAULT_ASSET.into()
}
fn default_denomination() -> String {
    DEFAULT_DENOMINATION.into()
}
fn default_network_id() -> u64 {
    DEFAULT_NETWORK_ID
}

/// Commitment tree configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default = "default_tree_height")]
    pub height: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            height: DEFAULT_TREE_HEIGHT,
        }
    }
}

fn default_tree_height() -> usize {
    DEFAULT_TREE_HEIGHT
}

/// Prover configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    /// Compiled withdraw circuit
    #[serde(default)]
    pub circuit_path: Option<String>,
    #[serde(default)]
    pub proving_key_path: Option<String>,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// File the CLI keeps ledger state in
    #[serde(default = "default_ledger_path")]
    pub state_path: String,
    /// Recent roots accepted for withdrawals
    #[serde(default = "default_root_history")]
    pub root_history: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            state_path: DEFAULT_LEDGER_PATH.into(),
            root_history: DEFAULT_ROOT_HISTORY,
        }
    }
}

fn default_ledger_path() -> String {
    DEFAULT_LEDGER_PATH.into()
}
fn default_root_history() -> usize {
    DEFAULT_ROOT_HISTORY
}

/// Retry policy for notes that are not indexed yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_RETRY_BASE_MS,
        }
    }
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_retry_base_ms() -> u64 {
    DEFAULT_RETRY_BASE_MS
}

// ============================================================================
// Environment Variable Helpers
// ============================================================================

type Vars<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Set field from env var if present
fn env_string(vars: Vars<'_>, key: &str, field: &mut String) {
    if let Some(v) = vars(key) {
        *field = v;
    }
}

/// Set Option<String> from env var if present
fn env_option_string(vars: Vars<'_>, key: &str, field: &mut Option<String>) {
    if let Some(v) = vars(key) {
        *field = Some(v);
    }
}

/// Set field from env var if present and parseable
fn env_parse<T: std::str::FromStr>(vars: Vars<'_>, key: &str, field: &mut T) {
    if let Some(v) = vars(key) {
        match v.parse() {
            Ok(parsed) => *field = parsed,
            Err(_) => log::warn!("Ignoring {key}={v}: not a valid value"),
        }
    }
}

// ============================================================================
// Implementation
// ============================================================================

impl ShadeConfig {
    /// Load configuration from config file with env var overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::find_config_file() {
            Some(path) => {
                log::info!("Loading config from: {}", path.display());
                Self::read(&path)?
            }
            None => {
                log::info!("No config file found, using defaults and environment variables");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Find the config file path
    fn find_config_file() -> Option<PathBuf> {
        // 1. Check SHADE_CONFIG env var
        if let Ok(path) = env::var("SHADE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
            log::warn!("SHADE_CONFIG points to {}, which does not exist", path.display());
        }

        // 2. Check ./shade.toml (current directory)
        let local_path = PathBuf::from(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Some(local_path);
        }

        // 3. Check ~/.shade/config.toml
        Self::default_config_path().filter(|p| p.exists())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(&|key| env::var(key).ok());
    }

    /// Apply `SHADE_*` overrides from an arbitrary variable source
    pub fn apply_overrides(&mut self, vars: Vars<'_>) {
        // Pool
        env_string(vars, "SHADE_NOTE_PREFIX", &mut self.pool.note_prefix);
        env_string(vars, "SHADE_ASSET", &mut self.pool.asset);
        env_string(vars, "SHADE_DENOMINATION", &mut self.pool.denomination);
        env_parse(vars, "SHADE_NETWORK_ID", &mut self.pool.network_id);

        // Tree
        env_parse(vars, "SHADE_TREE_HEIGHT", &mut self.tree.height);

        // Prover
        env_option_string(vars, "SHADE_CIRCUIT", &mut self.prover.circuit_path);
        env_option_string(vars, "SHADE_PROVING_KEY", &mut self.prover.proving_key_path);

        // Ledger
        env_string(vars, "SHADE_LEDGER_PATH", &mut self.ledger.state_path);
        env_parse(vars, "SHADE_ROOT_HISTORY", &mut self.ledger.root_history);

        // Retry
        env_parse(vars, "SHADE_MAX_RETRIES", &mut self.retry.max_retries);
        env_parse(vars, "SHADE_RETRY_BASE_MS", &mut self.retry.base_delay_ms);
    }

    /// Reject values no pool can run with
    pub fn validate(&self) -> Result<()> {
        if self.tree.height == 0 || self.tree.height > MAX_TREE_HEIGHT {
            bail!(
                "tree.height must be between 1 and {MAX_TREE_HEIGHT}, got {}",
                self.tree.height
            );
        }
        if self.ledger.root_history == 0 || self.ledger.root_history > MAX_ROOT_HISTORY {
            bail!(
                "ledger.root_history must be between 1 and {MAX_ROOT_HISTORY}, got {}",
                self.ledger.root_history
            );
        }
        if self.pool.asset.is_empty() || self.pool.denomination.is_empty() {
            bail!("pool.asset and pool.denomination must be set");
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(CONFIG_DIR_NAME).join(HOME_CONFIG_FILE_NAME))
    }

    /// Generate a sample config file
    pub fn generate_sample() -> String {
        let mut sample = Self::default();
        sample.prover.circuit_path = Some("./artifacts/withdraw.json".into());
        sample.prover.proving_key_path = Some("./artifacts/withdraw_proving_key.bin".into());
        toml::to_string_pretty(&sample).unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
