//! Configuration types for Sigil.

use crate::error::SigilError;
use crate::Result;
use serde::{Deserialize, Serialize};
use sigil_signature::{MasterKey, RetryPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the Sigil node service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigilConfig {
    /// Node catalog configuration.
    pub catalog: CatalogConfig,

    /// Signature store configuration.
    pub signature: SignatureConfig,

    /// Master key sourcing.
    pub crypto: CryptoConfig,
}

impl SigilConfig {
    /// Loads a configuration from a TOML file. Missing keys take defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SigilError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SigilError::Config(format!("invalid config: {}", e)))
    }
}

/// Node catalog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory holding one definition file per node type.
    pub definitions_dir: PathBuf,

    /// Concurrent file loads during a rebuild.
    pub scan_workers: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("./nodes"),
            scan_workers: 4,
        }
    }
}

/// Signature store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Root directory of per-user documents.
    pub store_dir: PathBuf,

    /// User whose signature the service reconciles after a rebuild.
    pub default_user: String,

    /// Bounded wait for a user's lock.
    pub lock_timeout_ms: u64,

    /// Retries after a lock timeout.
    pub max_retries: u32,

    /// Linear backoff step between retries.
    pub retry_backoff_ms: u64,
}

impl SignatureConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./signatures"),
            default_user: "default".to_string(),
            lock_timeout_ms: 2000,
            max_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

/// Where the master key comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Environment variable holding a passphrase.
    pub key_env: String,

    /// File holding 32 raw key bytes, or any content to be hashed.
    /// Takes precedence over `key_env`.
    pub key_file: Option<PathBuf>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_env: "SIGIL_MASTER_KEY".to_string(),
            key_file: None,
        }
    }
}

impl CryptoConfig {
    /// Resolves the master key.
    ///
    /// # Errors
    ///
    /// `Config` if the key file is unreadable or empty, or if neither source
    /// is set.
    pub fn load_master_key(&self) -> Result<MasterKey> {
        if let Some(path) = &self.key_file {
            let material = std::fs::read(path).map_err(|e| {
                SigilError::Config(format!("cannot read key file {}: {}", path.display(), e))
            })?;
            if material.is_empty() {
                return Err(SigilError::Config(format!(
                    "key file {} is empty",
                    path.display()
                )));
            }
            return Ok(MasterKey::from_material(&material));
        }

        match std::env::var(&self.key_env) {
            Ok(passphrase) if !passphrase.is_empty() => {
                Ok(MasterKey::from_passphrase(passphrase.as_bytes()))
            }
            _ => Err(SigilError::Config(format!(
                "no master key: set {} or crypto.key_file",
                self.key_env
            ))),
        }
    }
}
