//! Cache configuration.
//!
//! Configuration is plain data that can be deserialized from JSON and then
//! adjusted from the environment:
//!
//! ```json
//! {
//!   "policy": "cache-first",
//!   "store": { "backend": "directory", "root": "./cache" },
//!   "max_head_size": 65536,
//!   "user_agent": "my-tool/1.0"
//! }
//! ```
//!
//! | Variable            | Overrides                                  |
//! |---------------------|--------------------------------------------|
//! | `HTTPCACHE_POLICY`  | `policy`                                   |
//! | `HTTPCACHE_BACKEND` | `store.backend` (`directory` or `memory`)  |
//! | `HTTPCACHE_DIR`     | `store.root` (selects the directory store) |

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::policy::{PolicyKind, UnknownPolicy};
use crate::store::{DirStore, MemoryStore, Store};
use crate::transport::DEFAULT_MAX_HEAD_SIZE;

/// Environment variable overriding [`CacheConfig::policy`].
pub const ENV_POLICY: &str = "HTTPCACHE_POLICY";
/// Environment variable overriding the store backend.
pub const ENV_BACKEND: &str = "HTTPCACHE_BACKEND";
/// Environment variable overriding the directory store root.
pub const ENV_DIR: &str = "HTTPCACHE_DIR";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Policy(#[from] UnknownPolicy),

    #[error("unknown store backend: {0:?} (expected directory or memory)")]
    Backend(String),
}

/// Which [`Store`] backs the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum StoreConfig {
    /// One file per key under `root`.
    Directory {
        #[serde(default = "default_root")]
        root: PathBuf,
    },
    /// Process memory only.
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Directory {
            root: default_root(),
        }
    }
}

/// Top-level cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Read/write policy.
    #[serde(default)]
    pub policy: PolicyKind,

    /// Store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Largest response head the built-in transport accepts.
    #[serde(default = "default_max_head_size")]
    pub max_head_size: usize,

    /// `User-Agent` sent by the built-in transport.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            store: StoreConfig::default(),
            max_head_size: default_max_head_size(),
            user_agent: None,
        }
    }
}

impl CacheConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default configuration with the process environment applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides looked up through `var`.
    ///
    /// The backend is applied before the directory, so `HTTPCACHE_DIR` alone
    /// switches to (or stays on) the directory store.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        if let Some(policy) = lookup(ENV_POLICY) {
            self.policy = policy.parse()?;
        }
        if let Some(backend) = lookup(ENV_BACKEND) {
            self.store = match backend.trim().to_ascii_lowercase().as_str() {
                "directory" | "dir" => match &self.store {
                    StoreConfig::Directory { .. } => self.store.clone(),
                    StoreConfig::Memory => StoreConfig::default(),
                },
                "memory" => StoreConfig::Memory,
                _ => return Err(ConfigError::Backend(backend)),
            };
        }
        if let Some(dir) = lookup(ENV_DIR) {
            self.store = StoreConfig::Directory {
                root: PathBuf::from(dir),
            };
        }
        Ok(())
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }

    /// Selects the directory store rooted at `root`.
    #[must_use]
    pub fn with_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.store = StoreConfig::Directory { root: root.into() };
        self
    }

    /// Selects the in-memory store.
    #[must_use]
    pub fn with_memory(mut self) -> Self {
        self.store = StoreConfig::Memory;
        self
    }

    /// Builds the configured store.
    pub fn build_store(&self) -> Arc<dyn Store> {
        match &self.store {
            StoreConfig::Directory { root } => Arc::new(DirStore::new(root.clone())),
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./")
}

fn default_max_head_size() -> usize {
    DEFAULT_MAX_HEAD_SIZE
}
