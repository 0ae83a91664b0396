//! Store configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Extension appended to a bare database name.
pub const DEFAULT_EXTENSION: &str = "redb";

/// How hard a commit works to reach stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityMode {
    /// Every commit is persisted before it returns (safest).
    #[default]
    Immediate,
    /// Commits are persisted by a later durable commit or on close.
    Eventual,
    /// Commits are never explicitly persisted (tests, scratch databases).
    None,
}

impl From<DurabilityMode> for redb::Durability {
    fn from(mode: DurabilityMode) -> Self {
        match mode {
            DurabilityMode::Immediate => redb::Durability::Immediate,
            DurabilityMode::Eventual => redb::Durability::Eventual,
            DurabilityMode::None => redb::Durability::None,
        }
    }
}

/// Configuration for [`Store::open`](crate::Store::open).
///
/// ```toml
/// path = "data/parlor"
/// durability = "eventual"
/// cache_size = 67108864
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. A bare name with no extension that does not exist on
    /// disk gets `.redb` appended.
    pub path: PathBuf,
    /// Commit durability.
    pub durability: DurabilityMode,
    /// Page cache size in bytes (engine default when unset).
    pub cache_size: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("parlor"),
            durability: DurabilityMode::default(),
            cache_size: None,
        }
    }
}

impl StoreConfig {
    /// Default configuration for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn from_toml(text: &str) -> StoreResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// The file the store actually opens.
    pub fn resolved_path(&self) -> PathBuf {
        let has_extension = self
            .path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().contains('.'));
        if has_extension || self.path.exists() {
            self.path.clone()
        } else {
            self.path.with_extension(DEFAULT_EXTENSION)
        }
    }
}
