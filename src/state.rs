//! Ledger of self-managed items
//!
//! Every entry records something keel created or adopted, so later runs can
//! remove it once it disappears from the configuration. The file is JSON with
//! a schema version; a missing or unreadable file starts an empty ledger,
//! a different version refuses to run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::KeelError;
use crate::schema::{Position, Scoped};

/// Ledger schema version written by this build
pub const LEDGER_VERSION: u32 = 1;

// ============================================================================
// Ledger Structures
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Ledger {
    pub version: u32,

    /// Tilde-relative target paths; directories end with `/`
    #[serde(default)]
    pub dotfiles: BTreeSet<String>,

    /// Variable names per scope
    #[serde(default)]
    pub environment: Scoped<BTreeSet<String>>,

    /// PATH entries per scope and position
    #[serde(default)]
    pub path: Scoped<PathEntries>,

    /// Deployed secrets keyed by tilde-relative target path
    #[serde(default)]
    pub encrypted_files: BTreeMap<String, EncryptedFileRecord>,

    /// Items installed by each task
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PathEntries {
    #[serde(default)]
    pub prepend: BTreeSet<String>,
    #[serde(default)]
    pub append: BTreeSet<String>,
}

impl PathEntries {
    pub fn get(&self, position: Position) -> &BTreeSet<String> {
        match position {
            Position::Prepend => &self.prepend,
            Position::Append => &self.append,
        }
    }

    pub fn get_mut(&mut self, position: Position) -> &mut BTreeSet<String> {
        match position {
            Position::Prepend => &mut self.prepend,
            Position::Append => &mut self.append,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EncryptedFileRecord {
    /// Hex SHA-256 of the ciphertext that was deployed
    pub source_hash: String,
    /// Hex SHA-256 of the plaintext written to the target
    pub target_hash: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TaskRecord {
    #[serde(default)]
    pub items: BTreeSet<String>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            dotfiles: BTreeSet::new(),
            environment: Scoped::default(),
            path: Scoped::default(),
            encrypted_files: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Ledger Implementation
// ============================================================================

impl Ledger {
    /// Parse ledger content
    ///
    /// Empty or malformed content, or a missing version, yields
    /// [`KeelError::StateCorrupted`]; any version other than
    /// [`LEDGER_VERSION`] yields [`KeelError::StateVersionMismatch`].
    pub fn parse(content: &str) -> std::result::Result<Self, KeelError> {
        let corrupted = |reason: String| KeelError::StateCorrupted { reason };

        if content.trim().is_empty() {
            return Err(corrupted("file is empty".to_string()));
        }

        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| corrupted(e.to_string()))?;

        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| corrupted("missing schema version".to_string()))?;

        if version != u64::from(LEDGER_VERSION) {
            return Err(KeelError::StateVersionMismatch {
                found: version,
                supported: LEDGER_VERSION,
            });
        }

        serde_json::from_value(value).map_err(|e| corrupted(e.to_string()))
    }

    /// Load the ledger, or return an empty one if the file is missing or corrupted
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty ledger");
            return Ok(Self::default());
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to read state file {}: {e}", path.display());
                crate::ui::warn(&format!(
                    "State file {} is unreadable, starting with an empty ledger",
                    path.display()
                ));
                return Ok(Self::default());
            }
        };

        match Self::parse(&content) {
            Ok(ledger) => {
                log::debug!("Loaded state from {}", path.display());
                Ok(ledger)
            }
            Err(e @ KeelError::StateCorrupted { .. }) => {
                log::warn!("{e}");
                crate::ui::warn(&format!("{e}; starting with an empty ledger"));
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save the ledger atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .context("State file path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;

        let content = serde_json::to_string_pretty(self).context("Failed to serialize state")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write state")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    /// Items recorded for a task
    pub fn task_items(&self, name: &str) -> BTreeSet<String> {
        self.tasks
            .get(name)
            .map(|t| t.items.clone())
            .unwrap_or_default()
    }

    /// Replace the items recorded for a task; empty sets drop the entry
    pub fn set_task_items(&mut self, name: &str, items: BTreeSet<String>) {
        if items.is_empty() {
            self.tasks.remove(name);
        } else {
            self.tasks.insert(name.to_string(), TaskRecord { items });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
