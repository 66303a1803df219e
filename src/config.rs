//! Desired-state document loading
//!
//! `config.toml` is used when present; otherwise `config.toml.age` is
//! decrypted through the config cache with key sources from the environment.

use anyhow::{Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::KeelError;
use crate::paths::{self, Paths};
use crate::runner::Runner;
use crate::schema::{AgeConfig, DesiredState};
use crate::secret::{ConfigCache, Decryptor, KeySources, Vault, resolve_key};

/// Which document a run reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Plaintext(PathBuf),
    Encrypted(PathBuf),
}

impl ConfigSource {
    /// Locate the document; plaintext wins when both exist
    pub fn locate(paths: &Paths) -> std::result::Result<Self, KeelError> {
        let plaintext = paths.config_file();
        if plaintext.is_file() {
            return Ok(Self::Plaintext(plaintext));
        }
        let encrypted = paths.encrypted_config_file();
        if encrypted.is_file() {
            return Ok(Self::Encrypted(encrypted));
        }
        Err(KeelError::config(format!(
            "no configuration found in {} (expected {} or {})",
            paths.config_dir.display(),
            paths::CONFIG_FILE,
            paths::ENCRYPTED_CONFIG_FILE
        )))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Plaintext(path) | Self::Encrypted(path) => path,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plaintext(path) => write!(f, "{}", path.display()),
            Self::Encrypted(path) => write!(f, "{} (encrypted)", path.display()),
        }
    }
}

/// Load and normalize the desired state
pub fn load(
    paths: &Paths,
    runner: &dyn Runner,
    vault: &dyn Vault,
    decryptor: &dyn Decryptor,
) -> Result<DesiredState> {
    let source = ConfigSource::locate(paths)?;
    log::debug!("Loading configuration from {source}");

    let content = match &source {
        ConfigSource::Plaintext(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        ConfigSource::Encrypted(path) => {
            let cache = ConfigCache::new(paths, runner);
            cache.load_plaintext(
                path,
                || resolve_key(&KeySources::from_env(), vault),
                decryptor,
            )?
        }
    };

    let state = DesiredState::parse(&content, &paths.config_dir, &paths.home)?;
    Ok(state)
}

/// Read key-source hints from the plaintext bootstrap document
///
/// A missing file yields empty hints.
pub fn load_hints(paths: &Paths) -> Result<AgeConfig> {
    let path = paths.hints_file();
    if !path.exists() {
        return Ok(AgeConfig::default());
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut hints: AgeConfig = toml::from_str(&content)
        .map_err(|e| KeelError::config(format!("{}: {e}", path.display())))?;
    hints.key_file = hints
        .key_file
        .map(|p| paths::resolve(&p.to_string_lossy(), &paths.config_dir));
    Ok(hints)
}
