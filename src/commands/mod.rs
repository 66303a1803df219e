pub mod config;
pub mod declarative;
pub mod doctor;
pub mod secret;

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::config as desired;
use crate::paths::Paths;
use crate::schema::AgeConfig;
use crate::secret::KeySources;

/// Ask a yes/no question; without a terminal the default is taken
pub(crate) fn confirm(prompt: &str, default: bool) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        log::debug!("stdin is not a terminal, answering {default} to: {prompt}");
        return Ok(default);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("Failed to read confirmation")
}

/// Key sources for the decrypt commands
///
/// A set environment source wins outright; `age.toml` is read only when
/// none is set.
pub(crate) fn decrypt_key_sources(paths: &Paths) -> Result<KeySources> {
    let env = KeySources::from_env();
    if !env.is_empty() {
        return Ok(env);
    }
    let hints = desired::load_hints(paths)?;
    Ok(KeySources::from_age_config(&hints))
}

/// Recipient from `age.toml`; key-source hints in the file are ignored
pub(crate) fn recipient_hint(paths: &Paths) -> Result<AgeConfig> {
    Ok(AgeConfig {
        public_key: desired::load_hints(paths)?.public_key,
        ..AgeConfig::default()
    })
}

/// Temporary file next to `target`, renamed into place by the caller
pub(crate) fn sibling_temp(target: &Path) -> Result<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    tempfile::Builder::new()
        .prefix(".keel-")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))
}
