//! Centralized path resolution for keel
//!
//! This module provides platform-aware path resolution with environment variable
//! support, so the configuration can live inside a dotfiles repository.
//!
//! # Environment Variables
//!
//! - `KEEL_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/keel`)
//! - `KEEL_CACHE_DIR` - Override cache directory (decrypted config cache)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `KEEL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/keel` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\keel`
//!    - macOS/Linux: `~/.config/keel`
//!
//! For cache_dir():
//! 1. `KEEL_CACHE_DIR` environment variable
//! 2. `XDG_CACHE_HOME/keel` (if set)
//! 3. Platform default (`dirs::cache_dir()/keel`)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "KEEL_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "KEEL_CACHE_DIR";

/// Plaintext desired-state document
pub const CONFIG_FILE: &str = "config.toml";

/// Encrypted desired-state document
pub const ENCRYPTED_CONFIG_FILE: &str = "config.toml.age";

/// Plaintext bootstrap hints read by `config decrypt`
pub const HINTS_FILE: &str = "age.toml";

/// Ledger of self-managed items
pub const STATE_FILE: &str = "state.json";

/// Get the keel config directory path
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("keel");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Platform default
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("keel");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    // Unix default: ~/.config/keel
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("keel");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the keel cache directory path
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
        let path = expand(&dir);
        log::debug!("Using cache dir from {}: {}", ENV_CACHE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        let path = PathBuf::from(xdg_cache).join("keel");
        log::debug!("Using XDG_CACHE_HOME: {}", path.display());
        return Ok(path);
    }

    let base = dirs::cache_dir().context("Could not determine cache directory")?;
    let path = base.join("keel");
    log::debug!("Using default cache dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for keel. All modules
/// should use this instead of calling shellexpand directly.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a path and resolve it against `base` when relative
pub fn resolve(path: &str, base: &Path) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// All file locations used in one invocation
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub home: PathBuf,
}

impl Paths {
    /// Resolve locations from the environment
    pub fn resolve() -> Result<Self> {
        Ok(Self {
            config_dir: config_dir()?,
            cache_dir: cache_dir()?,
            home: dirs::home_dir().context("Could not determine home directory")?,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn encrypted_config_file(&self) -> PathBuf {
        self.config_dir.join(ENCRYPTED_CONFIG_FILE)
    }

    pub fn hints_file(&self) -> PathBuf {
        self.config_dir.join(HINTS_FILE)
    }

    pub fn state_file(&self) -> PathBuf {
        self.config_dir.join(STATE_FILE)
    }

    /// Decrypted copy of the encrypted config
    pub fn cached_config(&self) -> PathBuf {
        self.cache_dir.join(CONFIG_FILE)
    }

    /// Hex SHA-256 of the ciphertext the cached copy was produced from
    pub fn cached_config_hash(&self) -> PathBuf {
        self.cache_dir.join(format!("{CONFIG_FILE}.sha256"))
    }

    /// Default location for a generated age identity
    pub fn default_key_file(&self) -> PathBuf {
        self.config_dir.join("key.txt")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::env;
    use std::sync::{Mutex, PoisonError};

    /// Serializes every test that edits the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    thread_local! {
        /// Nesting depth of the helpers on this thread; only the outermost locks
        static ENV_DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    /// Run `f` holding `ENV_LOCK`, re-entrant for nested helper calls
    fn serialized<R>(f: impl FnOnce() -> R) -> R {
        let outermost = ENV_DEPTH.with(|d| d.get() == 0);
        let _guard = outermost.then(|| ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner));
        ENV_DEPTH.with(|d| d.set(d.get() + 1));
        let result = f();
        ENV_DEPTH.with(|d| d.set(d.get() - 1));
        result
    }

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var. Callers are
    /// serialized through `ENV_LOCK`, so tests that touch the environment
    /// only through these helpers never race each other.
    pub(crate) fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        serialized(|| {
            let original = env::var(key).ok();
            // SAFETY: ENV_LOCK is held
            unsafe { env::set_var(key, value) };
            let result = f();
            match original {
                // SAFETY: ENV_LOCK is held
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
            result
        })
    }

    /// Helper to run a test with env var removed
    pub(crate) fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        serialized(|| {
            let original = env::var(key).ok();
            // SAFETY: ENV_LOCK is held
            unsafe { env::remove_var(key) };
            let result = f();
            if let Some(v) = original {
                // SAFETY: ENV_LOCK is held
                unsafe { env::set_var(key, v) };
            }
            result
        })
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/config/path", || {
            let result = config_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/config/path"));
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        let expected = home.join("dotfiles").join("keel-tilde-test");
        with_env_var(ENV_CONFIG_DIR, "~/dotfiles/keel-tilde-test", || {
            let result = config_dir().unwrap();
            assert_eq!(result, expected);
        });
    }

    #[test]
    fn test_cache_dir_env_override() {
        with_env_var(ENV_CACHE_DIR, "/custom/cache/path", || {
            let result = cache_dir().unwrap();
            assert_eq!(result, PathBuf::from("/custom/cache/path"));
        });
    }

    #[test]
    fn test_xdg_cache_home() {
        without_env_var(ENV_CACHE_DIR, || {
            with_env_var("XDG_CACHE_HOME", "/tmp/xdg-cache-test", || {
                let result = cache_dir().unwrap();
                assert_eq!(result, PathBuf::from("/tmp/xdg-cache-test/keel"));
            });
        });
    }

    #[test]
    fn test_nested_helpers_do_not_deadlock() {
        let seen = with_env_var(ENV_CONFIG_DIR, "/nested/a", || {
            without_env_var(ENV_CACHE_DIR, || {
                with_env_var(ENV_CACHE_DIR, "/nested/b", || (config_dir().unwrap(), cache_dir().unwrap()))
            })
        });
        assert_eq!(seen, (PathBuf::from("/nested/a"), PathBuf::from("/nested/b")));
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let base = Path::new("/base/dir");
        assert_eq!(resolve("secrets/a.age", base), PathBuf::from("/base/dir/secrets/a.age"));
        assert_eq!(resolve("/abs/a.age", base), PathBuf::from("/abs/a.age"));
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths {
            config_dir: PathBuf::from("/cfg"),
            cache_dir: PathBuf::from("/cache"),
            home: PathBuf::from("/home/u"),
        };
        assert_eq!(paths.state_file(), PathBuf::from("/cfg/state.json"));
        assert_eq!(paths.encrypted_config_file(), PathBuf::from("/cfg/config.toml.age"));
        assert_eq!(paths.cached_config_hash(), PathBuf::from("/cache/config.toml.sha256"));
    }
}
