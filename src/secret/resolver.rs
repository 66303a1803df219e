//! Age secret-key resolution
//!
//! Sources are tried in a fixed order: an explicit key value, a key file,
//! then a named vault item. The first configured source decides the outcome;
//! a configured source that fails does not fall through to the next one.

use regex::Regex;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use super::vault::Vault;
use crate::error::KeelError;
use crate::paths;
use crate::schema::AgeConfig;

/// Explicit key value
pub const ENV_AGE_KEY: &str = "KEEL_AGE_KEY";

/// Path to an identity file
pub const ENV_AGE_KEY_FILE: &str = "KEEL_AGE_KEY_FILE";

/// Vault item holding the key
pub const ENV_BW_ITEM: &str = "KEEL_BW_ITEM";

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^AGE-SECRET-KEY-1[0-9A-Z]+$").expect("key pattern is valid"));

/// Check whether a trimmed line is an age secret key
pub fn is_secret_key(line: &str) -> bool {
    KEY_PATTERN.is_match(line.trim())
}

/// First line of `text` that is a secret key
pub fn find_key_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|line| KEY_PATTERN.is_match(line))
}

/// A resolved age identity; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn parse(value: &str) -> Result<Self, KeelError> {
        let value = value.trim();
        if is_secret_key(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(KeelError::secret(
                "value is not an age secret key (expected AGE-SECRET-KEY-1...)",
            ))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Configured key sources, highest precedence first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySources {
    pub key: Option<String>,
    pub key_file: Option<PathBuf>,
    pub vault_item: Option<String>,
}

impl KeySources {
    /// Sources from `KEEL_AGE_KEY`, `KEEL_AGE_KEY_FILE` and `KEEL_BW_ITEM`
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            key: var(ENV_AGE_KEY),
            key_file: var(ENV_AGE_KEY_FILE).map(|p| paths::expand(&p)),
            vault_item: var(ENV_BW_ITEM),
        }
    }

    /// Sources from an `[age]` table
    pub fn from_age_config(age: &AgeConfig) -> Self {
        Self {
            key: None,
            key_file: age.key_file.clone(),
            vault_item: age.bitwarden_item.clone(),
        }
    }

    /// These sources, or `other` when none is set here
    ///
    /// Sources are never merged field by field: one configured source here
    /// hides every source in `other`.
    pub fn with_fallback(self, other: Self) -> Self {
        if self.is_empty() { other } else { self }
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.key_file.is_none() && self.vault_item.is_none()
    }

    /// Whether resolution would call the vault
    pub fn uses_vault(&self) -> bool {
        self.key.is_none() && self.key_file.is_none() && self.vault_item.is_some()
    }
}

/// Resolve the secret key from the first configured source
pub fn resolve_key(sources: &KeySources, vault: &dyn Vault) -> Result<SecretKey, KeelError> {
    if let Some(value) = &sources.key {
        log::debug!("Using age key from {ENV_AGE_KEY}");
        return SecretKey::parse(value).map_err(|_| {
            KeelError::secret_with_hint(
                format!("{ENV_AGE_KEY} does not contain an age secret key"),
                "The value must start with AGE-SECRET-KEY-1",
            )
        });
    }

    if let Some(path) = &sources.key_file {
        log::debug!("Reading age key from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| {
            KeelError::secret_with_hint(
                format!("cannot read key file {}: {e}", path.display()),
                format!("Create one with `keel secret keygen {}`", path.display()),
            )
        })?;
        return find_key_line(&content)
            .map(|line| SecretKey(line.to_string()))
            .ok_or_else(|| {
                KeelError::secret(format!("no age secret key found in {}", path.display()))
            });
    }

    if let Some(item) = &sources.vault_item {
        log::debug!("Fetching age key from vault item {item:?}");
        return vault.fetch_key(item);
    }

    Err(KeelError::secret_with_hint(
        "no key source configured",
        format!(
            "Set {ENV_AGE_KEY} to the key, {ENV_AGE_KEY_FILE} to an identity file, \
             or {ENV_BW_ITEM} to a Bitwarden item holding the key"
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::tests::{with_env_var, without_env_var};
    use crate::secret::vault::fake::FakeVault;
    use tempfile::TempDir;

    const KEY: &str = "AGE-SECRET-KEY-1QQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQQ";

    #[test]
    fn test_key_pattern() {
        assert!(is_secret_key(KEY));
        assert!(is_secret_key(&format!("  {KEY}\n")));
        assert!(!is_secret_key("age1qqqq"));
        assert!(!is_secret_key("AGE-SECRET-KEY-1lowercase"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let tmp = TempDir::new().unwrap();
        let sources = KeySources {
            key: Some(KEY.to_string()),
            key_file: Some(tmp.path().join("missing.txt")),
            vault_item: Some("item".to_string()),
        };
        let vault = FakeVault::default();
        let key = resolve_key(&sources, &vault).unwrap();
        assert_eq!(key.expose(), KEY);
        assert_eq!(vault.fetches.get(), 0);
    }

    #[test]
    fn test_invalid_explicit_key() {
        let sources = KeySources {
            key: Some("not-a-key".to_string()),
            ..Default::default()
        };
        let err = resolve_key(&sources, &FakeVault::default()).unwrap_err();
        assert!(matches!(err, KeelError::SecretResolution { .. }));
    }

    #[test]
    fn test_key_file_first_matching_line() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.txt");
        fs::write(
            &path,
            format!("# created: 2024-01-01\n# public key: age1abc\n{KEY}\n"),
        )
        .unwrap();

        let sources = KeySources {
            key_file: Some(path),
            ..Default::default()
        };
        assert_eq!(resolve_key(&sources, &FakeVault::default()).unwrap().expose(), KEY);
    }

    #[test]
    fn test_key_file_without_key() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("key.txt");
        fs::write(&path, "# nothing here\n").unwrap();
        let sources = KeySources {
            key_file: Some(path),
            ..Default::default()
        };
        assert!(resolve_key(&sources, &FakeVault::default()).is_err());
    }

    #[test]
    fn test_vault_source() {
        let vault = FakeVault::with_key(KEY);
        let sources = KeySources {
            vault_item: Some("keel age key".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_key(&sources, &vault).unwrap().expose(), KEY);
        assert_eq!(vault.fetches.get(), 1);
    }

    #[test]
    fn test_no_source_hint_names_all_mechanisms() {
        let err = resolve_key(&KeySources::default(), &FakeVault::default()).unwrap_err();
        let hint = err.hint().unwrap();
        assert!(hint.contains(ENV_AGE_KEY));
        assert!(hint.contains(ENV_AGE_KEY_FILE));
        assert!(hint.contains(ENV_BW_ITEM));
    }

    #[test]
    fn test_env_source_hides_document_sources() {
        let age = AgeConfig {
            public_key: None,
            key_file: Some(PathBuf::from("/doc/key.txt")),
            bitwarden_item: Some("doc item".to_string()),
        };
        let sources = with_env_var(ENV_BW_ITEM, "env item", || {
            without_env_var(ENV_AGE_KEY, || {
                without_env_var(ENV_AGE_KEY_FILE, || {
                    KeySources::from_env().with_fallback(KeySources::from_age_config(&age))
                })
            })
        });
        assert_eq!(sources.vault_item.as_deref(), Some("env item"));
        assert_eq!(sources.key_file, None);
        assert!(sources.uses_vault());
    }

    #[test]
    fn test_document_sources_used_without_env() {
        let age = AgeConfig {
            public_key: None,
            key_file: Some(PathBuf::from("/doc/key.txt")),
            bitwarden_item: Some("doc item".to_string()),
        };
        let sources = KeySources::default().with_fallback(KeySources::from_age_config(&age));
        assert_eq!(sources.key_file, Some(PathBuf::from("/doc/key.txt")));
        assert_eq!(sources.vault_item.as_deref(), Some("doc item"));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::parse(KEY).unwrap();
        assert!(!format!("{key:?}").contains("AGE-SECRET"));
    }
}
