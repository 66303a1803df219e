//! Desired-state document schema and normalization
//!
//! The TOML loader yields a generic value tree. Heterogeneous list entries
//! (`"git"`, `"nodejs@20.10.0"`, `{ python = "3.12.1" }`) are decoded into
//! tagged records here, paths are expanded and resolved, and the result is
//! an immutable [`DesiredState`] for the run.

use pkgkit::{Bucket, Package};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::KeelError;
use crate::paths;
use crate::resource::acl::AclSpec;

// ============================================================================
// Scopes
// ============================================================================

/// Environment scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    User,
    Machine,
}

impl Scope {
    pub const ALL: [Self; 2] = [Self::User, Self::Machine];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Machine => "machine",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a PATH entry is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    Prepend,
    Append,
}

impl Position {
    pub const ALL: [Self; 2] = [Self::Prepend, Self::Append];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepend => "prepend",
            Self::Append => "append",
        }
    }
}

/// A value per environment scope
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Scoped<T> {
    #[serde(default)]
    pub user: T,
    #[serde(default)]
    pub machine: T,
}

impl<T> Scoped<T> {
    pub fn get(&self, scope: Scope) -> &T {
        match scope {
            Scope::User => &self.user,
            Scope::Machine => &self.machine,
        }
    }

    pub fn get_mut(&mut self, scope: Scope) -> &mut T {
        match scope {
            Scope::User => &mut self.user,
            Scope::Machine => &mut self.machine,
        }
    }
}

// ============================================================================
// Desired State
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    pub scoop: ScoopConfig,
    pub winget: WingetConfig,
    pub dotfiles: Option<DotfilesConfig>,
    pub environment: Scoped<BTreeMap<String, String>>,
    pub path: Scoped<PathConfig>,
    pub age: AgeConfig,
    pub encrypted_files: Vec<EncryptedFile>,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoopConfig {
    pub buckets: Vec<Bucket>,
    pub apps: Vec<Package>,
}

#[derive(Debug, Clone, Default)]
pub struct WingetConfig {
    pub apps: Vec<Package>,
}

#[derive(Debug, Clone)]
pub struct DotfilesConfig {
    pub source: PathBuf,
    pub target: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    pub prepend: Vec<String>,
    #[serde(default)]
    pub append: Vec<String>,
}

impl PathConfig {
    pub fn entries(&self, position: Position) -> &[String] {
        match position {
            Position::Prepend => &self.prepend,
            Position::Append => &self.append,
        }
    }
}

/// Key source hints and the encryption recipient
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgeConfig {
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub bitwarden_item: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EncryptedFile {
    pub source: PathBuf,
    pub target: PathBuf,
    pub acl: Option<AclSpec>,
}

#[derive(Debug, Clone)]
pub struct TaskConfig {
    pub name: String,
    pub config: toml::Value,
}

// ============================================================================
// Raw Document
// ============================================================================

/// A list entry: bare string or a single `name = value` pair
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Pair(BTreeMap<String, String>),
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    scoop: RawScoop,
    #[serde(default)]
    winget: RawWinget,
    #[serde(default)]
    dotfiles: Option<RawDotfiles>,
    #[serde(default)]
    environment: Scoped<BTreeMap<String, toml::Value>>,
    #[serde(default)]
    path: Scoped<PathConfig>,
    #[serde(default)]
    age: AgeConfig,
    #[serde(default)]
    encrypted_files: Vec<RawEncryptedFile>,
    #[serde(default)]
    tasks: toml::Table,
}

#[derive(Debug, Default, Deserialize)]
struct RawScoop {
    #[serde(default)]
    buckets: Vec<RawEntry>,
    #[serde(default)]
    apps: Vec<RawEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWinget {
    #[serde(default)]
    apps: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawDotfiles {
    source: String,
    #[serde(default = "default_dotfiles_target")]
    target: String,
}

fn default_dotfiles_target() -> String {
    "~".to_string()
}

#[derive(Debug, Deserialize)]
struct RawEncryptedFile {
    source: String,
    target: String,
    #[serde(default)]
    acl: Option<toml::Value>,
}

// ============================================================================
// Normalization
// ============================================================================

impl DesiredState {
    /// Parse and normalize a TOML document
    ///
    /// Relative sources resolve against `base_dir`, relative targets against `home`.
    pub fn parse(content: &str, base_dir: &Path, home: &Path) -> Result<Self, KeelError> {
        let value: toml::Value = toml::from_str::<toml::Table>(content)
            .map(toml::Value::Table)
            .map_err(|e| KeelError::config(e.to_string()))?;
        Self::from_value(value, base_dir, home)
    }

    /// Normalize an already-parsed value tree
    pub fn from_value(value: toml::Value, base_dir: &Path, home: &Path) -> Result<Self, KeelError> {
        let raw: RawDocument = value
            .try_into()
            .map_err(|e: toml::de::Error| KeelError::config(e.to_string()))?;

        let buckets = raw
            .scoop
            .buckets
            .into_iter()
            .map(|entry| {
                let (name, url) = entry.into_pair("scoop.buckets")?;
                Ok(Bucket { name, url })
            })
            .collect::<Result<Vec<_>, KeelError>>()?;

        let scoop_apps = normalize_packages(raw.scoop.apps, "scoop.apps")?;
        let winget_apps = normalize_packages(raw.winget.apps, "winget.apps")?;

        let dotfiles = raw.dotfiles.map(|d| DotfilesConfig {
            source: paths::resolve(&d.source, base_dir),
            target: paths::resolve(&d.target, home),
        });

        let environment = Scoped {
            user: normalize_env(raw.environment.user, "environment.user")?,
            machine: normalize_env(raw.environment.machine, "environment.machine")?,
        };

        let mut age = raw.age;
        age.key_file = age
            .key_file
            .map(|p| paths::resolve(&p.to_string_lossy(), base_dir));

        let encrypted_files = raw
            .encrypted_files
            .into_iter()
            .map(|f| {
                let acl = f.acl.as_ref().map(AclSpec::from_value).transpose()?;
                Ok(EncryptedFile {
                    source: paths::resolve(&f.source, base_dir),
                    target: paths::resolve(&f.target, home),
                    acl,
                })
            })
            .collect::<Result<Vec<_>, KeelError>>()?;

        let tasks = raw
            .tasks
            .into_iter()
            .map(|(name, config)| TaskConfig { name, config })
            .collect();

        Ok(Self {
            scoop: ScoopConfig {
                buckets,
                apps: scoop_apps,
            },
            winget: WingetConfig { apps: winget_apps },
            dotfiles,
            environment,
            path: raw.path,
            age,
            encrypted_files,
            tasks,
        })
    }
}

impl RawEntry {
    /// Decode into `(name, value)`
    fn into_pair(self, field: &str) -> Result<(String, Option<String>), KeelError> {
        let (name, value) = match self {
            Self::Name(name) => (name, None),
            Self::Pair(map) => {
                if map.len() != 1 {
                    return Err(KeelError::config(format!(
                        "{field}: expected a name or a single `name = value` pair, found {} keys",
                        map.len()
                    )));
                }
                let Some((name, value)) = map.into_iter().next() else {
                    return Err(KeelError::config(format!("{field}: empty entry")));
                };
                (name, Some(value))
            }
        };

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(KeelError::config(format!("{field}: empty name")));
        }
        Ok((name, value.filter(|v| !v.trim().is_empty())))
    }
}

fn normalize_packages(entries: Vec<RawEntry>, field: &str) -> Result<Vec<Package>, KeelError> {
    entries
        .into_iter()
        .map(|entry| {
            let (name, version) = match entry.into_pair(field)? {
                (name, Some(version)) => (name, Some(version)),
                (name, None) => match name.rsplit_once('@') {
                    Some((n, v)) if !n.is_empty() && !v.is_empty() => {
                        (n.to_string(), Some(v.to_string()))
                    }
                    _ => (name, None),
                },
            };
            Ok(Package { name, version })
        })
        .collect()
}

fn normalize_env(
    vars: BTreeMap<String, toml::Value>,
    field: &str,
) -> Result<BTreeMap<String, String>, KeelError> {
    vars.into_iter()
        .map(|(name, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(KeelError::config(format!(
                        "{field}.{name}: expected a string, found {}",
                        other.type_str()
                    )));
                }
            };
            Ok((name, value))
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::acl::AclPreset;

    fn parse(content: &str) -> DesiredState {
        DesiredState::parse(content, Path::new("/cfg"), Path::new("/home/u")).unwrap()
    }

    #[test]
    fn test_empty_document() {
        let state = parse("");
        assert!(state.scoop.apps.is_empty());
        assert!(state.dotfiles.is_none());
        assert!(state.tasks.is_empty());
    }

    #[test]
    fn test_heterogeneous_package_entries() {
        let state = parse(
            r#"
            [scoop]
            buckets = ["main", { extras = "https://github.com/ScoopInstaller/Extras" }]
            apps = ["git", "nodejs@20.10.0", { python = "3.12.1" }]

            [winget]
            apps = ["Microsoft.PowerToys", { "Git.Git" = "2.43.0" }]
            "#,
        );

        assert_eq!(
            state.scoop.buckets,
            vec![
                Bucket::new("main"),
                Bucket::with_url("extras", "https://github.com/ScoopInstaller/Extras"),
            ]
        );
        assert_eq!(
            state.scoop.apps,
            vec![
                Package::new("git"),
                Package::pinned("nodejs", "20.10.0"),
                Package::pinned("python", "3.12.1"),
            ]
        );
        assert_eq!(state.winget.apps[1], Package::pinned("Git.Git", "2.43.0"));
    }

    #[test]
    fn test_multi_key_entry_rejected() {
        let err = DesiredState::parse(
            r#"
            [scoop]
            apps = [{ git = "1", curl = "2" }]
            "#,
            Path::new("/cfg"),
            Path::new("/home/u"),
        )
        .unwrap_err();
        assert!(matches!(err, KeelError::Config { .. }));
    }

    #[test]
    fn test_paths_resolved() {
        let state = parse(
            r#"
            [dotfiles]
            source = "home"

            [[encrypted_files]]
            source = "secrets/id.age"
            target = ".ssh/id"
            acl = "owner-read"
            "#,
        );

        let dotfiles = state.dotfiles.unwrap();
        assert_eq!(dotfiles.source, PathBuf::from("/cfg/home"));
        assert_eq!(dotfiles.target, dirs::home_dir().unwrap());

        let file = &state.encrypted_files[0];
        assert_eq!(file.source, PathBuf::from("/cfg/secrets/id.age"));
        assert_eq!(file.target, PathBuf::from("/home/u/.ssh/id"));
        assert_eq!(file.acl, Some(AclSpec::Preset(AclPreset::OwnerRead)));
    }

    #[test]
    fn test_environment_scalars_become_strings() {
        let state = parse(
            r#"
            [environment.user]
            EDITOR = "nvim"
            RETRIES = 3

            [environment.machine]
            FEATURE = true
            "#,
        );
        assert_eq!(state.environment.user["EDITOR"], "nvim");
        assert_eq!(state.environment.user["RETRIES"], "3");
        assert_eq!(state.environment.machine["FEATURE"], "true");
    }

    #[test]
    fn test_environment_table_rejected() {
        let err = DesiredState::parse(
            "[environment.user]\nNESTED = { a = 1 }\n",
            Path::new("/cfg"),
            Path::new("/home/u"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("environment.user.NESTED"));
    }

    #[test]
    fn test_path_and_tasks() {
        let state = parse(
            r#"
            [path.user]
            prepend = ["~/bin"]
            append = ["$LOCALAPPDATA/tools"]

            [tasks.vscode_extensions]
            extensions = ["rust-lang.rust-analyzer"]
            "#,
        );
        assert_eq!(state.path.user.prepend, vec!["~/bin"]);
        assert_eq!(state.path.user.entries(Position::Append), ["$LOCALAPPDATA/tools"]);
        assert!(state.path.machine.prepend.is_empty());
        assert_eq!(state.tasks[0].name, "vscode_extensions");
    }
}
