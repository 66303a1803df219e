//! Access control for deployed secrets
//!
//! Presets and detailed rules map to `icacls` grants on Windows and to
//! POSIX mode bits elsewhere.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

use crate::error::KeelError;
use crate::runner::Runner;

/// Well-known SID of the local Users group
const USERS_GROUP_SID: &str = "*S-1-5-32-545";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AclPreset {
    OwnerFull,
    OwnerRead,
    Inherit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rights {
    Full,
    Modify,
    Read,
    #[default]
    None,
}

impl Rights {
    fn icacls_code(self) -> Option<&'static str> {
        match self {
            Rights::Full => Some("F"),
            Rights::Modify => Some("M"),
            Rights::Read => Some("R"),
            Rights::None => None,
        }
    }

    fn mode_bits(self) -> u32 {
        match self {
            Rights::Full | Rights::Modify => 0o6,
            Rights::Read => 0o4,
            Rights::None => 0,
        }
    }
}

fn owner_default() -> Rights {
    Rights::Full
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclRules {
    #[serde(default = "owner_default")]
    pub owner: Rights,
    #[serde(default)]
    pub group: Rights,
    #[serde(default)]
    pub inherit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AclSpec {
    Preset(AclPreset),
    Detailed(AclRules),
}

impl AclSpec {
    pub const OWNER_ONLY: Self = Self::Preset(AclPreset::OwnerFull);

    pub fn from_value(value: &toml::Value) -> std::result::Result<Self, KeelError> {
        value.clone().try_into().map_err(|_| {
            KeelError::config(format!(
                "invalid acl {value}: expected \"owner-full\", \"owner-read\", \"inherit\" \
                 or {{ owner, group, inherit }} with rights full, modify, read or none"
            ))
        })
    }

    /// POSIX mode for this spec; `None` leaves the mode untouched
    pub fn unix_mode(&self) -> Option<u32> {
        match self {
            Self::Preset(AclPreset::OwnerFull) => Some(0o600),
            Self::Preset(AclPreset::OwnerRead) => Some(0o400),
            Self::Preset(AclPreset::Inherit) => None,
            Self::Detailed(rules) => {
                Some((rules.owner.mode_bits() << 6) | (rules.group.mode_bits() << 3))
            }
        }
    }

    /// `icacls` arguments after the target path
    pub fn icacls_args(&self, user: &str) -> Vec<String> {
        let grant = |rights: Rights, who: &str| {
            rights
                .icacls_code()
                .map(|code| vec!["/grant:r".to_string(), format!("{who}:({code})")])
                .unwrap_or_default()
        };

        match self {
            Self::Preset(AclPreset::Inherit) => vec!["/reset".to_string()],
            Self::Preset(AclPreset::OwnerFull) => {
                let mut args = vec!["/inheritance:r".to_string()];
                args.extend(grant(Rights::Full, user));
                args
            }
            Self::Preset(AclPreset::OwnerRead) => {
                let mut args = vec!["/inheritance:r".to_string()];
                args.extend(grant(Rights::Read, user));
                args
            }
            Self::Detailed(rules) => {
                let inheritance = if rules.inherit { "/inheritance:e" } else { "/inheritance:r" };
                let mut args = vec![inheritance.to_string()];
                args.extend(grant(rules.owner, user));
                args.extend(grant(rules.group, USERS_GROUP_SID));
                args
            }
        }
    }
}

/// Apply an access spec to a file
pub fn apply(spec: &AclSpec, path: &Path, runner: &dyn Runner) -> Result<()> {
    if cfg!(windows) {
        let user = std::env::var("USERNAME").unwrap_or_else(|_| "%USERNAME%".to_string());
        let target = path.to_string_lossy().to_string();
        let mut args = vec![target];
        args.extend(spec.icacls_args(&user));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        runner.run_capture("icacls", &args)?;
        log::debug!("Applied ACL {spec:?} to {}", path.display());
        return Ok(());
    }

    set_mode(spec, path, runner)
}

#[cfg(unix)]
fn set_mode(spec: &AclSpec, path: &Path, _runner: &dyn Runner) -> Result<()> {
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = spec.unix_mode() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        log::debug!("Set mode {mode:o} on {}", path.display());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_spec: &AclSpec, _path: &Path, _runner: &dyn Runner) -> Result<()> {
    Ok(())
}

/// Restrict a file to its owner
pub fn restrict_to_owner(path: &Path, runner: &dyn Runner) -> Result<()> {
    apply(&AclSpec::OWNER_ONLY, path, runner)
}
