//! Drift detection for Scoop and Winget.
//!
//! Scoop is reconciled as a full sync: anything installed but not declared
//! is removed, except the default bucket and Scoop itself. Winget is
//! additive: missing packages are installed, nothing is ever removed, and
//! version drift is not detected.

use crate::types::{Bucket, Package, ScoopInventory, WingetInventory};
use declarative::{Category, Plan};
use std::collections::HashSet;
use std::fmt;

/// Bucket that ships with Scoop and is never removed.
pub const DEFAULT_BUCKET: &str = "main";

/// Scoop's own package, never removed.
pub const BOOTSTRAP_PACKAGE: &str = "scoop";

/// One Scoop change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoopItem {
    /// A bucket to add or remove
    Bucket(Bucket),
    /// An app to install, update, or remove
    App {
        /// The desired package (name only for removals)
        package: Package,
        /// Currently installed version, if any
        installed: Option<String>,
    },
}

impl ScoopItem {
    /// Name of the bucket or app.
    pub fn name(&self) -> &str {
        match self {
            Self::Bucket(b) => &b.name,
            Self::App { package, .. } => &package.name,
        }
    }
}

impl fmt::Display for ScoopItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket(b) => write!(f, "bucket {b}"),
            Self::App {
                package,
                installed: Some(installed),
            } if package.version.is_some() => {
                write!(
                    f,
                    "{} {} → {}",
                    package.name,
                    installed,
                    package.version.as_deref().unwrap_or_default()
                )
            }
            Self::App { package, .. } => write!(f, "{package}"),
        }
    }
}

/// Compute the full-sync plan for Scoop.
pub fn audit_scoop(buckets: &[Bucket], apps: &[Package], live: &ScoopInventory) -> Plan<ScoopItem> {
    let mut plan = Plan::new();

    let declared_buckets: HashSet<String> = buckets.iter().map(|b| b.name.to_lowercase()).collect();
    let declared_apps: HashSet<String> = apps.iter().map(|a| a.app_name().to_lowercase()).collect();

    for bucket in buckets {
        if !live.has_bucket(&bucket.name) {
            plan.push(Category::Add, ScoopItem::Bucket(bucket.clone()));
        }
    }

    for app in apps {
        match live.app(app.app_name()) {
            None => plan.push(
                Category::Add,
                ScoopItem::App {
                    package: app.clone(),
                    installed: None,
                },
            ),
            Some(installed) => {
                if let Some(pinned) = &app.version
                    && !versions_match(pinned, &installed.version)
                {
                    plan.push(
                        Category::Update,
                        ScoopItem::App {
                            package: app.clone(),
                            installed: Some(installed.version.clone()),
                        },
                    );
                }
            }
        }
    }

    for installed in &live.apps {
        if installed.name.eq_ignore_ascii_case(BOOTSTRAP_PACKAGE) {
            continue;
        }
        if !declared_apps.contains(&installed.name.to_lowercase()) {
            plan.push(
                Category::Remove,
                ScoopItem::App {
                    package: Package::new(installed.name.clone()),
                    installed: Some(installed.version.clone()),
                },
            );
        }
    }

    for name in &live.buckets {
        if name.eq_ignore_ascii_case(DEFAULT_BUCKET) {
            continue;
        }
        if !declared_buckets.contains(&name.to_lowercase()) {
            plan.push(Category::Remove, ScoopItem::Bucket(Bucket::new(name.clone())));
        }
    }

    plan
}

/// Compute the additive plan for Winget.
///
/// `to_remove` is always empty.
pub fn audit_winget(apps: &[Package], live: &WingetInventory) -> Plan<Package> {
    let mut plan = Plan::new();
    for app in apps {
        if !live.contains(&app.name) {
            plan.push(Category::Add, app.clone());
        }
    }
    plan
}

/// Check if a pinned version matches the installed one.
///
/// Comparison ignores case, surrounding whitespace and a leading `v`.
pub fn versions_match(pinned: &str, installed: &str) -> bool {
    let pinned = pinned.trim().to_lowercase();
    let installed = installed.trim().to_lowercase();

    if pinned == installed {
        return true;
    }

    let pinned = pinned.strip_prefix('v').unwrap_or(&pinned);
    let installed = installed.strip_prefix('v').unwrap_or(&installed);

    pinned == installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstalledApp;

    fn app(name: &str, version: &str) -> InstalledApp {
        InstalledApp {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    fn inventory(buckets: &[&str], apps: &[(&str, &str)]) -> ScoopInventory {
        ScoopInventory {
            buckets: buckets.iter().map(|b| (*b).to_string()).collect(),
            apps: apps.iter().map(|(n, v)| app(n, v)).collect(),
        }
    }

    #[test]
    fn test_versions_match_exact() {
        assert!(versions_match("2.40.0", "2.40.0"));
        assert!(versions_match(" 1.0 ", "1.0"));
    }

    #[test]
    fn test_versions_match_v_prefix() {
        assert!(versions_match("v2.40.0", "2.40.0"));
        assert!(versions_match("V2.40.0", "v2.40.0"));
    }

    #[test]
    fn test_versions_no_prefix_match() {
        assert!(!versions_match("2.40", "2.40.1"));
        assert!(!versions_match("20.10.0", "20.9.0"));
    }

    #[test]
    fn test_scoop_full_sync() {
        let live = inventory(
            &["main", "extras"],
            &[("git", "2.43.0"), ("nodejs", "20.9.0"), ("scoop", "0.4.0")],
        );
        let apps = vec![Package::new("git"), Package::pinned("nodejs", "20.10.0")];
        let plan = audit_scoop(&[Bucket::new("main")], &apps, &live);

        assert!(plan.to_add.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].to_string(), "nodejs 20.9.0 → 20.10.0");
        assert_eq!(plan.to_remove.len(), 1);
        assert_eq!(plan.to_remove[0], ScoopItem::Bucket(Bucket::new("extras")));
    }

    #[test]
    fn test_scoop_mixed_drift() {
        let live = inventory(&["main"], &[("git", "2.43.0"), ("vim", "9.1")]);
        let buckets = vec![Bucket::new("main"), Bucket::new("extras")];
        let apps = vec![Package::new("git"), Package::pinned("nodejs", "20.10.0")];
        let plan = audit_scoop(&buckets, &apps, &live);

        assert_eq!(
            plan.to_add,
            vec![
                ScoopItem::Bucket(Bucket::new("extras")),
                ScoopItem::App {
                    package: Package::pinned("nodejs", "20.10.0"),
                    installed: None,
                },
            ]
        );
        assert_eq!(plan.to_add[1].to_string(), "nodejs@20.10.0");
        assert_eq!(plan.to_remove.len(), 1);
        assert_eq!(plan.to_remove[0].name(), "vim");
        assert!(plan.to_update.is_empty());
    }

    #[test]
    fn test_scoop_bucket_qualified_app() {
        let live = inventory(&["main", "extras"], &[("vscode", "1.90.0")]);
        let apps = vec![Package::new("extras/vscode")];
        let plan = audit_scoop(&[Bucket::new("extras")], &apps, &live);
        assert!(plan.is_empty());

        let pinned = vec![Package::pinned("extras/vscode", "1.91.0")];
        let plan = audit_scoop(&[Bucket::new("extras")], &pinned, &live);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].to_string(), "extras/vscode 1.90.0 → 1.91.0");
        assert!(plan.to_remove.is_empty());

        let missing = audit_scoop(&[Bucket::new("extras")], &apps, &inventory(&["main", "extras"], &[]));
        assert_eq!(missing.to_add[0].to_string(), "extras/vscode");
    }

    #[test]
    fn test_scoop_never_removes_defaults() {
        let live = inventory(&["main"], &[("scoop", "0.4.0")]);
        let plan = audit_scoop(&[], &[], &live);
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_scoop_adds_buckets_and_apps() {
        let live = inventory(&["main"], &[]);
        let buckets = vec![Bucket::with_url("custom", "https://example.com/bucket.git")];
        let apps = vec![Package::new("ripgrep")];
        let plan = audit_scoop(&buckets, &apps, &live);

        assert_eq!(plan.to_add.len(), 2);
        assert_eq!(plan.to_add[0].name(), "custom");
        assert_eq!(plan.to_add[1].name(), "ripgrep");
    }

    #[test]
    fn test_scoop_unpinned_never_updates() {
        let live = inventory(&["main"], &[("git", "2.43.0")]);
        let plan = audit_scoop(&[], &[Package::new("git")], &live);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_winget_is_additive() {
        let live = WingetInventory {
            packages: vec!["Git.Git".to_string(), "Mozilla.Firefox".to_string()],
        };
        let apps = vec![Package::new("git.git"), Package::pinned("Microsoft.PowerToys", "0.80.0")];
        let plan = audit_winget(&apps, &live);

        assert_eq!(plan.to_add, vec![Package::pinned("Microsoft.PowerToys", "0.80.0")]);
        assert!(plan.to_remove.is_empty());
        assert!(plan.to_update.is_empty());
    }
}
