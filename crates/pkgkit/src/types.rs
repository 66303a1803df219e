//! Core types for Scoop and Winget package management.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A desired package, optionally pinned to a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    /// Package name (Scoop app name or Winget package identifier)
    pub name: String,
    /// Pinned version, if any
    pub version: Option<String>,
}

impl Package {
    /// Create an unpinned package.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    /// Create a package pinned to a version.
    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// App name without a bucket qualifier (`extras/vscode` → `vscode`).
    ///
    /// `scoop export` lists apps by this name.
    pub fn app_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Scoop install spec (`name` or `name@version`).
    pub fn spec(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{}", self.name, v),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}

/// A Scoop bucket (named package source).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bucket {
    /// Bucket name
    pub name: String,
    /// Repository URL; known buckets resolve without one
    pub url: Option<String>,
}

impl Bucket {
    /// Create a known bucket (no explicit URL).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    /// Create a bucket with an explicit repository URL.
    pub fn with_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{} ({url})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An installed Scoop app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    /// App name
    pub name: String,
    /// Installed version
    pub version: String,
}

/// Live Scoop state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoopInventory {
    /// Installed bucket names
    pub buckets: Vec<String>,
    /// Installed apps
    pub apps: Vec<InstalledApp>,
}

impl ScoopInventory {
    /// Parse the JSON document printed by `scoop export`.
    pub fn from_export_json(json: &str) -> crate::Result<Self> {
        #[derive(Deserialize)]
        struct Export {
            #[serde(default)]
            buckets: Vec<ExportBucket>,
            #[serde(default)]
            apps: Vec<ExportApp>,
        }

        #[derive(Deserialize)]
        struct ExportBucket {
            #[serde(rename = "Name")]
            name: String,
        }

        #[derive(Deserialize)]
        struct ExportApp {
            #[serde(rename = "Name")]
            name: String,
            #[serde(rename = "Version", default)]
            version: String,
        }

        let export: Export = serde_json::from_str(json)?;
        Ok(Self {
            buckets: export.buckets.into_iter().map(|b| b.name).collect(),
            apps: export
                .apps
                .into_iter()
                .map(|a| InstalledApp {
                    name: a.name,
                    version: a.version,
                })
                .collect(),
        })
    }

    /// Find an installed app by name (case-insensitive).
    pub fn app(&self, name: &str) -> Option<&InstalledApp> {
        self.apps.iter().find(|a| a.name.eq_ignore_ascii_case(name))
    }

    /// Whether a bucket is installed (case-insensitive).
    pub fn has_bucket(&self, name: &str) -> bool {
        self.buckets.iter().any(|b| b.eq_ignore_ascii_case(name))
    }
}

/// Live Winget state: installed package identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WingetInventory {
    /// Package identifiers known to a Winget source
    pub packages: Vec<String>,
}

impl WingetInventory {
    /// Parse the JSON file written by `winget export`.
    pub fn from_export_json(json: &str) -> crate::Result<Self> {
        #[derive(Deserialize)]
        struct Export {
            #[serde(rename = "Sources", default)]
            sources: Vec<Source>,
        }

        #[derive(Deserialize)]
        struct Source {
            #[serde(rename = "Packages", default)]
            packages: Vec<ExportPackage>,
        }

        #[derive(Deserialize)]
        struct ExportPackage {
            #[serde(rename = "PackageIdentifier")]
            id: String,
        }

        // winget writes a UTF-8 BOM on some versions
        let json = json.trim_start_matches('\u{feff}');
        let export: Export = serde_json::from_str(json)?;
        Ok(Self {
            packages: export
                .sources
                .into_iter()
                .flat_map(|s| s.packages)
                .map(|p| p.id)
                .collect(),
        })
    }

    /// Whether a package identifier is installed (case-insensitive).
    pub fn contains(&self, id: &str) -> bool {
        self.packages.iter().any(|p| p.eq_ignore_ascii_case(id))
    }
}
