//! Dotfile reconciler
//!
//! The source tree is mirrored into the target base by copying. Each source
//! item maps to exactly one target; empty directories are mirrored too and
//! carry a trailing `/` in their ledger key.

use anyhow::{Context, Result};
use declarative::{Category, Plan};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{from_tilde_key, tilde_key};
use crate::schema::DotfilesConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotfileItem {
    /// Ledger key
    pub key: String,
    /// Source item; `None` for removals
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub is_dir: bool,
}

impl fmt::Display for DotfileItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

fn file_hash(path: &Path) -> Result<blake3::Hash> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(blake3::hash(&content))
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    Ok(fs::read_dir(path)
        .with_context(|| format!("Failed to read directory {}", path.display()))?
        .next()
        .is_none())
}

/// Source items as `(relative path, is_dir)`; files and empty directories only
fn walk_source(root: &Path) -> Result<Vec<(PathBuf, bool)>> {
    let mut items = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("Failed to strip prefix from {}", path.display()))?
            .to_path_buf();

        if entry.file_type().is_dir() {
            if is_empty_dir(path)? {
                items.push((rel, true));
            }
        } else {
            items.push((rel, false));
        }
    }
    Ok(items)
}

/// Compare the source tree with the target base and the ledger
pub fn diff(
    config: Option<&DotfilesConfig>,
    tracked: &BTreeSet<String>,
    home: &Path,
) -> Result<Plan<DotfileItem>> {
    let mut plan = Plan::new();
    let mut current_keys = BTreeSet::new();

    if let Some(config) = config {
        if !config.source.is_dir() {
            anyhow::bail!(
                "dotfiles source {} is not a directory",
                config.source.display()
            );
        }

        for (rel, is_dir) in walk_source(&config.source)? {
            let source = config.source.join(&rel);
            let target = config.target.join(&rel);
            let mut key = tilde_key(&target, home);
            if is_dir {
                key.push('/');
            }
            current_keys.insert(key.clone());

            let category = if is_dir {
                match (target.is_dir(), tracked.contains(&key)) {
                    (false, _) => Some(Category::Add),
                    (true, false) => Some(Category::Track),
                    (true, true) => None,
                }
            } else if !target.is_file() {
                Some(Category::Add)
            } else if file_hash(&source)? != file_hash(&target)? {
                Some(Category::Update)
            } else if !tracked.contains(&key) {
                Some(Category::Track)
            } else {
                None
            };

            if let Some(category) = category {
                plan.push(
                    category,
                    DotfileItem {
                        key,
                        source: Some(source),
                        target,
                        is_dir,
                    },
                );
            }
        }
    }

    for key in tracked.difference(&current_keys) {
        plan.push(
            Category::Remove,
            DotfileItem {
                key: key.clone(),
                source: None,
                target: from_tilde_key(key, home),
                is_dir: key.ends_with('/'),
            },
        );
    }

    Ok(plan)
}

fn deploy(item: &DotfileItem, source: &Path) -> Result<()> {
    if item.is_dir {
        return fs::create_dir_all(&item.target)
            .with_context(|| format!("Failed to create {}", item.target.display()));
    }
    if let Some(parent) = item.target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(source, &item.target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            item.target.display()
        )
    })?;
    Ok(())
}

fn retire(item: &DotfileItem) -> Result<()> {
    if item.is_dir {
        if item.target.is_dir() && is_empty_dir(&item.target)? {
            fs::remove_dir(&item.target)
                .with_context(|| format!("Failed to remove {}", item.target.display()))?;
        } else {
            log::debug!("Keeping non-empty directory {}", item.target.display());
        }
    } else if item.target.is_file() {
        fs::remove_file(&item.target)
            .with_context(|| format!("Failed to remove {}", item.target.display()))?;
    }
    Ok(())
}

/// Execute the plan and update the ledger
pub fn apply(plan: &Plan<DotfileItem>, tracked: &mut BTreeSet<String>, dry_run: bool) -> Result<usize> {
    if dry_run {
        return Ok(plan.len());
    }

    for (category, item) in plan.iter() {
        match category {
            Category::Add | Category::Update => {
                if let Some(source) = &item.source {
                    deploy(item, source)?;
                }
                tracked.insert(item.key.clone());
            }
            Category::Track => {
                tracked.insert(item.key.clone());
            }
            Category::Remove => {
                retire(item)?;
                tracked.remove(&item.key);
            }
        }
    }

    Ok(plan.len())
}
