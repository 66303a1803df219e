//! Domain reconcilers
//!
//! Every domain follows the same shape:
//! - `diff` compares desired state, the ledger and a live probe into a [`Plan`]
//! - `apply` executes the plan (or only counts it when `dry_run` is set) and
//!   records what keel now manages in the ledger
//!
//! Preview and apply share one code path so their counts always agree.

use declarative::Plan;
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub mod acl;
pub mod dotfile;
pub mod encrypted_file;
pub mod env_store;
pub mod env_var;
pub mod path_entry;
pub mod scoop;
pub mod winget;

/// Ledger key for a path: `~/rel/path` under home, otherwise the full path
///
/// Separators are always `/` so keys are stable across platforms.
pub fn tilde_key(path: &Path, home: &Path) -> String {
    match path.strip_prefix(home) {
        Ok(rel) => {
            let rel = rel.to_string_lossy().replace('\\', "/");
            if rel.is_empty() {
                "~".to_string()
            } else {
                format!("~/{rel}")
            }
        }
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

/// Inverse of [`tilde_key`]
pub fn from_tilde_key(key: &str, home: &Path) -> PathBuf {
    let key = key.trim_end_matches('/');
    match key.strip_prefix("~/") {
        Some(rel) => rel.split('/').fold(home.to_path_buf(), |acc, part| acc.join(part)),
        None if key == "~" => home.to_path_buf(),
        None => PathBuf::from(key),
    }
}

/// Print a plan under a section title; silent when the plan is empty
pub fn print_plan<T: Display>(title: &str, plan: &Plan<T>) {
    if plan.is_empty() {
        return;
    }
    crate::ui::section(&format!("{title} ({})", plan.counts()));
    for (category, item) in plan.iter() {
        crate::ui::change(category, &item.to_string());
    }
}
