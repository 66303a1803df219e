//! Winget reconciler (additive)
//!
//! Missing packages are installed; nothing is ever removed and installed
//! versions are not compared.

use anyhow::Result;
use declarative::{Category, Plan};
use pkgkit::backend::WingetBackend;
use pkgkit::{Package, audit};

use crate::error::KeelError;
use crate::progress;
use crate::schema::WingetConfig;

pub const WINGET_HINT: &str = "Install App Installer from the Microsoft Store";

pub fn diff(config: &WingetConfig, backend: &dyn WingetBackend) -> Result<Plan<Package>> {
    if config.apps.is_empty() {
        return Ok(Plan::new());
    }
    if !backend.is_available() {
        return Err(KeelError::prerequisite("winget", WINGET_HINT).into());
    }
    let live = backend.inventory().map_err(KeelError::from)?;
    Ok(audit::audit_winget(&config.apps, &live))
}

pub fn apply(
    plan: &Plan<Package>,
    backend: &dyn WingetBackend,
    quiet: bool,
    dry_run: bool,
) -> Result<usize> {
    if dry_run {
        return Ok(plan.len());
    }
    for package in plan.items(Category::Add) {
        progress::step(&format!("Installing {package}"), quiet, || {
            backend.install(package)
        })
        .map_err(KeelError::from)?;
    }
    Ok(plan.len())
}
