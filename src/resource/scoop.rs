//! Scoop reconciler (full sync)

use anyhow::Result;
use declarative::{Category, Plan};
use pkgkit::backend::ScoopBackend;
use pkgkit::escalate::{self, EscalationCallback};
use pkgkit::{ScoopItem, audit};

use crate::error::KeelError;
use crate::progress;
use crate::schema::ScoopConfig;

pub const SCOOP_HINT: &str = "Install Scoop from https://scoop.sh";

/// Reports item-scoped elevation to the user
struct UiEscalation;

impl EscalationCallback for UiEscalation {
    fn on_escalate(&self, item: &str, _error: &pkgkit::Error) {
        crate::ui::warn(&format!("{item} needs administrator rights, retrying elevated"));
    }

    fn on_helper_install(&self) {
        crate::ui::info(&format!("Installing {}", pkgkit::ELEVATION_HELPER));
    }
}

/// Whether the document declares any Scoop state
///
/// An absent `[scoop]` table leaves Scoop unmanaged instead of removing
/// every installed app.
pub fn is_managed(config: &ScoopConfig) -> bool {
    !config.buckets.is_empty() || !config.apps.is_empty()
}

pub fn diff(config: &ScoopConfig, backend: &dyn ScoopBackend) -> Result<Plan<ScoopItem>> {
    if !is_managed(config) {
        return Ok(Plan::new());
    }
    if !backend.is_available() {
        return Err(KeelError::prerequisite("scoop", SCOOP_HINT).into());
    }
    let live = backend.inventory().map_err(KeelError::from)?;
    Ok(audit::audit_scoop(&config.buckets, &config.apps, &live))
}

pub fn apply(
    plan: &Plan<ScoopItem>,
    backend: &dyn ScoopBackend,
    quiet: bool,
    dry_run: bool,
) -> Result<usize> {
    if dry_run {
        return Ok(plan.len());
    }
    let callback: &dyn EscalationCallback = &UiEscalation;

    for item in plan.items(Category::Add) {
        match item {
            ScoopItem::Bucket(bucket) => {
                progress::step(&format!("Adding bucket {bucket}"), quiet, || {
                    backend.add_bucket(bucket)
                })
                .map_err(KeelError::from)?;
            }
            ScoopItem::App { package, .. } => {
                progress::step(&format!("Installing {package}"), quiet, || {
                    escalate::install_with_escalation(backend, package, Some(callback))
                })
                .map_err(KeelError::from)?;
            }
        }
    }

    for item in plan.items(Category::Update) {
        if let ScoopItem::App { package, .. } = item {
            progress::step(&format!("Reinstalling {package}"), quiet, || {
                escalate::reinstall_pinned(backend, package, Some(callback))
            })
            .map_err(KeelError::from)?;
        }
    }

    let removals = plan.items(Category::Remove);
    for item in removals.iter().filter(|i| matches!(i, ScoopItem::App { .. })) {
        progress::step(&format!("Uninstalling {}", item.name()), quiet, || {
            backend.uninstall(item.name())
        })
        .map_err(KeelError::from)?;
    }
    for item in removals.iter().filter(|i| matches!(i, ScoopItem::Bucket(_))) {
        progress::step(&format!("Removing bucket {}", item.name()), quiet, || {
            backend.remove_bucket(item.name())
        })
        .map_err(KeelError::from)?;
    }

    Ok(plan.len())
}
