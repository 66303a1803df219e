//! Item-scoped retry under elevation.
//!
//! Some Scoop installers refuse to run without administrator rights. Instead
//! of elevating the whole run, the failing item alone is retried once through
//! the elevation helper, installing the helper first if it is missing.

use crate::backend::ScoopBackend;
use crate::error::{Error, Result};
use crate::types::Package;

/// Package providing the elevation helper.
pub const ELEVATION_HELPER: &str = "gsudo";

/// Callback trait for escalation notifications.
pub trait EscalationCallback {
    /// Called before the operation is retried under elevation.
    fn on_escalate(&self, item: &str, error: &Error);

    /// Called before the elevation helper is installed.
    fn on_helper_install(&self) {}
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl EscalationCallback for NoCallback {
    fn on_escalate(&self, _item: &str, _error: &Error) {}
}

/// Execute an operation, retrying once under elevation if it needs admin rights.
///
/// # Arguments
/// * `item` - Name of the item being processed (for notifications)
/// * `callback` - Optional callback for escalation notifications
/// * `ensure_helper` - Makes the elevation helper available
/// * `operation` - The operation; receives `true` when running elevated
pub fn with_escalation<T, H, F>(
    item: &str,
    callback: Option<&dyn EscalationCallback>,
    ensure_helper: H,
    mut operation: F,
) -> Result<T>
where
    H: FnOnce() -> Result<()>,
    F: FnMut(bool) -> Result<T>,
{
    match operation(false) {
        Ok(result) => Ok(result),
        Err(e) if e.needs_elevation() => {
            if let Some(cb) = callback {
                cb.on_escalate(item, &e);
            }
            log::info!("Retrying {item} under elevation");
            ensure_helper()?;
            operation(true)
        }
        Err(e) => Err(e),
    }
}

/// Install a Scoop package, escalating once if the installer needs admin rights.
///
/// An "already installed" report is treated as success.
pub fn install_with_escalation(
    backend: &dyn ScoopBackend,
    package: &Package,
    callback: Option<&dyn EscalationCallback>,
) -> Result<()> {
    let result = with_escalation(
        &package.name,
        callback,
        || {
            if backend.has_elevation_helper() {
                return Ok(());
            }
            if let Some(cb) = callback {
                cb.on_helper_install();
            }
            backend.install(&Package::new(ELEVATION_HELPER), false)
        },
        |elevated| backend.install(package, elevated),
    );

    match result {
        Err(e) if e.is_ignorable() => Ok(()),
        other => other,
    }
}

/// Replace an installed app with its pinned version.
///
/// Scoop refuses to install a second version next to an existing one, so the
/// app is uninstalled first.
pub fn reinstall_pinned(
    backend: &dyn ScoopBackend,
    package: &Package,
    callback: Option<&dyn EscalationCallback>,
) -> Result<()> {
    backend.uninstall(package.app_name())?;
    install_with_escalation(backend, package, callback)
}
