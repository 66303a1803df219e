//! Real Scoop CLI backend using `scoop` commands.

use crate::backend::ScoopBackend;
use crate::error::{Error, Result};
use crate::escalate::ELEVATION_HELPER;
use crate::types::{Bucket, Package, ScoopInventory};
use declarative::CommandOutput;
use std::path::PathBuf;
use std::process::Command;

/// Backend that executes real `scoop` commands.
///
/// Scoop is a PowerShell script exposed through `.cmd`/`.ps1` shims, so the
/// executable is resolved through PATH/PATHEXT once at construction.
pub struct ScoopCli {
    /// Path to the scoop shim, if found
    scoop_path: Option<PathBuf>,
}

impl ScoopCli {
    /// Create a new ScoopCli, looking up `scoop` on PATH.
    ///
    /// A missing executable is reported by the first operation that needs it.
    pub fn new() -> Self {
        let scoop_path = which::which("scoop").ok();
        log::debug!("scoop resolved to {scoop_path:?}");
        Self { scoop_path }
    }

    fn scoop(&self) -> Result<&PathBuf> {
        self.scoop_path.as_ref().ok_or(Error::ToolNotFound {
            tool: "scoop",
            hint: "Install Scoop from https://scoop.sh",
        })
    }

    /// Run a scoop command and return output.
    fn run_scoop(&self, args: &[&str], elevated: bool) -> Result<CommandOutput> {
        let scoop = self.scoop()?;
        let mut command = if elevated {
            let helper = which::which(ELEVATION_HELPER).map_err(|_| Error::ToolNotFound {
                tool: ELEVATION_HELPER,
                hint: "Install it with: scoop install gsudo",
            })?;
            let mut c = Command::new(helper);
            c.arg(scoop);
            c
        } else {
            Command::new(scoop)
        };

        log::debug!("Running scoop {} (elevated: {elevated})", args.join(" "));
        let output = command.args(args).output().map_err(|e| Error::CommandFailed {
            message: format!("failed to execute scoop: {e}"),
            output: String::new(),
        })?;
        Ok(output.into())
    }

    /// Run a scoop command and check for failure in both exit status and output text.
    fn run_scoop_checked(
        &self,
        args: &[&str],
        package_name: Option<&str>,
        elevated: bool,
    ) -> Result<String> {
        let output = self.run_scoop(args, elevated)?;
        let text = output.combined();

        if !output.success || reports_error(&text) {
            return Err(Error::from_output("scoop", &text, package_name));
        }

        Ok(output.stdout_str())
    }
}

impl Default for ScoopCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoopBackend for ScoopCli {
    fn is_available(&self) -> bool {
        self.scoop_path.is_some()
    }

    fn has_elevation_helper(&self) -> bool {
        which::which(ELEVATION_HELPER).is_ok()
    }

    fn inventory(&self) -> Result<ScoopInventory> {
        let stdout = self.run_scoop_checked(&["export"], None, false)?;
        ScoopInventory::from_export_json(&stdout)
    }

    fn add_bucket(&self, bucket: &Bucket) -> Result<()> {
        let mut args = vec!["bucket", "add", bucket.name.as_str()];
        if let Some(url) = &bucket.url {
            args.push(url.as_str());
        }
        match self.run_scoop_checked(&args, Some(&bucket.name), false) {
            Err(e) if e.is_ignorable() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    fn remove_bucket(&self, name: &str) -> Result<()> {
        self.run_scoop_checked(&["bucket", "rm", name], Some(name), false)?;
        Ok(())
    }

    fn install(&self, package: &Package, elevated: bool) -> Result<()> {
        let spec = package.spec();
        self.run_scoop_checked(&["install", spec.as_str()], Some(&package.name), elevated)?;
        Ok(())
    }

    fn uninstall(&self, name: &str) -> Result<()> {
        self.run_scoop_checked(&["uninstall", name], Some(name), false)?;
        Ok(())
    }
}

/// Whether scoop printed an error despite its exit status.
fn reports_error(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("ERROR") || line.starts_with("Couldn't find manifest")
    })
}
