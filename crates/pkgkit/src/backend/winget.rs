//! Real Winget CLI backend using `winget` commands.

use crate::backend::WingetBackend;
use crate::error::{Error, Result};
use crate::types::{Package, WingetInventory};
use declarative::CommandOutput;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// Backend that executes real `winget` commands.
pub struct WingetCli {
    winget_path: Option<PathBuf>,
}

impl WingetCli {
    /// Create a new WingetCli, looking up `winget` on PATH.
    pub fn new() -> Self {
        let winget_path = which::which("winget").ok();
        log::debug!("winget resolved to {winget_path:?}");
        Self { winget_path }
    }

    fn run_winget(&self, args: &[&str]) -> Result<CommandOutput> {
        let winget = self.winget_path.as_ref().ok_or(Error::ToolNotFound {
            tool: "winget",
            hint: "Install App Installer from the Microsoft Store",
        })?;

        log::debug!("Running winget {}", args.join(" "));
        let output = Command::new(winget)
            .args(args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute winget: {e}"),
                output: String::new(),
            })?;
        Ok(output.into())
    }
}

impl Default for WingetCli {
    fn default() -> Self {
        Self::new()
    }
}

impl WingetBackend for WingetCli {
    fn is_available(&self) -> bool {
        self.winget_path.is_some()
    }

    fn inventory(&self) -> Result<WingetInventory> {
        // winget export only writes to a file
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("winget-export.json");
        let file_arg = file.to_string_lossy().to_string();

        let output = self.run_winget(&[
            "export",
            "--output",
            &file_arg,
            "--accept-source-agreements",
            "--disable-interactivity",
        ])?;

        // Unexportable packages produce warnings and a non-zero exit, but the file is still written
        if !file.exists() {
            return Err(Error::from_output("winget", &output.combined(), None));
        }
        if !output.success {
            log::debug!("winget export reported: {}", output.combined().trim());
        }

        let json = fs::read_to_string(&file)?;
        WingetInventory::from_export_json(&json)
    }

    fn install(&self, package: &Package) -> Result<()> {
        let args = install_args(package);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_winget(&args)?;

        if !output.success {
            let err = Error::from_output("winget", &output.combined(), Some(&package.name));
            if err.is_ignorable() {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

/// Build the argument list for an exact-id, non-interactive install.
fn install_args(package: &Package) -> Vec<String> {
    let mut args: Vec<String> = [
        "install",
        "--id",
        package.name.as_str(),
        "--exact",
        "--accept-source-agreements",
        "--accept-package-agreements",
        "--disable-interactivity",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    if let Some(version) = &package.version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_args_unpinned() {
        let args = install_args(&Package::new("Git.Git"));
        assert_eq!(args[..4], ["install", "--id", "Git.Git", "--exact"]);
        assert!(!args.contains(&"--version".to_string()));
    }

    #[test]
    fn test_install_args_pinned() {
        let args = install_args(&Package::pinned("Microsoft.PowerShell", "7.4.1"));
        let n = args.len();
        assert_eq!(args[n - 2..], ["--version", "7.4.1"]);
    }
}
