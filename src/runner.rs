//! External command execution
//!
//! Every external tool keel drives (age, bw, powershell, icacls, code, gh)
//! goes through [`Runner`], so reconcilers can be exercised against a fake.

use anyhow::{Context, Result};
use declarative::CommandOutput;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::KeelError;

pub trait Runner {
    /// Run a command and capture its output
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Locate an executable on PATH
    fn find(&self, program: &str) -> Option<PathBuf>;

    /// Check if a command exists
    fn exists(&self, program: &str) -> bool {
        self.find(program).is_some()
    }

    /// Fail with a prerequisite error unless the command exists
    fn require(&self, program: &str, hint: &str) -> Result<()> {
        if self.exists(program) {
            Ok(())
        } else {
            Err(KeelError::prerequisite(program, hint).into())
        }
    }

    /// Run a command and return stdout, failing on a non-zero exit
    fn run_capture(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.run(program, args)?;
        if !output.success {
            let stderr = output.stderr_str();
            let message = if stderr.trim().is_empty() {
                output.stdout_str()
            } else {
                stderr
            };
            return Err(KeelError::command(program, message.trim()).into());
        }
        Ok(output.stdout_str())
    }
}

/// Runner backed by real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        // Resolve through PATHEXT so .cmd/.ps1 shims work on Windows
        let resolved = which::which(program).unwrap_or_else(|_| PathBuf::from(program));
        log::debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(&resolved)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to execute: {} {}", program, args.join(" ")))?;
        Ok(output.into())
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
