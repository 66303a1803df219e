//! Core types for phase execution

use serde::{Deserialize, Serialize};
use std::process::Output;

/// How a phase error affects the rest of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Log, mark the run as failed, continue with the next phase
    AbortPhase,
    /// Stop the run; later phases do not execute
    AbortRun,
    /// Log a warning only
    Warn,
}

/// Options for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Compute and report changes without mutating anything
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

impl RunOptions {
    /// Options for a preview run
    pub fn preview() -> Self {
        Self {
            dry_run: true,
            verbose: false,
        }
    }
}

/// Outcome of a single phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseOutcome {
    /// Phase completed, reporting its change count
    Completed { changes: usize },
    /// Phase failed
    Failed {
        error: String,
        disposition: Disposition,
    },
    /// Phase never ran because an earlier phase aborted the run
    NotRun,
}

/// Report for one phase in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub outcome: PhaseOutcome,
}

/// Summary of a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub phases: Vec<PhaseReport>,
    /// Run-wide change counter
    pub changes: usize,
    /// Any phase failed with an error (not a warning)
    pub had_errors: bool,
    /// A phase stopped the run
    pub aborted: bool,
    pub dry_run: bool,
}

impl RunSummary {
    /// Check if every phase completed without errors
    pub fn is_success(&self) -> bool {
        !self.had_errors
    }

    /// Whether the persisted state should be committed after this run
    pub fn should_commit(&self) -> bool {
        !self.dry_run && !self.had_errors
    }

    /// Phases that failed, with their error messages
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.phases.iter().filter_map(|p| match &p.outcome {
            PhaseOutcome::Failed { error, .. } => Some((p.name.as_str(), error.as_str())),
            _ => None,
        })
    }

    /// Record a phase outcome and update the aggregate counters
    pub fn record(&mut self, name: &str, outcome: PhaseOutcome) {
        match &outcome {
            PhaseOutcome::Completed { changes } => self.changes += changes,
            PhaseOutcome::Failed { disposition, .. } => match disposition {
                Disposition::AbortPhase => self.had_errors = true,
                Disposition::AbortRun => {
                    self.had_errors = true;
                    self.aborted = true;
                }
                Disposition::Warn => {}
            },
            PhaseOutcome::NotRun => {}
        }
        self.phases.push(PhaseReport {
            name: name.to_string(),
            outcome,
        });
    }
}

/// Output from an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into().into_bytes(),
            stderr: Vec::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.into().into_bytes(),
            success: false,
        }
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Stdout and stderr joined, for tools that report errors on either stream
    pub fn combined(&self) -> String {
        let mut text = self.stdout_str();
        let stderr = self.stderr_str();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        text
    }
}
