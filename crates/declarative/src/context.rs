//! Phase traits and provider traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of elevation, progress, etc.

use crate::types::{CommandOutput, Disposition, PhaseOutcome, RunOptions};
use anyhow::Result;

/// Provider for elevated privilege operations
///
/// Implement this trait to provide admin capabilities.
pub trait ElevationProvider {
    /// Run a command with elevated privileges
    fn run_elevated(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Run a command and return just success/failure
    fn run_status(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        Ok(self.run_elevated(cmd, args)?.success)
    }

    /// Run a command and capture stdout
    fn run_capture(&self, cmd: &str, args: &[&str]) -> Result<String> {
        let output = self.run_elevated(cmd, args)?;
        if !output.success {
            anyhow::bail!("Command failed: {}", output.stderr_str().trim());
        }
        Ok(output.stdout_str())
    }
}

/// One step of a run
///
/// A phase reads and mutates the shared run state `S` and reports how many
/// changes it made (or would make, when `opts.dry_run` is set).
pub trait Phase<S> {
    type Error;

    /// Short name used in logs and summaries
    fn name(&self) -> &'static str;

    /// Execute or preview the phase
    fn run(&mut self, state: &mut S, opts: &RunOptions) -> Result<usize, Self::Error>;
}

/// Maps phase errors onto their effect on the run
pub trait ErrorClassifier<E> {
    fn classify(&self, error: &E) -> Disposition;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> Disposition,
{
    fn classify(&self, error: &E) -> Disposition {
        self(error)
    }
}

/// Progress callback for run execution
pub trait ProgressCallback {
    /// Called before a phase starts
    fn on_phase_start(&mut self, name: &str);

    /// Called after a phase finishes
    fn on_phase_complete(&mut self, name: &str, outcome: &PhaseOutcome);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _name: &str) {}
    fn on_phase_complete(&mut self, _name: &str, _outcome: &PhaseOutcome) {}
}
