//! Scoped elevation through gsudo
//!
//! Elevation is never requested for the entire process. Instead:
//! 1. Changes are computed first (no elevation needed)
//! 2. The helper is required only when machine-scope work exists
//! 3. Elevated commands run through the helper one at a time
//! 4. The helper's credential cache is cleared when the context drops

use anyhow::Result;
use declarative::{CommandOutput, ElevationProvider};

use crate::runner::Runner;

/// Elevation helper executable
pub const HELPER: &str = "gsudo";

pub const HELPER_HINT: &str = "Install it with: scoop install gsudo";

/// Scoped elevation context - clears cached credentials on drop
pub struct SudoContext<'a> {
    runner: &'a dyn Runner,
}

impl<'a> SudoContext<'a> {
    /// Acquire the elevation helper with a reason shown to the user
    pub fn acquire(runner: &'a dyn Runner, reason: &str) -> Result<Self> {
        runner.require(HELPER, HELPER_HINT)?;
        log::info!("Elevation required: {reason}");
        Ok(Self { runner })
    }
}

impl ElevationProvider for SudoContext<'_> {
    fn run_elevated(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut full: Vec<&str> = Vec::with_capacity(args.len() + 1);
        full.push(cmd);
        full.extend_from_slice(args);
        self.runner.run(HELPER, &full)
    }
}

impl Drop for SudoContext<'_> {
    fn drop(&mut self) {
        // Invalidate the helper's credential cache to release privileges
        let _ = self.runner.run(HELPER, &["-k"]);
    }
}
