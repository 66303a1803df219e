//! # Declarative
//!
//! A framework for plan-based, phase-ordered reconciliation.
//!
//! This crate provides the core abstractions for comparing desired state
//! against live state, grouping the result into categorized plans, and
//! running a sequence of phases with failure isolation.
//!
//! ## Core Concepts
//!
//! - **Plan**: Items to add, update, remove, or track for one domain
//! - **Phase**: One step of a run, reporting a change count
//! - **Disposition**: How a phase error affects the rest of the run
//! - **RunSummary**: Aggregated outcome with a run-wide change counter
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Disposition, Phase, RunOptions, run_phases_simple};
//!
//! struct Greet;
//!
//! impl Phase<Vec<String>> for Greet {
//!     type Error = String;
//!     fn name(&self) -> &'static str { "greet" }
//!     fn run(&mut self, log: &mut Vec<String>, opts: &RunOptions) -> Result<usize, String> {
//!         if !opts.dry_run {
//!             log.push("hello".into());
//!         }
//!         Ok(1)
//!     }
//! }
//!
//! let mut phases: Vec<declarative::BoxedPhase<'_, _, String>> = vec![Box::new(Greet)];
//! let mut state = Vec::new();
//! let summary = run_phases_simple(&mut phases, &mut state, &RunOptions::default(), &|_: &String| {
//!     Disposition::AbortPhase
//! });
//! assert_eq!(summary.changes, 1);
//! ```
//!
//! ## Provider Traits
//!
//! - [`ElevationProvider`]: Provides elevated privilege execution
//! - [`ErrorClassifier`]: Maps phase errors to a [`Disposition`]
//! - [`ProgressCallback`]: Receives phase progress updates

pub mod context;
pub mod executor;
pub mod plan;
pub mod types;

// Re-export main types at crate root
pub use context::{ElevationProvider, ErrorClassifier, NoProgress, Phase, ProgressCallback};
pub use executor::{BoxedPhase, run_phases, run_phases_simple};
pub use plan::{Category, Plan, PlanCounts};
pub use types::{CommandOutput, Disposition, PhaseOutcome, PhaseReport, RunOptions, RunSummary};
