//! Execution engine for keel
//!
//! The engine orchestrates:
//! 1. Diffing - each phase compares live state with the desired document
//! 2. Executing - phases apply their plans in a fixed order
//! 3. Committing - the ledger is written once after a clean run

pub mod differ;
pub mod orchestrator;

pub use orchestrator::{RunReport, Toolbox, execute, print_summary};
