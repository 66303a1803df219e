//! # pkgkit
//!
//! Scoop and Winget package management for declarative reconcilers.
//!
//! This crate provides functionality for:
//! - Reading live inventories (`scoop export`, `winget export`)
//! - Computing full-sync (Scoop) and additive (Winget) plans
//! - Installing packages, retrying a single item under elevation when an
//!   installer demands administrator rights
//!
//! ## Example
//!
//! ```no_run
//! use pkgkit::backend::{ScoopBackend, scoop::ScoopCli};
//! use pkgkit::{Bucket, Package, audit};
//!
//! let scoop = ScoopCli::new();
//! let live = scoop.inventory().expect("scoop export failed");
//! let plan = audit::audit_scoop(&[Bucket::new("main")], &[Package::new("git")], &live);
//! for item in &plan.to_add {
//!     println!("Missing: {item}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod backend;
pub mod error;
pub mod escalate;
pub mod types;

pub use audit::{BOOTSTRAP_PACKAGE, DEFAULT_BUCKET, ScoopItem};
pub use error::{Error, ErrorCategory, Result};
pub use escalate::{ELEVATION_HELPER, EscalationCallback};
pub use types::{Bucket, InstalledApp, Package, ScoopInventory, WingetInventory};
