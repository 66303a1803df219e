//! Backend abstraction for package manager operations.
//!
//! The traits here define the live-system probes and mutations the
//! reconcilers need, allowing for different implementations (real CLI,
//! in-memory fakes for testing).

pub mod scoop;
pub mod winget;

use crate::error::Result;
use crate::types::{Bucket, Package, ScoopInventory, WingetInventory};

/// Backend trait for Scoop operations.
pub trait ScoopBackend {
    /// Check if Scoop is available.
    fn is_available(&self) -> bool;

    /// Check if the elevation helper is available.
    fn has_elevation_helper(&self) -> bool;

    /// Read installed buckets and apps.
    fn inventory(&self) -> Result<ScoopInventory>;

    /// Add a bucket.
    fn add_bucket(&self, bucket: &Bucket) -> Result<()>;

    /// Remove a bucket.
    fn remove_bucket(&self, name: &str) -> Result<()>;

    /// Install an app, optionally through the elevation helper.
    fn install(&self, package: &Package, elevated: bool) -> Result<()>;

    /// Uninstall an app.
    fn uninstall(&self, name: &str) -> Result<()>;
}

/// Backend trait for Winget operations.
pub trait WingetBackend {
    /// Check if Winget is available.
    fn is_available(&self) -> bool;

    /// Read installed package identifiers.
    fn inventory(&self) -> Result<WingetInventory>;

    /// Install a package by exact identifier, honoring a pinned version.
    fn install(&self, package: &Package) -> Result<()>;
}
