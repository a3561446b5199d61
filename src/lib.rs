//! Modsync — nightly modpack asset synchronizer
//!
//! This crate keeps one or more local modpack installations consistent with a
//! remote asset index: fetch the index, optionally re-resolve each mod to its
//! latest published build, materialize every artifact into a shared cache
//! exactly once per version, then reconcile each installation's mods
//! directory against the resolved set.

pub use modsync_core::{SyncError, SyncResult};

/// Core module re-exported for path helpers.
pub mod core {
    pub use modsync_core::core::*;
}

/// Asset descriptors, the manifest set, and manifest fetching.
pub mod manifest;

/// Latest-version resolution against a package repository.
pub mod resolver;

/// Shared artifact cache.
pub mod cache;

/// Per-installation reconciliation.
pub mod sync;
