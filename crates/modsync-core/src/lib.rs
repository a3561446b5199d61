//! Core utilities shared across modsync.
//!
//! Holds the error taxonomy and the platform path helpers so the main crate
//! and any future tooling agree on both.

pub mod core;

pub use core::error::{SyncError, SyncResult};
pub use core::path::{cache_dir, ensure_dir};
