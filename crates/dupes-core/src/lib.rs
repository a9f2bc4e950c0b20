//! Core types for dupes.
//!
//! This crate provides the data model shared by the walker and the
//! hashing engine: content and directory hashes, cache records,
//! duplicate aggregates, walk entries and configuration.

mod aggregate;
mod config;
mod error;
mod node;
mod walk;

pub use aggregate::Aggregate;
pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{HashError, ScanWarning, WarningKind};
pub use node::{ContentHash, FileIdentity, FileStats, NodeHash};
pub use walk::{DirectoryEntry, FileEntry, WalkEntry, WalkStats, epoch_seconds, resolve_root};
