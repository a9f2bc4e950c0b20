//! Hashing, caching and duplicate aggregation for dupes.
//!
//! This crate turns a post-order walk into duplicate groups:
//!
//! - **Hashing** - BLAKE3 content hashes for files, and directory hashes
//!   derived from the sorted hashes of each directory's children
//! - **Caching** - a persistent [`MetadataCache`] that skips files whose
//!   size and modification time did not change
//! - **Aggregation** - [`AggregationEngine`] groups files and whole
//!   directories by hash
//! - **Reporting** - a [`SelectionPolicy`] picks candidates and a
//!   [`RedundancyFilter`] drops groups already implied by a larger one
//!
//! ```rust,no_run
//! use dupes_analyze::{
//!     AggregationConfig, AggregationEngine, Blake3Hasher, MetadataCache, SelectionPolicy,
//!     build_report,
//! };
//! use dupes_scan::{ScanConfig, TreeWalker};
//!
//! let walker = TreeWalker::new(ScanConfig::new(["/path/to/scan"])).unwrap();
//! let mut cache = MetadataCache::open("/tmp/dupes-cache.json");
//!
//! let mut engine = AggregationEngine::new(&mut cache, Blake3Hasher, AggregationConfig::default());
//! engine.consume(walker.walk()).unwrap();
//! let outcome = engine.finish().unwrap();
//! cache.persist().unwrap();
//!
//! let report = build_report(&outcome.aggregates, &SelectionPolicy::ReportAll, 0);
//! report.write_text(&mut std::io::stdout(), "gio trash --").unwrap();
//! ```

mod cache;
mod engine;
mod error;
mod hasher;
mod lookup;
mod redundancy;
mod report;
mod selection;

pub use cache::{CacheStats, DEFAULT_AUTOSAVE_INTERVAL, MetadataCache, Refreshed};
pub use engine::{
    AggregationConfig, AggregationConfigBuilder, AggregationEngine, AggregationOutcome,
    EngineStats,
};
pub use error::{AnalyzeError, CacheError};
pub use hasher::{Blake3Hasher, ContentHasher, hash_bytes, hash_directory};
pub use lookup::{NamePattern, find_by_content, find_by_name};
pub use redundancy::{RedundancyFilter, report_order};
pub use report::{
    DEFAULT_REMOVAL_COMMAND, DuplicateGroup, DuplicateReport, build_report, shell_quote,
};
pub use selection::{GoldenDelete, GroupPaths, SelectionPolicy};

// Re-export core types
pub use dupes_core::{Aggregate, ContentHash, FileIdentity, FileStats, HashError, NodeHash};
