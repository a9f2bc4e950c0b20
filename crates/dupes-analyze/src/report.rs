//! Duplicate reports: selection, redundancy suppression and rendering.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use dupes_core::{Aggregate, NodeHash};

use crate::redundancy::{RedundancyFilter, report_order};
use crate::selection::{GroupPaths, SelectionPolicy};

/// Default command prefixed to removal directives.
pub const DEFAULT_REMOVAL_COMMAND: &str = "gio trash --";

/// One reported group of identical files or directories.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    /// Hash shared by every path.
    pub hash: NodeHash,
    /// Whether the paths are directories.
    pub is_directory: bool,
    /// Size of each copy in bytes.
    pub size: u64,
    /// Number of files behind each copy.
    pub file_count: u64,
    /// Paths, split according to the selection policy.
    #[serde(flatten)]
    pub paths: GroupPaths,
}

impl DuplicateGroup {
    /// Number of reported copies.
    pub fn count(&self) -> usize {
        self.paths.len()
    }

    /// Bytes freed by keeping a single copy, or by removing every delete path.
    pub fn reclaimable_bytes(&self) -> u64 {
        let removable = match &self.paths {
            GroupPaths::All { paths } => paths.len().saturating_sub(1),
            GroupPaths::GoldenDelete { delete, .. } => delete.len(),
        };
        self.size.saturating_mul(removable as u64)
    }
}

/// Result of a duplicate search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DuplicateReport {
    /// Accepted groups in report order.
    pub groups: Vec<DuplicateGroup>,
    /// Aggregates examined.
    pub aggregates_considered: usize,
    /// Aggregates matching the selection policy.
    pub candidates: usize,
    /// Candidates dropped because a larger group implies them.
    pub suppressed: usize,
    /// Whether groups were dropped by the group limit.
    pub truncated: bool,
    /// Combined size of every reported copy.
    pub total_duplicate_size: u64,
    /// Bytes that could be reclaimed.
    pub total_reclaimable: u64,
    /// Number of groups in the report.
    pub group_count: usize,
}

impl DuplicateReport {
    /// Check if any duplicates were found.
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Render the report as text.
    ///
    /// Every group ends with a blank line. Golden copies are written as
    /// `#` comments and delete copies as `removal_command` invocations,
    /// so the output can be reviewed and then run by a shell.
    pub fn write_text<W: Write>(&self, out: &mut W, removal_command: &str) -> io::Result<()> {
        for group in &self.groups {
            match &group.paths {
                GroupPaths::All { paths } => {
                    writeln!(
                        out,
                        "{} files, {} bytes ({})",
                        group.file_count,
                        group.size,
                        humansize::format_size(group.size, humansize::BINARY)
                    )?;
                    for path in paths {
                        writeln!(out, "  {}", path.display())?;
                    }
                }
                GroupPaths::GoldenDelete { golden, delete } => {
                    for path in golden {
                        writeln!(out, "# {}", path.display())?;
                    }
                    for path in delete {
                        writeln!(out, "{removal_command} {}", shell_quote(path))?;
                    }
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Render the report as pretty-printed JSON.
    pub fn write_json<W: Write>(&self, out: &mut W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out).map_err(serde_json::Error::io)
    }
}

/// Build a report from the aggregates of a run.
///
/// Candidates are visited largest first; a candidate whose every path
/// lies inside the paths of an accepted group is suppressed. A
/// `max_groups` of 0 means no limit.
pub fn build_report(
    aggregates: &HashMap<NodeHash, Aggregate>,
    policy: &SelectionPolicy,
    max_groups: usize,
) -> DuplicateReport {
    let mut candidates: Vec<(&NodeHash, &Aggregate, GroupPaths)> = aggregates
        .iter()
        .filter(|(_, aggregate)| aggregate.is_duplicated())
        .filter_map(|(hash, aggregate)| {
            policy
                .select(aggregate)
                .map(|paths| (hash, aggregate, paths))
        })
        .collect();
    candidates.sort_by(|a, b| report_order(a.1, b.1).then_with(|| a.0.cmp(b.0)));

    let mut report = DuplicateReport {
        aggregates_considered: aggregates.len(),
        candidates: candidates.len(),
        ..Default::default()
    };

    let mut filter = RedundancyFilter::new();
    for (hash, aggregate, paths) in candidates {
        if !filter.accept(aggregate) {
            report.suppressed += 1;
            continue;
        }
        if max_groups > 0 && report.groups.len() >= max_groups {
            report.truncated = true;
            continue;
        }
        let group = DuplicateGroup {
            hash: *hash,
            is_directory: aggregate.is_directory,
            size: aggregate.size,
            file_count: aggregate.file_count,
            paths,
        };
        report.total_duplicate_size += group.size.saturating_mul(group.count() as u64);
        report.total_reclaimable += group.reclaimable_bytes();
        report.groups.push(group);
    }
    report.group_count = report.groups.len();

    info!(
        aggregates = report.aggregates_considered,
        candidates = report.candidates,
        suppressed = report.suppressed,
        groups = report.group_count,
        "report built"
    );
    report
}

/// Quote a path for a POSIX shell.
pub fn shell_quote(path: &Path) -> String {
    let text = path.to_string_lossy();
    format!("'{}'", text.replace('\'', r"'\''"))
}
