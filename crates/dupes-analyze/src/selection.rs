//! Policies deciding which duplicate groups are reported.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dupes_core::{Aggregate, resolve_root};

/// Paths of a reported group, split according to the policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum GroupPaths {
    /// Every copy, sorted.
    All { paths: Vec<PathBuf> },
    /// Copies to keep and copies to remove, each sorted.
    GoldenDelete {
        golden: Vec<PathBuf>,
        delete: Vec<PathBuf>,
    },
}

impl GroupPaths {
    /// Number of paths in the group.
    pub fn len(&self) -> usize {
        match self {
            GroupPaths::All { paths } => paths.len(),
            GroupPaths::GoldenDelete { golden, delete } => golden.len() + delete.len(),
        }
    }

    /// Check if the group has no paths.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every path, golden paths first.
    pub fn iter(&self) -> Box<dyn Iterator<Item = &PathBuf> + '_> {
        match self {
            GroupPaths::All { paths } => Box::new(paths.iter()),
            GroupPaths::GoldenDelete { golden, delete } => {
                Box::new(golden.iter().chain(delete.iter()))
            }
        }
    }
}

/// Roots of the retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenDelete {
    golden_roots: Vec<PathBuf>,
    delete_roots: Vec<PathBuf>,
}

impl GoldenDelete {
    /// Create a policy from golden and delete roots.
    ///
    /// Roots are resolved the way the walker resolves its roots, so
    /// `a/../b` and `b` name the same tree.
    pub fn new<G, D>(golden_roots: G, delete_roots: D) -> Self
    where
        G: IntoIterator,
        G::Item: Into<PathBuf>,
        D: IntoIterator,
        D::Item: Into<PathBuf>,
    {
        Self {
            golden_roots: golden_roots.into_iter().map(resolved).collect(),
            delete_roots: delete_roots.into_iter().map(resolved).collect(),
        }
    }

    /// Roots whose copies are kept.
    pub fn golden_roots(&self) -> &[PathBuf] {
        &self.golden_roots
    }

    /// Roots whose copies may be removed.
    pub fn delete_roots(&self) -> &[PathBuf] {
        &self.delete_roots
    }

    /// Every root, golden first.
    pub fn roots(&self) -> impl Iterator<Item = &PathBuf> {
        self.golden_roots.iter().chain(self.delete_roots.iter())
    }

    fn is_golden(&self, path: &Path) -> bool {
        self.golden_roots.iter().any(|root| path.starts_with(root))
    }

    fn is_delete(&self, path: &Path) -> bool {
        self.delete_roots.iter().any(|root| path.starts_with(root))
    }

    fn split(&self, aggregate: &Aggregate) -> Option<GroupPaths> {
        let mut golden = Vec::new();
        let mut delete = Vec::new();
        for path in &aggregate.paths {
            match (self.is_golden(path), self.is_delete(path)) {
                (true, true) => return None,
                (true, false) => golden.push(path.clone()),
                (false, true) => delete.push(path.clone()),
                (false, false) => {}
            }
        }
        if golden.is_empty() || delete.is_empty() {
            return None;
        }
        Some(GroupPaths::GoldenDelete { golden, delete })
    }
}

fn resolved(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    resolve_root(&path).unwrap_or(path)
}

/// Which aggregates become report candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionPolicy {
    /// Every aggregate with at least two paths.
    #[default]
    ReportAll,
    /// Aggregates with a copy under a golden root and one under a delete root.
    GoldenDelete(GoldenDelete),
}

impl SelectionPolicy {
    /// Check if `aggregate` is a candidate under this policy.
    pub fn matches(&self, aggregate: &Aggregate) -> bool {
        self.select(aggregate).is_some()
    }

    /// Split the paths of a candidate for presentation.
    ///
    /// Returns `None` for aggregates the policy does not report. Under
    /// [`SelectionPolicy::GoldenDelete`] a single path under both a golden
    /// and a delete root disqualifies the whole aggregate.
    pub fn select(&self, aggregate: &Aggregate) -> Option<GroupPaths> {
        match self {
            SelectionPolicy::ReportAll => aggregate.is_duplicated().then(|| GroupPaths::All {
                paths: aggregate.paths.iter().cloned().collect(),
            }),
            SelectionPolicy::GoldenDelete(policy) => policy.split(aggregate),
        }
    }
}
