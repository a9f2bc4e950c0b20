//! Suppression of duplicate groups implied by larger accepted groups.

use std::cmp::Ordering;

use dupes_core::Aggregate;

/// Report order: largest copies first.
///
/// Ties prefer more files, then directories, then the shallowest path,
/// so an enclosing directory is accepted before anything inside it.
pub fn report_order(a: &Aggregate, b: &Aggregate) -> Ordering {
    b.size
        .cmp(&a.size)
        .then_with(|| b.file_count.cmp(&a.file_count))
        .then_with(|| b.is_directory.cmp(&a.is_directory))
        .then_with(|| a.min_depth().cmp(&b.min_depth()))
        .then_with(|| a.paths.iter().next().cmp(&b.paths.iter().next()))
}

/// Greedy filter over aggregates presented in [`report_order`].
#[derive(Debug, Default)]
pub struct RedundancyFilter<'a> {
    accepted: Vec<&'a Aggregate>,
}

impl<'a> RedundancyFilter<'a> {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if an accepted aggregate already covers every path of `candidate`.
    pub fn is_implied(&self, candidate: &Aggregate) -> bool {
        self.accepted.iter().any(|accepted| accepted.implies(candidate))
    }

    /// Accept `candidate` unless it is implied; returns whether it was accepted.
    pub fn accept(&mut self, candidate: &'a Aggregate) -> bool {
        if self.is_implied(candidate) {
            return false;
        }
        self.accepted.push(candidate);
        true
    }

    /// Aggregates accepted so far, in acceptance order.
    pub fn accepted(&self) -> &[&'a Aggregate] {
        &self.accepted
    }
}
