//! Session-scoped record of which sections have been opened.

use std::collections::HashSet;

use tracing::debug;

/// Set of section ids whose detail view was entered this session.
///
/// Grows monotonically; nothing is ever removed short of dropping the
/// tracker, which the viewer does on session reset. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct VisitTracker {
    visited: HashSet<String>,
}

impl VisitTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit. Returns `true` the first time an id is seen.
    pub fn record(&mut self, section_id: &str) -> bool {
        if self.visited.contains(section_id) {
            return false;
        }
        self.visited.insert(section_id.to_string());
        debug!(section_id, visited = self.visited.len(), "Section visited");
        true
    }

    #[must_use]
    pub fn contains(&self, section_id: &str) -> bool {
        self.visited.contains(section_id)
    }

    /// Whether every id yielded by `ids` has been visited.
    pub fn covers<'a>(&self, mut ids: impl Iterator<Item = &'a str>) -> bool {
        ids.all(|id| self.visited.contains(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.visited.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }

    /// Visited ids in sorted order.
    #[must_use]
    pub fn visited(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.visited.iter().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
