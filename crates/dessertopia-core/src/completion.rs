//! Completion trigger predicate.

use crate::catalog::Catalog;
use crate::corruption::CorruptionLevel;
use crate::visit_tracker::VisitTracker;

/// Whether the narrative sequence may be triggered.
///
/// Armed iff the archive is at [`CorruptionLevel::Severe`], the selected
/// phase is the last one in the catalog, and every section of it has been
/// visited. Severe phases before the last never arm.
#[must_use]
pub fn completion_armed(
    level: CorruptionLevel,
    catalog: &Catalog,
    selected: Option<usize>,
    visited: &VisitTracker,
) -> bool {
    if level != CorruptionLevel::Severe {
        return false;
    }
    let Some(index) = selected.filter(|index| index + 1 == catalog.len()) else {
        return false;
    };
    catalog
        .phase(index)
        .is_some_and(|phase| visited.covers(phase.section_ids()))
}
