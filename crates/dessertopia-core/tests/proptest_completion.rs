//! Property-based tests for the completion trigger.
//!
//! Verifies:
//! - armed iff the level is Severe, the phase is the last one, and every
//!   section of it is visited
//! - visits outside the phase never arm it
//! - with a longer catalog, only its last phase arms
//! - through the viewer, only the final phase can arm, and visit order is irrelevant

use proptest::prelude::*;

use dessertopia_core::catalog::Catalog;
use dessertopia_core::completion::completion_armed;
use dessertopia_core::corruption::CorruptionLevel;
use dessertopia_core::progress_store::{MemoryStore, UNLOCK_KEY};
use dessertopia_core::random::ScriptedRandom;
use dessertopia_core::session::InMemorySession;
use dessertopia_core::viewer::ArchiveViewer;
use dessertopia_core::visit_tracker::VisitTracker;

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

fn arb_level() -> impl Strategy<Value = CorruptionLevel> {
    prop_oneof![
        Just(CorruptionLevel::Calm),
        Just(CorruptionLevel::Unstable),
        Just(CorruptionLevel::Severe),
    ]
}

fn all_section_ids(catalog: &Catalog) -> Vec<String> {
    catalog
        .phases()
        .iter()
        .flat_map(|phase| phase.section_ids().map(str::to_string))
        .collect()
}

/// The built-in catalog followed by `extra` copies of its last phase.
fn extended_catalog(extra: usize) -> Catalog {
    let mut phases = Catalog::builtin().unwrap().phases().to_vec();
    for copy in 0..extra {
        let mut phase = phases[2].clone();
        phase.id = format!("late{copy}");
        for section in &mut phase.sections {
            section.id = format!("{}-late{copy}", section.id);
        }
        phases.push(phase);
    }
    Catalog::new(phases).unwrap()
}

// ────────────────────────────────────────────────────────────────────
// Predicate
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The predicate matches its definition for any visit set.
    #[test]
    fn prop_armed_iff_severe_and_all_visited(
        level in arb_level(),
        phase_index in 0usize..3,
        mask in prop::collection::vec(any::<bool>(), 9),
    ) {
        let catalog = Catalog::builtin().unwrap();
        let ids = all_section_ids(&catalog);
        let mut tracker = VisitTracker::new();
        for (id, visit) in ids.iter().zip(&mask) {
            if *visit {
                tracker.record(id);
            }
        }

        let phase = catalog.phase(phase_index).unwrap();
        let covered = phase.section_ids().all(|id| tracker.contains(id));
        let expected = level == CorruptionLevel::Severe && phase_index == 2 && covered;
        prop_assert_eq!(
            completion_armed(level, &catalog, Some(phase_index), &tracker),
            expected
        );
        prop_assert!(!completion_armed(level, &catalog, None, &tracker));
    }

    /// Visiting every section of the other phases never arms a phase.
    #[test]
    fn prop_foreign_visits_do_not_arm(phase_index in 0usize..3) {
        let catalog = Catalog::builtin().unwrap();
        let mut tracker = VisitTracker::new();
        for (index, other) in catalog.phases().iter().enumerate() {
            if index != phase_index {
                for id in other.section_ids() {
                    tracker.record(id);
                }
            }
        }
        prop_assert!(!completion_armed(
            CorruptionLevel::Severe,
            &catalog,
            Some(phase_index),
            &tracker
        ));
    }

    /// Fully visiting any phase of a longer catalog arms only the last one.
    #[test]
    fn prop_only_last_phase_of_longer_catalog_arms(
        extra in 1usize..4,
        phase_index in 0usize..7,
    ) {
        let catalog = extended_catalog(extra);
        let phase_index = phase_index % catalog.len();
        let mut tracker = VisitTracker::new();
        for id in catalog.phase(phase_index).unwrap().section_ids() {
            tracker.record(id);
        }
        prop_assert_eq!(
            completion_armed(CorruptionLevel::Severe, &catalog, Some(phase_index), &tracker),
            phase_index + 1 == catalog.len()
        );
    }
}

// ────────────────────────────────────────────────────────────────────
// Through the viewer
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any visit order over a phase's sections arms the trigger exactly when
    /// that phase is the final one and the last section has been opened.
    #[test]
    fn prop_viewer_arms_only_on_final_phase(
        phase_index in 0usize..3,
        order in Just(vec![0usize, 1, 2]).prop_shuffle(),
    ) {
        let mut viewer = ArchiveViewer::builder(
            Catalog::builtin().unwrap(),
            MemoryStore::new().with_entry(UNLOCK_KEY, "3"),
            InMemorySession::authorized(),
        )
        .visual_random(Box::new(ScriptedRandom::constant(0.5)))
        .audio_random(Box::new(ScriptedRandom::constant(0.5)))
        .build()
        .unwrap();

        viewer.select_phase(phase_index).unwrap();
        for (step, section) in order.iter().enumerate() {
            prop_assert!(!viewer.completion_armed());
            viewer.open_section(*section).unwrap();
            let last = step + 1 == order.len();
            prop_assert_eq!(viewer.completion_armed(), last && phase_index == 2);
            viewer.back_to_sections().unwrap();
        }
        prop_assert_eq!(viewer.status().completion_armed, phase_index == 2);
        viewer.return_to_phases().unwrap();
        prop_assert!(!viewer.completion_armed());
    }
}
