//! Property-based tests for the narrative sequencer state machine.
//!
//! Verifies under arbitrary action/time interleavings:
//! - only the four allowed edges are ever taken
//! - a rejected action never changes state or authorization
//! - continue/reboot are refused before their reveal delay and accepted after
//! - leaving Shock freezes the overlay and cancels spawn and noise timers
//! - Idle after a reboot owns no timers

use proptest::prelude::*;

use dessertopia_core::audio::{AudioDriver, RecordingSynth};
use dessertopia_core::config::{AudioConfig, SequenceConfig};
use dessertopia_core::error::SequenceError;
use dessertopia_core::random::{ScriptedRandom, SeededRandom};
use dessertopia_core::scheduler::{ManualScheduler, Scheduler, TimerKind};
use dessertopia_core::sequencer::{NarrativeSequencer, SequenceAction, SequenceState};
use dessertopia_core::session::{InMemorySession, SessionHost};

// ────────────────────────────────────────────────────────────────────
// Strategies
// ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Step {
    Act(SequenceAction, bool),
    Wait(u64),
}

fn arb_action() -> impl Strategy<Value = SequenceAction> {
    prop_oneof![
        Just(SequenceAction::Trigger),
        Just(SequenceAction::Interrupt),
        Just(SequenceAction::Continue),
        Just(SequenceAction::Reboot),
    ]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (arb_action(), any::<bool>()).prop_map(|(action, armed)| Step::Act(action, armed)),
        2 => (0u64..12_000).prop_map(Step::Wait),
    ]
}

fn sequencer(seed: u64) -> NarrativeSequencer {
    let config = SequenceConfig::default();
    let audio = AudioDriver::new(
        Some(Box::new(RecordingSynth::new())),
        Box::new(ScriptedRandom::constant(0.3)),
        &AudioConfig::default(),
        &config,
    );
    NarrativeSequencer::new(&config, Box::new(SeededRandom::new(seed)), audio)
}

fn run_until(seq: &mut NarrativeSequencer, sched: &mut ManualScheduler, until_ms: u64) {
    while let Some(fired) = sched.pop_due(until_ms) {
        seq.on_timer(&fired, sched);
    }
    sched.advance_clock(until_ms);
}

fn allowed(from: SequenceState, to: SequenceState) -> bool {
    matches!(
        (from, to),
        (SequenceState::Idle, SequenceState::Shock)
            | (SequenceState::Shock, SequenceState::Narrative)
            | (SequenceState::Narrative, SequenceState::Epilogue)
            | (SequenceState::Epilogue, SequenceState::Idle)
    )
}

// ────────────────────────────────────────────────────────────────────
// Transitions
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every state change follows an allowed edge; refusals change nothing.
    #[test]
    fn prop_only_allowed_edges(
        seed in any::<u64>(),
        steps in prop::collection::vec(arb_step(), 1..50),
    ) {
        let mut sched = ManualScheduler::new();
        let mut session = InMemorySession::authorized();
        let mut seq = sequencer(seed);
        let mut entered_at = 0u64;

        for step in steps {
            let before = seq.state();
            let result = match step {
                Step::Wait(ms) => {
                    let target = sched.now_ms() + ms;
                    run_until(&mut seq, &mut sched, target);
                    prop_assert_eq!(seq.state(), before);
                    continue;
                }
                Step::Act(SequenceAction::Trigger, armed) => seq.trigger(armed, &mut sched),
                Step::Act(SequenceAction::Interrupt, _) => seq.interrupt(&mut sched),
                Step::Act(SequenceAction::Continue, _) => seq.continue_narrative(&mut sched),
                Step::Act(SequenceAction::Reboot, _) => {
                    seq.reboot(&mut sched, &mut session).map(|_| ())
                }
            };
            let after = seq.state();
            let since_entry = sched.now_ms() - entered_at;

            match result {
                Ok(()) => {
                    prop_assert!(allowed(before, after), "{} -> {}", before, after);
                    if before == SequenceState::Narrative {
                        prop_assert!(since_entry >= 10_000);
                    }
                    if before == SequenceState::Epilogue {
                        prop_assert!(since_entry >= 6_000);
                        prop_assert!(!session.is_authorized());
                        session.set_authorized(true);
                    }
                    entered_at = sched.now_ms();
                }
                Err(SequenceError::NotYetAvailable { remaining_ms, .. }) => {
                    prop_assert_eq!(after, before);
                    prop_assert!(remaining_ms > 0);
                    prop_assert!(session.is_authorized());
                }
                Err(_) => {
                    prop_assert_eq!(after, before);
                    prop_assert!(session.is_authorized());
                }
            }

            if after != SequenceState::Shock {
                prop_assert_eq!(sched.pending_of(TimerKind::OverlaySpawn), 0);
                prop_assert_eq!(sched.pending_of(TimerKind::NoiseBurst), 0);
                prop_assert_eq!(seq.overlay_items().len(), 0);
            }
            if after == SequenceState::Idle {
                prop_assert_eq!(sched.pending(), 0);
            }
        }
    }

    /// Overlay growth stops for good once Shock is left.
    #[test]
    fn prop_overlay_frozen_after_shock(
        seed in any::<u64>(),
        shock_ms in 0u64..5_000,
        after_ms in 0u64..20_000,
    ) {
        let mut sched = ManualScheduler::new();
        let mut seq = sequencer(seed);
        seq.trigger(true, &mut sched).unwrap();
        run_until(&mut seq, &mut sched, shock_ms);
        seq.interrupt(&mut sched).unwrap();

        let spawned = seq.snapshot(sched.now_ms()).total_spawned;
        run_until(&mut seq, &mut sched, shock_ms + after_ms);
        let snap = seq.snapshot(sched.now_ms());
        prop_assert_eq!(snap.total_spawned, spawned);
        prop_assert_eq!(snap.overlay_items, 0);
        prop_assert!(!snap.audio_playing);
        prop_assert_eq!(snap.continue_available, after_ms >= 10_000);
    }
}
