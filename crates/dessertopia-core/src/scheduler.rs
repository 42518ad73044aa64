//! Timer scheduling for the archive's cooperative event loop.
//!
//! Every suspension point in the archive (unlock tick, overlay spawn tick,
//! noise bursts, narrative reveal delays) is a timer registered through the
//! [`Scheduler`] trait. Nothing here runs callbacks itself: the owner pops due
//! timers with [`ManualScheduler::pop_due`] and dispatches them, which keeps
//! all mutation on one logical thread and lets tests drive time by hand.
//!
//! # Ordering
//!
//! Timers fire in deadline order; ties fire in registration order. A
//! repeating timer is re-armed at `deadline + interval` (not at pop time) so
//! a late `pop_due` catches up tick by tick instead of drifting.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Opaque handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What a timer is for. Used for routing and logging only; ownership is
/// decided by the [`TimerId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// One-second dwell tick of the unlock controller.
    UnlockTick,
    /// Overlay text spawn tick during the shock stage.
    OverlaySpawn,
    /// Next white-noise burst during the shock stage.
    NoiseBurst,
    /// Reveal of the narrative "continue" action.
    NarrativeReveal,
    /// Reveal of the epilogue "reboot" action.
    EpilogueReveal,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnlockTick => write!(f, "unlock_tick"),
            Self::OverlaySpawn => write!(f, "overlay_spawn"),
            Self::NoiseBurst => write!(f, "noise_burst"),
            Self::NarrativeReveal => write!(f, "narrative_reveal"),
            Self::EpilogueReveal => write!(f, "epilogue_reveal"),
        }
    }
}

/// A timer that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    pub id: TimerId,
    pub kind: TimerKind,
    /// Scheduler time at which the timer was due.
    pub at_ms: u64,
}

/// Timer registration surface handed to the archive's state machines.
pub trait Scheduler {
    /// Current scheduler time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Fire once after `delay`.
    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId;

    /// Fire every `interval`, first after one interval.
    fn schedule_repeating(&mut self, interval: Duration, kind: TimerKind) -> TimerId;

    /// Cancel a timer. Returns `false` if it was not scheduled (already fired
    /// one-shot, already cancelled, or unknown).
    fn cancel(&mut self, id: TimerId) -> bool;

    /// Whether `id` is still pending.
    fn is_scheduled(&self, id: TimerId) -> bool;
}

#[derive(Debug, Clone)]
struct TimerEntry {
    kind: TimerKind,
    interval_ms: Option<u64>,
    due_ms: u64,
    seq: u64,
}

/// Deterministic scheduler with an explicitly advanced clock.
///
/// Used directly by tests and the `simulate` command, and by the tokio
/// driver which advances it to wall-clock elapsed time.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    next_id: u64,
    next_seq: u64,
    queue: BTreeMap<(u64, u64), TimerId>,
    timers: HashMap<TimerId, TimerEntry>,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler whose clock starts at `now_ms`.
    #[must_use]
    pub fn starting_at(now_ms: u64) -> Self {
        Self {
            now_ms,
            ..Self::default()
        }
    }

    fn insert(&mut self, kind: TimerKind, delay_ms: u64, interval_ms: Option<u64>) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        let due_ms = self.now_ms.saturating_add(delay_ms);
        self.queue.insert((due_ms, seq), id);
        self.timers.insert(
            id,
            TimerEntry {
                kind,
                interval_ms,
                due_ms,
                seq,
            },
        );
        trace!(timer_id = %id, kind = %kind, due_ms, "Timer scheduled");
        id
    }

    /// Deadline of the earliest pending timer.
    #[must_use]
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    /// Pop the earliest timer due at or before `until_ms`, moving the clock to
    /// its deadline. Repeating timers are re-armed before returning.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<Fired> {
        let (&(due_ms, seq), &id) = self.queue.iter().next()?;
        if due_ms > until_ms {
            return None;
        }
        self.queue.remove(&(due_ms, seq));
        self.now_ms = self.now_ms.max(due_ms);

        let entry = self.timers.get_mut(&id)?;
        let kind = entry.kind;
        match entry.interval_ms {
            Some(interval) => {
                let next_seq = self.next_seq;
                self.next_seq += 1;
                entry.due_ms = due_ms.saturating_add(interval);
                entry.seq = next_seq;
                self.queue.insert((entry.due_ms, next_seq), id);
            }
            None => {
                self.timers.remove(&id);
            }
        }

        Some(Fired {
            id,
            kind,
            at_ms: due_ms,
        })
    }

    /// Move the clock forward without firing anything. Never moves backwards.
    pub fn advance_clock(&mut self, to_ms: u64) {
        self.now_ms = self.now_ms.max(to_ms);
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Number of pending timers of one kind.
    #[must_use]
    pub fn pending_of(&self, kind: TimerKind) -> usize {
        self.timers.values().filter(|entry| entry.kind == kind).count()
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerId {
        self.insert(kind, duration_ms(delay), None)
    }

    fn schedule_repeating(&mut self, interval: Duration, kind: TimerKind) -> TimerId {
        // A zero interval would never let the clock move past the deadline.
        let interval_ms = duration_ms(interval).max(1);
        self.insert(kind, interval_ms, Some(interval_ms))
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some(entry) => {
                self.queue.remove(&(entry.due_ms, entry.seq));
                trace!(timer_id = %id, kind = %entry.kind, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    fn is_scheduled(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(sched: &mut ManualScheduler, until_ms: u64) -> Vec<Fired> {
        let mut fired = Vec::new();
        while let Some(f) = sched.pop_due(until_ms) {
            fired.push(f);
        }
        sched.advance_clock(until_ms);
        fired
    }

    #[test]
    fn once_fires_exactly_once_at_deadline() {
        let mut sched = ManualScheduler::new();
        let id = sched.schedule_once(Duration::from_secs(10), TimerKind::NarrativeReveal);

        assert!(drain(&mut sched, 9_999).is_empty());
        let fired = drain(&mut sched, 10_000);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, id);
        assert_eq!(fired[0].at_ms, 10_000);
        assert!(!sched.is_scheduled(id));
        assert!(drain(&mut sched, 50_000).is_empty());
    }

    #[test]
    fn repeating_catches_up_tick_by_tick() {
        let mut sched = ManualScheduler::new();
        sched.schedule_repeating(Duration::from_millis(30), TimerKind::OverlaySpawn);
        let fired = drain(&mut sched, 95);
        let times: Vec<u64> = fired.iter().map(|f| f.at_ms).collect();
        assert_eq!(times, vec![30, 60, 90]);
        assert_eq!(sched.next_deadline_ms(), Some(120));
    }

    #[test]
    fn cancel_removes_pending_timer() {
        let mut sched = ManualScheduler::new();
        let id = sched.schedule_repeating(Duration::from_secs(1), TimerKind::UnlockTick);
        assert!(sched.cancel(id));
        assert!(!sched.cancel(id));
        assert!(drain(&mut sched, 10_000).is_empty());
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let mut sched = ManualScheduler::new();
        let a = sched.schedule_once(Duration::from_millis(5), TimerKind::NoiseBurst);
        let b = sched.schedule_once(Duration::from_millis(5), TimerKind::EpilogueReveal);
        let fired = drain(&mut sched, 5);
        assert_eq!(fired.iter().map(|f| f.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn clock_follows_popped_deadlines() {
        let mut sched = ManualScheduler::starting_at(1_000);
        sched.schedule_once(Duration::from_millis(40), TimerKind::NoiseBurst);
        let fired = sched.pop_due(5_000).unwrap();
        assert_eq!(fired.at_ms, 1_040);
        assert_eq!(sched.now_ms(), 1_040);
        sched.advance_clock(500);
        assert_eq!(sched.now_ms(), 1_040);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let mut sched = ManualScheduler::new();
        sched.schedule_repeating(Duration::ZERO, TimerKind::OverlaySpawn);
        assert_eq!(drain(&mut sched, 3).len(), 3);
        assert_eq!(sched.pending_of(TimerKind::OverlaySpawn), 1);
    }
}
