//! Dwell-driven phase unlock gate.
//!
//! Phases unlock strictly in order. The newest unlocked phase is *eligible*
//! while more phases remain sealed; spending `dwell_required` ticks inside
//! its subtree (section list or any section detail) unlocks the next one.
//! Leaving the subtree resets the dwell counter.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::UnlockConfig;
use crate::content::LOCKED_PHASE_NOTICE;
use crate::error::NavigationError;
use crate::progress_store::{KvStore, ProgressStore};
use crate::scheduler::{Fired, Scheduler, TimerId, TimerKind};

/// Dwell progress toward the next unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnlockProgress {
    /// A dwell tick is running.
    pub in_progress: bool,
    pub dwell: u32,
    pub required: u32,
    /// `floor(dwell / required * 100)`
    pub percent: u8,
}

#[derive(Debug)]
pub struct PhaseUnlockController<K> {
    store: ProgressStore<K>,
    config: UnlockConfig,
    phase_count: u32,
    unlocked: u32,
    dwell: u32,
    tick: Option<TimerId>,
}

impl<K: KvStore> PhaseUnlockController<K> {
    /// Seed the unlock count from `store`.
    pub fn new(store: ProgressStore<K>, phase_count: u32, config: UnlockConfig) -> Self {
        let unlocked = store.load(phase_count);
        debug!(unlocked_count = unlocked, phase_count, "Unlock state loaded");
        Self {
            store,
            config,
            phase_count,
            unlocked,
            dwell: 0,
            tick: None,
        }
    }

    #[must_use]
    pub fn unlocked_count(&self) -> u32 {
        self.unlocked
    }

    #[must_use]
    pub fn phase_count(&self) -> u32 {
        self.phase_count
    }

    #[must_use]
    pub fn is_selectable(&self, index: usize) -> bool {
        index < self.unlocked as usize && index < self.phase_count as usize
    }

    /// Gate a phase selection.
    pub fn check_selectable(&self, index: usize) -> Result<(), NavigationError> {
        if index >= self.phase_count as usize {
            return Err(NavigationError::PhaseOutOfRange {
                index,
                count: self.phase_count as usize,
            });
        }
        if !self.is_selectable(index) {
            debug!(phase_index = index, unlocked_count = self.unlocked, "Locked phase refused");
            return Err(NavigationError::PhaseLocked {
                index,
                unlocked_count: self.unlocked,
                notice: LOCKED_PHASE_NOTICE.to_bilingual(),
            });
        }
        Ok(())
    }

    /// Index of the phase whose dwell unlocks the next one.
    #[must_use]
    pub fn eligible_index(&self) -> Option<usize> {
        (self.unlocked < self.phase_count).then(|| self.unlocked as usize - 1)
    }

    /// Re-evaluate arming for the current position. `position` is the
    /// selected phase index, or `None` on the phase selection screen.
    pub fn sync<S: Scheduler + ?Sized>(&mut self, position: Option<usize>, sched: &mut S) {
        let should_arm = position.is_some() && position == self.eligible_index();
        match (should_arm, self.tick) {
            (true, None) => {
                self.dwell = 0;
                let interval = Duration::from_millis(self.config.tick_ms);
                self.tick = Some(sched.schedule_repeating(interval, TimerKind::UnlockTick));
                debug!(phase_index = ?position, "Unlock dwell armed");
            }
            (false, Some(tick)) => {
                sched.cancel(tick);
                self.tick = None;
                self.dwell = 0;
                debug!(phase_index = ?position, "Unlock dwell disarmed");
            }
            _ => {}
        }
    }

    #[must_use]
    pub fn owns(&self, id: TimerId) -> bool {
        self.tick == Some(id)
    }

    /// Handle a dwell tick. Returns the new unlock count when this tick
    /// unlocked a phase. Ticks from other timers are ignored.
    pub fn on_tick<S: Scheduler + ?Sized>(&mut self, fired: &Fired, sched: &mut S) -> Option<u32> {
        if !self.owns(fired.id) {
            trace!(timer_id = %fired.id, "Ignoring stale unlock tick");
            return None;
        }
        self.dwell += 1;
        trace!(dwell = self.dwell, required = self.config.dwell_required, "Dwell tick");
        if self.dwell < self.config.dwell_required {
            return None;
        }

        if let Some(tick) = self.tick.take() {
            sched.cancel(tick);
        }
        self.dwell = 0;
        self.unlocked = (self.unlocked + 1).min(self.phase_count);
        // A failed write is logged by the store; the in-memory count still
        // advances for this session.
        self.store.save(self.unlocked);
        info!(
            unlocked_count = self.unlocked,
            phase_count = self.phase_count,
            "Phase unlocked"
        );
        Some(self.unlocked)
    }

    #[must_use]
    pub fn progress(&self) -> UnlockProgress {
        let required = self.config.dwell_required;
        let percent = (u64::from(self.dwell) * 100 / u64::from(required.max(1))).min(100) as u8;
        UnlockProgress {
            in_progress: self.tick.is_some(),
            dwell: self.dwell,
            required,
            percent,
        }
    }

    #[must_use]
    pub fn progress_store(&self) -> &ProgressStore<K> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_store::{MemoryStore, UNLOCK_KEY};
    use crate::scheduler::ManualScheduler;

    fn controller(stored: Option<&str>) -> PhaseUnlockController<MemoryStore> {
        let mut store = MemoryStore::new();
        if let Some(raw) = stored {
            store = store.with_entry(UNLOCK_KEY, raw);
        }
        PhaseUnlockController::new(ProgressStore::new(store), 3, UnlockConfig::default())
    }

    fn run(
        ctl: &mut PhaseUnlockController<MemoryStore>,
        sched: &mut ManualScheduler,
        until_ms: u64,
    ) -> Vec<u32> {
        let mut unlocks = Vec::new();
        while let Some(fired) = sched.pop_due(until_ms) {
            if let Some(count) = ctl.on_tick(&fired, sched) {
                unlocks.push(count);
            }
        }
        sched.advance_clock(until_ms);
        unlocks
    }

    #[test]
    fn only_unlocked_phases_are_selectable() {
        let ctl = controller(None);
        assert!(ctl.check_selectable(0).is_ok());
        assert!(matches!(
            ctl.check_selectable(1),
            Err(NavigationError::PhaseLocked { index: 1, unlocked_count: 1, .. })
        ));
        assert!(matches!(
            ctl.check_selectable(3),
            Err(NavigationError::PhaseOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn five_seconds_on_eligible_phase_unlocks_next() {
        let mut ctl = controller(None);
        let mut sched = ManualScheduler::new();
        ctl.sync(Some(0), &mut sched);
        assert!(ctl.progress().in_progress);

        assert!(run(&mut ctl, &mut sched, 4_000).is_empty());
        assert_eq!(ctl.progress().dwell, 4);
        assert_eq!(ctl.progress().percent, 80);

        assert_eq!(run(&mut ctl, &mut sched, 5_000), vec![2]);
        assert_eq!(ctl.unlocked_count(), 2);
        assert_eq!(ctl.progress_store().load(3), 2);
        assert_eq!(ctl.progress().dwell, 0);
        assert!(!ctl.progress().in_progress);

        // Still on phase 0, which is no longer eligible.
        ctl.sync(Some(0), &mut sched);
        assert!(run(&mut ctl, &mut sched, 20_000).is_empty());
        assert_eq!(ctl.unlocked_count(), 2);
    }

    #[test]
    fn leaving_resets_dwell() {
        let mut ctl = controller(None);
        let mut sched = ManualScheduler::new();
        ctl.sync(Some(0), &mut sched);
        run(&mut ctl, &mut sched, 3_000);
        ctl.sync(None, &mut sched);
        assert_eq!(ctl.progress().dwell, 0);
        assert_eq!(sched.pending(), 0);

        ctl.sync(Some(0), &mut sched);
        run(&mut ctl, &mut sched, 7_000);
        assert_eq!(ctl.progress().dwell, 4);
        assert_eq!(ctl.unlocked_count(), 1);
    }

    #[test]
    fn syncing_same_position_keeps_counter() {
        let mut ctl = controller(None);
        let mut sched = ManualScheduler::new();
        ctl.sync(Some(0), &mut sched);
        run(&mut ctl, &mut sched, 2_000);
        ctl.sync(Some(0), &mut sched);
        assert_eq!(ctl.progress().dwell, 2);
        assert_eq!(sched.pending(), 1);
    }

    #[test]
    fn non_eligible_phase_never_arms() {
        let mut ctl = controller(Some("2"));
        let mut sched = ManualScheduler::new();
        ctl.sync(Some(0), &mut sched);
        assert!(!ctl.progress().in_progress);
        ctl.sync(Some(1), &mut sched);
        assert!(ctl.progress().in_progress);
    }

    #[test]
    fn fully_unlocked_never_arms() {
        let mut ctl = controller(Some("3"));
        let mut sched = ManualScheduler::new();
        assert_eq!(ctl.eligible_index(), None);
        for index in 0..3 {
            ctl.sync(Some(index), &mut sched);
            assert_eq!(sched.pending(), 0);
        }
    }

    #[test]
    fn stale_tick_is_ignored() {
        let mut ctl = controller(None);
        let mut sched = ManualScheduler::new();
        ctl.sync(Some(0), &mut sched);
        let other = sched.schedule_once(Duration::from_millis(10), TimerKind::NoiseBurst);
        let fired = sched.pop_due(10).unwrap();
        assert_eq!(fired.id, other);
        assert_eq!(ctl.on_tick(&fired, &mut sched), None);
        assert_eq!(ctl.progress().dwell, 0);
    }
}
