//! Narrative sequencer: the scripted cutscene that ends an archive visit.
//!
//! # State Machine
//!
//! ```text
//! Idle ──trigger──> Shock ──interrupt──> Narrative ──continue──> Epilogue
//!   ^                                                               │
//!   └────────────────────────────reboot─────────────────────────────┘
//! ```
//!
//! - **Shock**: overlay text spawns on a repeating tick, a drone plays and
//!   noise bursts recur at random short delays.
//! - **Narrative**: fixed passages; `continue` unlocks after a delay.
//! - **Epilogue**: closing quote; `reboot` unlocks after a delay and performs
//!   the session reset.
//!
//! Every state exit runs one teardown that cancels the timers the state
//! owns. Timer callbacks are matched by id, so a callback for a cancelled
//! timer is ignored.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::AudioDriver;
use crate::config::SequenceConfig;
use crate::error::SequenceError;
use crate::overlay::{OverlayGenerator, OverlayItem, OverlayParams};
use crate::random::RandomSource;
use crate::scheduler::{Fired, Scheduler, TimerId, TimerKind};
use crate::session::{ResetOutcome, SessionHost, SessionReset};

/// Stage of the narrative sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceState {
    #[default]
    Idle,
    Shock,
    Narrative,
    Epilogue,
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Shock => write!(f, "shock"),
            Self::Narrative => write!(f, "narrative"),
            Self::Epilogue => write!(f, "epilogue"),
        }
    }
}

/// User actions that move the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceAction {
    Trigger,
    Interrupt,
    Continue,
    Reboot,
}

impl fmt::Display for SequenceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger => write!(f, "trigger"),
            Self::Interrupt => write!(f, "interrupt"),
            Self::Continue => write!(f, "continue"),
            Self::Reboot => write!(f, "reboot"),
        }
    }
}

/// Observable state of the sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceSnapshot {
    pub state: SequenceState,
    /// Milliseconds since the current state was entered.
    pub elapsed_ms: u64,
    pub overlay_items: usize,
    pub total_spawned: u64,
    pub continue_available: bool,
    pub reboot_available: bool,
    pub audio_playing: bool,
    pub audio_degraded: bool,
    pub noise_bursts: u64,
}

pub struct NarrativeSequencer {
    config: SequenceConfig,
    state: SequenceState,
    entered_at_ms: u64,
    overlay: OverlayGenerator,
    rng: Box<dyn RandomSource>,
    audio: AudioDriver,
    spawn_timer: Option<TimerId>,
    noise_timer: Option<TimerId>,
    reveal_timer: Option<TimerId>,
    action_ready: bool,
}

impl fmt::Debug for NarrativeSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrativeSequencer")
            .field("state", &self.state)
            .field("entered_at_ms", &self.entered_at_ms)
            .field("overlay_items", &self.overlay.len())
            .field("audio", &self.audio)
            .field("action_ready", &self.action_ready)
            .finish_non_exhaustive()
    }
}

impl NarrativeSequencer {
    /// `rng` feeds the overlay; the audio driver carries its own source.
    #[must_use]
    pub fn new(config: &SequenceConfig, rng: Box<dyn RandomSource>, audio: AudioDriver) -> Self {
        Self {
            config: *config,
            state: SequenceState::Idle,
            entered_at_ms: 0,
            overlay: OverlayGenerator::new(OverlayParams::from(config)),
            rng,
            audio,
            spawn_timer: None,
            noise_timer: None,
            reveal_timer: None,
            action_ready: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> SequenceState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state != SequenceState::Idle
    }

    /// Overlay items currently on screen, oldest first.
    pub fn overlay_items(&self) -> impl ExactSizeIterator<Item = &OverlayItem> {
        self.overlay.items()
    }

    #[must_use]
    pub fn audio(&self) -> &AudioDriver {
        &self.audio
    }

    /// Whether `id` is one of this sequencer's live timers.
    #[must_use]
    pub fn owns(&self, id: TimerId) -> bool {
        [self.spawn_timer, self.noise_timer, self.reveal_timer].contains(&Some(id))
    }

    // =========================================================================
    // User actions
    // =========================================================================

    /// `Idle -> Shock`, only while the completion trigger is armed.
    pub fn trigger<S: Scheduler + ?Sized>(
        &mut self,
        armed: bool,
        sched: &mut S,
    ) -> Result<(), SequenceError> {
        self.expect_state(SequenceState::Idle, SequenceAction::Trigger)?;
        if !armed {
            return Err(SequenceError::NotArmed);
        }
        self.enter(SequenceState::Shock, sched);
        Ok(())
    }

    /// `Shock -> Narrative`.
    pub fn interrupt<S: Scheduler + ?Sized>(&mut self, sched: &mut S) -> Result<(), SequenceError> {
        self.expect_state(SequenceState::Shock, SequenceAction::Interrupt)?;
        self.enter(SequenceState::Narrative, sched);
        Ok(())
    }

    /// `Narrative -> Epilogue`, once the continue action is revealed.
    pub fn continue_narrative<S: Scheduler + ?Sized>(
        &mut self,
        sched: &mut S,
    ) -> Result<(), SequenceError> {
        self.expect_state(SequenceState::Narrative, SequenceAction::Continue)?;
        self.expect_ready(SequenceAction::Continue, self.config.narrative_delay_ms, sched)?;
        self.enter(SequenceState::Epilogue, sched);
        Ok(())
    }

    /// `Epilogue -> Idle`, once the reboot action is revealed. Performs the
    /// session reset.
    pub fn reboot<S, H>(&mut self, sched: &mut S, host: &mut H) -> Result<ResetOutcome, SequenceError>
    where
        S: Scheduler + ?Sized,
        H: SessionHost + ?Sized,
    {
        self.expect_state(SequenceState::Epilogue, SequenceAction::Reboot)?;
        self.expect_ready(SequenceAction::Reboot, self.config.epilogue_delay_ms, sched)?;
        let outcome = SessionReset::perform(host);
        self.enter(SequenceState::Idle, sched);
        Ok(outcome)
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Handle a fired timer. Returns `false` when the timer is not ours.
    pub fn on_timer<S: Scheduler + ?Sized>(&mut self, fired: &Fired, sched: &mut S) -> bool {
        let id = Some(fired.id);
        if id == self.spawn_timer {
            let elapsed_ms = fired.at_ms.saturating_sub(self.entered_at_ms);
            self.overlay.spawn_batch(elapsed_ms, self.rng.as_mut());
            true
        } else if id == self.noise_timer {
            self.noise_timer = None;
            if self.audio.play_burst() {
                self.schedule_noise(sched);
            }
            true
        } else if id == self.reveal_timer {
            self.reveal_timer = None;
            self.action_ready = true;
            debug!(state = %self.state, "Sequence action revealed");
            true
        } else {
            false
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn expect_state(&self, expected: SequenceState, action: SequenceAction) -> Result<(), SequenceError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SequenceError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    fn expect_ready<S: Scheduler + ?Sized>(
        &self,
        action: SequenceAction,
        delay_ms: u64,
        sched: &S,
    ) -> Result<(), SequenceError> {
        if self.action_ready {
            return Ok(());
        }
        let ready_at = self.entered_at_ms.saturating_add(delay_ms);
        Err(SequenceError::NotYetAvailable {
            action,
            remaining_ms: ready_at.saturating_sub(sched.now_ms()),
        })
    }

    fn schedule_noise<S: Scheduler + ?Sized>(&mut self, sched: &mut S) {
        let delay = self.audio.next_burst_delay_ms();
        self.noise_timer = Some(sched.schedule_once(Duration::from_millis(delay), TimerKind::NoiseBurst));
    }

    fn schedule_reveal<S: Scheduler + ?Sized>(&mut self, delay_ms: u64, sched: &mut S) {
        if delay_ms == 0 {
            self.action_ready = true;
        } else {
            self.reveal_timer = Some(sched.schedule_once(
                Duration::from_millis(delay_ms),
                match self.state {
                    SequenceState::Epilogue => TimerKind::EpilogueReveal,
                    _ => TimerKind::NarrativeReveal,
                },
            ));
        }
    }

    /// Cancel every timer owned by the current state and release its
    /// resources.
    fn teardown<S: Scheduler + ?Sized>(&mut self, sched: &mut S) {
        for timer in [
            self.spawn_timer.take(),
            self.noise_timer.take(),
            self.reveal_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            sched.cancel(timer);
        }
        self.audio.stop();
        self.overlay.clear();
        self.action_ready = false;
    }

    fn enter<S: Scheduler + ?Sized>(&mut self, next: SequenceState, sched: &mut S) {
        let from = self.state;
        self.teardown(sched);
        self.state = next;
        self.entered_at_ms = sched.now_ms();

        match next {
            SequenceState::Idle => {}
            SequenceState::Shock => {
                self.spawn_timer = Some(sched.schedule_repeating(
                    Duration::from_millis(self.config.spawn_interval_ms),
                    TimerKind::OverlaySpawn,
                ));
                // First burst plays on entry, later ones on the noise timer.
                if self.audio.start() && self.audio.play_burst() {
                    self.schedule_noise(sched);
                }
            }
            SequenceState::Narrative => self.schedule_reveal(self.config.narrative_delay_ms, sched),
            SequenceState::Epilogue => self.schedule_reveal(self.config.epilogue_delay_ms, sched),
        }

        info!(from = %from, to = %next, at_ms = self.entered_at_ms, "Sequence transition");
    }

    #[must_use]
    pub fn snapshot(&self, now_ms: u64) -> SequenceSnapshot {
        SequenceSnapshot {
            state: self.state,
            elapsed_ms: now_ms.saturating_sub(self.entered_at_ms),
            overlay_items: self.overlay.len(),
            total_spawned: self.overlay.total_spawned(),
            continue_available: self.state == SequenceState::Narrative && self.action_ready,
            reboot_available: self.state == SequenceState::Epilogue && self.action_ready,
            audio_playing: self.audio.is_playing(),
            audio_degraded: self.audio.is_degraded(),
            noise_bursts: self.audio.bursts_played(),
        }
    }
}
