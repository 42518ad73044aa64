//! Shock-stage audio: a low sawtooth drone plus recurring white-noise bursts.
//!
//! Actual sound output is behind [`AudioSynth`]. The [`AudioDriver`] owns the
//! synth, generates noise buffers from its own random source, and degrades to
//! silence on the first failure without interrupting the visuals.
//!
//! With the `sound` feature, [`RodioSynth`] plays through the default output
//! device.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AudioConfig, SequenceConfig};
use crate::random::RandomSource;

#[cfg(feature = "sound")]
pub use crate::rodio_synth::RodioSynth;

/// Oscillator waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Sawtooth,
}

/// Continuous tone started on entry to the shock stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DroneSpec {
    pub waveform: Waveform,
    pub frequency_hz: f64,
    pub gain: f64,
    pub sample_rate: u32,
}

impl DroneSpec {
    /// Endless sample stream for this drone, before gain.
    #[must_use]
    pub fn wave(&self) -> SawtoothWave {
        SawtoothWave::new(self.frequency_hz, self.sample_rate)
    }
}

/// Mono sawtooth oscillator ramping from -1 to 1 once per period.
#[derive(Debug, Clone, PartialEq)]
pub struct SawtoothWave {
    step: f64,
    phase: f64,
    sample_rate: u32,
}

impl SawtoothWave {
    #[must_use]
    pub fn new(frequency_hz: f64, sample_rate: u32) -> Self {
        let step = if sample_rate == 0 {
            0.0
        } else {
            frequency_hz / f64::from(sample_rate)
        };
        Self {
            step,
            phase: 0.0,
            sample_rate,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Iterator for SawtoothWave {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = 2.0 * self.phase - 1.0;
        self.phase = (self.phase + self.step).fract();
        Some(sample as f32)
    }
}

/// One mono buffer of uniform noise in `[-1, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseBurst {
    pub sample_rate: u32,
    pub gain: f64,
    pub samples: Vec<f32>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("audio playback failed: {0}")]
    Playback(String),
}

/// Sound output backend.
pub trait AudioSynth: Send {
    /// Acquire the output and start the drone.
    fn start_drone(&mut self, spec: &DroneSpec) -> Result<(), AudioError>;

    /// Play one noise buffer.
    fn play_noise(&mut self, burst: &NoiseBurst) -> Result<(), AudioError>;

    /// Stop all sound and release the output. Must be safe to call twice.
    fn stop(&mut self);
}

/// Backend that accepts everything and produces nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSynth;

impl AudioSynth for SilentSynth {
    fn start_drone(&mut self, _spec: &DroneSpec) -> Result<(), AudioError> {
        Ok(())
    }

    fn play_noise(&mut self, _burst: &NoiseBurst) -> Result<(), AudioError> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// What a [`RecordingSynth`] has been asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioLog {
    pub drones: Vec<DroneSpec>,
    pub bursts: usize,
    pub burst_lengths: Vec<usize>,
    pub stops: usize,
}

/// Backend that records calls into a shared log. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSynth {
    log: Arc<Mutex<AudioLog>>,
    fail_start: bool,
}

impl RecordingSynth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A synth whose `start_drone` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Snapshot of the recorded calls.
    #[must_use]
    pub fn log(&self) -> AudioLog {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

impl AudioSynth for RecordingSynth {
    fn start_drone(&mut self, spec: &DroneSpec) -> Result<(), AudioError> {
        if self.fail_start {
            return Err(AudioError::Unavailable("no output device".to_string()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.drones.push(*spec);
        }
        Ok(())
    }

    fn play_noise(&mut self, burst: &NoiseBurst) -> Result<(), AudioError> {
        if let Ok(mut log) = self.log.lock() {
            log.bursts += 1;
            log.burst_lengths.push(burst.samples.len());
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut log) = self.log.lock() {
            log.stops += 1;
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Owns the synth for one sequencer and applies the degrade-once policy.
pub struct AudioDriver {
    synth: Option<Box<dyn AudioSynth>>,
    rng: Box<dyn RandomSource>,
    config: AudioConfig,
    noise_min_ms: u64,
    noise_max_ms: u64,
    playing: bool,
    degraded: bool,
    bursts_played: u64,
}

impl std::fmt::Debug for AudioDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDriver")
            .field("has_synth", &self.synth.is_some())
            .field("playing", &self.playing)
            .field("degraded", &self.degraded)
            .field("bursts_played", &self.bursts_played)
            .finish_non_exhaustive()
    }
}

impl AudioDriver {
    /// `synth` of `None` (or `config.enabled == false`) runs silently.
    #[must_use]
    pub fn new(
        synth: Option<Box<dyn AudioSynth>>,
        rng: Box<dyn RandomSource>,
        config: &AudioConfig,
        sequence: &SequenceConfig,
    ) -> Self {
        Self {
            synth: if config.enabled { synth } else { None },
            rng,
            config: *config,
            noise_min_ms: sequence.noise_min_ms,
            noise_max_ms: sequence.noise_max_ms,
            playing: false,
            degraded: false,
            bursts_played: 0,
        }
    }

    #[must_use]
    pub fn drone_spec(&self) -> DroneSpec {
        DroneSpec {
            waveform: Waveform::Sawtooth,
            frequency_hz: self.config.drone_hz,
            gain: self.config.drone_gain,
            sample_rate: self.config.sample_rate,
        }
    }

    /// Start the drone. Returns whether audio is now playing.
    pub fn start(&mut self) -> bool {
        if self.degraded {
            return false;
        }
        let spec = self.drone_spec();
        let Some(synth) = self.synth.as_mut() else {
            return false;
        };
        match synth.start_drone(&spec) {
            Ok(()) => {
                self.playing = true;
                debug!(frequency_hz = spec.frequency_hz, gain = spec.gain, "Drone started");
            }
            Err(err) => self.degrade(&err),
        }
        self.playing
    }

    /// Generate and play one noise burst. Returns whether audio is still
    /// playing afterwards.
    pub fn play_burst(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        let burst = self.generate_burst();
        let Some(synth) = self.synth.as_mut() else {
            return false;
        };
        match synth.play_noise(&burst) {
            Ok(()) => self.bursts_played += 1,
            Err(err) => self.degrade(&err),
        }
        self.playing
    }

    /// Noise buffer of `sample_rate * burst_ms / 1000` samples.
    pub fn generate_burst(&mut self) -> NoiseBurst {
        let len = (u64::from(self.config.sample_rate) * u64::from(self.config.burst_ms) / 1_000)
            as usize;
        let samples = (0..len)
            .map(|_| self.rng.uniform(-1.0, 1.0) as f32)
            .collect();
        NoiseBurst {
            sample_rate: self.config.sample_rate,
            gain: self.config.noise_gain,
            samples,
        }
    }

    /// Delay before the next burst, in `[noise_min_ms, noise_max_ms)`.
    pub fn next_burst_delay_ms(&mut self) -> u64 {
        let span = self.noise_max_ms.saturating_sub(self.noise_min_ms) as f64;
        let offset = (self.rng.next_f64() * span) as u64;
        self.noise_min_ms + offset.min(self.noise_max_ms.saturating_sub(self.noise_min_ms + 1))
    }

    /// Stop playback. No-op when nothing is playing.
    pub fn stop(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(synth) = self.synth.as_mut() {
            synth.stop();
        }
        self.playing = false;
        debug!(bursts = self.bursts_played, "Audio stopped");
    }

    fn degrade(&mut self, err: &AudioError) {
        if !self.degraded {
            warn!(error = %err, "Audio unavailable, continuing without sound");
        }
        self.degraded = true;
        if let Some(synth) = self.synth.as_mut() {
            synth.stop();
        }
        self.playing = false;
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    #[must_use]
    pub fn bursts_played(&self) -> u64 {
        self.bursts_played
    }
}
