//! Procedural overlay text for the shock stage.
//!
//! Every spawn tick appends a batch of randomly styled phrases. Batches grow
//! with time spent in the stage; the retained set is capped and discards the
//! oldest items first.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::trace;

use crate::config::SequenceConfig;
use crate::content::HORROR_PHRASES;
use crate::random::RandomSource;

/// Stroke weight of an overlay phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    Thin,
    Regular,
}

impl FontWeight {
    #[must_use]
    pub const fn css_weight(self) -> u16 {
        match self {
            Self::Thin => 200,
            Self::Regular => 400,
        }
    }
}

/// Colour of the glow behind a phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GlowTone {
    Bright,
    Dim,
}

impl GlowTone {
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Bright => "#FF0000",
            Self::Dim => "#800000",
        }
    }
}

/// One rendered phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayItem {
    /// Monotonic across the generator's lifetime.
    pub id: u64,
    pub text: &'static str,
    /// Horizontal position, percent of the surface (may overflow by 5).
    pub x_percent: f64,
    pub y_percent: f64,
    pub size_rem: f64,
    pub large: bool,
    pub rotation_deg: f64,
    pub opacity: f64,
    /// Horizontally mirrored.
    pub mirrored: bool,
    pub glitch: bool,
    pub flicker: bool,
    pub z_index: u32,
    pub weight: FontWeight,
    pub glow_tone: GlowTone,
    pub glow_px: f64,
    pub duration_s: f64,
}

/// Batch shape parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayParams {
    pub cap: usize,
    pub random_span: u32,
    pub growth_per_sec: u32,
    pub growth_cap: u32,
}

impl From<&SequenceConfig> for OverlayParams {
    fn from(config: &SequenceConfig) -> Self {
        Self {
            cap: config.overlay_cap,
            random_span: config.batch_random_span,
            growth_per_sec: config.batch_growth_per_sec,
            growth_cap: config.batch_growth_cap,
        }
    }
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self::from(&SequenceConfig::default())
    }
}

impl OverlayParams {
    /// Largest batch a single tick can produce.
    #[must_use]
    pub fn max_batch(&self) -> usize {
        (self.random_span.saturating_sub(1) + self.growth_cap) as usize
    }
}

/// Bounded FIFO of overlay items.
#[derive(Debug, Clone)]
pub struct OverlayGenerator {
    params: OverlayParams,
    items: VecDeque<OverlayItem>,
    next_id: u64,
}

impl OverlayGenerator {
    #[must_use]
    pub fn new(params: OverlayParams) -> Self {
        Self {
            params,
            items: VecDeque::with_capacity(params.cap),
            next_id: 0,
        }
    }

    /// Items for a tick `elapsed_ms` into the stage: a random part in
    /// `[0, random_span)` plus a growth part capped at `growth_cap`.
    pub fn batch_size(&self, elapsed_ms: u64, rng: &mut dyn RandomSource) -> usize {
        let random_part = rng.index(self.params.random_span.max(1) as usize);
        let grown = elapsed_ms.saturating_mul(u64::from(self.params.growth_per_sec)) / 1_000;
        let growth_part = grown.min(u64::from(self.params.growth_cap)) as usize;
        random_part + growth_part
    }

    /// Append one batch and trim to the cap. Returns the batch size.
    pub fn spawn_batch(&mut self, elapsed_ms: u64, rng: &mut dyn RandomSource) -> usize {
        let count = self.batch_size(elapsed_ms, rng);
        for _ in 0..count {
            let item = self.draw_item(rng);
            self.items.push_back(item);
        }
        while self.items.len() > self.params.cap {
            self.items.pop_front();
        }
        trace!(elapsed_ms, batch = count, retained = self.items.len(), "Overlay batch spawned");
        count
    }

    fn draw_item(&mut self, rng: &mut dyn RandomSource) -> OverlayItem {
        let large = rng.above(0.94);
        let glitch = rng.above(0.3);
        let flicker = rng.above(0.5);
        let weight = if rng.above(0.5) {
            FontWeight::Thin
        } else {
            FontWeight::Regular
        };
        let glow_tone = if rng.above(0.3) {
            GlowTone::Bright
        } else {
            GlowTone::Dim
        };
        let text = HORROR_PHRASES[rng.index(HORROR_PHRASES.len())];
        let x_percent = rng.uniform(-5.0, 105.0);
        let y_percent = rng.uniform(-5.0, 105.0);
        let size_rem = if large {
            rng.uniform(3.0, 9.0)
        } else {
            rng.uniform(0.4, 1.9)
        };
        let rotation_deg = rng.uniform(-30.0, 30.0);
        let opacity = rng.uniform(0.2, 1.0);
        let mirrored = rng.above(0.9);
        let z_index = rng.index(200) as u32;
        let glow_px = rng.uniform(5.0, 20.0);
        let duration_s = rng.uniform(1.0, 3.0);

        let id = self.next_id;
        self.next_id += 1;
        OverlayItem {
            id,
            text,
            x_percent,
            y_percent,
            size_rem,
            large,
            rotation_deg,
            opacity,
            mirrored,
            glitch,
            flicker,
            z_index,
            weight,
            glow_tone,
            glow_px,
            duration_s,
        }
    }

    /// Retained items, oldest first.
    pub fn items(&self) -> impl ExactSizeIterator<Item = &OverlayItem> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items generated since construction, including discarded ones.
    #[must_use]
    pub fn total_spawned(&self) -> u64 {
        self.next_id
    }

    #[must_use]
    pub fn params(&self) -> OverlayParams {
        self.params
    }

    /// Drop retained items. Ids keep increasing.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
