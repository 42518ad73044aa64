//! Corruption level, palette and footer diagnostics.
//!
//! Everything here is a pure function of the sequence state and the selected
//! phase; nothing is stored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sequencer::SequenceState;

/// Visual degradation tier of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionLevel {
    #[default]
    Calm,
    Unstable,
    Severe,
}

impl CorruptionLevel {
    /// Numeric level (0, 1 or 2).
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Calm => 0,
            Self::Unstable => 1,
            Self::Severe => 2,
        }
    }

    /// Level for a 0-based phase index.
    #[must_use]
    pub const fn for_phase_index(index: usize) -> Self {
        match index {
            0 => Self::Calm,
            1 => Self::Unstable,
            _ => Self::Severe,
        }
    }
}

impl fmt::Display for CorruptionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calm => write!(f, "calm"),
            Self::Unstable => write!(f, "unstable"),
            Self::Severe => write!(f, "severe"),
        }
    }
}

/// Derive the level.
///
/// `phase_index` is `None` on the phase selection screen. The shock stage
/// forces [`CorruptionLevel::Severe`] regardless of phase.
#[must_use]
pub fn corruption_level(sequence: SequenceState, phase_index: Option<usize>) -> CorruptionLevel {
    if sequence == SequenceState::Shock {
        return CorruptionLevel::Severe;
    }
    phase_index.map_or(CorruptionLevel::Calm, CorruptionLevel::for_phase_index)
}

// =============================================================================
// Palette
// =============================================================================

/// Theme colour of the archive chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub hex: &'static str,
    pub rgb: (u8, u8, u8),
}

impl Palette {
    pub const ALARM: Self = Self {
        hex: "#FF0000",
        rgb: (255, 0, 0),
    };
    pub const TERMINAL: Self = Self {
        hex: "#00ff41",
        rgb: (0, 255, 65),
    };
    pub const SHIFTED: Self = Self {
        hex: "#00FF66",
        rgb: (0, 255, 102),
    };
    pub const CYAN: Self = Self {
        hex: "#00FFC3",
        rgb: (0, 255, 195),
    };
}

/// Colour for the current state. Indices past the third phase fall back to
/// the terminal green.
#[must_use]
pub fn palette(sequence: SequenceState, phase_index: Option<usize>) -> Palette {
    if sequence == SequenceState::Shock {
        return Palette::ALARM;
    }
    match phase_index {
        Some(1) => Palette::SHIFTED,
        Some(2) => Palette::CYAN,
        _ => Palette::TERMINAL,
    }
}

// =============================================================================
// Footer diagnostics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryIntegrity {
    Stable,
    Failed,
}

impl fmt::Display for MemoryIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stable => write!(f, "STABLE"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// System readout shown beneath the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDiagnostics {
    pub syslog_decay_percent: u8,
    pub memory_integrity: MemoryIntegrity,
}

impl SystemDiagnostics {
    #[must_use]
    pub fn for_level(level: CorruptionLevel) -> Self {
        Self {
            syslog_decay_percent: level.as_u8() * 50,
            memory_integrity: if level == CorruptionLevel::Severe {
                MemoryIntegrity::Failed
            } else {
                MemoryIntegrity::Stable
            },
        }
    }
}
