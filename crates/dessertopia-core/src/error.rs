//! Error types for dessertopia-core

use std::fmt::Write;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Bilingual;
use crate::sequencer::{SequenceAction, SequenceState};

/// Remediation command for resolving an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RemediationCommand {
    /// Short label describing the command purpose
    pub label: String,
    /// Command to run
    pub command: String,
}

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<RemediationCommand>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push(RemediationCommand {
            label: label.into(),
            command: command.into(),
        });
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for cmd in &self.commands {
                let _ = writeln!(output, "    - {}: {}", cmd.label, cmd.command);
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dessertopia-core
#[derive(Error, Debug)]
pub enum Error {
    /// Key-value store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Catalog loading/validation errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Navigation requests the viewer refused
    #[error("Navigation rejected: {0}")]
    Navigation(#[from] NavigationError),

    /// Narrative sequence transition errors
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// The archive was opened without an authorized session
    #[error("Session is not authorized for the restricted archive")]
    Unauthorized,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Runtime errors (driver channel failures, etc.)
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Store(_) => Some(
                Remediation::new("Check that the archive state file is readable and writable.")
                    .command("Status", "archive status")
                    .alternative("Point --state at a writable location."),
            ),
            Self::Config(err) => Some(err.remediation()),
            Self::Catalog(_) => Some(
                Remediation::new("Validate the phase catalog JSON and retry.")
                    .command("Show catalog", "archive catalog --json")
                    .alternative("Remove the stored catalog to fall back to the built-in one."),
            ),
            Self::Unauthorized => Some(
                Remediation::new("Authorize the session before opening the archive.")
                    .alternative("The archive only opens for an authorized session."),
            ),
            Self::Io(_) => Some(
                Remediation::new("Check filesystem permissions and paths, then retry.")
                    .alternative("Verify the state directory exists and is writable."),
            ),
            Self::Navigation(_) | Self::Sequence(_) | Self::Json(_) | Self::Runtime(_) => None,
        }
    }
}

/// Key-value store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),

    #[error("failed to access store file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::Read { path, .. } => Remediation::new(format!(
                "Verify the config file exists and is readable: {}",
                path.display()
            ))
            .alternative("Omit --config to run with built-in defaults."),
            Self::Parse(_) => Remediation::new("Fix the TOML syntax in the config file.")
                .alternative("Compare against the defaults documented in ArchiveConfig."),
            Self::Invalid(_) => Remediation::new("Correct the rejected value and retry.")
                .alternative("Intervals and thresholds must be greater than zero."),
        }
    }
}

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog has no phases")]
    Empty,

    #[error("duplicate phase id: {0}")]
    DuplicatePhase(String),

    #[error("duplicate section id: {0}")]
    DuplicateSection(String),

    #[error("phase {0} has no sections")]
    EmptyPhase(String),

    #[error("malformed catalog JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Navigation requests refused by the archive viewer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    /// The phase is still sealed; carries the user-facing notice.
    #[error("phase {index} is locked (unlocked: {unlocked_count}): {}", .notice.en)]
    PhaseLocked {
        index: usize,
        unlocked_count: u32,
        notice: Bilingual,
    },

    #[error("phase index {index} out of range (phases: {count})")]
    PhaseOutOfRange { index: usize, count: usize },

    #[error("section index {index} out of range (sections: {count})")]
    SectionOutOfRange { index: usize, count: usize },

    #[error("no phase selected")]
    NoPhaseSelected,

    #[error("no section open")]
    NoSectionOpen,

    #[error("evidence file not found: {0}")]
    FileNotFound(String),

    #[error("image not part of the open section: {0}")]
    ImageNotFound(String),

    #[error("section {0} shows its files as a gallery; zoom an image instead")]
    GalleryOnly(String),

    #[error("navigation unavailable while the {0} sequence is running")]
    SequenceActive(SequenceState),
}

/// Narrative sequence transition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("cannot {action} while in {from}")]
    InvalidTransition {
        from: SequenceState,
        action: SequenceAction,
    },

    #[error("completion trigger is not armed")]
    NotArmed,

    #[error("{action} becomes available in {remaining_ms} ms")]
    NotYetAvailable {
        action: SequenceAction,
        remaining_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remediation_renders_commands_and_alternatives() {
        let text = Remediation::new("Do the thing.")
            .command("Status", "archive status")
            .alternative("Or not.")
            .render_plain();
        assert!(text.contains("To fix:"));
        assert!(text.contains("Status: archive status"));
        assert!(text.contains("- Or not."));
    }

    #[test]
    fn locked_phase_message_uses_english_notice() {
        let err = NavigationError::PhaseLocked {
            index: 2,
            unlocked_count: 1,
            notice: Bilingual::new("잠김", "Locked"),
        };
        let message = err.to_string();
        assert!(message.contains("phase 2 is locked"));
        assert!(message.contains("Locked"));
    }

    #[test]
    fn unauthorized_has_remediation() {
        assert!(Error::Unauthorized.remediation().is_some());
        let nav: Error = NavigationError::NoPhaseSelected.into();
        assert!(nav.remediation().is_none());
    }

    #[test]
    fn config_parse_error_converts() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: Error = ConfigError::Parse(parse_err).into();
        assert!(err.to_string().starts_with("Config error:"));
    }
}
