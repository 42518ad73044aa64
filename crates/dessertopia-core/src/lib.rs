//! dessertopia-core: engine of the Dessertopia restricted archive
//!
//! The archive discloses its content progressively. Phases unlock one at a
//! time after a dwell period, the chrome degrades as the visitor goes deeper,
//! and once every facility of the last phase has been read a scripted
//! narrative sequence takes over and ends the session.
//!
//! # Architecture
//!
//! ```text
//! Visit Tracker ─┐
//!                ├─> Completion Trigger ─> Narrative Sequencer ─> Session Reset
//! Corruption ────┘                          (overlay + audio)
//!
//! Progress Store <─> Phase Unlock Controller   (gated by navigation position)
//! ```
//!
//! # Modules
//!
//! - `progress_store`: key-value contract and the persisted unlock count
//! - `visit_tracker`: sections visited this session
//! - `unlock`: dwell-driven phase unlock gate
//! - `corruption`: corruption level, palette and footer diagnostics
//! - `completion`: completion trigger predicate
//! - `sequencer`: Idle / Shock / Narrative / Epilogue state machine
//! - `overlay`: procedural shock-stage overlay text
//! - `audio`: drone and noise synthesis behind a backend trait
//! - `rodio_synth`: default-device playback (`sound` feature)
//! - `session`: authorization collaborator and session reset
//! - `scheduler`: timer trait and deterministic manual scheduler
//! - `random`: injectable random sources
//! - `catalog`: phases, sections and evidence files
//! - `content`: fixed bilingual text
//! - `viewer`: navigation state wiring every component together
//! - `runtime`: tokio driver for the viewer
//! - `config`: configuration management
//! - `logging`: tracing subscriber setup
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod audio;
pub mod catalog;
pub mod completion;
pub mod config;
pub mod content;
pub mod corruption;
pub mod error;
pub mod logging;
pub mod overlay;
pub mod progress_store;
pub mod random;
#[cfg(feature = "sound")]
mod rodio_synth;
pub mod runtime;
pub mod scheduler;
pub mod sequencer;
pub mod session;
pub mod unlock;
pub mod viewer;
pub mod visit_tracker;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
