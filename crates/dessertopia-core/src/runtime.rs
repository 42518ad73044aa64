//! Async driver for the archive viewer.
//!
//! The runtime owns the viewer exclusively. It waits on two things at once:
//! the next scheduler deadline and the next user command. Elapsed tokio time
//! is mapped onto scheduler milliseconds before every dispatch, so timers and
//! commands interleave in wall-clock order. Status is published on a `watch`
//! channel after every change.
//!
//! The loop ends when every [`RuntimeHandle`] is dropped or after a
//! successful reboot.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::catalog::Lang;
use crate::error::{Error, Result};
use crate::progress_store::KvStore;
use crate::session::{ResetOutcome, SessionHost};
use crate::viewer::{ArchiveViewer, ViewerStatus};

/// Default command queue depth.
pub const COMMAND_CAPACITY: usize = 32;

/// A user action forwarded to the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    SelectPhase(usize),
    ReturnToPhases,
    OpenSection(usize),
    BackToSections,
    OpenFile(String),
    CloseFile,
    ZoomImage(String),
    CloseZoom,
    SetLang(Lang),
    Trigger,
    Interrupt,
    Continue,
    Reboot,
}

/// Why the runtime loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All handles were dropped.
    ChannelClosed,
    /// The sequence finished with a session reset.
    Rebooted(ResetOutcome),
}

struct Envelope {
    command: ViewerCommand,
    reply: oneshot::Sender<Result<()>>,
}

/// Client side of a running [`ArchiveRuntime`]. Cheap to clone.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Envelope>,
    status: watch::Receiver<ViewerStatus>,
}

impl RuntimeHandle {
    /// Send a command and wait for the viewer's verdict.
    pub async fn execute(&self, command: ViewerCommand) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| Error::Runtime("archive runtime has stopped".to_string()))?;
        response
            .await
            .map_err(|_| Error::Runtime("archive runtime dropped the reply".to_string()))?
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> ViewerStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status publication.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewerStatus> {
        self.status.clone()
    }
}

pub struct ArchiveRuntime<K, H> {
    viewer: ArchiveViewer<K, H>,
    commands: mpsc::Receiver<Envelope>,
    status: watch::Sender<ViewerStatus>,
    origin: Instant,
    origin_ms: u64,
}

impl<K: KvStore, H: SessionHost> ArchiveRuntime<K, H> {
    /// Wrap `viewer`; the viewer's current clock maps to "now".
    pub fn new(viewer: ArchiveViewer<K, H>) -> (Self, RuntimeHandle) {
        Self::with_capacity(viewer, COMMAND_CAPACITY)
    }

    pub fn with_capacity(viewer: ArchiveViewer<K, H>, capacity: usize) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = mpsc::channel(capacity.max(1));
        let (status_tx, status_rx) = watch::channel(viewer.status());
        let origin_ms = viewer.now_ms();
        let runtime = Self {
            viewer,
            commands: command_rx,
            status: status_tx,
            origin: Instant::now(),
            origin_ms,
        };
        let handle = RuntimeHandle {
            commands: command_tx,
            status: status_rx,
        };
        (runtime, handle)
    }

    fn elapsed_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }

    fn deadline_instant(&self) -> Option<Instant> {
        let due_ms = self.viewer.next_deadline_ms()?;
        let offset = due_ms.saturating_sub(self.origin_ms);
        Some(self.origin + Duration::from_millis(offset))
    }

    fn catch_up(&mut self) {
        let now_ms = self.elapsed_ms();
        self.viewer.advance(now_ms);
    }

    fn publish(&self) {
        self.status.send_replace(self.viewer.status());
    }

    fn apply(&mut self, command: ViewerCommand) -> Result<Option<ResetOutcome>> {
        let viewer = &mut self.viewer;
        match command {
            ViewerCommand::SelectPhase(index) => viewer.select_phase(index).map(|_| None),
            ViewerCommand::ReturnToPhases => viewer.return_to_phases().map(|()| None),
            ViewerCommand::OpenSection(index) => viewer.open_section(index).map(|_| None),
            ViewerCommand::BackToSections => viewer.back_to_sections().map(|()| None),
            ViewerCommand::OpenFile(id) => viewer.open_file(&id).map(|_| None),
            ViewerCommand::CloseFile => {
                viewer.close_file();
                Ok(None)
            }
            ViewerCommand::ZoomImage(url) => viewer.zoom_image(&url).map(|()| None),
            ViewerCommand::CloseZoom => {
                viewer.close_zoom();
                Ok(None)
            }
            ViewerCommand::SetLang(lang) => {
                viewer.set_lang(lang);
                Ok(None)
            }
            ViewerCommand::Trigger => viewer.trigger_sequence().map(|()| None),
            ViewerCommand::Interrupt => viewer.interrupt_sequence().map(|()| None),
            ViewerCommand::Continue => viewer.continue_narrative().map(|()| None),
            ViewerCommand::Reboot => viewer.reboot().map(Some),
        }
    }

    /// Drive the viewer until the channel closes or the sequence reboots.
    /// Returns the viewer alongside the outcome.
    pub async fn run(mut self) -> (RunOutcome, ArchiveViewer<K, H>) {
        info!("Archive runtime started");
        let outcome = loop {
            let deadline = self.deadline_instant();
            tokio::select! {
                maybe_envelope = self.commands.recv() => {
                    let Some(Envelope { command, reply }) = maybe_envelope else {
                        debug!("Command channel closed; archive runtime stopping");
                        break RunOutcome::ChannelClosed;
                    };
                    self.catch_up();
                    debug!(?command, "Applying viewer command");
                    let result = self.apply(command);
                    self.publish();
                    match result {
                        Ok(Some(reset)) => {
                            let _ = reply.send(Ok(()));
                            break RunOutcome::Rebooted(reset);
                        }
                        Ok(None) => {
                            let _ = reply.send(Ok(()));
                        }
                        Err(err) => {
                            warn!(error = %err, "Viewer command rejected");
                            let _ = reply.send(Err(err));
                        }
                    }
                }
                () = async {
                    match deadline {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.catch_up();
                    self.publish();
                }
            }
        };
        info!(?outcome, "Archive runtime stopped");
        (outcome, self.viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::progress_store::{MemoryStore, UNLOCK_KEY};
    use crate::random::ScriptedRandom;
    use crate::sequencer::SequenceState;
    use crate::session::InMemorySession;
    use crate::viewer::ArchiveView;

    fn viewer(unlocked: &str) -> ArchiveViewer<MemoryStore, InMemorySession> {
        ArchiveViewer::builder(
            Catalog::builtin().unwrap(),
            MemoryStore::new().with_entry(UNLOCK_KEY, unlocked),
            InMemorySession::authorized(),
        )
        .visual_random(Box::new(ScriptedRandom::constant(0.5)))
        .audio_random(Box::new(ScriptedRandom::constant(0.5)))
        .build()
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_unlocks_in_paused_time() {
        let (runtime, handle) = ArchiveRuntime::new(viewer("1"));
        let task = tokio::spawn(runtime.run());

        handle.execute(ViewerCommand::SelectPhase(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(handle.status().unlocked_count, 2);

        drop(handle);
        let (outcome, viewer) = task.await.unwrap();
        assert_eq!(outcome, RunOutcome::ChannelClosed);
        assert_eq!(viewer.progress_store().load(3), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_command_reports_error() {
        let (runtime, handle) = ArchiveRuntime::new(viewer("1"));
        let task = tokio::spawn(runtime.run());

        let err = handle.execute(ViewerCommand::SelectPhase(2)).await.unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
        assert_eq!(handle.status().view, ArchiveView::PhaseSelect);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn full_sequence_ends_with_reboot() {
        let (runtime, handle) = ArchiveRuntime::new(viewer("3"));
        let task = tokio::spawn(runtime.run());

        handle.execute(ViewerCommand::SelectPhase(2)).await.unwrap();
        for index in 0..3 {
            handle.execute(ViewerCommand::OpenSection(index)).await.unwrap();
            handle.execute(ViewerCommand::BackToSections).await.unwrap();
        }
        handle.execute(ViewerCommand::Trigger).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let shock = handle.status();
        assert_eq!(shock.sequence.state, SequenceState::Shock);
        assert!(shock.sequence.total_spawned > 0);

        handle.execute(ViewerCommand::Interrupt).await.unwrap();
        assert!(handle.execute(ViewerCommand::Continue).await.is_err());
        tokio::time::sleep(Duration::from_millis(10_050)).await;
        handle.execute(ViewerCommand::Continue).await.unwrap();
        tokio::time::sleep(Duration::from_millis(6_050)).await;
        handle.execute(ViewerCommand::Reboot).await.unwrap();

        let (outcome, viewer) = task.await.unwrap();
        assert!(matches!(outcome, RunOutcome::Rebooted(reset) if reset.was_authorized));
        assert!(!viewer.session().is_authorized());
        assert_eq!(viewer.session().history(), ["/"]);
        assert_eq!(viewer.sequence_state(), SequenceState::Idle);
    }
}
