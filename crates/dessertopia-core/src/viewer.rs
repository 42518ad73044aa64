//! The archive viewer: navigation state plus every engine component.
//!
//! The viewer owns the scheduler and is the single place where state
//! changes. User operations mutate it directly; [`ArchiveViewer::advance`]
//! pops due timers and routes each one to the component that owns it.

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::audio::{AudioDriver, AudioSynth};
use crate::catalog::{Catalog, EvidenceFile, Lang, Phase, Section};
use crate::completion::completion_armed;
use crate::config::ArchiveConfig;
use crate::corruption::{
    CorruptionLevel, Palette, SystemDiagnostics, corruption_level, palette,
};
use crate::error::{Error, NavigationError, Result};
use crate::progress_store::{KvStore, ProgressStore};
use crate::random::{RandomSource, SeededRandom};
use crate::scheduler::{ManualScheduler, Scheduler};
use crate::sequencer::{NarrativeSequencer, SequenceSnapshot, SequenceState};
use crate::session::{ResetOutcome, SessionHost};
use crate::unlock::{PhaseUnlockController, UnlockProgress};
use crate::visit_tracker::VisitTracker;

/// Top-level screen of the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveView {
    #[default]
    PhaseSelect,
    SectionSelect,
    SectionDetail,
}

/// Serializable snapshot of the whole viewer.
#[derive(Debug, Clone, Serialize)]
pub struct ViewerStatus {
    pub now_ms: u64,
    pub view: ArchiveView,
    pub lang: Lang,
    pub authorized: bool,
    pub selected_phase: Option<usize>,
    pub selected_phase_id: Option<String>,
    pub selected_section_id: Option<String>,
    pub open_file: Option<String>,
    pub zoomed_image: Option<String>,
    pub unlocked_count: u32,
    pub phase_count: u32,
    pub unlock: UnlockProgress,
    pub corruption_level: CorruptionLevel,
    pub palette: Palette,
    pub diagnostics: SystemDiagnostics,
    pub visited_sections: Vec<String>,
    pub completion_armed: bool,
    pub gallery: bool,
    pub sequence: SequenceSnapshot,
}

/// Assembles an [`ArchiveViewer`].
pub struct ArchiveViewerBuilder<K, H> {
    catalog: Catalog,
    store: K,
    session: H,
    config: ArchiveConfig,
    visual_random: Option<Box<dyn RandomSource>>,
    audio_random: Option<Box<dyn RandomSource>>,
    synth: Option<Box<dyn AudioSynth>>,
    start_ms: u64,
}

impl<K: KvStore, H: SessionHost> ArchiveViewerBuilder<K, H> {
    #[must_use]
    pub fn config(mut self, config: ArchiveConfig) -> Self {
        self.config = config;
        self
    }

    /// Source for overlay draws. Defaults to an OS-seeded source.
    #[must_use]
    pub fn visual_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.visual_random = Some(rng);
        self
    }

    /// Source for noise samples and burst timing. Defaults to an OS-seeded
    /// source.
    #[must_use]
    pub fn audio_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.audio_random = Some(rng);
        self
    }

    /// Audio backend. Without one the shock stage runs silently.
    #[must_use]
    pub fn synth(mut self, synth: Box<dyn AudioSynth>) -> Self {
        self.synth = Some(synth);
        self
    }

    /// Initial scheduler clock.
    #[must_use]
    pub fn start_ms(mut self, start_ms: u64) -> Self {
        self.start_ms = start_ms;
        self
    }

    /// Fails with [`Error::Unauthorized`] when the session is not authorized.
    pub fn build(self) -> Result<ArchiveViewer<K, H>> {
        if !self.session.is_authorized() {
            return Err(Error::Unauthorized);
        }
        self.config.validate()?;

        let config = self.config;
        let audio = AudioDriver::new(
            self.synth,
            self.audio_random
                .unwrap_or_else(|| Box::new(SeededRandom::from_os())),
            &config.audio,
            &config.sequence,
        );
        let sequencer = NarrativeSequencer::new(
            &config.sequence,
            self.visual_random
                .unwrap_or_else(|| Box::new(SeededRandom::from_os())),
            audio,
        );
        let unlock = PhaseUnlockController::new(
            ProgressStore::new(self.store),
            self.catalog.phase_count(),
            config.unlock,
        );
        info!(
            phases = self.catalog.len(),
            unlocked_count = unlock.unlocked_count(),
            lang = %config.general.lang,
            "Archive opened"
        );

        Ok(ArchiveViewer {
            catalog: self.catalog,
            scheduler: ManualScheduler::starting_at(self.start_ms),
            unlock,
            visits: VisitTracker::new(),
            sequencer,
            session: self.session,
            lang: config.general.lang,
            view: ArchiveView::PhaseSelect,
            phase: None,
            section: None,
            open_file: None,
            zoomed_image: None,
        })
    }
}

#[derive(Debug)]
pub struct ArchiveViewer<K, H> {
    catalog: Catalog,
    scheduler: ManualScheduler,
    unlock: PhaseUnlockController<K>,
    visits: VisitTracker,
    sequencer: NarrativeSequencer,
    session: H,
    lang: Lang,
    view: ArchiveView,
    phase: Option<usize>,
    section: Option<usize>,
    open_file: Option<String>,
    zoomed_image: Option<String>,
}

impl<K: KvStore, H: SessionHost> ArchiveViewer<K, H> {
    #[must_use]
    pub fn builder(catalog: Catalog, store: K, session: H) -> ArchiveViewerBuilder<K, H> {
        ArchiveViewerBuilder {
            catalog,
            store,
            session,
            config: ArchiveConfig::default(),
            visual_random: None,
            audio_random: None,
            synth: None,
            start_ms: 0,
        }
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Enter a phase's section list. Sealed phases are refused with the
    /// locked notice and change nothing.
    pub fn select_phase(&mut self, index: usize) -> Result<&Phase> {
        self.ensure_navigable()?;
        self.unlock.check_selectable(index)?;
        self.phase = Some(index);
        self.section = None;
        self.close_overlays();
        self.view = ArchiveView::SectionSelect;
        debug!(phase_index = index, "Phase selected");
        self.resync_unlock();
        self.current_phase().ok_or(Error::Navigation(NavigationError::NoPhaseSelected))
    }

    pub fn return_to_phases(&mut self) -> Result<()> {
        self.ensure_navigable()?;
        self.reset_navigation();
        self.resync_unlock();
        Ok(())
    }

    /// Open a section of the selected phase and record the visit.
    pub fn open_section(&mut self, index: usize) -> Result<&Section> {
        self.ensure_navigable()?;
        let phase = self
            .current_phase()
            .ok_or(NavigationError::NoPhaseSelected)?;
        let section = phase
            .sections
            .get(index)
            .ok_or(NavigationError::SectionOutOfRange {
                index,
                count: phase.sections.len(),
            })?;
        let section_id = section.id.clone();

        self.visits.record(&section_id);
        self.section = Some(index);
        self.close_overlays();
        self.view = ArchiveView::SectionDetail;
        debug!(section_id = %section_id, "Section opened");
        self.resync_unlock();
        self.current_section()
            .ok_or(Error::Navigation(NavigationError::NoSectionOpen))
    }

    pub fn back_to_sections(&mut self) -> Result<()> {
        self.ensure_navigable()?;
        if self.view != ArchiveView::SectionDetail {
            return Err(NavigationError::NoSectionOpen.into());
        }
        self.section = None;
        self.close_overlays();
        self.view = ArchiveView::SectionSelect;
        self.resync_unlock();
        Ok(())
    }

    /// Open one evidence file. Sections rendered as a gallery only show
    /// their flattened images and refuse this.
    pub fn open_file(&mut self, file_id: &str) -> Result<&EvidenceFile> {
        self.ensure_navigable()?;
        let level = self.corruption_level();
        let section = self.current_section().ok_or(NavigationError::NoSectionOpen)?;
        if section.renders_as_gallery(level) {
            return Err(NavigationError::GalleryOnly(section.id.clone()).into());
        }
        if section.file(file_id).is_none() {
            return Err(NavigationError::FileNotFound(file_id.to_string()).into());
        }
        self.open_file = Some(file_id.to_string());
        self.zoomed_image = None;
        self.current_section()
            .and_then(|section| section.file(file_id))
            .ok_or_else(|| NavigationError::FileNotFound(file_id.to_string()).into())
    }

    pub fn close_file(&mut self) {
        self.open_file = None;
        self.zoomed_image = None;
    }

    /// Zoom an image belonging to the open section.
    pub fn zoom_image(&mut self, url: &str) -> Result<()> {
        self.ensure_navigable()?;
        let section = self.current_section().ok_or(NavigationError::NoSectionOpen)?;
        if !section.contains_image(url) {
            return Err(NavigationError::ImageNotFound(url.to_string()).into());
        }
        self.zoomed_image = Some(url.to_string());
        Ok(())
    }

    pub fn close_zoom(&mut self) {
        self.zoomed_image = None;
    }

    pub fn set_lang(&mut self, lang: Lang) {
        self.lang = lang;
    }

    // =========================================================================
    // Sequence
    // =========================================================================

    pub fn trigger_sequence(&mut self) -> Result<()> {
        if !self.session.is_authorized() {
            return Err(Error::Unauthorized);
        }
        let armed = self.completion_armed();
        self.sequencer.trigger(armed, &mut self.scheduler)?;
        self.close_overlays();
        Ok(())
    }

    pub fn interrupt_sequence(&mut self) -> Result<()> {
        self.sequencer.interrupt(&mut self.scheduler)?;
        Ok(())
    }

    pub fn continue_narrative(&mut self) -> Result<()> {
        self.sequencer.continue_narrative(&mut self.scheduler)?;
        Ok(())
    }

    /// Finish the sequence: reset the session and return to phase select.
    ///
    /// The viewer is closed afterwards. Navigation and the trigger fail with
    /// [`Error::Unauthorized`] and the visited set starts over.
    pub fn reboot(&mut self) -> Result<ResetOutcome> {
        let outcome = self
            .sequencer
            .reboot(&mut self.scheduler, &mut self.session)?;
        self.reset_navigation();
        self.visits = VisitTracker::new();
        self.resync_unlock();
        info!(route = outcome.route, "Archive closed by session reset");
        Ok(outcome)
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Fire every timer due at or before `now_ms`, in deadline order.
    /// Returns how many were dispatched to a live owner.
    pub fn advance(&mut self, now_ms: u64) -> usize {
        let mut dispatched = 0;
        while let Some(fired) = self.scheduler.pop_due(now_ms) {
            if self.unlock.owns(fired.id) {
                dispatched += 1;
                if self.unlock.on_tick(&fired, &mut self.scheduler).is_some() {
                    self.resync_unlock();
                }
            } else if self.sequencer.on_timer(&fired, &mut self.scheduler) {
                dispatched += 1;
            } else {
                trace!(timer_id = %fired.id, kind = %fired.kind, "Dropped timer without owner");
            }
        }
        self.scheduler.advance_clock(now_ms);
        dispatched
    }

    /// Advance by `delta_ms` from the current clock.
    pub fn advance_by(&mut self, delta_ms: u64) -> usize {
        let target = self.scheduler.now_ms().saturating_add(delta_ms);
        self.advance(target)
    }

    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.scheduler.now_ms()
    }

    #[must_use]
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.scheduler.next_deadline_ms()
    }

    // =========================================================================
    // Derived state
    // =========================================================================

    /// Phase index used for level and palette; `None` on phase select.
    fn level_phase(&self) -> Option<usize> {
        match self.view {
            ArchiveView::PhaseSelect => None,
            _ => self.phase,
        }
    }

    #[must_use]
    pub fn corruption_level(&self) -> CorruptionLevel {
        corruption_level(self.sequencer.state(), self.level_phase())
    }

    #[must_use]
    pub fn palette(&self) -> Palette {
        palette(self.sequencer.state(), self.level_phase())
    }

    #[must_use]
    pub fn completion_armed(&self) -> bool {
        completion_armed(
            self.corruption_level(),
            &self.catalog,
            self.phase,
            &self.visits,
        )
    }

    #[must_use]
    pub fn status(&self) -> ViewerStatus {
        let level = self.corruption_level();
        let now_ms = self.scheduler.now_ms();
        ViewerStatus {
            now_ms,
            view: self.view,
            lang: self.lang,
            authorized: self.session.is_authorized(),
            selected_phase: self.phase,
            selected_phase_id: self.current_phase().map(|phase| phase.id.clone()),
            selected_section_id: self.current_section().map(|section| section.id.clone()),
            open_file: self.open_file.clone(),
            zoomed_image: self.zoomed_image.clone(),
            unlocked_count: self.unlock.unlocked_count(),
            phase_count: self.unlock.phase_count(),
            unlock: self.unlock.progress(),
            corruption_level: level,
            palette: self.palette(),
            diagnostics: SystemDiagnostics::for_level(level),
            visited_sections: self.visits.visited().into_iter().map(str::to_string).collect(),
            completion_armed: self.completion_armed(),
            gallery: self
                .current_section()
                .is_some_and(|section| section.renders_as_gallery(level)),
            sequence: self.sequencer.snapshot(now_ms),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn view(&self) -> ArchiveView {
        self.view
    }

    #[must_use]
    pub fn lang(&self) -> Lang {
        self.lang
    }

    #[must_use]
    pub fn current_phase(&self) -> Option<&Phase> {
        self.phase.and_then(|index| self.catalog.phase(index))
    }

    #[must_use]
    pub fn current_section(&self) -> Option<&Section> {
        let phase = self.current_phase()?;
        self.section.and_then(|index| phase.sections.get(index))
    }

    #[must_use]
    pub fn unlocked_count(&self) -> u32 {
        self.unlock.unlocked_count()
    }

    #[must_use]
    pub fn unlock_progress(&self) -> UnlockProgress {
        self.unlock.progress()
    }

    #[must_use]
    pub fn visits(&self) -> &VisitTracker {
        &self.visits
    }

    #[must_use]
    pub fn sequence_state(&self) -> SequenceState {
        self.sequencer.state()
    }

    #[must_use]
    pub fn sequencer(&self) -> &NarrativeSequencer {
        &self.sequencer
    }

    #[must_use]
    pub fn session(&self) -> &H {
        &self.session
    }

    #[must_use]
    pub fn progress_store(&self) -> &ProgressStore<K> {
        self.unlock.progress_store()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Navigation needs an authorized session and an idle sequence.
    fn ensure_navigable(&self) -> Result<()> {
        if !self.session.is_authorized() {
            return Err(Error::Unauthorized);
        }
        match self.sequencer.state() {
            SequenceState::Idle => Ok(()),
            state => Err(NavigationError::SequenceActive(state).into()),
        }
    }

    fn close_overlays(&mut self) {
        self.open_file = None;
        self.zoomed_image = None;
    }

    fn reset_navigation(&mut self) {
        self.view = ArchiveView::PhaseSelect;
        self.phase = None;
        self.section = None;
        self.close_overlays();
    }

    fn resync_unlock(&mut self) {
        let position = self.level_phase();
        self.unlock.sync(position, &mut self.scheduler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress_store::{MemoryStore, UNLOCK_KEY};
    use crate::random::ScriptedRandom;
    use crate::session::InMemorySession;

    fn viewer_with(store: MemoryStore) -> ArchiveViewer<MemoryStore, InMemorySession> {
        ArchiveViewer::builder(
            Catalog::builtin().unwrap(),
            store,
            InMemorySession::authorized(),
        )
        .visual_random(Box::new(ScriptedRandom::constant(0.5)))
        .audio_random(Box::new(ScriptedRandom::constant(0.5)))
        .build()
        .unwrap()
    }

    #[test]
    fn unauthorized_session_is_refused() {
        let result = ArchiveViewer::builder(
            Catalog::builtin().unwrap(),
            MemoryStore::new(),
            InMemorySession::new(false),
        )
        .build();
        assert!(matches!(result, Err(Error::Unauthorized)));
    }

    #[test]
    fn locked_phase_leaves_state_untouched() {
        let mut viewer = viewer_with(MemoryStore::new());
        let err = viewer.select_phase(1).unwrap_err();
        assert!(matches!(
            err,
            Error::Navigation(NavigationError::PhaseLocked { index: 1, .. })
        ));
        assert_eq!(viewer.view(), ArchiveView::PhaseSelect);
        assert!(viewer.current_phase().is_none());
    }

    #[test]
    fn detail_view_keeps_dwell_running() {
        let mut viewer = viewer_with(MemoryStore::new());
        viewer.select_phase(0).unwrap();
        viewer.advance(2_000);
        viewer.open_section(1).unwrap();
        viewer.advance(3_000);
        viewer.back_to_sections().unwrap();
        assert_eq!(viewer.unlock_progress().dwell, 3);
        viewer.advance(5_000);
        assert_eq!(viewer.unlocked_count(), 2);
        assert_eq!(
            viewer.progress_store().store().get(UNLOCK_KEY).unwrap().as_deref(),
            Some("2")
        );
    }

    #[test]
    fn returning_to_phases_resets_dwell() {
        let mut viewer = viewer_with(MemoryStore::new());
        viewer.select_phase(0).unwrap();
        viewer.advance(4_000);
        viewer.return_to_phases().unwrap();
        assert_eq!(viewer.unlock_progress().dwell, 0);
        viewer.advance(60_000);
        assert_eq!(viewer.unlocked_count(), 1);
    }

    #[test]
    fn files_and_zoom_are_scoped_to_open_section() {
        let mut viewer = viewer_with(MemoryStore::new());
        viewer.select_phase(0).unwrap();
        assert!(matches!(
            viewer.open_file("f2"),
            Err(Error::Navigation(NavigationError::NoSectionOpen))
        ));
        viewer.open_section(1).unwrap();
        assert!(viewer.status().gallery);
        assert!(matches!(
            viewer.open_file("f2"),
            Err(Error::Navigation(NavigationError::GalleryOnly(ref id))) if id == "lab2-+30"
        ));
        viewer.zoom_image("https://imgdb.in/i/n3th.jpg").unwrap();
        assert!(viewer.zoom_image("https://example.invalid/x.jpg").is_err());
        let status = viewer.status();
        assert!(status.open_file.is_none());
        assert_eq!(status.zoomed_image.as_deref(), Some("https://imgdb.in/i/n3th.jpg"));
        viewer.back_to_sections().unwrap();
        assert!(viewer.status().zoomed_image.is_none());

        // Calm level: this section still lists its files one by one.
        viewer.open_section(2).unwrap();
        assert!(!viewer.status().gallery);
        assert_eq!(viewer.open_file("f4").unwrap().id, "f4");
        assert!(viewer.open_file("nope").is_err());
        assert_eq!(viewer.status().open_file.as_deref(), Some("f4"));
        viewer.back_to_sections().unwrap();
        assert!(viewer.status().open_file.is_none());
    }

    #[test]
    fn status_tracks_level_and_palette() {
        let mut viewer = viewer_with(MemoryStore::new().with_entry(UNLOCK_KEY, "3"));
        assert_eq!(viewer.status().palette.hex, "#00ff41");
        viewer.select_phase(1).unwrap();
        let status = viewer.status();
        assert_eq!(status.corruption_level, CorruptionLevel::Unstable);
        assert_eq!(status.palette.hex, "#00FF66");
        assert_eq!(status.diagnostics.syslog_decay_percent, 50);
        viewer.return_to_phases().unwrap();
        assert_eq!(viewer.corruption_level(), CorruptionLevel::Calm);
    }

    #[test]
    fn navigation_is_refused_during_sequence() {
        let mut viewer = viewer_with(MemoryStore::new().with_entry(UNLOCK_KEY, "3"));
        viewer.select_phase(2).unwrap();
        for index in 0..3 {
            viewer.open_section(index).unwrap();
            viewer.back_to_sections().unwrap();
        }
        viewer.trigger_sequence().unwrap();
        assert!(matches!(
            viewer.return_to_phases(),
            Err(Error::Navigation(NavigationError::SequenceActive(SequenceState::Shock)))
        ));
        assert_eq!(viewer.palette(), Palette::ALARM);
    }
}
