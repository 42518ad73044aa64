//! `archive`: command-line front end for the Dessertopia restricted archive.
//!
//! Subcommands:
//! - `status`: unlock count and phase access table
//! - `catalog`: phases and sections of the active catalog
//! - `simulate`: deterministic walkthrough on the manual clock
//! - `run`: interactive session on the tokio driver, commands read from stdin

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use dessertopia_core::audio::{AudioSynth, SilentSynth};
use dessertopia_core::catalog::{Catalog, Lang};
use dessertopia_core::config::{ArchiveConfig, LogFormat};
use dessertopia_core::content::{CLOSING_ATTRIBUTION, CLOSING_QUOTE, NARRATIVE_PASSAGES};
use dessertopia_core::corruption::CorruptionLevel;
use dessertopia_core::logging::init_logging;
use dessertopia_core::progress_store::{JsonFileStore, KvStore, MemoryStore, ProgressStore, UNLOCK_KEY};
use dessertopia_core::random::SeededRandom;
use dessertopia_core::runtime::{ArchiveRuntime, RunOutcome, RuntimeHandle, ViewerCommand};
use dessertopia_core::session::InMemorySession;
use dessertopia_core::viewer::{ArchiveView, ArchiveViewer, ViewerStatus};

/// Dessertopia archive - progressive disclosure engine
#[derive(Parser)]
#[command(name = "archive")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "DESSERTOPIA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Display language (ko, en)
    #[arg(long, global = true)]
    lang: Option<Lang>,

    /// Archive state file
    #[arg(long, global = true, env = "DESSERTOPIA_STATE")]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the unlock count and which phases are accessible
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the phases and sections of the active catalog
    Catalog {
        /// Emit the catalog records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Walk the whole archive on a simulated clock
    Simulate {
        /// Seed for overlay and noise randomness
        #[arg(long, default_value_t = 7)]
        seed: u64,

        /// Emit one JSON status object per step
        #[arg(long)]
        json: bool,

        /// Write unlock progress back to the state file
        #[arg(long)]
        persist: bool,
    },

    /// Interactive session; reads commands from stdin (type `help`)
    Run {
        /// Seed for overlay and noise randomness; OS-seeded when omitted
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = err
                .downcast_ref::<dessertopia_core::Error>()
                .and_then(dessertopia_core::Error::remediation)
            {
                eprintln!("\n{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config.log_config()).context("failed to initialize logging")?;
    let state_path = cli
        .state
        .clone()
        .unwrap_or_else(|| config.storage.resolved_state_path());
    debug!(state_path = %state_path.display(), "Resolved archive state path");

    match cli.command {
        Commands::Status { json } => cmd_status(&config, &state_path, json),
        Commands::Catalog { json } => cmd_catalog(&config, &state_path, json),
        Commands::Simulate {
            seed,
            json,
            persist,
        } => cmd_simulate(&config, &state_path, seed, json, persist),
        Commands::Run { seed } => cmd_run(config, &state_path, seed).await,
    }
}

/// Config file plus command-line overrides.
fn load_config(cli: &Cli) -> Result<ArchiveConfig> {
    let mut config = ArchiveConfig::load_or_default(cli.config.as_deref())
        .map_err(dessertopia_core::Error::from)?;
    if let Some(level) = &cli.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(lang) = cli.lang {
        config.general.lang = lang;
    }
    config.validate().map_err(dessertopia_core::Error::from)?;
    Ok(config)
}

fn load_catalog<K: KvStore>(store: &K) -> Result<Catalog> {
    Ok(Catalog::load_or_builtin(store).map_err(dessertopia_core::Error::from)?)
}

fn build_viewer<K: KvStore>(
    config: &ArchiveConfig,
    catalog: Catalog,
    store: K,
    seed: Option<u64>,
    synth: Option<Box<dyn AudioSynth>>,
) -> Result<ArchiveViewer<K, InMemorySession>> {
    let mut builder = ArchiveViewer::builder(catalog, store, InMemorySession::authorized())
        .config(config.clone());
    if let Some(seed) = seed {
        builder = builder
            .visual_random(Box::new(SeededRandom::new(seed)))
            .audio_random(Box::new(SeededRandom::new(seed.wrapping_add(1))));
    }
    if let Some(synth) = synth.filter(|_| config.audio.enabled) {
        builder = builder.synth(synth);
    }
    Ok(builder.build()?)
}

/// Walkthroughs on the manual clock report audio without producing it.
fn simulated_synth() -> Option<Box<dyn AudioSynth>> {
    let synth: Box<dyn AudioSynth> = Box::new(SilentSynth);
    Some(synth)
}

/// Output backend for live sessions.
#[cfg(feature = "sound")]
fn live_synth() -> Option<Box<dyn AudioSynth>> {
    let synth: Box<dyn AudioSynth> = Box::new(dessertopia_core::audio::RodioSynth::new());
    Some(synth)
}

#[cfg(not(feature = "sound"))]
fn live_synth() -> Option<Box<dyn AudioSynth>> {
    debug!("Built without the sound feature; shock stage runs silently");
    None
}

// =============================================================================
// status / catalog
// =============================================================================

fn cmd_status(config: &ArchiveConfig, state_path: &Path, json: bool) -> Result<()> {
    let store = JsonFileStore::open(state_path);
    let catalog = load_catalog(&store)?;
    let phase_count = catalog.phase_count();
    let unlocked = ProgressStore::new(store).load(phase_count);
    let lang = config.general.lang;

    if json {
        let phases: Vec<_> = catalog
            .phases()
            .iter()
            .enumerate()
            .map(|(index, phase)| {
                json!({
                    "index": index,
                    "id": phase.id,
                    "range": phase.range,
                    "title": phase.title.pick(lang),
                    "unlocked": index < unlocked as usize,
                    "corruption_level": CorruptionLevel::for_phase_index(index),
                })
            })
            .collect();
        let out = json!({
            "state_path": state_path.display().to_string(),
            "unlocked_count": unlocked,
            "phase_count": phase_count,
            "phases": phases,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Archive state: {}", state_path.display());
    println!("Unlocked: {unlocked}/{phase_count}");
    println!();
    println!("{:<4} {:<6} {:<14} {:<9} TITLE", "#", "ID", "RANGE", "ACCESS");
    for (index, phase) in catalog.phases().iter().enumerate() {
        let access = if index < unlocked as usize { "open" } else { "sealed" };
        println!(
            "{:<4} {:<6} {:<14} {:<9} {}",
            index,
            phase.id,
            phase.range,
            access,
            phase.title.pick(lang)
        );
    }
    Ok(())
}

fn cmd_catalog(config: &ArchiveConfig, state_path: &Path, json: bool) -> Result<()> {
    let store = JsonFileStore::open(state_path);
    let catalog = load_catalog(&store)?;
    if json {
        println!("{}", catalog.to_records_json()?);
        return Ok(());
    }

    let lang = config.general.lang;
    for phase in catalog.phases() {
        println!("{} [{}] {}", phase.id, phase.range, phase.title.pick(lang));
        for section in &phase.sections {
            println!(
                "  {:<12} {} ({} files)",
                section.id,
                section.name.pick(lang),
                section.files.len()
            );
        }
    }
    Ok(())
}

// =============================================================================
// simulate
// =============================================================================

struct Walkthrough<K> {
    viewer: ArchiveViewer<K, InMemorySession>,
    json: bool,
    lang: Lang,
}

impl<K: KvStore> Walkthrough<K> {
    fn emit(&self, step: &str) -> Result<()> {
        let status = self.viewer.status();
        if self.json {
            println!("{}", serde_json::to_string(&json!({ "step": step, "status": status }))?);
        } else {
            println!("{}", status_line(step, &status));
        }
        Ok(())
    }

    fn say(&self, text: &str) {
        if !self.json {
            println!("    {text}");
        }
    }
}

fn cmd_simulate(
    config: &ArchiveConfig,
    state_path: &Path,
    seed: u64,
    json: bool,
    persist: bool,
) -> Result<()> {
    let file = JsonFileStore::open(state_path);
    let catalog = load_catalog(&file)?;
    if persist {
        let viewer = build_viewer(config, catalog, file, Some(seed), simulated_synth())?;
        simulate(config, viewer, json)
    } else {
        // Dry run: start from the persisted count without writing it back.
        let mut memory = MemoryStore::new();
        if let Some(raw) = file.get(UNLOCK_KEY)? {
            memory = memory.with_entry(UNLOCK_KEY, raw);
        }
        let viewer = build_viewer(config, catalog, memory, Some(seed), simulated_synth())?;
        simulate(config, viewer, json)
    }
}

fn simulate<K: KvStore>(
    config: &ArchiveConfig,
    viewer: ArchiveViewer<K, InMemorySession>,
    json: bool,
) -> Result<()> {
    let dwell_ms = u64::from(config.unlock.dwell_required) * config.unlock.tick_ms;
    let seq = config.sequence;
    let phase_count = viewer.catalog().len();
    let mut walk = Walkthrough {
        lang: config.general.lang,
        viewer,
        json,
    };
    info!(phase_count, "Starting simulated walkthrough");
    walk.emit("start")?;

    for index in 0..phase_count {
        walk.viewer.select_phase(index)?;
        walk.emit("select_phase")?;

        let unlocked = walk.viewer.unlocked_count() as usize;
        if unlocked == index + 1 && unlocked < phase_count {
            walk.viewer.advance_by(dwell_ms);
            walk.emit("dwell")?;
        }

        let section_count = walk.viewer.current_phase().map_or(0, |p| p.sections.len());
        for section in 0..section_count {
            walk.viewer.open_section(section)?;
            walk.emit("open_section")?;
            walk.viewer.back_to_sections()?;
        }

        if index + 1 < phase_count {
            walk.viewer.return_to_phases()?;
        }
    }

    if !walk.viewer.completion_armed() {
        walk.emit("not_armed")?;
        bail!("completion trigger did not arm; the catalog needs at least three phases");
    }

    walk.viewer.trigger_sequence()?;
    walk.emit("trigger")?;
    walk.viewer.advance_by(2_000);
    walk.emit("shock")?;

    walk.viewer.interrupt_sequence()?;
    walk.emit("interrupt")?;
    for passage in &NARRATIVE_PASSAGES {
        walk.say(passage.pick(walk.lang));
    }
    walk.viewer.advance_by(seq.narrative_delay_ms);
    walk.viewer.continue_narrative()?;
    walk.emit("continue")?;
    walk.say(CLOSING_QUOTE.pick(walk.lang));
    walk.say(CLOSING_ATTRIBUTION);

    walk.viewer.advance_by(seq.epilogue_delay_ms);
    let outcome = walk.viewer.reboot()?;
    walk.emit("reboot")?;
    info!(route = outcome.route, was_authorized = outcome.was_authorized, "Walkthrough finished");
    Ok(())
}

fn view_label(view: ArchiveView) -> &'static str {
    match view {
        ArchiveView::PhaseSelect => "phases",
        ArchiveView::SectionSelect => "sections",
        ArchiveView::SectionDetail => "detail",
    }
}

fn status_line(step: &str, status: &ViewerStatus) -> String {
    let mut line = format!(
        "[{:>7}ms] {:<13} view={:<8} phase={:<4} unlocked={}/{} level={} sequence={}",
        status.now_ms,
        step,
        view_label(status.view),
        status.selected_phase_id.as_deref().unwrap_or("-"),
        status.unlocked_count,
        status.phase_count,
        status.corruption_level,
        status.sequence.state,
    );
    if status.unlock.in_progress {
        line.push_str(&format!(" dwell={}%", status.unlock.percent));
    }
    if status.completion_armed {
        line.push_str(" armed");
    }
    if status.sequence.total_spawned > 0 {
        line.push_str(&format!(" overlay={}", status.sequence.overlay_items));
    }
    if !status.authorized {
        line.push_str(" session=reset");
    }
    line
}

// =============================================================================
// run
// =============================================================================

/// One line of interactive input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Command(ViewerCommand),
    Status,
    Wait(u64),
    Help,
    Quit,
}

fn parse_input(line: &str) -> std::result::Result<Input, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let arg = words.next();
    let index = |arg: Option<&str>| -> std::result::Result<usize, String> {
        arg.ok_or_else(|| format!("{verb} needs an index"))?
            .parse::<usize>()
            .map_err(|_| format!("{verb}: not an index"))
    };
    let text = |arg: Option<&str>| -> std::result::Result<String, String> {
        arg.map(str::to_string)
            .ok_or_else(|| format!("{verb} needs an argument"))
    };

    let input = match verb {
        "phase" => Input::Command(ViewerCommand::SelectPhase(index(arg)?)),
        "phases" => Input::Command(ViewerCommand::ReturnToPhases),
        "open" => Input::Command(ViewerCommand::OpenSection(index(arg)?)),
        "back" => Input::Command(ViewerCommand::BackToSections),
        "file" => Input::Command(ViewerCommand::OpenFile(text(arg)?)),
        "close" => Input::Command(ViewerCommand::CloseFile),
        "zoom" => Input::Command(ViewerCommand::ZoomImage(text(arg)?)),
        "unzoom" => Input::Command(ViewerCommand::CloseZoom),
        "lang" => Input::Command(ViewerCommand::SetLang(text(arg)?.parse()?)),
        "trigger" => Input::Command(ViewerCommand::Trigger),
        "click" | "interrupt" => Input::Command(ViewerCommand::Interrupt),
        "continue" => Input::Command(ViewerCommand::Continue),
        "reboot" => Input::Command(ViewerCommand::Reboot),
        "status" => Input::Status,
        "wait" => Input::Wait(
            text(arg)?
                .parse()
                .map_err(|_| "wait: not a number of milliseconds".to_string())?,
        ),
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(input)
}

const RUN_HELP: &str = "\
commands:
  phase N      select phase N          phases       back to phase list
  open N       open section N          back         back to section list
  file ID      open evidence file      close        close file
  zoom URL     zoom an image           unzoom       close zoom
  lang ko|en   switch language         status       print status
  trigger      start the sequence      click        interrupt the shock stage
  continue     narrative -> epilogue   reboot       end the session
  wait MS      let time pass           quit         leave";

async fn cmd_run(config: ArchiveConfig, state_path: &Path, seed: Option<u64>) -> Result<()> {
    let store = JsonFileStore::open(state_path);
    let catalog = load_catalog(&store)?;
    let viewer = build_viewer(&config, catalog, store, seed, live_synth())?;
    let (runtime, handle) = ArchiveRuntime::new(viewer);
    let task = tokio::spawn(runtime.run());

    println!("{}", status_line("open", &handle.status()));
    let reader = BufReader::new(tokio::io::stdin());
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line) {
            Ok(Input::Quit) => break,
            Ok(Input::Help) => println!("{RUN_HELP}"),
            Ok(Input::Status) => print_status(&handle),
            Ok(Input::Wait(ms)) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                print_status(&handle);
            }
            Ok(Input::Command(command)) => {
                let reboot = command == ViewerCommand::Reboot;
                match handle.execute(command).await {
                    Ok(()) => {
                        print_status(&handle);
                        // The runtime stops after a successful reboot.
                        if reboot {
                            break;
                        }
                    }
                    Err(err) => println!("refused: {err}"),
                }
            }
            Err(message) => println!("{message}"),
        }
    }

    drop(handle);
    let (outcome, viewer) = task.await.context("archive runtime panicked")?;
    match outcome {
        RunOutcome::Rebooted(reset) => {
            println!("Session ended. Returning to {}", reset.route);
        }
        RunOutcome::ChannelClosed => {
            println!(
                "Archive closed. Unlocked {}/{}",
                viewer.unlocked_count(),
                viewer.catalog().len()
            );
        }
    }
    Ok(())
}

fn print_status(handle: &RuntimeHandle) {
    println!("{}", status_line("status", &handle.status()));
}
