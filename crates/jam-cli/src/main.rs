//! Jam CLI - The `jam` command.
//!
//! Runs a jam session headless, logging every trigger the engine emits,
//! and gives command-line access to the sound bank.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam_channel::{select, tick};
use jam_core::soundbank::service_from_config;
use jam_core::{
    demo_project, ChannelOutput, Engine, EngineCommand, EngineConfig, MonotonicClock,
    OutputClock, PatchRegistry, ProjectState, Runtime, SoundDescriptorGenerator, TriggerReceiver,
    GENRES,
};

/// Jam - lookahead sequencer and AI sound bank
#[derive(Parser, Debug)]
#[command(name = "jam")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless jam session engine", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that touches the engine or sound bank.
#[derive(ClapArgs, Debug, Clone)]
struct EngineOpts {
    /// JSON config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for persisted patches
    #[arg(long, value_name = "DIR")]
    store: Option<PathBuf>,

    /// Remote descriptor service URL
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,
}

impl EngineOpts {
    fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(store) = &self.store {
            config.storage.directory = Some(store.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.remote.endpoint = Some(endpoint.clone());
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a project (or the demo session) and log triggers
    Play {
        /// Project JSON file; the demo session when omitted
        #[arg(value_name = "FILE")]
        project: Option<PathBuf>,

        /// How long to play, in seconds (0 = until Ctrl+C)
        #[arg(short, long, default_value_t = 8.0)]
        seconds: f64,

        /// Override the project tempo
        #[arg(long)]
        bpm: Option<f64>,

        /// Generate a patch from this prompt and bind it to every track
        #[arg(long, value_name = "PROMPT")]
        prompt: Option<String>,

        /// Write the final project state to this file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,

        #[command(flatten)]
        engine: EngineOpts,
    },

    /// Generate a patch from a prompt and register it
    Patch {
        /// Text description, e.g. "Makossa Bass tight, punchy"
        prompt: String,

        /// Genre forwarded to the descriptor service
        #[arg(short, long)]
        genre: Option<String>,

        /// Print the descriptor instead of the patch
        #[arg(long)]
        descriptor: bool,

        #[command(flatten)]
        engine: EngineOpts,
    },

    /// List registered patches
    Patches {
        #[command(flatten)]
        engine: EngineOpts,
    },

    /// List genres
    Genres,

    /// Write the demo project to a file
    Demo {
        #[arg(value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    match args.command {
        Commands::Play {
            project,
            seconds,
            bpm,
            prompt,
            save,
            engine,
        } => run_play(
            project.as_deref(),
            seconds,
            bpm,
            prompt,
            save.as_deref(),
            &engine,
        ),
        Commands::Patch {
            prompt,
            genre,
            descriptor,
            engine,
        } => run_patch(&prompt, genre.as_deref(), descriptor, &engine),
        Commands::Patches { engine } => run_patches(&engine),
        Commands::Genres => {
            for genre in GENRES {
                println!("{genre}");
            }
            Ok(())
        }
        Commands::Demo { output } => save_project(&demo_project(), &output),
    }
}

/// Default level Info, overridable via RUST_LOG.
fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn load_project(path: Option<&Path>) -> Result<ProjectState> {
    let Some(path) = path else {
        return Ok(demo_project());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read project: {}", path.display()))?;
    ProjectState::from_json(&json)
        .with_context(|| format!("Failed to parse project: {}", path.display()))
}

fn save_project(project: &ProjectState, path: &Path) -> Result<()> {
    let json = project.to_json_pretty()?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write project: {}", path.display()))?;
    log::info!("Saved project to {}", path.display());
    Ok(())
}

fn run_play(
    project_path: Option<&Path>,
    seconds: f64,
    bpm: Option<f64>,
    prompt: Option<String>,
    save: Option<&Path>,
    opts: &EngineOpts,
) -> Result<()> {
    let config = opts.load()?;
    let mut project = load_project(project_path)?;
    if let Some(bpm) = bpm {
        project.bpm = bpm;
    }
    log::info!(
        "Loading '{}' ({} tracks, {} bpm)",
        project.name,
        project.tracks.len(),
        project.bpm
    );

    let clock: Arc<dyn OutputClock> = Arc::new(MonotonicClock::new());
    let (output, receiver) = ChannelOutput::bounded(config.trigger_queue_capacity, clock.clone());
    let tick_interval = config.tick_interval();
    let engine = Engine::from_config(config, Box::new(output))?;
    let runtime = Runtime::start(engine, tick_interval)?;
    let handle = runtime.handle().clone();

    let track_ids: Vec<String> = project.tracks.iter().map(|t| t.id.clone()).collect();
    handle.send(EngineCommand::LoadProject {
        project: Box::new(project),
    })?;
    if let Some(prompt) = prompt {
        for track_id in track_ids {
            handle.send(EngineCommand::RequestPatch {
                prompt: prompt.clone(),
                genre: None,
                target_track: Some(track_id),
            })?;
        }
    }
    handle.send(EngineCommand::Play)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, interrupted.clone())
        .context("Failed to install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, interrupted.clone())
        .context("Failed to install SIGTERM handler")?;

    let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
    let consumer = thread::Builder::new()
        .name("jam-output".to_string())
        .spawn(move || log_triggers(receiver, clock, done_rx))
        .context("Failed to spawn output thread")?;

    let started = Instant::now();
    while !interrupted.load(Ordering::Relaxed)
        && (seconds <= 0.0 || started.elapsed().as_secs_f64() < seconds)
    {
        thread::sleep(Duration::from_millis(50));
    }
    if interrupted.load(Ordering::Relaxed) {
        log::info!("Interrupted, stopping");
    }

    handle.send(EngineCommand::Stop)?;
    let version = handle.state().version();
    handle.wait_for_version(version + 1, Duration::from_secs(1));
    let final_state = handle.project();
    runtime.shutdown();

    drop(done_tx);
    let emitted = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("Output thread panicked"))?;
    log::info!("Played {} triggers", emitted);

    if let Some(path) = save {
        save_project(&final_state, path)?;
    }
    Ok(())
}

/// Stand-in audio thread: logs each trigger when it is due.
fn log_triggers(
    mut receiver: TriggerReceiver,
    clock: Arc<dyn OutputClock>,
    done: crossbeam_channel::Receiver<()>,
) -> usize {
    let ticker = tick(Duration::from_millis(5));
    let mut emitted = 0;
    loop {
        select! {
            recv(ticker) -> _ => {
                for trigger in receiver.take_due(clock.now()) {
                    emitted += 1;
                    log::info!(
                        "{:>8.3}s  {:<6} {:<4} {:<9} {:<20} gain {:.2} pan {:+.2}",
                        trigger.time,
                        trigger.track_id,
                        trigger.region_id,
                        trigger.pitch.map_or("region".to_string(), |p| format!("note {p}")),
                        trigger.patch.name,
                        trigger.gain * trigger.velocity,
                        trigger.pan,
                    );
                }
            }
            recv(done) -> _ => break,
        }
    }
    emitted
}

fn run_patch(
    prompt: &str,
    genre: Option<&str>,
    print_descriptor: bool,
    opts: &EngineOpts,
) -> Result<()> {
    let config = opts.load()?;
    let generator = SoundDescriptorGenerator::new(service_from_config(&config.remote));
    let descriptor = generator.generate(prompt, genre);

    if print_descriptor {
        println!("{}", serde_json::to_string_pretty(&descriptor)?);
        return Ok(());
    }

    let mut registry =
        PatchRegistry::from_config(&config).context("Failed to open patch store")?;
    let patch = descriptor.to_patch();
    println!("{}", serde_json::to_string_pretty(&patch)?);
    let id = registry.register(patch);
    if config.storage.directory.is_none() {
        log::warn!("No --store given, patch {} is not persisted", id);
    }
    Ok(())
}

fn run_patches(opts: &EngineOpts) -> Result<()> {
    let config = opts.load()?;
    let registry = PatchRegistry::from_config(&config).context("Failed to open patch store")?;
    if registry.is_empty() {
        println!("No patches registered");
        return Ok(());
    }
    for patch in registry.list() {
        println!(
            "{:<40} {:<24} {:<10} {}",
            patch.id,
            patch.name,
            format!("{:?}", patch.kind).to_lowercase(),
            patch.parameters.oscillator.name()
        );
    }
    Ok(())
}
