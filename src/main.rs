//! Application entry point: voice screening CLI.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`] from disk (returns default on first run).
//! 4. Create the [`tokio`] runtime.
//! 5. Run the selected subcommand.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use voice_screening::{
    audio::{CpalMicrophone, DeviceOpener, RecorderConfig, WavRecorder},
    config::{AppConfig, AppPaths, CaptureConfig},
    features::{CommandExtractor, ModelKind, PROFILES},
    inference::InferenceEngine,
    pipeline::{new_shared_state, AnalysisReport, PipelineOrchestrator},
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Record a voice sample and estimate a disease probability from its
/// acoustic features.
#[derive(Parser)]
#[command(name = "voice-screening")]
#[command(version)]
struct Cli {
    /// Settings file (default is the platform config dir's settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the microphone to a WAV file
    Record {
        /// Output file (default: configured recording file)
        output: Option<PathBuf>,
        /// Stop after this many seconds (default: wait for Ctrl-C)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Score an existing recording
    Analyze {
        /// 16 kHz mono 16-bit WAV file
        audio: PathBuf,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Record, then score the recording
    Screen {
        /// Stop recording after this many seconds (default: wait for Ctrl-C)
        #[arg(short, long)]
        seconds: Option<u64>,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// List the model profiles and their feature order
    Profiles,
    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Args)]
struct ScoringArgs {
    /// Model profile: speech or voice (default from settings)
    #[arg(short, long)]
    profile: Option<ModelKind>,
    /// Model file (default: the profile's configured asset)
    #[arg(short, long)]
    model: Option<PathBuf>,
    /// Also print every extracted feature
    #[arg(long)]
    details: bool,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 2. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 3. Configuration
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    let paths = AppPaths::new();

    // 4. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(cli, config, paths))
}

async fn run(cli: Cli, config: AppConfig, paths: AppPaths) -> Result<()> {
    match cli.command {
        Commands::Record { output, seconds } => {
            let target =
                output.unwrap_or_else(|| paths.recording_file(&config.capture.recording_file));
            record(&config.capture, &target, seconds).await
        }
        Commands::Analyze { audio, scoring } => {
            let orchestrator = build_orchestrator(&config, &paths, &scoring)?;
            let report = orchestrator.analyze(&audio).await;
            orchestrator.shutdown().await;
            print_report(&report?, scoring.details);
            Ok(())
        }
        Commands::Screen { seconds, scoring } => {
            let orchestrator = build_orchestrator(&config, &paths, &scoring)?;
            ensure_parent(orchestrator.recording_path())?;

            orchestrator.start_recording().await?;
            println!("Recording ({})", stop_hint(seconds));
            wait_for_stop(seconds).await;

            let report = orchestrator.stop_and_analyze().await;
            orchestrator.shutdown().await;
            print_report(&report?, scoring.details);
            Ok(())
        }
        Commands::Profiles => {
            for profile in PROFILES {
                println!("{} ({})", profile.key, profile.asset_name);
                for (i, feature) in profile.features.iter().enumerate() {
                    println!("  {i}: {feature}");
                }
            }
            Ok(())
        }
        Commands::Config { save } => {
            print!("{}", config.to_toml()?);
            if save {
                let path = cli.config.unwrap_or(paths.settings_file);
                config.save_to(&path)?;
                println!("# saved to {}", path.display());
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn record(capture: &CaptureConfig, target: &Path, seconds: Option<u64>) -> Result<()> {
    ensure_parent(target)?;
    let recorder = WavRecorder::new(microphone(capture), RecorderConfig::from(capture));

    // The recorder blocks while the device opens and while the capture
    // thread is joined, so both calls go to the blocking pool.
    let path = target.to_path_buf();
    let (mut recorder, started) = tokio::task::spawn_blocking(move || {
        let mut recorder = recorder;
        let started = recorder.start(&path);
        (recorder, started)
    })
    .await?;
    started?;

    println!("Recording to {} ({})", target.display(), stop_hint(seconds));
    wait_for_stop(seconds).await;

    match tokio::task::spawn_blocking(move || recorder.stop()).await?? {
        Some(recording) => {
            println!(
                "Saved {} ({:.1} s, {} bytes of audio)",
                recording.path.display(),
                recording.duration().as_secs_f32(),
                recording.payload_bytes()
            );
            Ok(())
        }
        None => bail!("recording was not active"),
    }
}

fn build_orchestrator(
    config: &AppConfig,
    paths: &AppPaths,
    scoring: &ScoringArgs,
) -> Result<PipelineOrchestrator> {
    let kind = scoring.profile.unwrap_or(config.models.default_profile);
    let model_path = scoring
        .model
        .clone()
        .unwrap_or_else(|| config.models.model_path(kind, paths));

    let engine = InferenceEngine::load(&model_path)
        .with_context(|| format!("loading {} model", kind))?;
    if let Some(width) = engine.input_width() {
        if width != kind.profile().width() {
            log::warn!(
                "model expects {width} inputs but the '{}' profile has {}",
                kind,
                kind.profile().width()
            );
        }
    }

    Ok(PipelineOrchestrator::new(
        new_shared_state(config.clone()),
        WavRecorder::new(microphone(&config.capture), RecorderConfig::from(&config.capture)),
        Arc::new(CommandExtractor::from_config(&config.extractor, kind)),
        engine,
        kind.profile(),
        paths.recording_file(&config.capture.recording_file),
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn microphone(capture: &CaptureConfig) -> Arc<dyn DeviceOpener> {
    match &capture.input_device {
        Some(name) => Arc::new(CpalMicrophone::with_device_name(name.clone())),
        None => Arc::new(CpalMicrophone::new()),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn stop_hint(seconds: Option<u64>) -> String {
    match seconds {
        Some(secs) => format!("stopping after {secs} s (Ctrl-C to stop early)"),
        None => "press Ctrl-C to stop".to_string(),
    }
}

/// Wait for the timer (if any) or Ctrl-C, whichever comes first.
async fn wait_for_stop(seconds: Option<u64>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    match seconds {
        Some(secs) => tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = ctrl_c => {}
        },
        None => ctrl_c.await,
    }
}

fn print_report(report: &AnalysisReport, details: bool) {
    println!("Profile:     {}", report.profile);
    println!("Recording:   {}", report.audio_path.display());
    println!("Probability: {}", report.probability);

    if details {
        let profile = report.profile.profile();
        println!("Features (* = model input):");
        for (name, value) in report.sorted_features() {
            let marker = if profile.features.contains(&name) { "*" } else { " " };
            println!("  {marker} {name:<20} {value}");
        }
    }
}
