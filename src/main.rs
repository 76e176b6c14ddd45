//! gsm-coordinator - launch games with their companions and drive the OCR backend.
//!
//! # Subcommands
//!
//! - `games`: list the games in `Launcher.yaml`
//! - `launch <name>`: start a game, its text hooker and its agent
//! - `ocr`: run an OCR session in this terminal
//!
//! # Configuration Files
//!
//! Expected in the config directory (`GSM Data/` by default):
//! - `Launcher.yaml`: tool paths and games
//! - `OCR Settings.yaml`: OCR engines, hotkeys and scan rate
//! - `Coordinator.yaml`: timings (optional, overridable with `GSM_*` variables)

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use gsm_coordinator::config::ConfigManager;
use gsm_coordinator::logging::{self, LOG_PREFIX};
use gsm_coordinator::models::SessionMode;
use gsm_coordinator::services::{
    BackendEvent, GameSessionOrchestrator, LaunchRequest, LaunchTimings, StdioBackend,
    SystemLauncher, SystemProcessTable,
};
use gsm_coordinator::state::{ConsoleHandle, OcrSessionController, SessionChange};
use gsm_coordinator::{APP_NAME, Metrics, VERSION};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

const WORKER_THREADS: usize = 4;

#[derive(Parser)]
#[command(name = "gsm-coordinator")]
#[command(about = "Launch games with their companions and coordinate OCR sessions")]
#[command(version)]
struct Cli {
    /// Directory holding Launcher.yaml and OCR Settings.yaml
    #[arg(long, env = "GSM_CONFIG_DIR", default_value = "GSM Data")]
    config_dir: Utf8PathBuf,

    /// Directory for rotating log files
    #[arg(long, default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured games
    Games,

    /// Launch a configured game by name
    Launch {
        /// Game name as it appears in Launcher.yaml
        #[arg(value_name = "NAME")]
        name: String,

        /// Do not attach the agent even if the game uses one
        #[arg(long)]
        no_agent: bool,
    },

    /// Run an OCR session; type p/m/r/f/s/q and Enter (or pause/resume)
    Ocr {
        /// Only recognise when the manual hotkey is pressed
        #[arg(long)]
        screenshot_only: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let settings = config_manager.load_coordinator_settings()?;

    let _log_guard = logging::setup_logging_with_console(
        &cli.log_dir,
        LOG_PREFIX,
        cli.debug || settings.debug_mode,
        true,
    )?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("gsm-worker")
        .build()
        .context("Failed to build tokio runtime")?;

    let metrics = Arc::new(Metrics::new());
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Games => list_games(&config_manager),
            Commands::Launch { name, no_agent } => {
                launch_game(&config_manager, &settings, metrics.clone(), name, !no_agent).await
            }
            Commands::Ocr { screenshot_only } => {
                let mode = if screenshot_only {
                    SessionMode::ScreenshotOnly
                } else {
                    SessionMode::Normal
                };
                run_ocr(&config_manager, &settings, metrics.clone(), mode).await
            }
        }
    });

    metrics.log_summary();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result.inspect_err(|e| tracing::error!("{:#}", e))
}

fn list_games(config_manager: &ConfigManager) -> Result<()> {
    let library = config_manager.load_launcher_config()?.library();
    if library.is_empty() {
        println!("No games configured in {}", config_manager.config_dir());
        return Ok(());
    }
    for game in library.iter() {
        let mut flags = Vec::new();
        if game.run_agent {
            flags.push("agent");
        }
        if game.run_textractor {
            flags.push("textractor");
        }
        println!("{} [{}] {}", game.name, game.process_name, flags.join(","));
    }
    Ok(())
}

async fn launch_game(
    config_manager: &ConfigManager,
    settings: &gsm_coordinator::CoordinatorSettings,
    metrics: Arc<Metrics>,
    name: String,
    attach_agent: bool,
) -> Result<()> {
    let mut launcher_config = config_manager.load_launcher_config()?;
    let mut library = launcher_config.library();

    let orchestrator = GameSessionOrchestrator::new(
        SystemLauncher::new(),
        SystemProcessTable::new(),
        launcher_config.paths.clone(),
        metrics,
    )
    .with_timings(LaunchTimings {
        settle_delay: settings.agent_settle_delay(),
        poll_interval: settings.pid_poll_interval(),
        resolve_timeout: settings.pid_timeout(),
    });

    let request = LaunchRequest {
        name,
        should_launch_agent: attach_agent,
    };
    let (response, report) = orchestrator.handle_launch_request(&mut library, &request).await;
    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to encode launch response")?
    );

    launcher_config.store_library(&library);
    config_manager.save_launcher_config(&launcher_config)?;

    // The agent step runs in the background; wait for it before exiting
    if let Some(report) = report {
        let outcome = report.agent_outcome().await;
        tracing::debug!("Agent step finished: {:?}", outcome);
    }
    Ok(())
}

async fn print_changes(mut changes: broadcast::Receiver<SessionChange>) {
    loop {
        match changes.recv().await {
            Ok(SessionChange::LogAppended(line)) => println!("{}", line),
            Ok(SessionChange::StatusUpdated(status)) => println!("Status: {}", status),
            Ok(SessionChange::Notice(notice)) => println!("! {}", notice),
            Ok(SessionChange::StateChanged { .. } | SessionChange::TranscriptCleared) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Console printer skipped {} changes", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_ocr(
    config_manager: &ConfigManager,
    settings: &gsm_coordinator::CoordinatorSettings,
    metrics: Arc<Metrics>,
    mode: SessionMode,
) -> Result<()> {
    let ocr_settings = config_manager.load_ocr_settings()?;
    let scan_rate = ocr_settings.scan_rate;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<BackendEvent>();
    let backend = StdioBackend::new(settings.python_path.clone(), ocr_settings, events_tx);

    let mut controller = OcrSessionController::new(backend, ConsoleHandle::new(), metrics)
        .with_scan_rate(scan_rate)
        .with_transcript_capacity(settings.transcript_capacity);
    let printer = tokio::spawn(print_changes(controller.subscribe()));

    controller.start(mode)?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut status_poll = tokio::time::interval(settings.status_poll_interval());

    loop {
        tokio::select! {
            event = events_rx.recv() => match event {
                Some(event) => controller.handle_event(event),
                None => break,
            },
            line = input.next_line() => {
                let line = line.context("Failed to read from stdin")?;
                let command = line.as_deref().map(str::trim).unwrap_or("q");
                let sent = match command {
                    "p" => controller.toggle_pause(),
                    "pause" => controller.pause(),
                    "resume" => controller.unpause(),
                    "m" => controller.manual_ocr(),
                    "r" => {
                        match config_manager.load_ocr_settings() {
                            Ok(reloaded) => {
                                controller.set_scan_rate(reloaded.scan_rate);
                                controller.channel().update_settings(reloaded);
                            }
                            Err(e) => tracing::warn!("Keeping current OCR settings: {:#}", e),
                        }
                        controller.reload_config()
                    }
                    "f" => controller.toggle_force_stable(),
                    "s" => controller.request_status(),
                    "q" => {
                        controller.stop();
                        break;
                    }
                    "" => Ok(()),
                    other => {
                        println!("Unknown command: {}", other);
                        Ok(())
                    }
                };
                if let Err(e) = sent {
                    tracing::warn!("{}", e);
                }
            }
            _ = status_poll.tick() => {
                if controller.console().is_visible() && controller.state().is_active() {
                    if let Err(e) = controller.request_status() {
                        tracing::debug!("Status poll failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping OCR");
                controller.stop();
                break;
            }
        }
    }

    drop(controller);
    let _ = printer.await;
    Ok(())
}
