//! Integration tests for the launch sequence
//!
//! These tests verify that the GameSessionOrchestrator:
//! - Starts companions in the documented order
//! - Hands the agent `-1` when the game never shows up
//! - Records the last game launched
//! - Answers a launch request before the agent's settle delay runs out
//! - Warns that the agent needs a manual connection when no PID is found

use camino::Utf8PathBuf;
use gsm_coordinator::Metrics;
use gsm_coordinator::models::{GameDefinition, GameLibrary, LauncherPaths};
use gsm_coordinator::services::{
    AgentOutcome, GameSessionOrchestrator, LaunchRequest, LaunchSpec, LaunchTimings, PidLookup,
    ProcessHandle, ProcessId, ProcessLauncher, ProcessTable, ResponseStatus,
};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::fmt::MakeWriter;

/// Launcher that records every spec and hands out increasing PIDs. Clones
/// share the same record.
#[derive(Clone, Default)]
struct RecordingLauncher {
    spawned: Arc<Mutex<Vec<LaunchSpec>>>,
    next_pid: Arc<AtomicU32>,
}

impl RecordingLauncher {
    fn spawned(&self) -> Vec<LaunchSpec> {
        self.spawned.lock().unwrap().clone()
    }
}

impl ProcessLauncher for RecordingLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> ProcessHandle {
        self.spawned.lock().unwrap().push(spec.clone());
        ProcessHandle::started(100 + self.next_pid.fetch_add(1, Ordering::SeqCst))
    }
}

/// Log sink shared between a test and its fmt subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

struct FixedTable(Vec<ProcessId>);

impl ProcessTable for FixedTable {
    fn find_by_name(&self, _name: &str) -> impl Future<Output = std::io::Result<Vec<ProcessId>>> + Send {
        let pids = self.0.clone();
        async move { Ok(pids) }
    }
}

fn paths() -> LauncherPaths {
    LauncherPaths {
        steam_path: Utf8PathBuf::from("C:/Steam/steam.exe"),
        agent_path: Utf8PathBuf::from("C:/Agent/agent.exe"),
        agent_scripts_path: Utf8PathBuf::from("C:/Agent/scripts"),
        textractor_path: Utf8PathBuf::from("C:/Textractor/Textractor.exe"),
    }
}

fn agent_game() -> GameDefinition {
    GameDefinition {
        id: 1234,
        name: "Test VN".to_string(),
        process_name: "Game.exe".to_string(),
        script: "C:/Agent/scripts/vn.js".to_string(),
        scene: Default::default(),
        executable_path: None,
        run_agent: true,
        run_textractor: false,
    }
}

fn fast_timings() -> LaunchTimings {
    LaunchTimings {
        settle_delay: Duration::from_millis(3000),
        poll_interval: Duration::from_millis(1000),
        resolve_timeout: Duration::from_millis(5000),
    }
}

#[tokio::test(start_paused = true)]
async fn test_agent_gets_sentinel_when_game_never_appears() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(Vec::new()),
        paths(),
        Arc::new(Metrics::new()),
    )
    .with_timings(fast_timings());

    let report = orchestrator.launch(&agent_game(), true).await;
    let outcome = report.agent_outcome().await;

    let spawned = launcher.spawned();
    assert_eq!(spawned.len(), 2, "game then agent");
    assert_eq!(spawned[0].args, vec!["-applaunch", "1234"]);
    assert!(spawned[1].args.contains(&"--pname=-1".to_string()));
    assert!(matches!(
        outcome,
        AgentOutcome::Started {
            target: PidLookup::NotFound,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_companions_launch_in_order() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(vec![9001, 9002]),
        paths(),
        Arc::new(Metrics::new()),
    )
    .with_timings(fast_timings());

    let mut game = agent_game();
    game.run_textractor = true;
    game.executable_path = Some(Utf8PathBuf::from("D:/Games/VN/Game.exe"));
    let report = orchestrator.launch(&game, true).await;
    assert_eq!(report.primary, ProcessHandle::started(100));
    assert_eq!(report.textractor, Some(ProcessHandle::started(101)));
    report.agent_outcome().await;

    let spawned = launcher.spawned();
    let programs: Vec<&str> = spawned.iter().map(|s| s.program.as_str()).collect();
    assert_eq!(
        programs,
        vec![
            "D:/Games/VN/Game.exe",
            "C:/Textractor/Textractor.exe",
            "C:/Agent/agent.exe"
        ]
    );
    assert_eq!(
        spawned[2].command_line(),
        "\"C:/Agent/agent.exe\" --script=\"C:/Agent/scripts/vn.js\" --pname=9001"
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_without_agent_flag_skips_agent() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(vec![9001]),
        paths(),
        Arc::new(Metrics::new()),
    );

    let mut library = GameLibrary::from_games(vec![agent_game()]);
    let (response, report) = orchestrator
        .handle_launch_request(
            &mut library,
            &LaunchRequest {
                name: "Test VN".to_string(),
                should_launch_agent: false,
            },
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert!(report.is_some_and(|report| report.agent.is_none()));
    assert_eq!(launcher.spawned().len(), 1);
    assert_eq!(library.last_game_launched.as_deref(), Some("Test VN"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_game_spawns_nothing() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(Vec::new()),
        paths(),
        Arc::new(Metrics::new()),
    );

    let mut library = GameLibrary::from_games(vec![agent_game()]);
    let (response, report) = orchestrator
        .handle_launch_request(
            &mut library,
            &LaunchRequest {
                name: "Missing".to_string(),
                should_launch_agent: true,
            },
        )
        .await;

    assert!(report.is_none());
    assert_eq!(response.status, ResponseStatus::Error);
    assert_eq!(response.message, "Game not found");
    assert!(launcher.spawned().is_empty());
    assert_eq!(library.last_game_launched, None);
}

#[tokio::test(start_paused = true)]
async fn test_textractor_starts_before_settle_delay() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(vec![9001]),
        paths(),
        Arc::new(Metrics::new()),
    )
    .with_timings(fast_timings());

    let mut game = agent_game();
    game.run_textractor = true;
    let start = Instant::now();
    let report = orchestrator.launch(&game, true).await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    let programs: Vec<String> = launcher
        .spawned()
        .iter()
        .map(|s| s.program.to_string())
        .collect();
    assert_eq!(
        programs,
        vec!["C:/Steam/steam.exe", "C:/Textractor/Textractor.exe"],
        "agent waits for the settle delay"
    );

    let outcome = report.agent_outcome().await;
    assert!(start.elapsed() >= fast_timings().settle_delay);
    assert!(matches!(
        outcome,
        AgentOutcome::Started {
            target: PidLookup::Found(9001),
            ..
        }
    ));
    assert_eq!(launcher.spawned().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_response_does_not_wait_for_agent() {
    let launcher = RecordingLauncher::default();
    let orchestrator = GameSessionOrchestrator::new(
        launcher.clone(),
        FixedTable(Vec::new()),
        paths(),
        Arc::new(Metrics::new()),
    )
    .with_timings(fast_timings());

    let mut library = GameLibrary::from_games(vec![agent_game()]);
    let start = Instant::now();
    let (response, report) = orchestrator
        .handle_launch_request(
            &mut library,
            &LaunchRequest {
                name: "Test VN".to_string(),
                should_launch_agent: true,
            },
        )
        .await;

    assert_eq!(response.status, ResponseStatus::Success);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(launcher.spawned().len(), 1);

    let report = report.expect("launched game has a report");
    assert!(report.agent.is_some());
    report.agent_outcome().await;
    assert_eq!(launcher.spawned().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_pid_warns_about_manual_connection() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let orchestrator = GameSessionOrchestrator::new(
        RecordingLauncher::default(),
        FixedTable(Vec::new()),
        paths(),
        Arc::new(Metrics::new()),
    )
    .with_timings(fast_timings());

    let report = orchestrator.launch(&agent_game(), true).await;
    report.agent_outcome().await;

    let output = logs.contents();
    assert!(output.contains("WARN"), "logged at warn level: {}", output);
    assert!(
        output.contains("Could not find PID for Game.exe, need to manually connect the agent"),
        "missing warning in: {}",
        output
    );
}

#[test]
fn test_launch_request_wire_format() {
    let request: LaunchRequest =
        serde_json::from_str(r#"{"name":"Test VN","shouldLaunchAgent":true}"#).unwrap();
    assert!(request.should_launch_agent);

    let minimal: LaunchRequest = serde_json::from_str(r#"{"name":"Test VN"}"#).unwrap();
    assert!(!minimal.should_launch_agent);
}
