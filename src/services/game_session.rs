//! Game launch sequencing.
//!
//! A launch starts the game (directly or through Steam), optionally a text
//! hooker, and after a settle delay an agent attached to the game's PID. There
//! is no "process ready" signal to wait on, so the agent target is found by
//! polling the process table with [`PidResolver`].

use crate::metrics::Metrics;
use crate::models::{GameDefinition, GameLibrary, LauncherPaths};
use crate::services::pid_resolver::{
    DEFAULT_POLL_INTERVAL, DEFAULT_RESOLVE_TIMEOUT, PidLookup, PidResolver,
};
use crate::services::process::{ProcessHandle, ProcessLauncher, ProcessTable, LaunchSpec};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default wait between starting the game and looking for its process.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(3000);

/// Timing knobs for a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchTimings {
    pub settle_delay: Duration,
    pub poll_interval: Duration,
    pub resolve_timeout: Duration,
}

impl Default for LaunchTimings {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

/// What happened to the agent step of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    /// The game does not use an agent, or the caller opted out
    NotRequested,
    /// The agent could not be started; the reason was logged as a warning
    Skipped(String),
    /// The agent was spawned against `target` (possibly the not-found sentinel)
    Started {
        target: PidLookup,
        handle: ProcessHandle,
    },
}

/// Per-step result of [`GameSessionOrchestrator::launch`].
///
/// The agent step runs in the background once the game and textractor are up;
/// `agent` is its task when one was requested.
#[derive(Debug)]
pub struct LaunchReport {
    pub primary: ProcessHandle,
    pub textractor: Option<ProcessHandle>,
    pub agent: Option<JoinHandle<AgentOutcome>>,
}

impl LaunchReport {
    /// Wait for the agent step to finish.
    pub async fn agent_outcome(self) -> AgentOutcome {
        let Some(task) = self.agent else {
            return AgentOutcome::NotRequested;
        };
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Agent task failed: {}", e);
                AgentOutcome::Skipped(format!("agent task failed: {}", e))
            }
        }
    }
}

/// Launch request as sent by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest {
    pub name: String,
    #[serde(default)]
    pub should_launch_agent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply to a [`LaunchRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl LaunchResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

/// Steam front-end invocation for a Steam app id.
pub fn steam_spec(paths: &LauncherPaths, app_id: u64) -> LaunchSpec {
    LaunchSpec::new(paths.steam_path.clone())
        .arg("-applaunch")
        .arg(app_id.to_string())
}

/// Direct invocation of a game's executable from its own directory.
pub fn executable_spec(game: &GameDefinition) -> Option<LaunchSpec> {
    let exe = game.executable_path.as_ref()?;
    let mut spec = LaunchSpec::new(exe.clone());
    if let Some(dir) = game.working_dir() {
        spec = spec.current_dir(dir);
    }
    Some(spec)
}

/// Agent command line: `"<agent>" --script="<script>" --pname=<pid|-1>`.
pub fn agent_spec(paths: &LauncherPaths, script: &str, target: PidLookup) -> LaunchSpec {
    LaunchSpec::new(paths.agent_path.clone())
        .arg(format!("--script=\"{}\"", script))
        .arg(format!("--pname={}", target.as_arg()))
        .through_shell()
}

pub fn textractor_spec(paths: &LauncherPaths) -> LaunchSpec {
    LaunchSpec::new(paths.textractor_path.clone())
}

fn spawn_recorded<L: ProcessLauncher>(launcher: &L, metrics: &Metrics, spec: &LaunchSpec) -> ProcessHandle {
    let handle = launcher.spawn(spec);
    metrics.record_launch(handle.is_running());
    handle
}

/// The delayed agent step, owning what it needs to outlive the launch call.
struct AgentStep<L: ProcessLauncher, T: ProcessTable> {
    launcher: Arc<L>,
    resolver: Arc<PidResolver<T>>,
    paths: LauncherPaths,
    timings: LaunchTimings,
    metrics: Arc<Metrics>,
}

impl<L: ProcessLauncher, T: ProcessTable> AgentStep<L, T> {
    async fn run(self, game: GameDefinition) -> AgentOutcome {
        if game.script.trim().is_empty() {
            tracing::warn!("No agent script found for game: {}", game.name);
            self.metrics.record_agent_skipped();
            return AgentOutcome::Skipped(format!("no agent script for {}", game.name));
        }
        if self.paths.agent_path.as_str().is_empty() {
            tracing::warn!("Agent executable is not configured, skipping agent for {}", game.name);
            self.metrics.record_agent_skipped();
            return AgentOutcome::Skipped("agent executable not configured".to_string());
        }

        tokio::time::sleep(self.timings.settle_delay).await;

        let target = self
            .resolver
            .resolve(
                &game.process_name,
                self.timings.poll_interval,
                self.timings.resolve_timeout,
            )
            .await;
        match target {
            PidLookup::Found(pid) => {
                tracing::info!("Attaching agent to {} ({})", game.process_name, pid);
            }
            PidLookup::NotFound => {
                tracing::warn!(
                    "Could not find PID for {}, need to manually connect the agent",
                    game.process_name
                );
            }
        }

        let spec = agent_spec(&self.paths, &game.script, target);
        let handle = spawn_recorded(self.launcher.as_ref(), &self.metrics, &spec);
        if handle.is_running() {
            self.metrics.record_agent_started();
        }
        AgentOutcome::Started { target, handle }
    }
}

/// Sequences game, textractor and agent launches.
pub struct GameSessionOrchestrator<L: ProcessLauncher, T: ProcessTable> {
    launcher: Arc<L>,
    resolver: Arc<PidResolver<T>>,
    paths: LauncherPaths,
    timings: LaunchTimings,
    metrics: Arc<Metrics>,
}

impl<L, T> GameSessionOrchestrator<L, T>
where
    L: ProcessLauncher + 'static,
    T: ProcessTable + 'static,
{
    pub fn new(launcher: L, table: T, paths: LauncherPaths, metrics: Arc<Metrics>) -> Self {
        Self {
            launcher: Arc::new(launcher),
            resolver: Arc::new(PidResolver::new(table, metrics.clone())),
            paths,
            timings: LaunchTimings::default(),
            metrics,
        }
    }

    pub fn with_timings(mut self, timings: LaunchTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn paths(&self) -> &LauncherPaths {
        &self.paths
    }

    pub fn timings(&self) -> LaunchTimings {
        self.timings
    }

    fn spawn(&self, spec: &LaunchSpec) -> ProcessHandle {
        spawn_recorded(self.launcher.as_ref(), &self.metrics, spec)
    }

    fn launch_primary(&self, game: &GameDefinition) -> ProcessHandle {
        match executable_spec(game) {
            Some(spec) => {
                let handle = self.spawn(&spec);
                if handle.is_running() {
                    return handle;
                }
                tracing::warn!(
                    "Direct launch of {} gave no PID, retrying through the shell",
                    spec.program
                );
                self.spawn(&spec.through_shell())
            }
            None => {
                tracing::info!("Launching {} through Steam (app {})", game.name, game.id);
                self.spawn(&steam_spec(&self.paths, game.id))
            }
        }
    }

    fn agent_step(&self) -> AgentStep<L, T> {
        AgentStep {
            launcher: self.launcher.clone(),
            resolver: self.resolver.clone(),
            paths: self.paths.clone(),
            timings: self.timings,
            metrics: self.metrics.clone(),
        }
    }

    /// Launch `game` and its companions. Never fails; each step reports its
    /// own outcome and failures are logged.
    ///
    /// Returns once the game and textractor are spawned. The agent step
    /// (settle delay, PID lookup, agent spawn) continues on a tokio task.
    pub async fn launch(&self, game: &GameDefinition, attach_agent: bool) -> LaunchReport {
        tracing::info!("Launching game: {}", game.name);
        let primary = self.launch_primary(game);

        let textractor = game.run_textractor.then(|| {
            let handle = self.spawn(&textractor_spec(&self.paths));
            if let Some(pid) = handle.id {
                tracing::info!("Textractor launched with PID: {}", pid);
            }
            handle
        });

        let agent = (game.run_agent && attach_agent)
            .then(|| tokio::spawn(self.agent_step().run(game.clone())));

        LaunchReport {
            primary,
            textractor,
            agent,
        }
    }

    /// Resolve a launch request against `library`, launch, and record it as
    /// the last game launched. The response does not wait for the agent step;
    /// the report is returned alongside for callers that want to.
    pub async fn handle_launch_request(
        &self,
        library: &mut GameLibrary,
        request: &LaunchRequest,
    ) -> (LaunchResponse, Option<LaunchReport>) {
        let Some(game) = library.get(&request.name).cloned() else {
            tracing::warn!("Launch requested for unknown game: {}", request.name);
            return (LaunchResponse::error("Game not found"), None);
        };

        let report = self.launch(&game, request.should_launch_agent).await;
        library.last_game_launched = Some(game.name);
        (
            LaunchResponse::success("Game launched successfully"),
            Some(report),
        )
    }
}
