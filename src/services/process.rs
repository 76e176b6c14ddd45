//! Process spawning and process-table queries.
//!
//! Both concerns sit behind traits ([`ProcessLauncher`], [`ProcessTable`]) so the
//! orchestration logic can be driven against scripted fakes in tests and the real
//! OS in the binary.

use camino::Utf8PathBuf;
use regex::Regex;
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::OnceLock;
use thiserror::Error;
use tokio::process::Command;

/// OS process identifier.
pub type ProcessId = u32;

/// Result of a launch attempt. `id` is `None` when the spawn failed; the OS
/// owns the real process either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessHandle {
    pub id: Option<ProcessId>,
}

impl ProcessHandle {
    pub fn started(id: ProcessId) -> Self {
        Self { id: Some(id) }
    }

    pub fn failed() -> Self {
        Self { id: None }
    }

    pub fn is_running(&self) -> bool {
        self.id.is_some()
    }
}

/// Errors that can occur while spawning a process
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("No executable configured for {0}")]
    NotConfigured(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} exited before reporting a process id")]
    NoProcessId(String),
}

/// Description of a process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: Utf8PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<Utf8PathBuf>,
    /// Run the command line through the platform shell instead of directly
    pub through_shell: bool,
}

impl LaunchSpec {
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            through_shell: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn through_shell(mut self) -> Self {
        self.through_shell = true;
        self
    }

    /// Render as a single shell command line with the program quoted.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Starts external executables. Implementations never fail loudly: a failed
/// spawn is logged and reported as [`ProcessHandle::failed`].
#[cfg_attr(test, mockall::automock)]
pub trait ProcessLauncher: Send + Sync {
    fn spawn(&self, spec: &LaunchSpec) -> ProcessHandle;
}

/// Lists running processes by image name.
pub trait ProcessTable: Send + Sync {
    /// PIDs of processes named `name`, in the order the OS reports them.
    fn find_by_name(&self, name: &str) -> impl Future<Output = std::io::Result<Vec<ProcessId>>> + Send;
}

/// [`ProcessLauncher`] backed by `tokio::process`.
///
/// Children are detached: stdio is nulled and the child handle is dropped
/// without `kill_on_drop`, so games and companions outlive the coordinator.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }

    fn try_spawn(&self, spec: &LaunchSpec) -> Result<ProcessId, LaunchError> {
        if spec.program.as_str().is_empty() {
            return Err(LaunchError::NotConfigured(spec.args.join(" ")));
        }

        let mut cmd = if spec.through_shell {
            let line = spec.command_line();
            if cfg!(target_os = "windows") {
                let mut c = Command::new("cmd");
                c.args(["/C", &line]);
                c
            } else {
                let mut c = Command::new("sh");
                c.args(["-c", &line]);
                c
            }
        } else {
            let mut c = Command::new(spec.program.as_std_path());
            c.args(&spec.args);
            c
        };

        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir.as_std_path());
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: spec.program.to_string(),
            source,
        })?;

        child
            .id()
            .ok_or_else(|| LaunchError::NoProcessId(spec.program.to_string()))
    }
}

impl ProcessLauncher for SystemLauncher {
    fn spawn(&self, spec: &LaunchSpec) -> ProcessHandle {
        tracing::info!("Launching: {}", spec);
        match self.try_spawn(spec) {
            Ok(pid) => {
                tracing::info!("{} started with PID {}", spec.program, pid);
                ProcessHandle::started(pid)
            }
            Err(e) => {
                tracing::error!("Launch failed: {}", e);
                ProcessHandle::failed()
            }
        }
    }
}

/// [`ProcessTable`] backed by the platform listing command
/// (`tasklist` on Windows, `pgrep` elsewhere).
#[derive(Debug, Clone, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for SystemProcessTable {
    fn find_by_name(&self, name: &str) -> impl Future<Output = std::io::Result<Vec<ProcessId>>> + Send {
        let name = name.to_string();
        async move {
            if cfg!(target_os = "windows") {
                let output = Command::new("tasklist")
                    .args(["/FI", &format!("IMAGENAME eq {}", name), "/FO", "CSV", "/NH"])
                    .output()
                    .await?;
                if !output.status.success() {
                    return Err(std::io::Error::other(format!(
                        "tasklist exited with {}",
                        output.status
                    )));
                }
                Ok(parse_tasklist_output(&String::from_utf8_lossy(&output.stdout)))
            } else {
                let output = Command::new("pgrep").arg(&name).output().await?;
                // pgrep exits 1 when nothing matched
                match output.status.code() {
                    Some(0) | Some(1) => {
                        Ok(parse_pgrep_output(&String::from_utf8_lossy(&output.stdout)))
                    }
                    _ => Err(std::io::Error::other(format!(
                        "pgrep exited with {}",
                        output.status
                    ))),
                }
            }
        }
    }
}

fn tasklist_row() -> &'static Regex {
    static ROW: OnceLock<Regex> = OnceLock::new();
    ROW.get_or_init(|| Regex::new(r#""([^"]+)",\s*"(\d+)""#).expect("Invalid tasklist regex"))
}

/// Extract PIDs from `tasklist /FO CSV /NH` output.
///
/// Rows look like `"Game.exe","1234","Console","1","120,000 K"`. The
/// "no tasks are running" notice matches nothing and yields an empty list.
pub fn parse_tasklist_output(stdout: &str) -> Vec<ProcessId> {
    stdout
        .lines()
        .filter_map(|line| tasklist_row().captures(line))
        .filter_map(|caps| caps.get(2)?.as_str().parse().ok())
        .collect()
}

/// Extract PIDs from `pgrep` output, one per line.
pub fn parse_pgrep_output(stdout: &str) -> Vec<ProcessId> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}
