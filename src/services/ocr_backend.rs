//! Transport to the long-running OCR backend process.
//!
//! The backend is a Python helper driven over stdio. Structured events arrive
//! on stdout as `OCRMSG:{json}` lines interleaved with ordinary log output;
//! commands are written to stdin as `OCRCMD:{json}` lines. Everything that is
//! not a well-formed `OCRMSG:` line is delivered as [`InboundMessage::Log`].

use crate::models::{OcrSettings, SessionMode};
use crate::services::process::LaunchSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};

const MESSAGE_PREFIX: &str = "OCRMSG:";
const COMMAND_PREFIX: &str = "OCRCMD:";
const HELPER_MODULE: &str = "GameSentenceMiner.ocr.owocr_helper";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to start OCR backend: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("OCR backend is already running")]
    AlreadyRunning,

    #[error("OCR backend is not running")]
    NotRunning,

    #[error("OCR backend command channel closed")]
    ChannelClosed,

    #[error("Failed to encode OCR command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound requests to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackendRequest {
    Start(SessionMode),
    Stop,
    Pause,
    Unpause,
    TogglePause,
    GetStatus,
    ManualOcr,
    ReloadConfig,
    ToggleForceStable,
    SetForceStable(bool),
}

impl BackendRequest {
    /// Wire name of the stdin command, `None` for requests handled locally.
    pub fn command_name(self) -> Option<&'static str> {
        let name = match self {
            BackendRequest::Start(_) => return None,
            BackendRequest::Stop => "stop",
            BackendRequest::Pause => "pause",
            BackendRequest::Unpause => "unpause",
            BackendRequest::TogglePause => "toggle_pause",
            BackendRequest::GetStatus => "get_status",
            BackendRequest::ManualOcr => "manual_ocr",
            BackendRequest::ReloadConfig => "reload_config",
            BackendRequest::ToggleForceStable => "toggle_force_stable",
            BackendRequest::SetForceStable(_) => "set_force_stable",
        };
        Some(name)
    }
}

/// Payload of a `status` event. Every field but `paused` is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub paused: bool,
    #[serde(default, alias = "currentEngine")]
    pub current_engine: Option<String>,
    #[serde(default, alias = "scanRate")]
    pub scan_rate: Option<f64>,
    #[serde(default)]
    pub manual: Option<bool>,
}

/// Messages flowing from the backend to the session controller, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Started,
    Stopped,
    Paused,
    Unpaused,
    Status(StatusPayload),
    Error(String),
    OcrResult(Value),
    ConfigReloaded,
    ForceStableChanged { enabled: bool },
    /// A structured event this client does not know about
    Unknown(String),
    /// Free-text output line
    Log(String),
}

impl InboundMessage {
    pub fn tag(&self) -> &'static str {
        match self {
            InboundMessage::Started => "started",
            InboundMessage::Stopped => "stopped",
            InboundMessage::Paused => "paused",
            InboundMessage::Unpaused => "unpaused",
            InboundMessage::Status(_) => "status",
            InboundMessage::Error(_) => "error",
            InboundMessage::OcrResult(_) => "ocr_result",
            InboundMessage::ConfigReloaded => "config_reloaded",
            InboundMessage::ForceStableChanged { .. } => "force_stable_changed",
            InboundMessage::Unknown(_) => "unknown",
            InboundMessage::Log(_) => "log",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Serialize)]
struct WireCommand {
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn decode_message(msg: WireMessage) -> InboundMessage {
    match msg.event.as_str() {
        "started" => InboundMessage::Started,
        "stopped" => InboundMessage::Stopped,
        "paused" => InboundMessage::Paused,
        "unpaused" => InboundMessage::Unpaused,
        "status" => InboundMessage::Status(serde_json::from_value(msg.data).unwrap_or_default()),
        "error" => InboundMessage::Error(
            msg.data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
        ),
        "ocr_result" => InboundMessage::OcrResult(msg.data),
        "config_reloaded" => InboundMessage::ConfigReloaded,
        "force_stable_changed" => InboundMessage::ForceStableChanged {
            enabled: msg
                .data
                .get("enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        _ => InboundMessage::Unknown(msg.event),
    }
}

/// An inbound message stamped with the backend process that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendEvent {
    /// Spawn counter of the producing process; see [`OcrChannel::generation`]
    pub generation: u64,
    pub message: InboundMessage,
}

impl BackendEvent {
    pub fn new(generation: u64, message: InboundMessage) -> Self {
        Self {
            generation,
            message,
        }
    }
}

/// Decode one stdout line.
pub fn parse_backend_line(line: &str) -> InboundMessage {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(json) = line.strip_prefix(MESSAGE_PREFIX) {
        match serde_json::from_str::<WireMessage>(json) {
            Ok(msg) => return decode_message(msg),
            Err(e) => tracing::debug!("Unparseable backend message ({}): {}", e, line),
        }
    }
    InboundMessage::Log(line.to_string())
}

/// Encode a request as a stdin line (without the trailing newline).
/// Returns `Ok(None)` for requests that are not stdin commands.
pub fn encode_command(request: BackendRequest) -> Result<Option<String>, BackendError> {
    let Some(command) = request.command_name() else {
        return Ok(None);
    };
    let data = match request {
        BackendRequest::SetForceStable(enabled) => Some(serde_json::json!({ "enabled": enabled })),
        _ => None,
    };
    let json = serde_json::to_string(&WireCommand { command, data })?;
    Ok(Some(format!("{}{}", COMMAND_PREFIX, json)))
}

/// Backend command line for `mode` under `settings`.
pub fn build_backend_command(python: &str, settings: &OcrSettings, mode: SessionMode) -> LaunchSpec {
    let shared = &settings.shared;
    let mut spec = LaunchSpec::new(python)
        .arg("-m")
        .arg(HELPER_MODULE)
        .arg("--language")
        .arg(shared.language.as_str());

    spec = match mode {
        SessionMode::Normal => {
            let primary = if shared.two_pass_ocr {
                &settings.ocr1
            } else {
                &settings.ocr2
            };
            spec.arg("--ocr1")
                .arg(primary.as_str())
                .arg("--ocr2")
                .arg(settings.ocr2.as_str())
                .arg("--twopassocr")
                .arg(if shared.two_pass_ocr { "1" } else { "0" })
                .arg("--obs_ocr")
        }
        SessionMode::ScreenshotOnly => spec
            .arg("--ocr1")
            .arg(settings.ocr2.as_str())
            .arg("--ocr2")
            .arg(settings.ocr2.as_str())
            .arg("--manual")
            .arg("--obs_ocr"),
    };

    if shared.ocr_screenshots {
        spec = spec.arg("--clipboard");
    }
    if shared.send_to_clipboard {
        spec = spec.arg("--clipboard-output");
    }
    if shared.furigana_filter_sensitivity > 0 {
        spec = spec
            .arg("--furigana_filter_sensitivity")
            .arg(shared.furigana_filter_sensitivity.to_string());
    }
    if !shared.area_select_ocr_hotkey.is_empty() {
        spec = spec
            .arg("--area_select_ocr_hotkey")
            .arg(shared.area_select_ocr_hotkey.as_str());
    }
    match mode {
        SessionMode::Normal if shared.optimize_second_scan => {
            spec = spec.arg("--optimize_second_scan");
        }
        SessionMode::ScreenshotOnly if !shared.manual_ocr_hotkey.is_empty() => {
            spec = spec
                .arg("--manual_ocr_hotkey")
                .arg(shared.manual_ocr_hotkey.as_str());
        }
        _ => {}
    }
    if shared.keep_newline {
        spec = spec.arg("--keep_newline");
    }
    spec
}

/// Outbound side of the backend channel, as seen by the session controller.
pub trait OcrChannel: Send + Sync {
    fn send(&self, request: BackendRequest) -> Result<(), BackendError>;

    /// Generation of the most recently started backend. Events stamped with
    /// any other generation come from a process that was already replaced.
    /// Channels that never respawn stay at 0.
    fn generation(&self) -> u64 {
        0
    }
}

struct RunningBackend {
    commands: mpsc::UnboundedSender<String>,
    kill: Option<oneshot::Sender<()>>,
}

/// [`OcrChannel`] that runs the backend as a child process.
///
/// Stdout and stderr each get a reader task forwarding into `events`; stdin is
/// fed by a writer task. A supervisor task owns the child, kills it on stop,
/// and emits [`InboundMessage::Stopped`] once the process and its readers are done.
pub struct StdioBackend {
    python: String,
    settings: Mutex<OcrSettings>,
    events: mpsc::UnboundedSender<BackendEvent>,
    running: Mutex<Option<RunningBackend>>,
    generation: AtomicU64,
}

impl StdioBackend {
    pub fn new(
        python: impl Into<String>,
        settings: OcrSettings,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            python: python.into(),
            settings: Mutex::new(settings),
            events,
            running: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Settings used for the next start.
    pub fn update_settings(&self, settings: OcrSettings) {
        *self.settings.lock().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.commands.is_closed())
    }

    fn start(&self, mode: SessionMode) -> Result<(), BackendError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.commands.is_closed()) {
            return Err(BackendError::AlreadyRunning);
        }

        let spec = {
            let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            build_backend_command(&self.python, &settings, mode)
        };
        tracing::info!("Starting OCR backend: {}", spec);

        let mut child = Command::new(spec.program.as_std_path())
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(BackendError::Spawn)?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("OCR backend generation {}", generation);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(forward_lines(
                out,
                self.events.clone(),
                generation,
                parse_backend_line,
            ))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(forward_lines(err, self.events.clone(), generation, |line| {
                InboundMessage::Log(line.to_string())
            }))
        });
        let writer = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(write_commands(stdin, cmd_rx)));

        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => tracing::info!("OCR backend exited with {}", status),
                    Err(e) => tracing::warn!("Failed to wait for OCR backend: {}", e),
                },
                _ = kill_rx => {
                    tracing::info!("Killing OCR backend");
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill OCR backend: {}", e);
                    }
                }
            }
            // Dropping the command receiver marks this backend as no longer running
            if let Some(writer) = writer {
                writer.abort();
            }
            for reader in [stdout, stderr].into_iter().flatten() {
                let _ = reader.await;
            }
            let _ = events.send(BackendEvent::new(generation, InboundMessage::Stopped));
        });

        *running = Some(RunningBackend {
            commands: cmd_tx,
            kill: Some(kill_tx),
        });
        let _ = self
            .events
            .send(BackendEvent::new(generation, InboundMessage::Started));
        Ok(())
    }

    fn stop(&self) -> Result<(), BackendError> {
        let Some(mut backend) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::debug!("Stop requested with no OCR backend running");
            return Ok(());
        };

        if let Some(line) = encode_command(BackendRequest::Stop)? {
            let _ = backend.commands.send(line);
        }
        if let Some(kill) = backend.kill.take() {
            let _ = kill.send(());
        }
        Ok(())
    }
}

impl OcrChannel for StdioBackend {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn send(&self, request: BackendRequest) -> Result<(), BackendError> {
        match request {
            BackendRequest::Start(mode) => self.start(mode),
            BackendRequest::Stop => self.stop(),
            other => {
                let Some(line) = encode_command(other)? else {
                    return Ok(());
                };
                let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
                let backend = running.as_ref().ok_or(BackendError::NotRunning)?;
                backend
                    .commands
                    .send(line)
                    .map_err(|_| BackendError::ChannelClosed)
            }
        }
    }
}

async fn forward_lines<R, F>(
    stream: R,
    events: mpsc::UnboundedSender<BackendEvent>,
    generation: u64,
    decode: F,
) where
    R: AsyncRead + Unpin,
    F: Fn(&str) -> InboundMessage,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if events.send(BackendEvent::new(generation, decode(&line))).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Error reading OCR backend output: {}", e);
                break;
            }
        }
    }
}

async fn write_commands(mut stdin: ChildStdin, mut commands: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = commands.recv().await {
        tracing::debug!("-> {}", line);
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::warn!("Failed to write to OCR backend: {}", e);
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_events() {
        assert_eq!(
            parse_backend_line(r#"OCRMSG:{"event":"started"}"#),
            InboundMessage::Started
        );
        assert_eq!(
            parse_backend_line(r#"OCRMSG:{"event":"error","data":{"error":"OBS not connected"}}"#),
            InboundMessage::Error("OBS not connected".to_string())
        );
        assert_eq!(
            parse_backend_line(r#"OCRMSG:{"event":"error"}"#),
            InboundMessage::Error("Unknown error".to_string())
        );
        assert_eq!(
            parse_backend_line(r#"OCRMSG:{"event":"force_stable_changed","data":{"enabled":true}}"#),
            InboundMessage::ForceStableChanged { enabled: true }
        );
    }

    #[test]
    fn test_parse_status_payload() {
        let msg = parse_backend_line(
            r#"OCRMSG:{"event":"status","data":{"paused":false,"current_engine":"OneOCR","scan_rate":0.5,"manual":false},"id":"1"}"#,
        );
        assert_eq!(
            msg,
            InboundMessage::Status(StatusPayload {
                paused: false,
                current_engine: Some("OneOCR".to_string()),
                scan_rate: Some(0.5),
                manual: Some(false),
            })
        );
    }

    #[test]
    fn test_non_messages_are_logs() {
        assert_eq!(
            parse_backend_line("OCRMSG:{not json\r"),
            InboundMessage::Log("OCRMSG:{not json".to_string())
        );
        assert_eq!(
            parse_backend_line("plain output"),
            InboundMessage::Log("plain output".to_string())
        );
        assert_eq!(parse_backend_line(r#"OCRMSG:{"event":"mystery"}"#).tag(), "unknown");
    }

    #[test]
    fn test_encode_commands() {
        assert_eq!(
            encode_command(BackendRequest::TogglePause).unwrap().as_deref(),
            Some(r#"OCRCMD:{"command":"toggle_pause"}"#)
        );
        assert_eq!(
            encode_command(BackendRequest::SetForceStable(true))
                .unwrap()
                .as_deref(),
            Some(r#"OCRCMD:{"command":"set_force_stable","data":{"enabled":true}}"#)
        );
        assert_eq!(encode_command(BackendRequest::Start(SessionMode::Normal)).unwrap(), None);
    }

    #[test]
    fn test_build_normal_command() {
        let mut settings = OcrSettings::default();
        settings.ocr1 = "oneocr".to_string();
        settings.shared.furigana_filter_sensitivity = 40;

        let spec = build_backend_command("python", &settings, SessionMode::Normal);
        assert_eq!(spec.program.as_str(), "python");
        assert_eq!(
            spec.args,
            vec![
                "-m",
                "GameSentenceMiner.ocr.owocr_helper",
                "--language",
                "ja",
                "--ocr1",
                "oneocr",
                "--ocr2",
                "glens",
                "--twopassocr",
                "1",
                "--obs_ocr",
                "--furigana_filter_sensitivity",
                "40",
                "--area_select_ocr_hotkey",
                "Ctrl+Shift+O",
                "--optimize_second_scan",
            ]
        );
    }

    #[test]
    fn test_build_screenshot_only_command() {
        let mut settings = OcrSettings::default();
        settings.shared.two_pass_ocr = false;
        settings.shared.keep_newline = true;

        let spec = build_backend_command("python", &settings, SessionMode::ScreenshotOnly);
        let args = spec.args.join(" ");
        assert!(args.contains("--ocr1 glens --ocr2 glens --manual --obs_ocr"));
        assert!(args.contains("--manual_ocr_hotkey Ctrl+Shift+G"));
        assert!(!args.contains("--optimize_second_scan"));
        assert!(!args.contains("--twopassocr"));
        assert!(args.ends_with("--keep_newline"));
    }

    #[tokio::test]
    async fn test_forwarded_lines_carry_their_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let output: &[u8] = b"OCRMSG:{\"event\":\"stopped\"}\nloading model\n";

        forward_lines(output, tx, 3, parse_backend_line).await;

        assert_eq!(
            rx.recv().await,
            Some(BackendEvent::new(3, InboundMessage::Stopped))
        );
        assert_eq!(
            rx.recv().await,
            Some(BackendEvent::new(3, InboundMessage::Log("loading model".to_string())))
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_unstarted_backend_is_generation_zero() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let backend = StdioBackend::new("python", OcrSettings::default(), tx);
        assert_eq!(backend.generation(), 0);
    }

    #[test]
    fn test_send_without_backend_is_rejected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let backend = StdioBackend::new("python", OcrSettings::default(), tx);
        assert!(matches!(
            backend.send(BackendRequest::GetStatus),
            Err(BackendError::NotRunning)
        ));
        assert!(backend.send(BackendRequest::Stop).is_ok());
        assert!(!backend.is_running());
    }
}
