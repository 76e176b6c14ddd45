//! OCR session controller.
//!
//! [`OcrSessionController`] keeps a belief about what the remote OCR backend is
//! doing, built only from structured push events and classified log lines. All
//! inbound traffic goes through [`OcrSessionController::handle`] one message at
//! a time, in arrival order.

use super::console::{ConsoleHandle, ConsoleOptions};
use super::{ANIMATION_FRAMES, SessionChange, StatusLine, UserNotice};
use crate::metrics::Metrics;
use crate::models::{DEFAULT_SCAN_RATE, SessionMode, SessionState};
use crate::services::log_classifier::{
    self, ANSI_CYAN, ANSI_MAGENTA, ANSI_RESET, Classification, LogClassifier, LogEvent,
};
use crate::services::ocr_backend::{
    BackendError, BackendEvent, BackendRequest, InboundMessage, OcrChannel, StatusPayload,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Number of transcript lines kept when no capacity is configured.
pub const DEFAULT_TRANSCRIPT_CAPACITY: usize = 1000;

/// Ticks between latency refreshes for an engine already measured.
const LATENCY_REFRESH_TICKS: u64 = 5;

const SCAN_FRAME_START: usize = 0;
const SLEEP_FRAME_START: usize = 1;

/// Scan rates above this show the sleeping indicator without waiting for a
/// second sleeping line.
const IMMEDIATE_SLEEP_SCAN_RATE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("An OCR session is already {0}")]
    AlreadyRunning(SessionState),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub struct OcrSessionController<C: OcrChannel> {
    channel: C,
    classifier: LogClassifier,
    console: ConsoleHandle,
    /// Whether this controller currently counts as one console holder
    holds_console: bool,
    metrics: Arc<Metrics>,
    changes: broadcast::Sender<SessionChange>,

    state: SessionState,
    mode: SessionMode,
    status: StatusLine,
    scan_rate: f64,

    sleep_streak: bool,
    scan_frame: usize,
    sleep_frame: usize,
    ticks: u64,
    latencies: HashMap<String, String>,
    current_engine: Option<String>,

    previous_message: String,
    pinned_source: Option<String>,
    noticed_sources: HashSet<String>,

    transcript: VecDeque<String>,
    transcript_capacity: usize,
}

impl<C: OcrChannel> OcrSessionController<C> {
    pub fn new(channel: C, console: ConsoleHandle, metrics: Arc<Metrics>) -> Self {
        let (changes, _) = broadcast::channel(100);
        Self {
            channel,
            classifier: LogClassifier::new(),
            console,
            holds_console: false,
            metrics,
            changes,
            state: SessionState::Idle,
            mode: SessionMode::Normal,
            status: StatusLine::Idle,
            scan_rate: DEFAULT_SCAN_RATE,
            sleep_streak: false,
            scan_frame: SCAN_FRAME_START,
            sleep_frame: SLEEP_FRAME_START,
            ticks: 0,
            latencies: HashMap::new(),
            current_engine: None,
            previous_message: String::new(),
            pinned_source: None,
            noticed_sources: HashSet::new(),
            transcript: VecDeque::new(),
            transcript_capacity: DEFAULT_TRANSCRIPT_CAPACITY,
        }
    }

    /// Configured scan rate in seconds, used by the sleeping indicator.
    pub fn with_scan_rate(mut self, scan_rate: f64) -> Self {
        self.scan_rate = scan_rate;
        self
    }

    pub fn with_transcript_capacity(mut self, capacity: usize) -> Self {
        self.transcript_capacity = capacity.max(1);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn current_engine(&self) -> Option<&str> {
        self.current_engine.as_deref()
    }

    /// Last measured latency for `engine`, as reported by the backend.
    pub fn latency(&self, engine: &str) -> Option<&str> {
        self.latencies.get(engine).map(String::as_str)
    }

    /// Video source OCR keeps using after a multi-source warning.
    pub fn pinned_source(&self) -> Option<&str> {
        self.pinned_source.as_deref()
    }

    pub fn console(&self) -> &ConsoleHandle {
        &self.console
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn transcript(&self) -> impl Iterator<Item = &str> {
        self.transcript.iter().map(String::as_str)
    }

    pub fn set_scan_rate(&mut self, scan_rate: f64) {
        self.scan_rate = scan_rate;
    }

    fn emit(&self, change: SessionChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.metrics.record_transition();
        tracing::debug!("OCR session {} -> {}", from, to);
        self.emit(SessionChange::StateChanged { from, to });
    }

    fn set_status(&mut self, status: StatusLine) {
        if self.status == status {
            return;
        }
        self.console.set_status(status.to_string());
        self.status = status.clone();
        self.emit(SessionChange::StatusUpdated(status));
    }

    fn append(&mut self, line: String) {
        if self.transcript.len() >= self.transcript_capacity {
            self.transcript.pop_front();
        }
        self.transcript.push_back(line.clone());
        self.emit(SessionChange::LogAppended(line));
    }

    fn notify(&self, notice: UserNotice) {
        tracing::warn!("{}", notice);
        self.emit(SessionChange::Notice(notice));
    }

    fn reset_animation(&mut self) {
        self.sleep_streak = false;
        self.scan_frame = SCAN_FRAME_START;
        self.sleep_frame = SLEEP_FRAME_START;
    }

    fn acquire_console(&mut self) {
        if self.holds_console {
            return;
        }
        self.holds_console = true;
        self.console.acquire(&ConsoleOptions::ocr_session());
    }

    fn release_console(&mut self) {
        if !std::mem::take(&mut self.holds_console) {
            return;
        }
        if self.console.release() {
            tracing::debug!("OCR console closed");
        }
    }

    /// Whether log-driven scanning and sleeping updates apply right now.
    fn accepts_activity(&self) -> bool {
        matches!(
            self.state,
            SessionState::Idle
                | SessionState::Starting
                | SessionState::Scanning
                | SessionState::Sleeping
        )
    }

    /// Begin a new session. Allowed from `Idle`, `Stopped` and `Error`.
    pub fn start(&mut self, mode: SessionMode) -> Result<(), SessionError> {
        if !self.state.can_start() {
            return Err(SessionError::AlreadyRunning(self.state));
        }

        tracing::info!("Starting OCR session ({:?})", mode);
        self.mode = mode;
        self.reset_animation();
        self.ticks = 0;
        self.latencies.clear();
        self.current_engine = None;
        self.previous_message.clear();
        self.pinned_source = None;
        self.noticed_sources.clear();
        self.transcript.clear();
        self.emit(SessionChange::TranscriptCleared);

        self.transition(SessionState::Starting);
        self.set_status(StatusLine::Starting);

        if let Err(e) = self.channel.send(BackendRequest::Start(mode)) {
            tracing::error!("Failed to start OCR backend: {}", e);
            self.metrics.record_backend_error();
            self.transition(SessionState::Error);
            self.set_status(StatusLine::Error(e.to_string()));
            return Err(e.into());
        }
        Ok(())
    }

    /// Kill the backend and end the session.
    pub fn stop(&mut self) {
        if let Err(e) = self.channel.send(BackendRequest::Stop) {
            tracing::warn!("Failed to send stop to OCR backend: {}", e);
        }
        self.reset_animation();
        self.transition(SessionState::Stopped);
        self.set_status(StatusLine::Stopped);
        self.release_console();
    }

    /// Ask the backend to flip its pause state. The controller waits for the
    /// backend's confirmation before changing state.
    pub fn toggle_pause(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::TogglePause)?)
    }

    /// Ask the backend to pause. Like [`Self::toggle_pause`], state follows
    /// the backend's `paused` push.
    pub fn pause(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::Pause)?)
    }

    pub fn unpause(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::Unpause)?)
    }

    pub fn request_status(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::GetStatus)?)
    }

    pub fn manual_ocr(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::ManualOcr)?)
    }

    pub fn reload_config(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::ReloadConfig)?)
    }

    pub fn toggle_force_stable(&self) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::ToggleForceStable)?)
    }

    pub fn set_force_stable(&self, enabled: bool) -> Result<(), SessionError> {
        Ok(self.channel.send(BackendRequest::SetForceStable(enabled))?)
    }

    /// Drain `inbound` until every sender is gone.
    pub async fn run(&mut self, mut inbound: mpsc::UnboundedReceiver<BackendEvent>) {
        while let Some(event) = inbound.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("OCR inbound channel closed");
    }

    /// Apply an event from the transport, dropping anything produced by a
    /// backend process older than the channel's current one.
    pub fn handle_event(&mut self, event: BackendEvent) {
        let current = self.channel.generation();
        if event.generation != current {
            tracing::debug!(
                "Dropping {} from backend generation {} (current {})",
                event.message.tag(),
                event.generation,
                current
            );
            return;
        }
        self.handle(event.message);
    }

    /// Apply one inbound message.
    pub fn handle(&mut self, message: InboundMessage) {
        tracing::trace!("<- {}", message.tag());
        match message {
            InboundMessage::Started => self.on_started(),
            InboundMessage::Stopped => self.on_stopped(),
            InboundMessage::Paused => self.on_paused(),
            InboundMessage::Unpaused => self.on_unpaused(),
            InboundMessage::Status(status) => self.on_status(status),
            InboundMessage::Error(message) => self.on_error(message),
            InboundMessage::OcrResult(result) => {
                tracing::debug!("OCR result: {}", result);
            }
            InboundMessage::ConfigReloaded => {
                self.append(format!("{}Configuration reloaded{}", ANSI_CYAN, ANSI_RESET));
            }
            InboundMessage::ForceStableChanged { enabled } => {
                let status = if enabled { "enabled" } else { "disabled" };
                self.append(format!(
                    "{}Force stable mode {}{}",
                    ANSI_MAGENTA, status, ANSI_RESET
                ));
            }
            InboundMessage::Unknown(event) => {
                tracing::debug!("Ignoring unknown OCR event: {}", event);
            }
            InboundMessage::Log(line) => self.on_log(&line),
        }
    }

    fn on_started(&mut self) {
        if !matches!(self.state, SessionState::Starting | SessionState::Idle) {
            tracing::debug!("Ignoring started event while {}", self.state);
            return;
        }
        self.transition(SessionState::Scanning);
        self.acquire_console();
    }

    fn on_stopped(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!("OCR backend stopped");
        self.reset_animation();
        self.transition(SessionState::Stopped);
        self.set_status(StatusLine::Stopped);
    }

    fn on_paused(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.reset_animation();
        self.transition(SessionState::Paused);
        self.set_status(StatusLine::Paused);
    }

    fn on_unpaused(&mut self) {
        if self.state != SessionState::Paused {
            return;
        }
        self.transition(SessionState::Scanning);
        self.set_status(StatusLine::Resumed);
    }

    fn on_status(&mut self, status: StatusPayload) {
        if let Some(manual) = status.manual {
            self.mode = if manual {
                SessionMode::ScreenshotOnly
            } else {
                SessionMode::Normal
            };
        }
        if let Some(rate) = status.scan_rate {
            self.scan_rate = rate;
        }

        if status.paused {
            self.on_paused();
            return;
        }

        match self.state {
            SessionState::Idle | SessionState::Stopped | SessionState::Error => {
                tracing::debug!("Ignoring status push while {}", self.state);
                return;
            }
            SessionState::Starting | SessionState::Paused | SessionState::Sleeping => {
                self.sleep_streak = false;
                self.transition(SessionState::Scanning);
            }
            SessionState::Scanning => {}
        }

        let engine = status
            .current_engine
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "OCR".to_string());
        let scan_rate = (!self.mode.is_manual()).then(|| status.scan_rate.unwrap_or(0.0));
        self.set_status(StatusLine::Running { engine, scan_rate });
    }

    fn on_error(&mut self, message: String) {
        tracing::error!("OCR backend error: {}", message);
        self.metrics.record_backend_error();
        self.reset_animation();
        self.transition(SessionState::Error);
        self.set_status(StatusLine::Error(message.clone()));
        self.notify(UserNotice::BackendError(message));
    }

    fn on_log(&mut self, line: &str) {
        let event = match self.classifier.classify(line) {
            Classification::Suppressed => {
                self.metrics.record_line(true);
                return;
            }
            Classification::Event(event) => event,
        };
        self.metrics.record_line(false);

        match event {
            LogEvent::Sleeping => self.on_sleeping(),
            LogEvent::Completed => {
                tracing::info!("OCR command finished");
                self.reset_animation();
                self.transition(SessionState::Stopped);
                self.set_status(StatusLine::Stopped);
                self.release_console();
            }
            LogEvent::ScanningTick { engine, seconds } => {
                if self.state == SessionState::Paused {
                    self.record_message(line.trim());
                } else if self.accepts_activity() {
                    self.on_tick(engine, seconds);
                }
            }
            LogEvent::Duplicate => {
                self.append(log_classifier::render_duplicate(&self.previous_message));
            }
            LogEvent::MultiSourceWarning { source } => {
                self.reset_animation();
                self.append(log_classifier::render_line(line.trim()));
                self.previous_message = line.trim().to_string();
                self.on_multiple_sources(source);
            }
            LogEvent::Unclassified { text } => {
                self.record_message(&text);
            }
        }
    }

    fn record_message(&mut self, text: &str) {
        self.reset_animation();
        self.append(log_classifier::render_line(text));
        self.previous_message = text.to_string();
    }

    fn on_sleeping(&mut self) {
        if !self.accepts_activity() {
            return;
        }
        let show = self.sleep_streak || self.scan_rate > IMMEDIATE_SLEEP_SCAN_RATE;
        self.sleep_streak = true;
        if !show {
            return;
        }

        let frame = self.sleep_frame;
        self.sleep_frame = (self.sleep_frame + 1) % ANIMATION_FRAMES.len();
        self.transition(SessionState::Sleeping);
        self.set_status(StatusLine::Sleeping { frame });
    }

    fn on_tick(&mut self, engine: String, seconds: String) {
        self.ticks += 1;
        self.sleep_streak = false;

        if !self.latencies.contains_key(&engine) || self.ticks % LATENCY_REFRESH_TICKS == 0 {
            self.latencies.insert(engine.clone(), seconds);
        }
        let latency = self.latencies.get(&engine).cloned();

        let frame = self.scan_frame;
        self.scan_frame = (self.scan_frame + 1) % ANIMATION_FRAMES.len();

        self.current_engine = Some(engine.clone());
        self.transition(SessionState::Scanning);
        self.set_status(StatusLine::Scanning {
            engine,
            latency,
            frame,
        });
    }

    fn on_multiple_sources(&mut self, detected: String) {
        let using = self
            .pinned_source
            .get_or_insert_with(|| detected.clone())
            .clone();
        if self.noticed_sources.insert(detected.clone()) {
            self.notify(UserNotice::MultipleVideoSources { detected, using });
        }
    }
}
