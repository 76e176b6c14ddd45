//! Services module - process orchestration and backend plumbing.
//!
//! Nothing in here touches a UI. Process spawning and process-table queries sit behind the
//! [`ProcessLauncher`] and [`ProcessTable`] traits so the sequencing logic can be tested
//! against fakes.
//!
//! # Components
//!
//! - [`process`]: spawning executables and listing running processes
//! - [`pid_resolver`]: polling the process table until a named process appears or a timeout passes
//! - [`game_session`]: launching a game, its text hooker and an agent attached to its PID
//! - [`log_classifier`]: turning free-text OCR backend lines into [`LogEvent`]s
//! - [`ocr_backend`]: the stdio `OCRMSG:`/`OCRCMD:` transport to the OCR backend
//!
//! # Launch sequence
//!
//! 1. Start the game directly (cwd = its directory) or through Steam's `-applaunch`
//! 2. Start the text hooker if the game uses one
//! 3. Wait the settle delay, then poll for the game's process
//! 4. Start the agent with the resolved PID, or `-1` if the game never showed up

pub mod game_session;
pub mod log_classifier;
pub mod ocr_backend;
pub mod pid_resolver;
pub mod process;

pub use game_session::{
    AgentOutcome, GameSessionOrchestrator, LaunchReport, LaunchRequest, LaunchResponse,
    LaunchTimings, ResponseStatus,
};
pub use log_classifier::{Classification, LogClassifier, LogEvent};
pub use ocr_backend::{
    BackendError, BackendEvent, BackendRequest, InboundMessage, OcrChannel, StatusPayload, StdioBackend,
    build_backend_command,
};
pub use pid_resolver::{PidLookup, PidResolver};
pub use process::{
    LaunchError, LaunchSpec, ProcessHandle, ProcessId, ProcessLauncher, ProcessTable,
    SystemLauncher, SystemProcessTable,
};
