// State management module
//
// This module holds the OCR session controller, which owns the client-side belief about the
// backend, and the reference-counted console guard. Observers learn about changes through
// SessionChange events on a tokio broadcast channel instead of polling.

pub mod console;
pub mod session;

pub use console::{ConsoleHandle, ConsoleLayout, ConsoleOptions, ConsoleResourceGuard};
pub use session::{OcrSessionController, SessionError};

use crate::models::SessionState;
use std::fmt;

/// Animation frames shared by the scanning and sleeping indicators.
pub const ANIMATION_FRAMES: [&str; 4] = [".", "..", "...", "...."];

/// Status line projection of the session.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum StatusLine {
    #[default]
    Idle,
    Starting,
    Scanning {
        engine: String,
        latency: Option<String>,
        frame: usize,
    },
    Sleeping {
        frame: usize,
    },
    /// Reported by a status push; `scan_rate` is absent in screenshot-only mode
    Running {
        engine: String,
        scan_rate: Option<f64>,
    },
    Resumed,
    Paused,
    Error(String),
    Stopped,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLine::Idle => Ok(()),
            StatusLine::Starting => f.write_str("Starting OCR..."),
            StatusLine::Scanning {
                engine,
                latency,
                frame,
            } => {
                write!(f, "Scanning using {}", engine)?;
                if let Some(latency) = latency {
                    write!(f, " in {}s", latency)?;
                }
                f.write_str(ANIMATION_FRAMES[frame % ANIMATION_FRAMES.len()])
            }
            StatusLine::Sleeping { frame } => write!(
                f,
                "Sleeping - Image empty or unchanged{}",
                ANIMATION_FRAMES[frame % ANIMATION_FRAMES.len()]
            ),
            StatusLine::Running {
                engine,
                scan_rate: Some(rate),
            } => write!(f, "Running ({}, {}s scan rate)", engine, rate),
            StatusLine::Running {
                engine,
                scan_rate: None,
            } => write!(f, "Running ({})", engine),
            StatusLine::Resumed => f.write_str("▶️ Running"),
            StatusLine::Paused => f.write_str("⏸️ Paused"),
            StatusLine::Error(message) => write!(f, "❌ Error: {}", message),
            StatusLine::Stopped => f.write_str("Stopped"),
        }
    }
}

/// Something the user should be told about explicitly, beyond the status line.
#[derive(Clone, Debug, PartialEq)]
pub enum UserNotice {
    /// OBS has several active video sources; `using` is the one OCR keeps using
    MultipleVideoSources { detected: String, using: String },
    BackendError(String),
}

impl fmt::Display for UserNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserNotice::MultipleVideoSources { using, .. } => write!(
                f,
                "Multiple active video sources were found in OBS. Please ensure only one source is active. For now, the source \"{}\" will be used for OCR.",
                using
            ),
            UserNotice::BackendError(message) => write!(f, "OCR backend error: {}", message),
        }
    }
}

/// Change events emitted by [`OcrSessionController`]
#[derive(Clone, Debug, PartialEq)]
pub enum SessionChange {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    StatusUpdated(StatusLine),

    /// A line was appended to the console transcript
    LogAppended(String),

    /// The transcript was cleared for a new session
    TranscriptCleared,

    Notice(UserNotice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line_rendering() {
        let scanning = StatusLine::Scanning {
            engine: "OneOCR".to_string(),
            latency: Some("0.4".to_string()),
            frame: 2,
        };
        assert_eq!(scanning.to_string(), "Scanning using OneOCR in 0.4s...");
        assert_eq!(
            StatusLine::Sleeping { frame: 5 }.to_string(),
            "Sleeping - Image empty or unchanged.."
        );
        assert_eq!(
            StatusLine::Running {
                engine: "OneOCR".to_string(),
                scan_rate: Some(0.5)
            }
            .to_string(),
            "Running (OneOCR, 0.5s scan rate)"
        );
        assert_eq!(
            StatusLine::Running {
                engine: "glens".to_string(),
                scan_rate: None
            }
            .to_string(),
            "Running (glens)"
        );
        assert_eq!(StatusLine::Idle.to_string(), "");
        assert_eq!(
            StatusLine::Error("boom".to_string()).to_string(),
            "❌ Error: boom"
        );
    }
}
