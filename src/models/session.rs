use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-side belief about the OCR backend.
///
/// `Stopped` and `Error` end a session; a new `start()` begins another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Scanning,
    Sleeping,
    Paused,
    Error,
    Stopped,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Error)
    }

    /// True while the backend is believed to be processing frames.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Scanning | SessionState::Sleeping)
    }

    /// States from which `start()` may begin a new session.
    pub fn can_start(self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::Stopped | SessionState::Error
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Scanning => "scanning",
            SessionState::Sleeping => "sleeping",
            SessionState::Paused => "paused",
            SessionState::Error => "error",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How the backend is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionMode {
    /// Continuous scanning at the configured scan rate
    #[default]
    Normal,
    /// Only recognise when the manual hotkey is pressed
    ScreenshotOnly,
}

impl SessionMode {
    pub fn is_manual(self) -> bool {
        self == SessionMode::ScreenshotOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_and_startable_states() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Error.is_terminal());
        assert!(!SessionState::Paused.is_terminal());

        assert!(SessionState::Idle.can_start());
        assert!(SessionState::Error.can_start());
        assert!(!SessionState::Scanning.can_start());
        assert!(!SessionState::Starting.can_start());
    }
}
