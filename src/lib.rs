// GSM Coordinator - launch and session coordination for external helper processes
//
// This is the library crate containing the core logic and data structures.
// The binary crate (main.rs) wires it to the real OS and a terminal.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, CoordinatorSettings};
pub use metrics::Metrics;
pub use models::{GameDefinition, GameLibrary, OcrSettings, SessionMode, SessionState};
pub use state::{ConsoleHandle, OcrSessionController, SessionChange};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
