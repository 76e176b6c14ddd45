//! Data models for the coordinator.
//!
//! - [`GameDefinition`] / [`GameLibrary`]: launchable games keyed by unique name, loaded from `Launcher.yaml`
//! - [`LauncherPaths`]: Steam, agent and textractor executables
//! - [`OcrSettings`]: the canonical OCR configuration both settings profiles project from
//! - [`SessionState`] / [`SessionMode`]: belief state of the OCR backend and how it was started
//!
//! All persisted structs derive `Serialize`/`Deserialize` for YAML persistence.

pub mod game;
pub mod ocr_settings;
pub mod session;

pub use game::{GameDefinition, GameLibrary, LauncherPaths, LibraryError, ObsScene};
pub use ocr_settings::{
    DEFAULT_SCAN_RATE, DEFAULT_SECONDARY_ENGINE, OcrSettings, SharedSettings,
    platform_default_engine,
};
pub use session::{SessionMode, SessionState};
