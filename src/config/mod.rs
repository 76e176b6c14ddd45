pub mod profile;
pub mod settings;

pub use profile::{
    AdvancedView, AppearanceSpeed, BasicView, ConfigProfileStore, ProfileEdits, ProfileView,
    SettingsMode, bucket,
};
pub use settings::CoordinatorSettings;

use crate::models::{GameDefinition, GameLibrary, LauncherPaths, OcrSettings};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;

/// Persisted launcher state: tool paths plus the game list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    #[serde(flatten)]
    pub paths: LauncherPaths,
    pub steam_games: Vec<GameDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_on_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_game_launched: Option<String>,
}

impl LauncherConfig {
    /// Build the in-memory library, dropping duplicate names.
    pub fn library(&self) -> GameLibrary {
        let mut library = GameLibrary::from_games(self.steam_games.clone());
        library.launch_on_start = self.launch_on_start.clone();
        library.last_game_launched = self.last_game_launched.clone();
        library
    }

    /// Replace the persisted game list with `library`.
    pub fn store_library(&mut self, library: &GameLibrary) {
        self.steam_games = library.to_games();
        self.launch_on_start = library.launch_on_start.clone();
        self.last_game_launched = library.last_game_launched.clone();
    }
}

/// Configuration manager for loading and saving YAML configuration files.
///
/// Manages two configuration files:
/// - Launcher config (`Launcher.yaml`): tool paths and games
/// - OCR settings (`OCR Settings.yaml`): the canonical OCR configuration
///
/// Coordinator timings live in a third, optional file read through
/// [`CoordinatorSettings::load`].
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    launcher_config_path: Utf8PathBuf,
    ocr_settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            launcher_config_path: config_dir.join("Launcher.yaml"),
            ocr_settings_path: config_dir.join("OCR Settings.yaml"),
            config_dir,
        })
    }

    /// Load the launcher configuration, or defaults if the file doesn't exist.
    pub fn load_launcher_config(&self) -> Result<LauncherConfig> {
        if !self.launcher_config_path.exists() {
            tracing::warn!(
                "Launcher config not found at {}, using defaults",
                self.launcher_config_path
            );
            return Ok(LauncherConfig::default());
        }

        let file_contents = fs::read_to_string(&self.launcher_config_path).with_context(|| {
            format!("Failed to read launcher config: {}", self.launcher_config_path)
        })?;

        let config: LauncherConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse launcher config: {}", self.launcher_config_path)
        })?;

        tracing::info!(
            "Loaded launcher config from {} ({} games)",
            self.launcher_config_path,
            config.steam_games.len()
        );
        Ok(config)
    }

    pub fn save_launcher_config(&self, config: &LauncherConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(config)
            .context("Failed to serialize launcher config to YAML")?;

        fs::write(&self.launcher_config_path, yaml_string).with_context(|| {
            format!("Failed to write launcher config: {}", self.launcher_config_path)
        })?;

        tracing::info!("Saved launcher config to {}", self.launcher_config_path);
        Ok(())
    }

    /// Load the OCR settings, or defaults if the file doesn't exist.
    pub fn load_ocr_settings(&self) -> Result<OcrSettings> {
        if !self.ocr_settings_path.exists() {
            tracing::warn!(
                "OCR settings not found at {}, using defaults",
                self.ocr_settings_path
            );
            return Ok(OcrSettings::default());
        }

        let file_contents = fs::read_to_string(&self.ocr_settings_path)
            .with_context(|| format!("Failed to read OCR settings: {}", self.ocr_settings_path))?;

        let settings: OcrSettings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse OCR settings: {}", self.ocr_settings_path))?;

        tracing::info!("Loaded OCR settings from {}", self.ocr_settings_path);
        Ok(settings)
    }

    pub fn save_ocr_settings(&self, settings: &OcrSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize OCR settings to YAML")?;

        fs::write(&self.ocr_settings_path, yaml_string)
            .with_context(|| format!("Failed to write OCR settings: {}", self.ocr_settings_path))?;

        tracing::info!("Saved OCR settings to {}", self.ocr_settings_path);
        Ok(())
    }

    /// Load layered coordinator settings for this directory.
    pub fn load_coordinator_settings(&self) -> Result<CoordinatorSettings> {
        CoordinatorSettings::load(&self.config_dir)
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}
