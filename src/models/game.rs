use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OBS scene a game is associated with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsScene {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A launchable game as persisted in `Launcher.yaml`.
///
/// Games are looked up by `name`, which is unique within a [`GameLibrary`].
/// `process_name` is the image name the game shows up as in the OS process
/// table once it is running (e.g. `Game.exe`); it is what the agent attaches to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDefinition {
    /// Steam app id, used when no executable path is configured
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub process_name: String,
    /// Agent script path, empty when the game has no agent script
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub scene: ObsScene,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub run_agent: bool,
    #[serde(default)]
    pub run_textractor: bool,
}

impl GameDefinition {
    /// Directory the executable should be started from, if launching directly.
    pub fn working_dir(&self) -> Option<&Utf8Path> {
        self.executable_path
            .as_deref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_str().is_empty())
    }
}

/// Paths to the external tools the launcher drives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherPaths {
    pub steam_path: Utf8PathBuf,
    pub agent_path: Utf8PathBuf,
    pub agent_scripts_path: Utf8PathBuf,
    pub textractor_path: Utf8PathBuf,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LibraryError {
    #[error("A game named {0} already exists")]
    DuplicateName(String),

    #[error("Game {0} not found")]
    NotFound(String),
}

/// Insertion-ordered collection of games keyed by unique name.
#[derive(Debug, Clone, Default)]
pub struct GameLibrary {
    games: IndexMap<String, GameDefinition>,
    pub launch_on_start: Option<String>,
    pub last_game_launched: Option<String>,
}

impl GameLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a library from a persisted list, keeping the first entry when
    /// names collide.
    pub fn from_games(games: Vec<GameDefinition>) -> Self {
        let mut library = Self::new();
        for game in games {
            if let Err(e) = library.add(game) {
                tracing::warn!("Skipping game from config: {}", e);
            }
        }
        library
    }

    pub fn add(&mut self, game: GameDefinition) -> Result<(), LibraryError> {
        if self.games.contains_key(&game.name) {
            return Err(LibraryError::DuplicateName(game.name));
        }
        self.games.insert(game.name.clone(), game);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<GameDefinition, LibraryError> {
        self.games
            .shift_remove(name)
            .ok_or_else(|| LibraryError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&GameDefinition> {
        self.games.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameDefinition> {
        self.games.values()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Flatten back into the persisted list form.
    pub fn to_games(&self) -> Vec<GameDefinition> {
        self.games.values().cloned().collect()
    }
}
