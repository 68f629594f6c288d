use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CompilerError;
use crate::version::GameVersion;

/// Settings for the `msci` command line, stored per environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub env_name: String,
    /// Syntax definition files, merged in this order.
    #[serde(default)]
    pub syntax_files: Vec<PathBuf>,
    #[serde(default = "default_game_version")]
    pub game_version: GameVersion,
}

fn default_game_version() -> GameVersion {
    GameVersion::TERRAN_CONFLICT
}

fn env_name() -> String {
    env::var("MSCI_ENV").unwrap_or_else(|_| String::from("default"))
}

fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    PathBuf::from(env::var(var).unwrap_or_else(|_| String::from(".")))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            env_name: env_name(),
            syntax_files: Vec::new(),
            game_version: default_game_version(),
        }
    }
}

impl Config {
    /// Load the configuration for the current environment, falling back to the
    /// defaults when there is none. `MSCI_SYNTAX` and `MSCI_GAME` override the file.
    pub fn load() -> Self {
        let config_path = Self::get_config_path();
        let config = if !config_path.exists() {
            Config::default()
        } else {
            match fs::read_to_string(&config_path) {
                Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                    warn!(path = %config_path.display(), error = %e, "ignoring unreadable config");
                    Config::default()
                }),
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "could not read config");
                    Config::default()
                }
            }
        };

        config.with_overrides(env::var_os("MSCI_SYNTAX"), env::var("MSCI_GAME").ok())
    }

    pub fn from_json(contents: &str) -> Result<Self, CompilerError> {
        serde_json::from_str(contents).map_err(|e| CompilerError::Config(e.to_string()))
    }

    /// Apply a platform path list of syntax files and a game version name.
    pub fn with_overrides(mut self, syntax: Option<OsString>, game: Option<String>) -> Self {
        if let Some(paths) = syntax {
            self.syntax_files = env::split_paths(&paths).collect();
        }
        if let Some(game) = game {
            match game.parse::<GameVersion>() {
                Ok(version) => self.game_version = version,
                Err(e) => warn!(value = %game, error = %e, "ignoring MSCI_GAME"),
            }
        }
        self
    }

    pub fn save(&self) -> Result<(), CompilerError> {
        let config_path = Self::get_config_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            serde_json::to_string_pretty(self).map_err(|e| CompilerError::Config(e.to_string()))?;
        fs::write(&config_path, contents)?;
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        home_dir().join(".msci").join(env_name()).join("config.json")
    }
}
