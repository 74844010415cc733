//! Configuration module for savewatch.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.savewatch/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SAVEWATCH_` and use double
//! underscores to separate nested levels:
//! - `SAVEWATCH_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `SAVEWATCH_SCAN__RETRY_BACKOFF_MS=1000` sets `scan.retry_backoff_ms`
//! - `SAVEWATCH_GAMES__MY_GAMES_ROOT=/data/My Games` sets `games.my_games_root`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::games::default_my_games_root;
use crate::host::ProfileState;
use crate::scanner::RetryPolicy;

const CONFIG_DIR: &str = ".savewatch";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "SAVEWATCH_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Game directory settings
    #[serde(default)]
    pub games: GamesConfig,

    /// Save directory scanning
    #[serde(default)]
    pub scan: ScanConfig,

    /// Live directory watching
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Profiles by id
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GamesConfig {
    /// Root of the per-game "My Games" folders.
    /// Defaults to `<Documents>/My Games`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_games_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanConfig {
    /// Wait before retrying a save the game still has locked
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Retries after a locked failure
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatchConfig {
    /// Quiet period before a burst of changes triggers a rescan
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProfileConfig {
    /// Game id, see `savewatch games`
    pub game: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Keep this profile's saves in `Saves\<profile id>\`
    #[serde(default = "default_false")]
    pub local_saves: bool,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_lock_retries() -> u32 {
    1
}
fn default_debounce_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_false() -> bool {
    false
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            games: GamesConfig::default(),
            scan: ScanConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
            lock_retries: default_lock_retries(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl ScanConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.lock_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));

        Self::figment(&config_path).extract().map_err(Box::new)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Find `.savewatch/settings.toml`, searching from the current directory up
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Effective "My Games" root.
    pub fn my_games_root(&self) -> Option<PathBuf> {
        self.games
            .my_games_root
            .clone()
            .or_else(default_my_games_root)
    }

    /// Profiles in the shape the host store expects.
    pub fn profile_states(&self) -> Vec<ProfileState> {
        self.profiles
            .iter()
            .map(|(id, profile)| ProfileState {
                id: id.clone(),
                name: profile.name.clone().unwrap_or_else(|| id.clone()),
                game_id: profile.game.clone(),
                local_saves: profile.local_saves,
            })
            .collect()
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let mut settings = Settings::default();
        settings.profiles.insert(
            "default".to_string(),
            ProfileConfig {
                game: "skyrimse".to_string(),
                name: Some("Default".to_string()),
                local_saves: false,
            },
        );
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.scan.retry_backoff_ms, 500);
        assert_eq!(settings.scan.lock_retries, 1);
        assert_eq!(settings.watch.debounce_ms, 1000);
        assert_eq!(settings.logging.default, "warn");
        assert!(settings.profiles.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
[games]
my_games_root = "/data/My Games"

[watch]
debounce_ms = 250

[profiles.survival]
game = "skyrimse"
local_saves = true

[profiles.vanilla]
game = "fallout4"
name = "Vanilla"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.watch.debounce_ms, 250);
        assert_eq!(settings.scan.retry_backoff_ms, 500);
        assert_eq!(
            settings.my_games_root(),
            Some(PathBuf::from("/data/My Games"))
        );

        let profiles = settings.profile_states();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].id, "survival");
        assert_eq!(profiles[0].name, "survival");
        assert!(profiles[0].local_saves);
        assert_eq!(profiles[1].name, "Vanilla");
        assert!(!profiles[1].local_saves);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.scan.lock_retries = 3;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.scan.lock_retries, 3);
        assert_eq!(loaded.watch, settings.watch);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = ScanConfig::default().retry_policy();
        assert_eq!(policy.retries, 1);
        assert_eq!(policy.backoff, Duration::from_millis(500));
    }
}
