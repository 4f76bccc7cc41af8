// Configuration loading and parsing (draft.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::draft::engine::EngineSettings;
use crate::draft::scheduler::DEFAULT_AUTO_PICK_DELAY;
use crate::draft::state::{DEFAULT_MAX_TOTAL_ROUNDS, DEFAULT_TOTAL_ROUNDS};

/// Largest accepted auto-pick grace period.
pub const MAX_AUTO_PICK_DELAY_MS: u64 = 600_000;

const CONFIG_FILE: &str = "draft.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub draft: DraftConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    pub database: DatabaseConfig,
    pub data_paths: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub name: String,
    /// Rounds used when a start request carries no usable count.
    #[serde(default = "default_total_rounds")]
    pub total_rounds: u32,
    /// Largest round count an admin may request when starting.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    /// Grace period before an auto-pick fires, in milliseconds.
    #[serde(default = "default_auto_pick_delay_ms")]
    pub auto_pick_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    pub host: String,
    pub port: u16,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub participants: String,
    pub golfers: String,
}

fn default_total_rounds() -> u32 {
    DEFAULT_TOTAL_ROUNDS
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_TOTAL_ROUNDS
}

fn default_auto_pick_delay_ms() -> u64 {
    DEFAULT_AUTO_PICK_DELAY.as_millis() as u64
}

impl Config {
    pub fn auto_pick_delay(&self) -> Duration {
        Duration::from_millis(self.draft.auto_pick_delay_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            auto_pick_delay: self.auto_pick_delay(),
            default_total_rounds: self.draft.total_rounds,
            max_total_rounds: self.draft.max_rounds,
        }
    }

    /// `host:port` for the WebSocket listener.
    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.websocket.host, self.websocket.port)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/draft.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()` which does.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Never overwrites an existing
/// file and skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Load config relative to the current working directory, copying default
/// files first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.draft.total_rounds == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.total_rounds".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.draft.total_rounds > config.draft.max_rounds {
        return Err(ConfigError::ValidationError {
            field: "draft.max_rounds".into(),
            message: format!(
                "must be at least total_rounds ({}), got {}",
                config.draft.total_rounds, config.draft.max_rounds
            ),
        });
    }

    if config.draft.auto_pick_delay_ms > MAX_AUTO_PICK_DELAY_MS {
        return Err(ConfigError::ValidationError {
            field: "draft.auto_pick_delay_ms".into(),
            message: format!(
                "must be at most {MAX_AUTO_PICK_DELAY_MS}, got {}",
                config.draft.auto_pick_delay_ms
            ),
        });
    }

    let paths: &[(&str, &str)] = &[
        ("database.path", &config.database.path),
        ("data_paths.participants", &config.data_paths.participants),
        ("data_paths.golfers", &config.data_paths.golfers),
    ];
    for (name, value) in paths {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
