use crate::core::models::{DataPath, validate_base_url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::time::Duration;

/// Top-level configuration stored in `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub ui: UiPreferences,
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            batch: BatchSettings::default(),
            ui: UiPreferences::default(),
            version: 1,
        }
    }
}

/// Where the collections service lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Timing parameters of the batch operation controller.
///
/// `ms_per_item` is a client-side estimate used only to simulate progress for
/// add operations; it is not measured from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_ms_per_item")]
    pub ms_per_item: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_completed_display_ms")]
    pub completed_display_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            ms_per_item: default_ms_per_item(),
            tick_interval_ms: default_tick_interval_ms(),
            completed_display_ms: default_completed_display_ms(),
        }
    }
}

impl BatchSettings {
    pub fn estimated_per_item(&self) -> Duration {
        Duration::from_millis(self.ms_per_item)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn completed_display(&self) -> Duration {
        Duration::from_millis(self.completed_display_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPreferences {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

pub const MAX_PAGE_SIZE: u32 = 500;

fn default_version() -> u32 {
    1
}
fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_ms_per_item() -> u64 {
    100
}
fn default_tick_interval_ms() -> u64 {
    100
}
fn default_completed_display_ms() -> u64 {
    2000
}
fn default_page_size() -> u32 {
    25
}

/// Keys accepted by `config get` / `config set`
pub const CONFIG_KEYS: &[&str] = &[
    "server.base_url",
    "server.timeout_secs",
    "batch.ms_per_item",
    "batch.tick_interval_ms",
    "batch.completed_display_ms",
    "ui.page_size",
];

pub struct ConfigService;

impl ConfigService {
    /// Load the configuration, writing a default file on first use
    pub fn load_config(data_path: &DataPath) -> io::Result<AppConfig> {
        let config_path = data_path.config_path();
        if !config_path.exists() {
            let config = AppConfig::default();
            Self::save_config(&config, data_path)?;
            log::info!("Created default configuration at {}", config_path.display());
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid config format in {}: {e}", config_path.display()),
            )
        })?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn save_config(config: &AppConfig, data_path: &DataPath) -> io::Result<()> {
        let config_path = data_path.config_path();
        let toml_content = toml::to_string_pretty(config).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize config: {e}"),
            )
        })?;

        fs::create_dir_all(&data_path.root)?;
        fs::write(&config_path, toml_content)?;
        log::info!("Saved configuration to {}", config_path.display());
        Ok(())
    }

    pub fn validate(config: &AppConfig) -> io::Result<()> {
        validate_base_url(&config.server.base_url)?;

        if config.ui.page_size == 0 || config.ui.page_size > MAX_PAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("ui.page_size must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        if config.batch.tick_interval_ms == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "batch.tick_interval_ms must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn get_value(config: &AppConfig, key: &str) -> io::Result<String> {
        let value = match key {
            "server.base_url" => config.server.base_url.clone(),
            "server.timeout_secs" => config.server.timeout_secs.to_string(),
            "batch.ms_per_item" => config.batch.ms_per_item.to_string(),
            "batch.tick_interval_ms" => config.batch.tick_interval_ms.to_string(),
            "batch.completed_display_ms" => config.batch.completed_display_ms.to_string(),
            "ui.page_size" => config.ui.page_size.to_string(),
            _ => return Err(unknown_key(key)),
        };
        Ok(value)
    }

    /// Apply a single `key = value` update and validate the result
    pub fn set_value(config: &mut AppConfig, key: &str, value: &str) -> io::Result<()> {
        let mut updated = config.clone();
        match key {
            "server.base_url" => {
                validate_base_url(value)?;
                updated.server.base_url = value.trim_end_matches('/').to_string();
            }
            "server.timeout_secs" => updated.server.timeout_secs = parse_number(key, value)?,
            "batch.ms_per_item" => updated.batch.ms_per_item = parse_number(key, value)?,
            "batch.tick_interval_ms" => updated.batch.tick_interval_ms = parse_number(key, value)?,
            "batch.completed_display_ms" => {
                updated.batch.completed_display_ms = parse_number(key, value)?
            }
            "ui.page_size" => updated.ui.page_size = parse_number(key, value)?,
            _ => return Err(unknown_key(key)),
        }
        Self::validate(&updated)?;
        *config = updated;
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> io::Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{key} expects a non-negative number, got '{value}'"),
        )
    })
}

fn unknown_key(key: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("Unknown key: {key} (known keys: {})", CONFIG_KEYS.join(", ")),
    )
}
