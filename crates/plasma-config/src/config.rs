//! Client configuration with RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

const APP_NAME: &str = "plasma-net";

/// Top-level network client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection settings.
    pub network: NetworkConfig,
    /// Proximity voice routing.
    pub voice: VoiceConfig,
    /// Session behaviour (clock sampling, linking, screening).
    pub session: SessionConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Game server address.
    pub server_address: String,
    /// Game server port.
    pub server_port: u16,
    /// Timeout for individual network requests, in seconds.
    pub request_timeout_secs: u32,
    /// Largest frame accepted from the wire.
    pub max_frame_bytes: u32,
    /// Capacity of the inbound message channel.
    pub inbox_capacity: usize,
}

/// Proximity voice configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    /// Master switch for listen-list computation.
    pub enabled: bool,
    /// Maximum number of members to listen to. `-1` means unbounded.
    pub max_list_size: i32,
    /// Maximum distance at which a member can be heard (world units).
    pub max_listen_distance: f32,
    /// Seconds between listen-list recomputations.
    pub update_interval_secs: f64,
    /// Keep the talk list identical to the listen list.
    pub same_talk_and_listen: bool,
    /// Only consider members reachable peer-to-peer.
    pub peer_to_peer_only: bool,
    /// Send our own voice back to ourselves.
    pub echo: bool,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Minimum seconds between server clock samples.
    pub clock_sample_interval_secs: f64,
    /// Seconds an age join or leave may take before it counts as failed.
    pub link_timeout_secs: f64,
    /// Apply the message screener to inbound and outbound traffic.
    pub screen_messages: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 14617,
            request_timeout_secs: 10,
            max_frame_bytes: 1_048_576,
            inbox_capacity: 1024,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_list_size: 3,
            max_listen_distance: 75.0,
            update_interval_secs: 2.0,
            same_talk_and_listen: true,
            peer_to_peer_only: false,
            echo: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clock_sample_interval_secs: 5.0,
            link_timeout_secs: 10.0,
            screen_messages: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl VoiceConfig {
    /// Squared listen distance, the form the voice engine compares against.
    pub fn max_listen_distance_sq(&self) -> f32 {
        self.max_listen_distance * self.max_listen_distance
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for this application, if the OS exposes one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE_NAME), serialized)
            .map_err(ConfigError::WriteError)
    }

    /// Re-read the file. Returns `Some(new_config)` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE_NAME))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
