//! Configuration for the Plasma network client.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Every section is `#[serde(default)]`, so older files keep
//! loading when new fields appear.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE_NAME, Config, DebugConfig, NetworkConfig, SessionConfig, VoiceConfig};
pub use error::ConfigError;
