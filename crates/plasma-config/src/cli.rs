//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Network client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "plasma-netcli", about = "Headless Plasma network client")]
pub struct CliArgs {
    /// Game server address.
    #[arg(long)]
    pub server: Option<String>,

    /// Game server port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Maximum number of members to listen to (-1 for unbounded).
    #[arg(long, allow_hyphen_values = true)]
    pub max_listeners: Option<i32>,

    /// Maximum voice listening distance.
    #[arg(long)]
    pub listen_distance: Option<f32>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(max) = args.max_listeners {
            self.voice.max_list_size = max;
        }
        if let Some(dist) = args.listen_distance {
            self.voice.max_listen_distance = dist;
        }
    }
}
