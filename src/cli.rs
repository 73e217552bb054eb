//! Command line overrides layered on top of `uplink.toml`.

use crate::config::UplinkConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sensor-uplink",
    version,
    about = "Reads gas/flame telemetry from a serial link and uploads a risk verdict on a fixed cadence"
)]
pub struct Cli {
    /// Path to uplink.toml (default: config/uplink.toml, then ../config/uplink.toml)
    #[arg(short, long, env = "UPLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Replay telemetry lines from a file instead of the serial port ("-" for stdin)
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Log each upload instead of sending it
    #[arg(long)]
    pub dry_run: bool,

    /// Debug-level logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn apply(&self, config: &mut UplinkConfig) {
        if let Some(replay) = &self.replay {
            config.serial.replay_file = Some(replay.clone());
        }
        if self.dry_run {
            config.publish.dry_run = true;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}
