//! deckbridge desktop host entry point.
//!
//! Loads the configuration, wires the reference media engine, the sync engine
//! and the mediator together, and runs the text console until `quit` or Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! deckbridge [OPTIONS] [FILES]...
//!
//! Options:
//!   --port <PORT>            Serial port to connect to at startup
//!   --config <PATH>          Config file [env: DECKBRIDGE_CONFIG]
//!   --log-level <LEVEL>      error|warn|info|debug|trace [env: DECKBRIDGE_LOG]
//!   --bpm <BPM>              Beat pulse tempo
//!   --no-beat                Do not send beat pulses
//! ```
//!
//! # Log level precedence
//!
//! `RUST_LOG` wins when set.  Otherwise `--log-level`, then the config file's
//! `app.log_level`.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  ├─ load_config()                 -- TOML, defaults when absent
//!  ├─ SyncEngine::new(SerialPortDriver)
//!  ├─ ControllerMediator::new(PlaylistPlayer, engine)
//!  └─ run_console()                 -- stdin commands, UiEvent output
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deckbridge_host::application::mediator::ControllerMediator;
use deckbridge_host::application::sync_engine::SyncEngine;
use deckbridge_host::infrastructure::console::{run_console, spawn_stdin_reader};
use deckbridge_host::infrastructure::media::PlaylistPlayer;
use deckbridge_host::infrastructure::serial::serialport_driver::SerialPortDriver;
use deckbridge_host::infrastructure::storage::config::{load_config, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Mirrors desktop playback onto a serial-attached control deck.
#[derive(Debug, Parser)]
#[command(
    name = "deckbridge",
    about = "Keeps a serial control deck in sync with desktop playback",
    version
)]
struct Cli {
    /// Serial port to connect to at startup (overrides `serial.port`).
    #[arg(long, env = "DECKBRIDGE_PORT")]
    port: Option<String>,

    /// Path to the TOML config file.
    ///
    /// Defaults to `deckbridge/config.toml` in the platform config directory.
    #[arg(long, env = "DECKBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when `RUST_LOG` is not set (overrides `app.log_level`).
    #[arg(long, env = "DECKBRIDGE_LOG")]
    log_level: Option<String>,

    /// Beat pulse tempo in beats per minute (overrides `playback.bpm`).
    #[arg(long)]
    bpm: Option<u32>,

    /// Disable the beat pulse.
    #[arg(long)]
    no_beat: bool,

    /// Audio files to enqueue at startup.
    files: Vec<PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(level) = &self.log_level {
            config.app.log_level = level.clone();
        }
        if let Some(bpm) = self.bpm {
            config.playback.bpm = bpm;
        }
        if self.no_beat {
            config.playback.beat_enabled = false;
        }
    }
}

/// Builds the log filter: `RUST_LOG` when set and valid, else `level`.
fn log_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // The config decides the log level, so it is loaded before logging is up.
    let mut config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_to(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.app.log_level))
        .init();

    info!("deckbridge starting");

    // ── Wiring ────────────────────────────────────────────────────────────────
    let (engine, engine_events) = SyncEngine::new(
        Arc::new(SerialPortDriver::new()),
        config.serial.link_settings(),
        config.sync.timing(),
    );
    let player = PlaylistPlayer::new(config.playback.player_settings());
    let (mediator, ui_events) = ControllerMediator::new(
        Box::new(player),
        engine,
        engine_events,
        config.playback.mediator_settings(),
    );

    if !cli.files.is_empty() {
        mediator.add_tracks(cli.files.clone()).await;
    }

    if let Some(port) = &config.serial.port {
        if let Err(e) = mediator.connect(port).await {
            warn!(port = %port, error = %e, "auto-connect failed");
        }
    }

    // ── Console until quit or Ctrl+C ──────────────────────────────────────────
    let lines = spawn_stdin_reader();
    let mut stdout = std::io::stdout();
    tokio::select! {
        result = run_console(Arc::clone(&mediator), lines, ui_events, &mut stdout) => {
            result.context("console output failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("received Ctrl+C; shutting down"),
                Err(e) => warn!("failed to listen for Ctrl+C: {e}"),
            }
        }
    }

    mediator.shutdown().await;
    info!("deckbridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        // Arrange
        let cli = Cli::parse_from(["deckbridge"]);
        let mut config = AppConfig::default();

        // Act
        cli.apply_to(&mut config);

        // Assert
        assert_eq!(config, AppConfig::default());
        assert!(cli.files.is_empty());
    }

    #[test]
    fn test_cli_port_overrides_config() {
        let cli = Cli::parse_from(["deckbridge", "--port", "/dev/ttyACM0"]);
        let mut config = AppConfig::default();
        config.serial.port = Some("COM3".to_string());

        cli.apply_to(&mut config);

        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_cli_bpm_and_no_beat() {
        let cli = Cli::parse_from(["deckbridge", "--bpm", "90", "--no-beat"]);
        let mut config = AppConfig::default();

        cli.apply_to(&mut config);

        assert_eq!(config.playback.bpm, 90);
        assert!(!config.playback.beat_enabled);
    }

    #[test]
    fn test_cli_positional_files() {
        let cli = Cli::parse_from(["deckbridge", "a.mp3", "b.wav"]);
        assert_eq!(cli.files, vec![PathBuf::from("a.mp3"), PathBuf::from("b.wav")]);
    }

    #[test]
    fn test_cli_log_level_override() {
        let cli = Cli::parse_from(["deckbridge", "--log-level", "debug"]);
        let mut config = AppConfig::default();

        cli.apply_to(&mut config);

        assert_eq!(config.app.log_level, "debug");
    }

    #[test]
    fn test_cli_config_path() {
        let cli = Cli::parse_from(["deckbridge", "--config", "/tmp/deck.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/deck.toml")));
    }
}
