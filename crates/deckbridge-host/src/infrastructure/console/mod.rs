//! Line-oriented console front-end.
//!
//! Reads commands from stdin, hands them to the [`ControllerMediator`] and
//! prints [`UiEvent`]s as they arrive.  It is the only consumer of this module;
//! the application layer must not import it.
//!
//! # Command set
//!
//! | Command            | Effect                                   |
//! |--------------------|------------------------------------------|
//! | `ports`            | list serial ports                        |
//! | `connect <port>`   | open the link and send the current state |
//! | `disconnect`       | pause and close the link                 |
//! | `add <files…>`     | enqueue audio files                      |
//! | `remove <n>`       | remove track *n* (1-based)               |
//! | `clear`            | empty the playlist                       |
//! | `select <n>`       | make track *n* current                   |
//! | `play` / `pause`   |                                          |
//! | `next` / `prev`    |                                          |
//! | `seek <0-100>`     | seek to a percentage of the track        |
//! | `volume <0-100>`   |                                          |
//! | `status`           | link, shadow and playback summary        |
//! | `help` / `quit`    |                                          |

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::mediator::{ControllerMediator, StatusSnapshot, UiEvent};
use crate::infrastructure::serial::LinkState;

pub const HELP: &str = "\
commands:
  ports                 list serial ports
  connect <port>        connect to the peripheral
  disconnect            pause playback and disconnect
  add <files...>        add .mp3/.wav/.m4a files
  remove <n>            remove track n
  clear                 remove all tracks
  select <n>            select track n
  play | pause | next | prev
  seek <0-100>          seek to a percentage of the track
  volume <0-100>        set the volume
  status                show link and playback state
  help | quit";

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Ports,
    Connect(String),
    Disconnect,
    Add(Vec<PathBuf>),
    /// 0-based index.
    Remove(usize),
    Clear,
    /// 0-based index.
    Select(usize),
    Play,
    Pause,
    Next,
    Prev,
    Seek(u8),
    Volume(u8),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{command}' needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("'{value}' is not {expected}")]
    InvalidArgument {
        value: String,
        expected: &'static str,
    },
}

/// Parses a 1-based track number into a 0-based index.
fn parse_track_number(
    command: &'static str,
    arg: Option<&str>,
) -> Result<usize, ParseCommandError> {
    const EXPECTED: &str = "a track number (1 or more)";
    let arg = arg.ok_or(ParseCommandError::MissingArgument {
        command,
        expected: EXPECTED,
    })?;
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(ParseCommandError::InvalidArgument {
            value: arg.to_string(),
            expected: EXPECTED,
        }),
    }
}

fn parse_percent(command: &'static str, arg: Option<&str>) -> Result<u8, ParseCommandError> {
    const EXPECTED: &str = "a number from 0 to 100";
    let arg = arg.ok_or(ParseCommandError::MissingArgument {
        command,
        expected: EXPECTED,
    })?;
    match arg.parse::<u8>() {
        Ok(n) if n <= 100 => Ok(n),
        _ => Err(ParseCommandError::InvalidArgument {
            value: arg.to_string(),
            expected: EXPECTED,
        }),
    }
}

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseCommandError::Empty);
        };
        let command = match verb.to_ascii_lowercase().as_str() {
            "ports" => ConsoleCommand::Ports,
            "connect" => {
                let port = words.next().ok_or(ParseCommandError::MissingArgument {
                    command: "connect",
                    expected: "a port name",
                })?;
                ConsoleCommand::Connect(port.to_string())
            }
            "disconnect" => ConsoleCommand::Disconnect,
            "add" => {
                let files: Vec<PathBuf> = words.by_ref().map(PathBuf::from).collect();
                if files.is_empty() {
                    return Err(ParseCommandError::MissingArgument {
                        command: "add",
                        expected: "at least one file",
                    });
                }
                ConsoleCommand::Add(files)
            }
            "remove" | "rm" => ConsoleCommand::Remove(parse_track_number("remove", words.next())?),
            "clear" => ConsoleCommand::Clear,
            "select" => ConsoleCommand::Select(parse_track_number("select", words.next())?),
            "play" => ConsoleCommand::Play,
            "pause" => ConsoleCommand::Pause,
            "next" => ConsoleCommand::Next,
            "prev" | "previous" => ConsoleCommand::Prev,
            "seek" => ConsoleCommand::Seek(parse_percent("seek", words.next())?),
            "volume" | "vol" => ConsoleCommand::Volume(parse_percent("volume", words.next())?),
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Runs one command.  Returns text to print directly; everything else shows
/// up through the UI event stream.
pub async fn execute(mediator: &ControllerMediator, command: ConsoleCommand) -> Option<String> {
    // Failed mediator calls publish their own status line, so their errors
    // are not printed again here.
    match command {
        ConsoleCommand::Ports => {
            let ports = mediator.list_ports();
            if ports.is_empty() {
                Some("no serial ports found".to_string())
            } else {
                Some(ports.join("\n"))
            }
        }
        ConsoleCommand::Connect(port) => {
            let _ = mediator.connect(&port).await;
            None
        }
        ConsoleCommand::Disconnect => {
            mediator.disconnect().await;
            None
        }
        ConsoleCommand::Add(files) => {
            let added = mediator.add_tracks(files).await;
            Some(format!("added {added} track(s)"))
        }
        ConsoleCommand::Remove(index) => {
            let _ = mediator.remove_track(index).await;
            None
        }
        ConsoleCommand::Clear => {
            mediator.clear_playlist().await;
            None
        }
        ConsoleCommand::Select(index) => {
            let _ = mediator.select_track(index).await;
            None
        }
        ConsoleCommand::Play => {
            mediator.play().await;
            None
        }
        ConsoleCommand::Pause => {
            mediator.pause().await;
            None
        }
        ConsoleCommand::Next => {
            mediator.next_track().await;
            None
        }
        ConsoleCommand::Prev => {
            mediator.prev_track().await;
            None
        }
        ConsoleCommand::Seek(percent) => {
            mediator.seek_percent(percent).await;
            None
        }
        ConsoleCommand::Volume(volume) => {
            mediator.set_volume(volume).await;
            None
        }
        ConsoleCommand::Status => Some(render_status(&mediator.status().await)),
        ConsoleCommand::Help => Some(HELP.to_string()),
        // The loop handles quitting.
        ConsoleCommand::Quit => None,
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn format_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Renders a UI event as console text.  High-frequency events render as `None`.
pub fn render(event: &UiEvent) -> Option<String> {
    match event {
        UiEvent::Status(text) => Some(format!("* {text}")),
        UiEvent::Connection(true) => Some("[connected]".to_string()),
        UiEvent::Connection(false) => Some("[disconnected]".to_string()),
        UiEvent::Playlist { names, current } => {
            if names.is_empty() {
                return Some("playlist is empty".to_string());
            }
            let mut out = String::from("playlist:");
            for (i, name) in names.iter().enumerate() {
                let marker = if Some(i) == *current { '>' } else { ' ' };
                let _ = write!(out, "\n {marker} {:>2}. {name}", i + 1);
            }
            Some(out)
        }
        UiEvent::TrackInfo { name, number, total } => {
            if *total == 0 {
                Some("no track loaded".to_string())
            } else {
                Some(format!("track {number}/{total}: {name}"))
            }
        }
        UiEvent::PlayState(true) => Some("playing".to_string()),
        UiEvent::PlayState(false) => Some("paused".to_string()),
        UiEvent::Volume(volume) => Some(format!("volume {volume}")),
        UiEvent::Time { .. } | UiEvent::TimeSync(_) | UiEvent::SeekPosition(_) => None,
    }
}

pub fn render_status(status: &StatusSnapshot) -> String {
    let link = match &status.link {
        LinkState::Closed => "closed".to_string(),
        LinkState::Open { port } => format!("open on {port}"),
        LinkState::Lost { reason } => format!("lost ({reason})"),
    };
    let track = match &status.track_name {
        Some(name) => format!(
            "{name} {} / {}",
            format_time(status.position),
            format_time(status.duration)
        ),
        None => "none".to_string(),
    };
    format!(
        "link:       {link}\nperipheral: {}\ntrack:      {track}\nvolume:     {}",
        status.shadow, status.volume
    )
}

// ── Loop ──────────────────────────────────────────────────────────────────────

/// Reads stdin lines on a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it lives on its own OS
/// thread rather than in the runtime; shutdown never waits for it.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start stdin reader; console input disabled");
    }
    rx
}

/// Runs the console until `quit`, end of input, or the UI channel closes.
///
/// # Errors
///
/// Returns the I/O error if writing to `out` fails.
pub async fn run_console<W: Write>(
    mediator: Arc<ControllerMediator>,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut ui_events: mpsc::UnboundedReceiver<UiEvent>,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "deckbridge ready; type 'help' for commands")?;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    debug!("console input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(command) => {
                        if let Some(text) = execute(&mediator, command).await {
                            writeln!(out, "{text}")?;
                        }
                    }
                    Err(e) => writeln!(out, "{e}")?,
                }
            }
            event = ui_events.recv() => {
                let Some(event) = event else { break };
                if let Some(text) = render(&event) {
                    writeln!(out, "{text}")?;
                }
            }
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckbridge_core::ShadowState;

    #[test]
    fn test_parse_track_numbers_are_one_based() {
        assert_eq!("select 3".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Select(2)));
        assert_eq!("rm 1".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Remove(0)));
        assert_eq!(
            "select 0".parse::<ConsoleCommand>(),
            Err(ParseCommandError::InvalidArgument {
                value: "0".to_string(),
                expected: "a track number (1 or more)",
            })
        );
    }

    #[test]
    fn test_parse_add_collects_all_files() {
        let parsed: ConsoleCommand = "add a.mp3 b.wav".parse().unwrap();
        assert_eq!(
            parsed,
            ConsoleCommand::Add(vec![PathBuf::from("a.mp3"), PathBuf::from("b.wav")])
        );
    }

    #[test]
    fn test_parse_rejects_missing_and_out_of_range_arguments() {
        assert!(matches!(
            "connect".parse::<ConsoleCommand>(),
            Err(ParseCommandError::MissingArgument { command: "connect", .. })
        ));
        assert!(matches!(
            "seek 101".parse::<ConsoleCommand>(),
            Err(ParseCommandError::InvalidArgument { .. })
        ));
        assert_eq!(
            "dance".parse::<ConsoleCommand>(),
            Err(ParseCommandError::Unknown("dance".to_string()))
        );
        assert_eq!("   ".parse::<ConsoleCommand>(), Err(ParseCommandError::Empty));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("PLAY".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Play));
        assert_eq!("Volume 40".parse::<ConsoleCommand>(), Ok(ConsoleCommand::Volume(40)));
    }

    #[test]
    fn test_render_playlist_marks_current() {
        let event = UiEvent::Playlist {
            names: vec!["a.mp3".into(), "b.mp3".into()],
            current: Some(1),
        };

        let text = render(&event).unwrap();

        assert_eq!(text, "playlist:\n    1. a.mp3\n >  2. b.mp3");
    }

    #[test]
    fn test_render_skips_high_frequency_events() {
        assert_eq!(render(&UiEvent::TimeSync(12)), None);
        assert_eq!(render(&UiEvent::SeekPosition(40)), None);
        assert_eq!(
            render(&UiEvent::TrackInfo {
                name: String::new(),
                number: 0,
                total: 0
            }),
            Some("no track loaded".to_string())
        );
    }

    #[test]
    fn test_render_status() {
        let status = StatusSnapshot {
            link: LinkState::Open {
                port: "COM3".to_string(),
            },
            shadow: ShadowState {
                current: 2,
                total: 4,
                playing: true,
            },
            playback: None,
            track_name: Some("b.mp3".to_string()),
            position: 75.0,
            duration: 180.0,
            volume: 50,
        };

        let text = render_status(&status);

        assert!(text.contains("open on COM3"));
        assert!(text.contains("2/4 playing"));
        assert!(text.contains("b.mp3 1:15 / 3:00"));
    }
}
