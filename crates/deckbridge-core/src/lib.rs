//! # deckbridge-core
//!
//! Shared library for deckbridge containing the single-byte peripheral
//! protocol, the playback/shadow state model, the reconciliation planner and
//! the playlist domain type.
//!
//! It has zero dependencies on OS APIs, serial ports, async runtimes or UI
//! code, so every rule in here can be unit-tested in isolation.
//!
//! # Architecture overview (for beginners)
//!
//! deckbridge plays audio on a desktop and mirrors the playback state onto a
//! small microcontroller ("the peripheral") wired to a serial port.  The
//! peripheral shows the current track number, the number of tracks and a
//! play/pause LED, and has buttons that send commands back.
//!
//! The peripheral cannot be queried and understands only one-byte commands
//! such as "total tracks + 1" or "cursor forward".  The desktop therefore keeps
//! a *shadow* copy of what it believes the peripheral displays and, whenever
//! its own state changes, sends the shortest byte sequence that walks the
//! shadow to the new state.
//!
//! - **`protocol`** – The byte alphabet and the (stateless) mapping between
//!   bytes and typed commands/events.
//!
//! - **`domain`** – Playback state, the shadow, the pure reconciliation
//!   planner, and the playlist with its cursor rules.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deckbridge_core::TrackState` instead of `deckbridge_core::domain::playback::TrackState`.
pub use domain::playback::{PlaybackState, ShadowState, StateError, TrackDirection, TrackState};
pub use domain::playlist::{is_supported_audio, Playlist, RemovalEffect, Track, TrackId};
pub use domain::reconcile::{plan_reconciliation, plan_track_change, ReconcilePlan};
pub use protocol::codec::{decode, decode_all, encode_all, encode_command};
pub use protocol::commands::{InboundEvent, OutboundCommand, UnknownCommandByte};
