//! Domain entities for deckbridge.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies: no serial ports, no clocks, no async runtime.
//!
//! # Why keep this separate? (for beginners)
//!
//! The rules that decide *which* bytes to send ("the peripheral shows 4 of 5,
//! we want 3 of 3, so send D D V") are the part of the system most likely to
//! hide off-by-one mistakes.  Keeping them as plain functions over plain
//! structs means they can be tested exhaustively without opening a port or
//! waiting for a single timer.
//!
//! Code in outer layers (the host's sync engine and mediator) depends on the
//! domain, but the domain never depends on them.

/// Playback state, shadow state and the track-change direction.
pub mod playback;

/// Ordered track list with cursor rules.
pub mod playlist;

/// Pure planner that turns a shadow/target pair into a byte sequence.
pub mod reconcile;
