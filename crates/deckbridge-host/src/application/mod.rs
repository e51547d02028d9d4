//! Application layer for the desktop host.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (pure rules in `deckbridge_core`) and the infrastructure (serial ports,
//! audio files, the terminal).
//!
//! Code in this layer:
//!
//! - **Orchestrates** domain objects to fulfil a user goal (e.g., "skip to the
//!   next track and make the peripheral show it").
//! - **Depends on abstractions** ([`media::MediaEngine`],
//!   [`crate::infrastructure::serial::SerialDriver`]) so tests can swap in mocks.
//!
//! # Sub-modules
//!
//! - **`media`**       – The playback seam: the trait the mediator drives and
//!   the events it gets back.
//! - **`sync_engine`** – Owns the serial link and the shadow state; turns target
//!   states into byte sequences and inbound bytes into intents.
//! - **`mediator`**    – Connects UI commands, playback and the sync engine.
//! - **`timers`**      – The beat pulse and the 1 Hz playback clock.

pub mod media;
pub mod mediator;
pub mod sync_engine;
pub mod timers;
