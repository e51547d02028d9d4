//! Infrastructure layer for the desktop host.
//!
//! Contains the OS-facing adapters: the serial port, the reference media
//! engine, configuration file loading, and the text console.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `deckbridge_core`.  The application layer reaches into it only for the
//! serial types it is generic over (`SerialDriver`, `LinkState`), never for
//! the console or concrete adapters.

pub mod console;
pub mod media;
pub mod serial;
pub mod storage;
