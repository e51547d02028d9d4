//! Storage infrastructure: configuration file loading.
//!
//! The `config` sub-module reads the TOML configuration file from the
//! platform-appropriate directory (or an explicit path) and falls back to
//! defaults when the file does not exist yet.  It also converts the file's
//! plain numbers into the runtime settings structs of the other layers.

pub mod config;
