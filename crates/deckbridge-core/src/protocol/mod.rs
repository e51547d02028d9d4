//! Protocol module containing the command alphabet and the byte codec.

pub mod codec;
pub mod commands;

pub use codec::{decode, decode_all, encode_all, encode_command};
pub use commands::*;
