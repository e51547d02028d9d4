//! Byte codec for the deckbridge single-byte protocol.
//!
//! Both directions are total functions: every byte decodes to some
//! [`InboundEvent`] (unrecognised bytes become [`InboundEvent::Unknown`]) and
//! every [`OutboundCommand`] encodes to exactly one byte.  The codec keeps no
//! state between calls.

use crate::protocol::commands::*;

/// Decodes one byte received from the peripheral.
pub fn decode(byte: u8) -> InboundEvent {
    match byte {
        BYTE_PLAY => InboundEvent::Play,
        BYTE_PAUSE => InboundEvent::Pause,
        BYTE_NEXT => InboundEvent::NextTrack,
        BYTE_PREV => InboundEvent::PrevTrack,
        BYTE_SEEK_FORWARD => InboundEvent::SeekRelative(SEEK_STEP_SECS),
        BYTE_SEEK_BACKWARD => InboundEvent::SeekRelative(-SEEK_STEP_SECS),
        BYTE_STATUS_REQUEST => InboundEvent::StatusRequest,
        other => InboundEvent::Unknown(other),
    }
}

/// Decodes a chunk of bytes in arrival order.
///
/// The serial reader hands over whatever one read call returned, which may be
/// several commands pressed in quick succession.
pub fn decode_all(bytes: &[u8]) -> Vec<InboundEvent> {
    bytes.iter().copied().map(decode).collect()
}

/// Encodes one command for the peripheral.
pub fn encode_command(command: OutboundCommand) -> u8 {
    command as u8
}

/// Encodes a command sequence, preserving order.
pub fn encode_all(commands: &[OutboundCommand]) -> Vec<u8> {
    commands.iter().copied().map(encode_command).collect()
}
