//! The deckbridge command alphabet.
//!
//! Every command on the serial line is exactly one ASCII byte.  There is no
//! framing, no length prefix and no acknowledgement: the peripheral firmware
//! reads one byte and dispatches on it immediately.
//!
//! Some bytes travel in both directions (`P`, `S`, `N`, `B`), some only from
//! the peripheral to the desktop (`F`, `R`, `Q`) and some only from the desktop
//! to the peripheral (`T`, `D`, `C`, `V`, `b`).

use thiserror::Error;

// ── Alphabet ──────────────────────────────────────────────────────────────────

/// Start playback.  Sent by both ends.
pub const BYTE_PLAY: u8 = b'P';
/// Pause (or stop) playback.  Sent by both ends.
pub const BYTE_PAUSE: u8 = b'S';
/// Advance to the next track, wrapping to the first.  Sent by both ends.
pub const BYTE_NEXT: u8 = b'N';
/// Go back to the previous track, wrapping to the last.  Sent by both ends.
pub const BYTE_PREV: u8 = b'B';
/// Seek forward [`SEEK_STEP_SECS`] seconds.  Peripheral → desktop only.
pub const BYTE_SEEK_FORWARD: u8 = b'F';
/// Seek backward [`SEEK_STEP_SECS`] seconds.  Peripheral → desktop only.
pub const BYTE_SEEK_BACKWARD: u8 = b'R';
/// Ask the desktop to resend its full state.  Peripheral → desktop only.
pub const BYTE_STATUS_REQUEST: u8 = b'Q';
/// Increment the peripheral's total-track counter.  Desktop → peripheral only.
pub const BYTE_TOTAL_INCREMENT: u8 = b'T';
/// Decrement the peripheral's total-track counter.  Desktop → peripheral only.
pub const BYTE_TOTAL_DECREMENT: u8 = b'D';
/// Move the peripheral's cursor forward without a "next track" effect.
pub const BYTE_CURSOR_FORWARD: u8 = b'C';
/// Move the peripheral's cursor backward without a "previous track" effect.
pub const BYTE_CURSOR_BACKWARD: u8 = b'V';
/// Beat pulse for the peripheral's tempo LED.  Desktop → peripheral only.
pub const BYTE_BEAT: u8 = b'b';

/// Seconds covered by one `F` or `R` press on the peripheral.
pub const SEEK_STEP_SECS: i32 = 30;

// ── Outbound commands ─────────────────────────────────────────────────────────

/// A command the desktop sends to the peripheral.
///
/// The discriminant of each variant is its wire byte, so `cmd as u8` is the
/// encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OutboundCommand {
    Play = BYTE_PLAY,
    Pause = BYTE_PAUSE,
    NextTrack = BYTE_NEXT,
    PrevTrack = BYTE_PREV,
    TotalIncrement = BYTE_TOTAL_INCREMENT,
    TotalDecrement = BYTE_TOTAL_DECREMENT,
    CursorForward = BYTE_CURSOR_FORWARD,
    CursorBackward = BYTE_CURSOR_BACKWARD,
    Beat = BYTE_BEAT,
}

impl OutboundCommand {
    /// Returns `true` for the counter bumps `T`, `D`, `C` and `V`.
    ///
    /// The peripheral redraws its display after each of these, so the sync
    /// engine leaves a longer gap after them.
    pub fn is_counter_bump(self) -> bool {
        matches!(
            self,
            OutboundCommand::TotalIncrement
                | OutboundCommand::TotalDecrement
                | OutboundCommand::CursorForward
                | OutboundCommand::CursorBackward
        )
    }

    /// Returns `true` for the track-change shortcuts `N` and `B`.
    pub fn is_track_shortcut(self) -> bool {
        matches!(self, OutboundCommand::NextTrack | OutboundCommand::PrevTrack)
    }

    /// Short human-readable meaning, used in debug logs.
    pub fn describe(self) -> &'static str {
        match self {
            OutboundCommand::Play => "play",
            OutboundCommand::Pause => "pause",
            OutboundCommand::NextTrack => "next track",
            OutboundCommand::PrevTrack => "previous track",
            OutboundCommand::TotalIncrement => "total++",
            OutboundCommand::TotalDecrement => "total--",
            OutboundCommand::CursorForward => "cursor forward",
            OutboundCommand::CursorBackward => "cursor backward",
            OutboundCommand::Beat => "beat",
        }
    }
}

/// A byte that is not in the outbound alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("byte {0:#04x} is not an outbound command")]
pub struct UnknownCommandByte(pub u8);

impl TryFrom<u8> for OutboundCommand {
    type Error = UnknownCommandByte;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            BYTE_PLAY => Ok(OutboundCommand::Play),
            BYTE_PAUSE => Ok(OutboundCommand::Pause),
            BYTE_NEXT => Ok(OutboundCommand::NextTrack),
            BYTE_PREV => Ok(OutboundCommand::PrevTrack),
            BYTE_TOTAL_INCREMENT => Ok(OutboundCommand::TotalIncrement),
            BYTE_TOTAL_DECREMENT => Ok(OutboundCommand::TotalDecrement),
            BYTE_CURSOR_FORWARD => Ok(OutboundCommand::CursorForward),
            BYTE_CURSOR_BACKWARD => Ok(OutboundCommand::CursorBackward),
            BYTE_BEAT => Ok(OutboundCommand::Beat),
            other => Err(UnknownCommandByte(other)),
        }
    }
}

// ── Inbound events ────────────────────────────────────────────────────────────

/// A user intent received from the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEvent {
    Play,
    Pause,
    NextTrack,
    PrevTrack,
    /// Relative seek in seconds; positive is forward.
    SeekRelative(i32),
    StatusRequest,
    /// Any byte outside the inbound alphabet.  Logged and dropped.
    Unknown(u8),
}

impl InboundEvent {
    /// The byte the peripheral sends for this event.
    ///
    /// `SeekRelative` maps on its sign only (`F` for zero or forward, `R` for
    /// backward), since the wire always carries a fixed [`SEEK_STEP_SECS`] step.
    pub fn to_byte(self) -> u8 {
        match self {
            InboundEvent::Play => BYTE_PLAY,
            InboundEvent::Pause => BYTE_PAUSE,
            InboundEvent::NextTrack => BYTE_NEXT,
            InboundEvent::PrevTrack => BYTE_PREV,
            InboundEvent::SeekRelative(delta) if delta < 0 => BYTE_SEEK_BACKWARD,
            InboundEvent::SeekRelative(_) => BYTE_SEEK_FORWARD,
            InboundEvent::StatusRequest => BYTE_STATUS_REQUEST,
            InboundEvent::Unknown(byte) => byte,
        }
    }
}
