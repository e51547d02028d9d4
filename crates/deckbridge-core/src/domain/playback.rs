//! Playback and shadow state.
//!
//! Two related but distinct triples live here:
//!
//! - [`TrackState`] is a *validated* `(current, total, playing)` triple with
//!   `1 <= current <= total`.  The desktop only ever asks the peripheral to
//!   display states of this shape.
//! - [`ShadowState`] is the desktop's belief of what the peripheral currently
//!   displays.  It is mutated one command at a time, so while a reconciliation
//!   pass is in flight it may briefly hold `current > total` (after a `D`
//!   and before the following `V`).

use thiserror::Error;

use crate::protocol::commands::OutboundCommand;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised when building a [`TrackState`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("current track {current} is outside 1..={total}")]
    CurrentOutOfRange { current: u16, total: u16 },

    #[error("track count {0} exceeds the peripheral counter range")]
    TooManyTracks(usize),
}

// ── TrackState ────────────────────────────────────────────────────────────────

/// A non-empty playback state: 1-based current track, track count and play flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackState {
    current: u16,
    total: u16,
    playing: bool,
}

impl TrackState {
    /// The state the peripheral shows after reset: track 1 of 1, paused.
    pub const ORIGIN: TrackState = TrackState {
        current: 1,
        total: 1,
        playing: false,
    };

    /// Builds a state, rejecting `current` outside `1..=total`.
    pub fn new(current: u16, total: u16, playing: bool) -> Result<Self, StateError> {
        if current == 0 || current > total {
            return Err(StateError::CurrentOutOfRange { current, total });
        }
        Ok(Self {
            current,
            total,
            playing,
        })
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn total(&self) -> u16 {
        self.total
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Same track position with a different play flag.
    pub fn with_playing(self, playing: bool) -> Self {
        Self { playing, ..self }
    }
}

// ── PlaybackState ─────────────────────────────────────────────────────────────

/// Desktop playback state as derived from the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No tracks loaded.
    Empty,
    Loaded(TrackState),
}

impl PlaybackState {
    /// Derives the state from a 0-based media index and a track count.
    ///
    /// A zero count is [`PlaybackState::Empty`] regardless of the other
    /// arguments.  The play flag of an empty playlist is meaningless and dropped.
    pub fn from_media(
        index: Option<usize>,
        track_count: usize,
        playing: bool,
    ) -> Result<Self, StateError> {
        if track_count == 0 {
            return Ok(PlaybackState::Empty);
        }
        let total = u16::try_from(track_count).map_err(|_| StateError::TooManyTracks(track_count))?;
        let index = index.unwrap_or(0);
        let current = u16::try_from(index + 1).map_err(|_| StateError::TooManyTracks(index + 1))?;
        TrackState::new(current, total, playing).map(PlaybackState::Loaded)
    }

    /// The state to reconcile the peripheral towards.  `Empty` maps to the origin.
    pub fn target(&self) -> TrackState {
        match self {
            PlaybackState::Empty => TrackState::ORIGIN,
            PlaybackState::Loaded(state) => *state,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PlaybackState::Empty)
    }
}

// ── TrackDirection ────────────────────────────────────────────────────────────

/// Direction of a one-step track change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDirection {
    Next,
    Prev,
}

impl TrackDirection {
    /// The shortcut command that moves the peripheral cursor in this direction.
    pub fn shortcut(self) -> OutboundCommand {
        match self {
            TrackDirection::Next => OutboundCommand::NextTrack,
            TrackDirection::Prev => OutboundCommand::PrevTrack,
        }
    }
}

// ── ShadowState ───────────────────────────────────────────────────────────────

/// What the desktop believes the peripheral currently displays.
///
/// Fields are public because the shadow is raw bookkeeping: it must be able to
/// represent intermediate states that [`TrackState::new`] would reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowState {
    pub current: u16,
    pub total: u16,
    pub playing: bool,
}

impl ShadowState {
    /// The belief right after a connect or an explicit reset.
    pub const ORIGIN: ShadowState = ShadowState {
        current: 1,
        total: 1,
        playing: false,
    };

    /// Applies the peripheral-side effect of one sent command.
    pub fn apply(&mut self, command: OutboundCommand) {
        match command {
            OutboundCommand::Play => self.playing = true,
            OutboundCommand::Pause => self.playing = false,
            OutboundCommand::NextTrack | OutboundCommand::CursorForward => {
                self.current = if self.total == 0 {
                    1
                } else {
                    (self.current % self.total) + 1
                };
            }
            OutboundCommand::PrevTrack | OutboundCommand::CursorBackward => {
                self.current = if self.current <= 1 {
                    self.total.max(1)
                } else {
                    self.current - 1
                };
            }
            OutboundCommand::TotalIncrement => self.total = self.total.saturating_add(1),
            OutboundCommand::TotalDecrement => self.total = self.total.saturating_sub(1),
            OutboundCommand::Beat => {}
        }
    }

    /// Returns `true` when `1 <= current <= total`.
    pub fn is_consistent(&self) -> bool {
        self.current >= 1 && self.current <= self.total
    }

    /// Returns `true` when the shadow already displays `target`.
    pub fn matches(&self, target: &TrackState) -> bool {
        *self == ShadowState::from(*target)
    }
}

impl Default for ShadowState {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl From<TrackState> for ShadowState {
    fn from(state: TrackState) -> Self {
        Self {
            current: state.current,
            total: state.total,
            playing: state.playing,
        }
    }
}

impl std::fmt::Display for ShadowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = if self.playing { "playing" } else { "paused" };
        write!(f, "{}/{} {}", self.current, self.total, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shadow(current: u16, total: u16, playing: bool) -> ShadowState {
        ShadowState {
            current,
            total,
            playing,
        }
    }

    // ── TrackState ───────────────────────────────────────────────────────────

    #[test]
    fn test_track_state_accepts_bounds() {
        assert!(TrackState::new(1, 1, false).is_ok());
        assert!(TrackState::new(5, 5, true).is_ok());
    }

    #[test]
    fn test_track_state_rejects_zero_current() {
        assert_eq!(
            TrackState::new(0, 3, false),
            Err(StateError::CurrentOutOfRange { current: 0, total: 3 })
        );
    }

    #[test]
    fn test_track_state_rejects_current_beyond_total() {
        assert!(TrackState::new(4, 3, false).is_err());
        assert!(TrackState::new(1, 0, false).is_err());
    }

    // ── PlaybackState ────────────────────────────────────────────────────────

    #[test]
    fn test_from_media_zero_tracks_is_empty() {
        let state = PlaybackState::from_media(None, 0, true).unwrap();
        assert!(state.is_empty());
        assert_eq!(state.target(), TrackState::ORIGIN);
    }

    #[test]
    fn test_from_media_converts_index_to_one_based() {
        let state = PlaybackState::from_media(Some(2), 4, true).unwrap();
        assert_eq!(state.target(), TrackState::new(3, 4, true).unwrap());
    }

    #[test]
    fn test_from_media_rejects_index_past_end() {
        assert!(PlaybackState::from_media(Some(4), 4, false).is_err());
    }

    #[test]
    fn test_from_media_rejects_oversized_playlist() {
        assert_eq!(
            PlaybackState::from_media(Some(0), 70_000, false),
            Err(StateError::TooManyTracks(70_000))
        );
    }

    // ── ShadowState::apply ───────────────────────────────────────────────────

    #[test]
    fn test_apply_next_wraps_to_first() {
        let mut s = shadow(5, 5, true);
        s.apply(OutboundCommand::NextTrack);
        assert_eq!(s, shadow(1, 5, true));
    }

    #[test]
    fn test_apply_prev_wraps_to_last() {
        let mut s = shadow(1, 4, false);
        s.apply(OutboundCommand::PrevTrack);
        assert_eq!(s, shadow(4, 4, false));
    }

    #[test]
    fn test_apply_cursor_moves_like_track_shortcuts() {
        let mut s = shadow(2, 3, false);
        s.apply(OutboundCommand::CursorForward);
        assert_eq!(s.current, 3);
        s.apply(OutboundCommand::CursorBackward);
        assert_eq!(s.current, 2);
    }

    #[test]
    fn test_apply_total_decrement_can_strand_cursor() {
        // Between D and V the shadow is briefly inconsistent.
        let mut s = shadow(4, 4, true);
        s.apply(OutboundCommand::TotalDecrement);
        assert_eq!(s, shadow(4, 3, true));
        assert!(!s.is_consistent());
    }

    #[test]
    fn test_apply_beat_has_no_effect() {
        let mut s = shadow(2, 3, true);
        s.apply(OutboundCommand::Beat);
        assert_eq!(s, shadow(2, 3, true));
    }

    #[test]
    fn test_matches_compares_all_fields() {
        let target = TrackState::new(2, 4, true).unwrap();
        assert!(shadow(2, 4, true).matches(&target));
        assert!(!shadow(2, 4, false).matches(&target));
    }

    #[test]
    fn test_display_format() {
        assert_eq!(shadow(3, 7, true).to_string(), "3/7 playing");
    }
}
