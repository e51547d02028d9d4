//! The media engine seam.
//!
//! The mediator drives playback through [`MediaEngine`] and learns about the
//! consequences from the [`MediaEvent`]s each call returns.  Returning events
//! (rather than pushing them through a callback) means a mutation and the
//! sync request it causes run under the same mediator lock, so nothing can
//! interleave between them.

use std::path::PathBuf;

/// Something that changed as a result of a media engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Tracks were added or removed.
    TracksChanged,
    /// The current track index changed.
    TrackChanged(usize),
    PlayStateChanged(bool),
    /// An explicit seek landed at this position (seconds).
    PositionChanged(f64),
    /// The clock advanced while playing.  Display only.
    Progress(f64),
    VolumeChanged(u8),
    PlaylistCleared,
    /// The track at `index` could not be played and was skipped.
    LoadFailed { index: usize, reason: String },
    /// A file offered to `add_tracks` was not accepted.
    Rejected { path: PathBuf, reason: String },
}

impl MediaEvent {
    /// Whether this event changes what the peripheral should display.
    pub fn affects_peripheral(&self) -> bool {
        matches!(
            self,
            MediaEvent::TracksChanged
                | MediaEvent::TrackChanged(_)
                | MediaEvent::PlayStateChanged(_)
                | MediaEvent::PositionChanged(_)
        )
    }
}

/// Trait abstracting audio playback.
///
/// Mutating operations return the events they caused, in order.  Operations
/// that are not applicable (seek on an empty playlist, an out-of-range index)
/// return no events.
#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine: Send {
    fn add_tracks(&mut self, paths: Vec<PathBuf>) -> Vec<MediaEvent>;
    fn remove_track(&mut self, index: usize) -> Vec<MediaEvent>;
    fn clear(&mut self) -> Vec<MediaEvent>;
    fn select(&mut self, index: usize) -> Vec<MediaEvent>;
    fn play(&mut self) -> Vec<MediaEvent>;
    fn pause(&mut self) -> Vec<MediaEvent>;
    fn stop(&mut self) -> Vec<MediaEvent>;
    fn next_track(&mut self) -> Vec<MediaEvent>;
    fn previous_track(&mut self) -> Vec<MediaEvent>;
    fn seek_to(&mut self, secs: f64) -> Vec<MediaEvent>;
    fn seek_percent(&mut self, percent: u8) -> Vec<MediaEvent>;
    fn seek_relative(&mut self, delta_secs: i32) -> Vec<MediaEvent>;
    fn set_volume(&mut self, volume: u8) -> Vec<MediaEvent>;
    /// Advances the playback clock; reports progress and track end.
    fn tick(&mut self) -> Vec<MediaEvent>;

    fn volume(&self) -> u8;
    fn current_index(&self) -> Option<usize>;
    fn track_count(&self) -> usize;
    fn is_playing(&self) -> bool;
    fn position_secs(&self) -> f64;
    fn duration_secs(&self) -> f64;
    fn track_names(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_does_not_affect_peripheral() {
        assert!(!MediaEvent::Progress(12.0).affects_peripheral());
        assert!(!MediaEvent::VolumeChanged(40).affects_peripheral());
        assert!(MediaEvent::PositionChanged(12.0).affects_peripheral());
        assert!(MediaEvent::TrackChanged(0).affects_peripheral());
    }
}
