//! Reference media engine: an in-memory playlist player without audio output.
//!
//! `PlaylistPlayer` keeps the playlist, play state, volume and a clock-driven
//! playback position.  It is what the console binary drives, and it gives
//! the integration tests realistic media behaviour to mirror onto the
//! peripheral.
//!
//! # Position keeping
//!
//! The position is `base + (now - started_at)` while playing and `base` while
//! paused.  It uses `tokio::time::Instant`, so tests running on a paused
//! clock control it exactly.
//!
//! # Track durations
//!
//! No decoder is involved, so durations are unknown until someone calls
//! [`PlaylistPlayer::set_track_duration`].  Until then the configured
//! placeholder (180 s by default) is used for seeking and end-of-track.

use std::path::PathBuf;

use deckbridge_core::{is_supported_audio, Playlist, RemovalEffect, Track};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::application::media::{MediaEngine, MediaEvent};

/// Pressing "previous" later than this into a track rewinds it instead.
const REWIND_THRESHOLD_SECS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Duration assumed for tracks whose length is unknown.
    pub default_duration_secs: u32,
    pub initial_volume: u8,
    /// Check that a track's file exists before playing it.
    pub verify_files: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            default_duration_secs: 180,
            initial_volume: 50,
            verify_files: true,
        }
    }
}

pub struct PlaylistPlayer {
    playlist: Playlist,
    settings: PlayerSettings,
    volume: u8,
    /// Position accumulated up to `started_at` (or the paused position).
    base_secs: f64,
    /// Set while playing.
    started_at: Option<Instant>,
}

impl PlaylistPlayer {
    pub fn new(settings: PlayerSettings) -> Self {
        Self {
            playlist: Playlist::new(),
            volume: settings.initial_volume.min(100),
            settings,
            base_secs: 0.0,
            started_at: None,
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    /// Records the real duration of the track at `index`.
    pub fn set_track_duration(&mut self, index: usize, secs: u32) -> bool {
        self.playlist.set_duration(index, secs)
    }

    fn current_duration(&self) -> f64 {
        match self.playlist.current() {
            Some(track) => f64::from(
                track
                    .duration_secs
                    .unwrap_or(self.settings.default_duration_secs),
            ),
            None => 0.0,
        }
    }

    fn raw_position(&self) -> f64 {
        match self.started_at {
            Some(started) => self.base_secs + started.elapsed().as_secs_f64(),
            None => self.base_secs,
        }
    }

    fn set_position(&mut self, secs: f64) {
        self.base_secs = secs;
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    /// Stops the clock, keeping the position.  Returns whether it was running.
    fn halt(&mut self) -> bool {
        match self.started_at.take() {
            Some(started) => {
                self.base_secs += started.elapsed().as_secs_f64();
                true
            }
            None => false,
        }
    }

    /// Checks that the current track can be played.
    fn current_playable(&self) -> Result<(), String> {
        let Some(track) = self.playlist.current() else {
            return Err("playlist is empty".to_string());
        };
        if self.settings.verify_files && !track.path.is_file() {
            return Err(format!("file not found: {}", track.path.display()));
        }
        Ok(())
    }

    /// Starts the current track from the current position.
    ///
    /// If the file cannot be played, reports it, moves the cursor to the next
    /// track and stays stopped.  Returns whether playback started.
    fn start(&mut self, events: &mut Vec<MediaEvent>) -> bool {
        let Some(index) = self.playlist.current_index() else {
            return false;
        };
        match self.current_playable() {
            Ok(()) => {
                self.started_at = Some(Instant::now());
                true
            }
            Err(reason) => {
                events.push(MediaEvent::LoadFailed { index, reason });
                if let Some(next) = self.playlist.next_index() {
                    if self.playlist.select(next) {
                        self.base_secs = 0.0;
                        events.push(MediaEvent::TrackChanged(next));
                    }
                }
                false
            }
        }
    }

    /// Moves to `index`, restarting at 0 and resuming if playback was running.
    fn change_track(&mut self, index: usize) -> Vec<MediaEvent> {
        let was_playing = self.halt();
        if !self.playlist.select(index) {
            if was_playing {
                self.started_at = Some(Instant::now());
            }
            return Vec::new();
        }
        self.base_secs = 0.0;

        let mut events = vec![MediaEvent::TrackChanged(index)];
        if was_playing && !self.start(&mut events) {
            events.push(MediaEvent::PlayStateChanged(false));
        }
        events
    }

    fn rewind(&mut self) -> Vec<MediaEvent> {
        self.set_position(0.0);
        vec![MediaEvent::PositionChanged(0.0)]
    }
}

impl Default for PlaylistPlayer {
    fn default() -> Self {
        Self::new(PlayerSettings::default())
    }
}

impl MediaEngine for PlaylistPlayer {
    fn add_tracks(&mut self, paths: Vec<PathBuf>) -> Vec<MediaEvent> {
        let mut events = Vec::new();
        let mut added = 0usize;
        for path in paths {
            if !is_supported_audio(&path) {
                events.push(MediaEvent::Rejected {
                    path,
                    reason: "unsupported file type".to_string(),
                });
                continue;
            }
            let track = Track::from_path(path);
            debug!(name = %track.name, id = %track.id, "track enqueued");
            self.playlist.push(track);
            added += 1;
        }
        if added > 0 {
            events.push(MediaEvent::TracksChanged);
        }
        events
    }

    fn remove_track(&mut self, index: usize) -> Vec<MediaEvent> {
        let Some(effect) = self.playlist.remove(index) else {
            return Vec::new();
        };
        match effect {
            RemovalEffect::Unaffected | RemovalEffect::CursorShifted => {
                vec![MediaEvent::TracksChanged]
            }
            RemovalEffect::CurrentRemoved | RemovalEffect::Emptied => {
                let was_playing = self.halt();
                self.base_secs = 0.0;
                let mut events = Vec::new();
                if was_playing {
                    events.push(MediaEvent::PlayStateChanged(false));
                }
                events.push(MediaEvent::TracksChanged);
                if let Some(current) = self.playlist.current_index() {
                    events.push(MediaEvent::TrackChanged(current));
                }
                events
            }
        }
    }

    fn clear(&mut self) -> Vec<MediaEvent> {
        if self.playlist.is_empty() {
            return Vec::new();
        }
        let was_playing = self.halt();
        self.base_secs = 0.0;
        self.playlist.clear();
        info!("playlist cleared");

        let mut events = Vec::new();
        if was_playing {
            events.push(MediaEvent::PlayStateChanged(false));
        }
        events.push(MediaEvent::PlaylistCleared);
        events
    }

    fn select(&mut self, index: usize) -> Vec<MediaEvent> {
        self.change_track(index)
    }

    fn play(&mut self) -> Vec<MediaEvent> {
        if self.started_at.is_some() || self.playlist.is_empty() {
            return Vec::new();
        }
        let mut events = Vec::new();
        if self.start(&mut events) {
            events.push(MediaEvent::PlayStateChanged(true));
        }
        events
    }

    fn pause(&mut self) -> Vec<MediaEvent> {
        if self.halt() {
            vec![MediaEvent::PlayStateChanged(false)]
        } else {
            Vec::new()
        }
    }

    fn stop(&mut self) -> Vec<MediaEvent> {
        let was_playing = self.halt();
        let mut events = Vec::new();
        if was_playing {
            events.push(MediaEvent::PlayStateChanged(false));
        }
        if self.base_secs != 0.0 {
            self.base_secs = 0.0;
            events.push(MediaEvent::PositionChanged(0.0));
        }
        events
    }

    fn next_track(&mut self) -> Vec<MediaEvent> {
        match self.playlist.next_index() {
            None => Vec::new(),
            Some(next) if Some(next) == self.playlist.current_index() => self.rewind(),
            Some(next) => self.change_track(next),
        }
    }

    fn previous_track(&mut self) -> Vec<MediaEvent> {
        if self.playlist.is_empty() {
            return Vec::new();
        }
        if self.raw_position() > REWIND_THRESHOLD_SECS {
            return self.rewind();
        }
        match self.playlist.prev_index() {
            Some(prev) if Some(prev) != self.playlist.current_index() => self.change_track(prev),
            _ => self.rewind(),
        }
    }

    fn seek_to(&mut self, secs: f64) -> Vec<MediaEvent> {
        if self.playlist.is_empty() || !(0.0..=self.current_duration()).contains(&secs) {
            return Vec::new();
        }
        self.set_position(secs);
        vec![MediaEvent::PositionChanged(secs)]
    }

    fn seek_percent(&mut self, percent: u8) -> Vec<MediaEvent> {
        let target = self.current_duration() * f64::from(percent.min(100)) / 100.0;
        self.seek_to(target)
    }

    fn seek_relative(&mut self, delta_secs: i32) -> Vec<MediaEvent> {
        if self.playlist.is_empty() {
            return Vec::new();
        }
        let target = (self.raw_position() + f64::from(delta_secs)).clamp(0.0, self.current_duration());
        self.set_position(target);
        vec![MediaEvent::PositionChanged(target)]
    }

    fn set_volume(&mut self, volume: u8) -> Vec<MediaEvent> {
        if volume > 100 || volume == self.volume {
            return Vec::new();
        }
        self.volume = volume;
        vec![MediaEvent::VolumeChanged(volume)]
    }

    fn tick(&mut self) -> Vec<MediaEvent> {
        if self.started_at.is_none() {
            return Vec::new();
        }
        let position = self.raw_position();
        if position >= self.current_duration() {
            debug!(position, "end of track");
            return self.next_track();
        }
        vec![MediaEvent::Progress(position)]
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn current_index(&self) -> Option<usize> {
        self.playlist.current_index()
    }

    fn track_count(&self) -> usize {
        self.playlist.len()
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn position_secs(&self) -> f64 {
        self.raw_position().min(self.current_duration())
    }

    fn duration_secs(&self) -> f64 {
        self.current_duration()
    }

    fn track_names(&self) -> Vec<String> {
        self.playlist.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn unverified() -> PlaylistPlayer {
        PlaylistPlayer::new(PlayerSettings {
            verify_files: false,
            ..PlayerSettings::default()
        })
    }

    fn with_tracks(n: usize) -> PlaylistPlayer {
        let mut player = unverified();
        let paths = (1..=n).map(|i| PathBuf::from(format!("track{i}.mp3"))).collect();
        player.add_tracks(paths);
        player
    }

    #[test]
    fn test_add_tracks_rejects_unsupported_files() {
        // Arrange
        let mut player = unverified();

        // Act
        let events = player.add_tracks(vec![
            PathBuf::from("a.mp3"),
            PathBuf::from("notes.txt"),
            PathBuf::from("b.WAV"),
        ]);

        // Assert
        assert_eq!(player.track_count(), 2);
        assert_eq!(player.current_index(), Some(0));
        assert!(matches!(&events[0], MediaEvent::Rejected { path, .. } if path.ends_with("notes.txt")));
        assert_eq!(events.last(), Some(&MediaEvent::TracksChanged));
    }

    #[test]
    fn test_add_only_rejected_files_reports_no_change() {
        let mut player = unverified();
        let events = player.add_tracks(vec![PathBuf::from("cover.jpg")]);
        assert_eq!(events.len(), 1);
        assert!(!events.iter().any(MediaEvent::affects_peripheral));
    }

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_clock_while_playing() {
        // Arrange
        let mut player = with_tracks(2);

        // Act
        assert_eq!(player.play(), vec![MediaEvent::PlayStateChanged(true)]);
        tokio::time::advance(Duration::from_secs(10)).await;
        player.pause();
        tokio::time::advance(Duration::from_secs(10)).await;

        // Assert
        assert_eq!(player.position_secs(), 10.0);
        assert!(!player.is_playing());
    }

    #[test]
    fn test_play_missing_file_skips_to_next_without_playing() {
        // Arrange
        let mut player = PlaylistPlayer::default();
        player.add_tracks(vec![
            PathBuf::from("/nonexistent/deckbridge/one.mp3"),
            PathBuf::from("/nonexistent/deckbridge/two.mp3"),
        ]);

        // Act
        let events = player.play();

        // Assert
        assert!(matches!(events[0], MediaEvent::LoadFailed { index: 0, .. }));
        assert_eq!(events[1], MediaEvent::TrackChanged(1));
        assert_eq!(events.len(), 2);
        assert!(!player.is_playing());
        assert_eq!(player.current_index(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_after_three_seconds_rewinds() {
        let mut player = with_tracks(3);
        player.select(1);
        player.play();
        tokio::time::advance(Duration::from_secs(5)).await;

        let events = player.previous_track();

        assert_eq!(events, vec![MediaEvent::PositionChanged(0.0)]);
        assert_eq!(player.current_index(), Some(1));
        assert!(player.is_playing());
    }

    #[test]
    fn test_previous_at_start_wraps_to_last() {
        let mut player = with_tracks(3);

        let events = player.previous_track();

        assert_eq!(events, vec![MediaEvent::TrackChanged(2)]);
        assert_eq!(player.current_index(), Some(2));
    }

    #[test]
    fn test_next_wraps_and_keeps_playing() {
        let mut player = with_tracks(3);
        player.select(2);
        player.play();

        let events = player.next_track();

        assert_eq!(events, vec![MediaEvent::TrackChanged(0)]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_select_same_index_is_noop() {
        let mut player = with_tracks(2);
        assert!(player.select(0).is_empty());
        assert!(player.select(9).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_resets_position_and_resumes() {
        let mut player = with_tracks(3);
        player.play();
        tokio::time::advance(Duration::from_secs(42)).await;

        let events = player.select(2);

        assert_eq!(events, vec![MediaEvent::TrackChanged(2)]);
        assert!(player.is_playing());
        assert_eq!(player.position_secs(), 0.0);
    }

    #[test]
    fn test_seek_outside_duration_is_ignored() {
        let mut player = with_tracks(1);
        player.set_track_duration(0, 120);

        assert!(player.seek_to(121.0).is_empty());
        assert!(player.seek_to(-1.0).is_empty());
        assert_eq!(player.seek_to(60.0), vec![MediaEvent::PositionChanged(60.0)]);
    }

    #[test]
    fn test_seek_relative_clamps() {
        let mut player = with_tracks(1);
        player.set_track_duration(0, 100);
        player.seek_to(80.0);

        assert_eq!(player.seek_relative(30), vec![MediaEvent::PositionChanged(100.0)]);
        player.seek_to(10.0);
        assert_eq!(player.seek_relative(-30), vec![MediaEvent::PositionChanged(0.0)]);
    }

    #[test]
    fn test_seek_percent_uses_placeholder_duration() {
        let mut player = with_tracks(1);

        let events = player.seek_percent(50);

        assert_eq!(events, vec![MediaEvent::PositionChanged(90.0)]);
        assert_eq!(player.duration_secs(), 180.0);
    }

    #[test]
    fn test_volume_out_of_range_is_ignored() {
        let mut player = unverified();
        assert!(player.set_volume(101).is_empty());
        assert_eq!(player.set_volume(80), vec![MediaEvent::VolumeChanged(80)]);
        assert_eq!(player.volume(), 80);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_advances_to_next_track_at_end() {
        // Arrange
        let mut player = with_tracks(2);
        player.set_track_duration(0, 5);
        player.play();

        // Act
        tokio::time::advance(Duration::from_secs(2)).await;
        let progress = player.tick();
        tokio::time::advance(Duration::from_secs(4)).await;
        let at_end = player.tick();

        // Assert
        assert_eq!(progress, vec![MediaEvent::Progress(2.0)]);
        assert_eq!(at_end, vec![MediaEvent::TrackChanged(1)]);
        assert!(player.is_playing());
    }

    #[test]
    fn test_remove_current_while_playing_stops() {
        let mut player = with_tracks(3);
        player.select(1);
        player.play();

        let events = player.remove_track(1);

        assert_eq!(
            events,
            vec![
                MediaEvent::PlayStateChanged(false),
                MediaEvent::TracksChanged,
                MediaEvent::TrackChanged(1),
            ]
        );
        assert!(!player.is_playing());
    }

    #[test]
    fn test_remove_before_cursor_keeps_current_track() {
        let mut player = with_tracks(3);
        player.select(2);

        let events = player.remove_track(0);

        assert_eq!(events, vec![MediaEvent::TracksChanged]);
        assert_eq!(player.current_index(), Some(1));
        assert_eq!(player.track_names()[1], "track3.mp3");
    }

    #[test]
    fn test_clear_stops_and_empties() {
        let mut player = with_tracks(2);
        player.play();

        let events = player.clear();

        assert_eq!(
            events,
            vec![MediaEvent::PlayStateChanged(false), MediaEvent::PlaylistCleared]
        );
        assert_eq!(player.current_index(), None);
        assert_eq!(player.duration_secs(), 0.0);
        assert!(player.clear().is_empty());
    }
}
