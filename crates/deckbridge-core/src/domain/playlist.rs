//! Playlist domain entity.
//!
//! An ordered list of tracks with a cursor.  The cursor always points at a
//! valid track while the list is non-empty; removals before the cursor shift
//! it down so it keeps pointing at the same track.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Unique identifier for a playlist entry, derived from UUID v4.
///
/// The same file may be enqueued twice; each entry gets its own id.
pub type TrackId = Uuid;

/// File extensions accepted as audio, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["mp3", "wav", "m4a"];

/// Returns `true` if `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// One playlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: TrackId,
    pub path: PathBuf,
    /// Display name: the file name without directories.
    pub name: String,
    /// Duration once known.  `None` until the media engine has probed the file.
    pub duration_secs: Option<u32>,
}

impl Track {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            id: Uuid::new_v4(),
            path,
            name,
            duration_secs: None,
        }
    }
}

/// How a removal affected the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalEffect {
    /// The removed track was after the cursor.
    Unaffected,
    /// The removed track was before the cursor; the cursor moved down by one
    /// and still points at the same track.
    CursorShifted,
    /// The current track itself was removed.  The cursor now points at the
    /// track that followed it, or at the new last track.
    CurrentRemoved,
    /// The removed track was the only one.
    Emptied,
}

#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    cursor: usize,
}

impl Playlist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Index of the current track, or `None` when empty.
    pub fn current_index(&self) -> Option<usize> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(self.cursor)
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current_index().and_then(|i| self.tracks.get(i))
    }

    pub fn names(&self) -> Vec<String> {
        self.tracks.iter().map(|t| t.name.clone()).collect()
    }

    /// Appends a track.  The cursor does not move.
    pub fn push(&mut self, track: Track) -> TrackId {
        let id = track.id;
        self.tracks.push(track);
        id
    }

    /// Removes the track at `index`.  Returns `None` if the index is out of range.
    pub fn remove(&mut self, index: usize) -> Option<RemovalEffect> {
        if index >= self.tracks.len() {
            return None;
        }
        self.tracks.remove(index);

        let effect = if self.tracks.is_empty() {
            self.cursor = 0;
            RemovalEffect::Emptied
        } else if index < self.cursor {
            self.cursor -= 1;
            RemovalEffect::CursorShifted
        } else if index == self.cursor {
            self.cursor = self.cursor.min(self.tracks.len() - 1);
            RemovalEffect::CurrentRemoved
        } else {
            RemovalEffect::Unaffected
        };
        Some(effect)
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.cursor = 0;
    }

    /// Moves the cursor to `index`.  Returns `true` only if the cursor moved.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.tracks.len() || index == self.cursor {
            return false;
        }
        self.cursor = index;
        true
    }

    /// Index after the cursor, wrapping to the first track.
    pub fn next_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        (len > 0).then(|| (self.cursor + 1) % len)
    }

    /// Index before the cursor, wrapping to the last track.
    pub fn prev_index(&self) -> Option<usize> {
        let len = self.tracks.len();
        (len > 0).then(|| if self.cursor == 0 { len - 1 } else { self.cursor - 1 })
    }

    /// Records a probed duration.  Returns `false` if the index is out of range.
    pub fn set_duration(&mut self, index: usize, secs: u32) -> bool {
        match self.tracks.get_mut(index) {
            Some(track) => {
                track.duration_secs = Some(secs);
                true
            }
            None => false,
        }
    }
}
