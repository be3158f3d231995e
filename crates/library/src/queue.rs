use common::AudioFileRecord;
use rand::seq::SliceRandom;

use crate::index::Dimension;

pub const ALL_SONGS_TITLE: &str = "All Songs";
pub const ALL_PLAYLISTS_TITLE: &str = "All Playlists";

/// Where a playback queue draws its songs from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueueSource {
    AllSongs,
    AllPlaylists,
    Playlist(String),
    Category(Dimension, String),
}

/// Ordered list of songs with a cursor, as handed to a playback engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayQueue {
    name: String,
    items: Vec<AudioFileRecord>,
    position: usize,
}

impl PlayQueue {
    /// `None` when there is nothing to play.
    pub fn new(
        name: impl Into<String>,
        mut items: Vec<AudioFileRecord>,
        shuffle: bool,
    ) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        if shuffle {
            let mut rng = rand::rng();
            items.shuffle(&mut rng);
        }
        Some(Self {
            name: name.into(),
            items,
            position: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[AudioFileRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current(&self) -> Option<&AudioFileRecord> {
        self.items.get(self.position)
    }

    /// Moves to the next song; `None` at the end of the queue, leaving the
    /// cursor where it was.
    pub fn advance(&mut self) -> Option<&AudioFileRecord> {
        let next = next_index_for_error(self.position, self.items.len())?;
        self.position = next;
        self.items.get(next)
    }

    pub fn previous(&mut self) -> Option<&AudioFileRecord> {
        let previous = self.position.checked_sub(1)?;
        self.position = previous;
        self.items.get(previous)
    }

    pub fn jump_to(&mut self, uri: &str) -> Option<&AudioFileRecord> {
        let found = self.items.iter().position(|item| item.uri == uri)?;
        self.position = found;
        self.items.get(found)
    }
}

/// Index to skip to after `current` failed to play, if any remains.
pub fn next_index_for_error(current: usize, len: usize) -> Option<usize> {
    let next = current.checked_add(1)?;
    if next < len {
        Some(next)
    } else {
        None
    }
}

pub fn should_retry_playback_error(consecutive_errors: u32, max_errors: u32) -> bool {
    consecutive_errors < max_errors
}
