use std::collections::HashMap;

use common::{AudioFileRecord, PlaylistRecord};
use parking_lot::Mutex;

pub const MAX_CACHE_SIZE: usize = 20;
pub const MAX_PLAYLIST_CACHE_SIZE: usize = 20;

/// Bounded source of truth for discovered audio files and playlists.
///
/// Every read and write goes through one mutex that is only ever held for
/// in-memory work. Mutations of the audio-file set bump `generation`, which
/// is what derived indexes compare against to know they are stale.
pub struct LibraryCache {
    inner: Mutex<CacheState>,
}

struct CacheState {
    files: Vec<AudioFileRecord>,
    positions: HashMap<String, usize>,
    playlists: Vec<PlaylistRecord>,
    capacity: usize,
    playlist_capacity: usize,
    generation: u64,
}

impl CacheState {
    fn insert_file(&mut self, record: AudioFileRecord) -> bool {
        if let Some(&slot) = self.positions.get(&record.uri) {
            self.files[slot] = record;
            return true;
        }
        if self.files.len() >= self.capacity {
            return false;
        }
        self.positions.insert(record.uri.clone(), self.files.len());
        self.files.push(record);
        true
    }

    fn clear_files(&mut self) {
        self.files.clear();
        self.positions.clear();
        self.generation += 1;
    }
}

impl Default for LibraryCache {
    fn default() -> Self {
        Self::new(MAX_CACHE_SIZE, MAX_PLAYLIST_CACHE_SIZE)
    }
}

impl LibraryCache {
    pub fn new(capacity: usize, playlist_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheState {
                files: Vec::new(),
                positions: HashMap::new(),
                playlists: Vec::new(),
                capacity: capacity.max(1),
                playlist_capacity: playlist_capacity.max(1),
                generation: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn playlist_capacity(&self) -> usize {
        self.inner.lock().playlist_capacity
    }

    pub fn reset(&self, capacity: usize, playlist_capacity: usize) {
        let mut state = self.inner.lock();
        state.clear_files();
        state.playlists.clear();
        state.capacity = capacity.max(1);
        state.playlist_capacity = playlist_capacity.max(1);
    }

    /// Adds one record unless the cache is full. A record whose uri is
    /// already cached replaces the old one in place.
    pub fn add_file(&self, record: AudioFileRecord) -> bool {
        let mut state = self.inner.lock();
        let added = state.insert_file(record);
        if added {
            state.generation += 1;
        }
        added
    }

    /// Appends a whole batch under a single lock acquisition and returns how
    /// many records made it in before the capacity was hit.
    pub fn add_files(&self, records: Vec<AudioFileRecord>) -> usize {
        let mut state = self.inner.lock();
        let mut added = 0usize;
        for record in records {
            if state.insert_file(record) {
                added += 1;
            }
        }
        if added > 0 {
            state.generation += 1;
        }
        added
    }

    pub fn add_playlist(&self, record: PlaylistRecord) {
        let mut state = self.inner.lock();
        match state.playlists.iter().position(|p| p.uri == record.uri) {
            Some(slot) => state.playlists[slot] = record,
            None => state.playlists.push(record),
        }
    }

    pub fn try_add_playlist(&self, record: PlaylistRecord) -> bool {
        let mut state = self.inner.lock();
        if state.playlists.iter().any(|p| p.uri == record.uri) {
            return true;
        }
        if state.playlists.len() >= state.playlist_capacity {
            return false;
        }
        state.playlists.push(record);
        true
    }

    pub fn remove_playlist(&self, uri: &str) -> usize {
        let mut state = self.inner.lock();
        let before = state.playlists.len();
        state.playlists.retain(|p| p.uri != uri);
        before - state.playlists.len()
    }

    pub fn clear_files(&self) {
        self.inner.lock().clear_files();
    }

    pub fn clear_playlists(&self) {
        self.inner.lock().playlists.clear();
    }

    pub fn clear_all(&self) {
        let mut state = self.inner.lock();
        state.clear_files();
        state.playlists.clear();
    }

    /// Swaps in a restored cache. Records past `capacity` are dropped.
    pub fn replace(
        &self,
        files: Vec<AudioFileRecord>,
        playlists: Vec<PlaylistRecord>,
        capacity: usize,
    ) {
        let mut state = self.inner.lock();
        state.clear_files();
        state.capacity = capacity.max(1);
        for record in files {
            state.insert_file(record);
        }
        state.playlists = playlists;
    }

    pub fn snapshot_files(&self) -> Vec<AudioFileRecord> {
        self.inner.lock().files.clone()
    }

    pub fn snapshot_playlists(&self) -> Vec<PlaylistRecord> {
        self.inner.lock().playlists.clone()
    }

    pub fn snapshot_with_generation(&self) -> (u64, Vec<AudioFileRecord>) {
        let state = self.inner.lock();
        (state.generation, state.files.clone())
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().files.len()
    }

    pub fn playlist_count(&self) -> usize {
        self.inner.lock().playlists.len()
    }

    pub fn is_full(&self) -> bool {
        let state = self.inner.lock();
        state.files.len() >= state.capacity
    }
}
