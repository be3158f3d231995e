use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_DECADE: &str = "Unknown Decade";
pub const PLAYLIST_EXTENSION: &str = ".m3u";

/// Opaque reference to a folder or file inside a storage provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(String);

impl Handle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFileRecord {
    pub uri: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub duration_ms: Option<u64>,
    pub year: Option<i32>,
}

impl AudioFileRecord {
    /// Bare record for an entry that carries no tags, e.g. a playlist line.
    pub fn untagged(uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            uri: uri.into(),
            title: display_name.clone(),
            display_name,
            size_bytes: 0,
            artist: None,
            album: None,
            genre: None,
            duration_ms: None,
            year: None,
        }
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.uri.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRecord {
    pub uri: String,
    pub display_name: String,
}

impl PlaylistRecord {
    /// Name without the `.m3u` suffix.
    pub fn title(&self) -> &str {
        strip_playlist_suffix(&self.display_name)
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.uri.clone())
    }
}

/// Identity of a completed scan. Two scans are the same iff both fields match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanConfiguration {
    pub source: String,
    pub max_files: usize,
}

impl ScanConfiguration {
    pub fn new(source: &Handle, max_files: usize) -> Self {
        Self {
            source: source.as_str().to_string(),
            max_files: max_files.max(1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCache {
    pub files: Vec<AudioFileRecord>,
    pub playlists: Vec<PlaylistRecord>,
    pub config: ScanConfiguration,
    pub scanned_at: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub elapsed_ms: u64,
    pub folders_visited: usize,
    pub files_found: usize,
    /// Set when cancellation stopped the walk before it ran out of work.
    #[serde(default)]
    pub cancelled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanProgress {
    pub files_found: usize,
    pub folders_visited: usize,
}

pub fn strip_playlist_suffix(name: &str) -> &str {
    let cut = name.len().saturating_sub(PLAYLIST_EXTENSION.len());
    match name.get(cut..) {
        Some(tail) if tail.eq_ignore_ascii_case(PLAYLIST_EXTENSION) => &name[..cut],
        _ => name,
    }
}

/// Last non-empty segment of a URI or path, accepting either separator.
pub fn last_path_segment(uri: &str) -> Option<&str> {
    uri.rsplit(&['/', '\\'][..]).find(|part| !part.is_empty())
}

pub fn extension_lower(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::{extension_lower, last_path_segment, strip_playlist_suffix, Handle, ScanConfiguration};

    #[test]
    fn scan_configuration_coerces_zero_limit() {
        let root = Handle::new("/music");
        assert_eq!(ScanConfiguration::new(&root, 0).max_files, 1);
        assert_eq!(
            ScanConfiguration::new(&root, 20),
            ScanConfiguration::new(&Handle::new("/music"), 20)
        );
        assert_ne!(
            ScanConfiguration::new(&root, 20),
            ScanConfiguration::new(&root, 21)
        );
    }

    #[test]
    fn strips_playlist_suffix_case_insensitively() {
        assert_eq!(strip_playlist_suffix("Road Trip.m3u"), "Road Trip");
        assert_eq!(strip_playlist_suffix("Road Trip.M3U"), "Road Trip");
        assert_eq!(strip_playlist_suffix("Road Trip"), "Road Trip");
    }

    #[test]
    fn last_segment_skips_trailing_separators() {
        assert_eq!(last_path_segment("/music/a/song.mp3"), Some("song.mp3"));
        assert_eq!(last_path_segment("C:\\music\\song.flac"), Some("song.flac"));
        assert_eq!(last_path_segment("/music/a/"), Some("a"));
        assert_eq!(last_path_segment(""), None);
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_lower("Track.MP3").as_deref(), Some("mp3"));
        assert_eq!(extension_lower(".hidden"), None);
        assert_eq!(extension_lower("noext"), None);
    }
}
