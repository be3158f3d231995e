use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;

use common::{last_path_segment, AudioFileRecord, Handle, PlaylistRecord, PLAYLIST_EXTENSION};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::provider::{StorageProvider, WriteMode};

pub const M3U_HEADER: &str = "#EXTM3U";
pub const M3U_MIME: &str = "audio/x-mpegurl";
const EXTINF_PREFIX: &str = "#EXTINF:";
const UNKNOWN_ENTRY: &str = "Unknown";

#[derive(Debug)]
pub enum PlaylistError {
    Empty,
    InvalidName,
    CreateFailed(String),
    PermissionDenied(String),
    Io(io::Error),
}

impl fmt::Display for PlaylistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaylistError::Empty => write!(f, "No songs to add to the playlist"),
            PlaylistError::InvalidName => write!(f, "Playlist name cannot be blank"),
            PlaylistError::CreateFailed(name) => write!(f, "Could not create playlist {}", name),
            PlaylistError::PermissionDenied(target) => {
                write!(f, "Permission denied for {}", target)
            }
            PlaylistError::Io(err) => write!(f, "Playlist file error: {}", err),
        }
    }
}

impl std::error::Error for PlaylistError {}

impl From<io::Error> for PlaylistError {
    fn from(err: io::Error) -> Self {
        PlaylistError::Io(err)
    }
}

fn classify_io(err: io::Error, target: &str) -> PlaylistError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        PlaylistError::PermissionDenied(target.to_string())
    } else {
        PlaylistError::Io(err)
    }
}

/// Extended M3U text for `files`: header, then an `#EXTINF` line and the
/// raw uri for every entry.
pub fn generate_m3u(files: &[AudioFileRecord]) -> String {
    let mut content = String::new();
    content.push_str(M3U_HEADER);
    content.push('\n');
    for file in files {
        content.push_str(EXTINF_PREFIX);
        content.push_str("-1,");
        content.push_str(&file.display_name);
        content.push('\n');
        content.push_str(&file.uri);
        content.push('\n');
    }
    content
}

/// Parses playlist text. `#EXTINF` titles apply to the next uri line;
/// entries without one are named after the last segment of their uri.
/// Bytes that are not UTF-8 are replaced rather than failing the read.
pub fn parse_m3u<R: BufRead>(mut reader: R) -> io::Result<Vec<AudioFileRecord>> {
    let mut entries = Vec::new();
    let mut pending_title: Option<String> = None;
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if starts_with_ignore_case(trimmed, EXTINF_PREFIX) {
            pending_title = trimmed
                .split_once(',')
                .map(|(_, title)| title.trim())
                .filter(|title| !title.is_empty())
                .map(String::from);
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        let name = match pending_title.take() {
            Some(title) => title,
            None => last_path_segment(trimmed)
                .unwrap_or(UNKNOWN_ENTRY)
                .to_string(),
        };
        entries.push(AudioFileRecord::untagged(trimmed, name));
    }
    Ok(entries)
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// `name` trimmed, with `/` replaced and the `.m3u` suffix ensured.
pub fn playlist_file_name(name: &str) -> Result<String, PlaylistError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(PlaylistError::InvalidName);
    }
    let safe = trimmed.replace('/', "_");
    let has_suffix = safe
        .get(safe.len().saturating_sub(PLAYLIST_EXTENSION.len())..)
        .map(|tail| tail.eq_ignore_ascii_case(PLAYLIST_EXTENSION))
        .unwrap_or(false);
    if has_suffix {
        Ok(safe)
    } else {
        Ok(format!("{}{}", safe, PLAYLIST_EXTENSION))
    }
}

pub fn timestamped_name(now: OffsetDateTime) -> String {
    match now.format(format_description!("[year][month][day]_[hour][minute][second]")) {
        Ok(stamp) => format!("playlist_{}", stamp),
        Err(_) => format!("playlist_{}", now.unix_timestamp()),
    }
}

/// Creates, extends, reads and deletes `.m3u` files through a provider.
#[derive(Clone)]
pub struct PlaylistService {
    provider: Arc<dyn StorageProvider>,
}

impl PlaylistService {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    pub fn write_playlist(
        &self,
        root: &Handle,
        files: &[AudioFileRecord],
    ) -> Result<PlaylistRecord, PlaylistError> {
        let name = timestamped_name(OffsetDateTime::now_utc());
        self.write_playlist_with_name(root, files, &name)
    }

    pub fn write_playlist_with_name(
        &self,
        root: &Handle,
        files: &[AudioFileRecord],
        name: &str,
    ) -> Result<PlaylistRecord, PlaylistError> {
        if files.is_empty() {
            return Err(PlaylistError::Empty);
        }
        let file_name = playlist_file_name(name)?;
        let target = self
            .provider
            .create_file(root, M3U_MIME, &file_name)
            .map_err(|err| {
                warn!("Failed to create playlist file {}: {}", file_name, err);
                match err.kind() {
                    io::ErrorKind::PermissionDenied => {
                        PlaylistError::PermissionDenied(file_name.clone())
                    }
                    _ => PlaylistError::CreateFailed(file_name.clone()),
                }
            })?;

        let content = generate_m3u(files);
        let written = self
            .provider
            .open_write(&target, WriteMode::Truncate)
            .and_then(|mut output| {
                output.write_all(content.as_bytes())?;
                output.flush()
            });
        if let Err(err) = written {
            warn!("Could not write playlist {}: {}", file_name, err);
            if let Err(cleanup) = self.provider.delete_file(&target) {
                warn!("Could not remove unwritten playlist {}: {}", target, cleanup);
            }
            return Err(classify_io(err, &file_name));
        }

        // The provider may have renamed the file to avoid a collision.
        let display_name = last_path_segment(target.as_str())
            .unwrap_or(file_name.as_str())
            .to_string();
        info!("Wrote playlist {} with {} entries", display_name, files.len());
        Ok(PlaylistRecord {
            uri: target.as_str().to_string(),
            display_name,
        })
    }

    pub fn append_to_playlist(
        &self,
        playlist: &Handle,
        files: &[AudioFileRecord],
    ) -> Result<(), PlaylistError> {
        if files.is_empty() {
            return Err(PlaylistError::Empty);
        }
        let content = generate_m3u(files);
        let body = content
            .strip_prefix(M3U_HEADER)
            .and_then(|rest| rest.strip_prefix('\n'))
            .unwrap_or(content.as_str());
        let appended = self
            .provider
            .open_write(playlist, WriteMode::Append)
            .and_then(|mut output| {
                output.write_all(b"\n")?;
                output.write_all(body.as_bytes())?;
                output.flush()
            });
        appended.map_err(|err| {
            warn!("Could not append to playlist {}: {}", playlist, err);
            classify_io(err, playlist.as_str())
        })
    }

    /// Deletes by handle first; if that fails and a root and name are
    /// known, looks the file up by name under the root and deletes that.
    pub fn delete_playlist(
        &self,
        playlist: &Handle,
        display_name: Option<&str>,
        root: Option<&Handle>,
    ) -> Result<(), PlaylistError> {
        let first = match self.provider.delete_file(playlist) {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!("Delete of {} failed: {}", playlist, err);
                err
            }
        };

        let name = display_name.map(str::trim).filter(|name| !name.is_empty());
        if let (Some(root), Some(name)) = (root, name) {
            match self.provider.find_child(root, name) {
                Ok(Some(found)) => match self.provider.delete_file(&found) {
                    Ok(()) => return Ok(()),
                    Err(err) => warn!("Fallback delete of {} failed: {}", name, err),
                },
                Ok(None) => warn!("No playlist named {} under {}", name, root),
                Err(err) => warn!("Could not list {} for fallback delete: {}", root, err),
            }
        }

        warn!("All delete strategies failed for playlist {}", playlist);
        Err(classify_io(first, playlist.as_str()))
    }

    pub fn read_playlist(&self, playlist: &Handle) -> Result<Vec<AudioFileRecord>, PlaylistError> {
        let input = self.provider.open_read(playlist).map_err(|err| {
            warn!("Could not open playlist {}: {}", playlist, err);
            classify_io(err, playlist.as_str())
        })?;
        parse_m3u(BufReader::new(input)).map_err(|err| {
            warn!("Could not read playlist {}: {}", playlist, err);
            classify_io(err, playlist.as_str())
        })
    }
}
