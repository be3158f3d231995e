use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use common::{extension_lower, AudioFileRecord, Handle, PlaylistRecord, ScanProgress, ScanStats};
use metadata::TagInfo;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{LibraryCache, MAX_PLAYLIST_CACHE_SIZE};
use crate::extractor::MetadataExtractor;
use crate::genre::normalize_genre;
use crate::provider::{DocumentEntry, StorageProvider};

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "flac", "ogg", "opus", "wav", "m4b", "aiff", "aif",
];
pub const PLAYLIST_EXTENSIONS: &[&str] = &["m3u"];

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_EXTRACT_WORKERS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    pub max_playlists: usize,
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_playlists: MAX_PLAYLIST_CACHE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_EXTRACT_WORKERS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    Audio,
    Playlist,
    Other,
}

pub fn classify(entry: &DocumentEntry) -> EntryKind {
    if entry.is_directory() {
        return EntryKind::Folder;
    }
    match extension_lower(&entry.name) {
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => EntryKind::Audio,
        Some(ext) if PLAYLIST_EXTENSIONS.contains(&ext.as_str()) => EntryKind::Playlist,
        _ => EntryKind::Other,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub handle: Handle,
    pub name: String,
    pub size: u64,
    pub last_modified: Option<i64>,
}

impl From<DocumentEntry> for Candidate {
    fn from(entry: DocumentEntry) -> Self {
        Self {
            handle: entry.handle,
            name: entry.name,
            size: entry.size,
            last_modified: entry.last_modified,
        }
    }
}

/// Breadth-first, two-phase walk of a storage provider.
///
/// Discovery lists folders one round trip at a time and only collects
/// candidates. Enrichment then reads tags for fixed-size batches through a
/// small worker pool and commits each batch to the cache in one go.
#[derive(Clone)]
pub struct TreeScanner {
    provider: Arc<dyn StorageProvider>,
    extractor: Arc<dyn MetadataExtractor>,
    options: ScanOptions,
}

struct Discovery {
    candidates: Vec<Candidate>,
    folders_visited: usize,
    cancelled: bool,
}

impl TreeScanner {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        extractor: Arc<dyn MetadataExtractor>,
        options: ScanOptions,
    ) -> Self {
        Self {
            provider,
            extractor,
            options,
        }
    }

    pub fn options(&self) -> ScanOptions {
        self.options
    }

    /// Fills `cache` with up to `max_files` audio records found under `root`.
    ///
    /// Never fails: unreadable folders are skipped and extraction failures
    /// fall back to filesystem values. Work already committed stays in the
    /// cache when `cancel` fires, and `ScanStats::cancelled` is only set
    /// when that actually cut the walk short.
    pub async fn scan(
        &self,
        cache: &LibraryCache,
        root: &Handle,
        max_files: usize,
        progress: Option<&UnboundedSender<ScanProgress>>,
        cancel: &CancellationToken,
    ) -> ScanStats {
        let started = Instant::now();
        let max_files = max_files.max(1);

        let discovery = self.discover(cache, root, max_files, cancel).await;
        let folders_visited = discovery.folders_visited;
        info!(
            "Discovered {} audio candidates in {} folders under {}",
            discovery.candidates.len(),
            folders_visited,
            root
        );

        let batch_size = self.options.batch_size.max(1);
        let mut files_found = 0usize;
        let mut cancelled = discovery.cancelled;
        let mut pending = discovery.candidates.into_iter().peekable();
        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                info!("Scan cancelled after {} files", files_found);
                cancelled = true;
                break;
            }
            let batch: Vec<Candidate> = pending.by_ref().take(batch_size).collect();
            let records = self.enrich_batch(batch).await;
            files_found += cache.add_files(records);
            debug!("Committed batch; {} files so far", files_found);
            if let Some(progress) = progress {
                let _ = progress.send(ScanProgress {
                    files_found,
                    folders_visited,
                });
            }
        }

        let stats = ScanStats {
            elapsed_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
            folders_visited,
            files_found,
            cancelled,
        };
        info!(
            "Scan finished: {} files, {} folders in {}ms",
            stats.files_found, stats.folders_visited, stats.elapsed_ms
        );
        stats
    }

    async fn discover(
        &self,
        cache: &LibraryCache,
        root: &Handle,
        max_files: usize,
        cancel: &CancellationToken,
    ) -> Discovery {
        let mut to_visit = VecDeque::new();
        to_visit.push_back(root.clone());
        let mut candidates = Vec::new();
        let mut folders_visited = 0usize;
        let mut cancelled = false;
        let max_playlists = self.options.max_playlists.max(1);

        while let Some(folder) = to_visit.pop_front() {
            if candidates.len() >= max_files {
                break;
            }
            if cancel.is_cancelled() {
                info!("Discovery cancelled after {} folders", folders_visited);
                cancelled = true;
                break;
            }

            let children = match self.list_children(&folder).await {
                Ok(children) => children,
                Err(err) => {
                    warn!("Skipping unreadable folder {}: {}", folder, err);
                    continue;
                }
            };
            folders_visited += 1;

            for entry in children {
                match classify(&entry) {
                    EntryKind::Folder => to_visit.push_back(entry.handle),
                    EntryKind::Audio if candidates.len() < max_files => {
                        candidates.push(Candidate::from(entry));
                    }
                    EntryKind::Playlist if cache.playlist_count() < max_playlists => {
                        cache.try_add_playlist(PlaylistRecord {
                            uri: entry.handle.as_str().to_string(),
                            display_name: entry.name,
                        });
                    }
                    _ => {}
                }
            }
        }

        Discovery {
            candidates,
            folders_visited,
            cancelled,
        }
    }

    async fn list_children(&self, folder: &Handle) -> io::Result<Vec<DocumentEntry>> {
        let provider = Arc::clone(&self.provider);
        let folder = folder.clone();
        tokio::task::spawn_blocking(move || provider.list_children(&folder))
            .await
            .map_err(|err| io::Error::other(err.to_string()))?
    }

    /// Reads tags for one batch on a fixed pool of workers fed through a
    /// bounded queue. Output order matches `batch` order.
    async fn enrich_batch(&self, batch: Vec<Candidate>) -> Vec<AudioFileRecord> {
        let len = batch.len();
        if len == 0 {
            return Vec::new();
        }
        let workers = self.options.workers.clamp(1, len);

        let (job_tx, job_rx) = mpsc::channel::<(usize, Candidate)>(workers);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<(usize, AudioFileRecord)>(len);

        let mut pool = Vec::with_capacity(workers);
        for _ in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let extractor = Arc::clone(&self.extractor);
            pool.push(tokio::spawn(async move {
                loop {
                    let job = jobs.lock().await.recv().await;
                    let (slot, candidate) = match job {
                        Some(job) => job,
                        None => break,
                    };
                    let tags = extract_tags(&extractor, &candidate.handle).await;
                    if results.send((slot, build_record(candidate, tags))).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        for job in batch.into_iter().enumerate() {
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut slots: Vec<Option<AudioFileRecord>> = (0..len).map(|_| None).collect();
        while let Some((slot, record)) = result_rx.recv().await {
            slots[slot] = Some(record);
        }
        for worker in pool {
            if let Err(err) = worker.await {
                warn!("Extraction worker failed: {}", err);
            }
        }
        slots.into_iter().flatten().collect()
    }
}

async fn extract_tags(extractor: &Arc<dyn MetadataExtractor>, file: &Handle) -> Option<TagInfo> {
    let extractor = Arc::clone(extractor);
    let file = file.clone();
    let target = file.clone();
    match tokio::task::spawn_blocking(move || extractor.extract(&target)).await {
        Ok(tags) => tags,
        Err(err) => {
            warn!("Tag extraction for {} aborted: {}", file, err);
            None
        }
    }
}

/// Combines a candidate with whatever tags were found. Missing title falls
/// back to the file name and missing year to the modification year.
pub fn build_record(candidate: Candidate, tags: Option<TagInfo>) -> AudioFileRecord {
    let tags = tags.unwrap_or_default();
    let year = tags
        .year
        .or_else(|| candidate.last_modified.and_then(year_from_millis));
    let genre = normalize_genre(tags.genre.as_deref()).to_string();
    AudioFileRecord {
        uri: candidate.handle.as_str().to_string(),
        title: tags.title.unwrap_or_else(|| candidate.name.clone()),
        display_name: candidate.name,
        size_bytes: candidate.size,
        artist: tags.artist,
        album: tags.album,
        genre: Some(genre),
        duration_ms: tags.duration_ms,
        year,
    }
}

fn year_from_millis(millis: i64) -> Option<i32> {
    let nanos = i128::from(millis).checked_mul(1_000_000)?;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .map(|moment| moment.year())
}
