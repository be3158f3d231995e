use std::path::Path;
use std::sync::Arc;

use common::{
    last_path_segment, strip_playlist_suffix, AudioFileRecord, Handle, PersistedCache,
    PlaylistRecord, ScanConfiguration, ScanProgress, ScanStats,
};
use parking_lot::{Mutex, RwLock};
use redb::{CommitError, DatabaseError, StorageError, TableError, TransactionError};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod cache;
pub mod extractor;
pub mod genre;
pub mod index;
pub mod playlist;
pub mod provider;
pub mod queue;
pub mod scanner;
pub mod search;
pub mod store;

pub use cache::{LibraryCache, MAX_CACHE_SIZE, MAX_PLAYLIST_CACHE_SIZE};
pub use extractor::{LoftyExtractor, MetadataExtractor, NoTags};
pub use genre::normalize_genre;
pub use index::{CategoryIndex, Dimension, BUCKET_THRESHOLD};
pub use playlist::{PlaylistError, PlaylistService};
pub use provider::{DocumentEntry, LocalFsProvider, StorageProvider, WriteMode};
pub use queue::{PlayQueue, QueueSource};
pub use scanner::{ScanOptions, TreeScanner};
pub use store::CacheStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColdStart {
    Restored { files: usize, playlists: usize },
    Scanned(ScanStats),
    /// The scan was cancelled; its partial result is cached but not saved.
    Interrupted(ScanStats),
}

#[derive(Clone)]
pub struct MediaLibrary {
    inner: Arc<Inner>,
}

struct Inner {
    cache: LibraryCache,
    index: RwLock<CategoryIndex>,
    scanner: TreeScanner,
    store: CacheStore,
    playlists: PlaylistService,
    root: Mutex<Option<Handle>>,
}

impl MediaLibrary {
    pub fn new(
        provider: Arc<dyn StorageProvider>,
        extractor: Arc<dyn MetadataExtractor>,
        store: CacheStore,
        options: ScanOptions,
    ) -> Self {
        let scanner = TreeScanner::new(Arc::clone(&provider), extractor, options);
        Self {
            inner: Arc::new(Inner {
                cache: LibraryCache::new(MAX_CACHE_SIZE, options.max_playlists),
                index: RwLock::new(CategoryIndex::default()),
                scanner,
                store,
                playlists: PlaylistService::new(provider),
                root: Mutex::new(None),
            }),
        }
    }

    pub fn open_local(store_path: &Path, options: ScanOptions) -> Result<Self, LibraryError> {
        let store = CacheStore::open(store_path)?;
        Ok(Self::new(
            Arc::new(LocalFsProvider::new()),
            Arc::new(LoftyExtractor),
            store,
            options,
        ))
    }

    pub fn cache(&self) -> &LibraryCache {
        &self.inner.cache
    }

    pub fn current_root(&self) -> Option<Handle> {
        self.inner.root.lock().clone()
    }

    pub async fn scan(
        &self,
        root: &Handle,
        max_files: usize,
        progress: Option<&UnboundedSender<ScanProgress>>,
        cancel: &CancellationToken,
    ) -> ScanStats {
        let max_files = max_files.max(1);
        let options = self.inner.scanner.options();
        self.inner.cache.reset(max_files, options.max_playlists);
        *self.inner.root.lock() = Some(root.clone());
        self.inner
            .scanner
            .scan(&self.inner.cache, root, max_files, progress, cancel)
            .await
    }

    pub fn cached_files(&self) -> Vec<AudioFileRecord> {
        self.inner.cache.snapshot_files()
    }

    pub fn discovered_playlists(&self) -> Vec<PlaylistRecord> {
        self.inner.cache.snapshot_playlists()
    }

    pub fn search(&self, query: &str) -> Vec<AudioFileRecord> {
        search::search(&self.inner.cache.snapshot_files(), query)
    }

    pub fn has_indexes(&self) -> bool {
        let generation = self.inner.cache.generation();
        self.inner.index.read().is_current(generation)
    }

    pub fn rebuild_indexes(&self) {
        let (generation, snapshot) = self.inner.cache.snapshot_with_generation();
        let rebuilt = CategoryIndex::build(&snapshot, generation);
        *self.inner.index.write() = rebuilt;
    }

    fn ensure_indexes(&self) {
        if !self.has_indexes() {
            self.rebuild_indexes();
        }
    }

    pub fn labels(&self, dimension: Dimension) -> Vec<String> {
        self.ensure_indexes();
        self.inner.index.read().labels(dimension)
    }

    pub fn songs_for(&self, dimension: Dimension, label: &str) -> Vec<AudioFileRecord> {
        self.ensure_indexes();
        self.inner.index.read().songs_for(dimension, label)
    }

    /// Letter buckets for `dimension`, or `None` when its label list is
    /// short enough to browse directly.
    pub fn label_buckets(&self, dimension: Dimension) -> Option<Vec<String>> {
        let labels = self.labels(dimension);
        if labels.len() > BUCKET_THRESHOLD {
            Some(index::letter_buckets(&labels))
        } else {
            None
        }
    }

    pub fn labels_in_bucket(&self, dimension: Dimension, bucket: &str) -> Vec<String> {
        let labels = self.labels(dimension);
        let matched = index::filter_by_letter(&labels, bucket);
        match dimension {
            Dimension::Decade => index::sort_decades(matched),
            _ => matched,
        }
    }

    pub fn persist(&self, root: &Handle, max_files: usize) -> Result<(), LibraryError> {
        let config = ScanConfiguration::new(root, max_files);
        let files = self.inner.cache.snapshot_files();
        let playlists = self.inner.cache.snapshot_playlists();
        self.inner.store.save(&files, &playlists, &config)?;
        Ok(())
    }

    /// Loads the stored scan for exactly this root and limit and installs it
    /// as the live cache. A mismatch leaves the cache untouched.
    pub fn load_persisted(
        &self,
        root: &Handle,
        max_files: usize,
    ) -> Result<Option<PersistedCache>, LibraryError> {
        let config = ScanConfiguration::new(root, max_files);
        let persisted = match self.inner.store.load(&config)? {
            Some(persisted) => persisted,
            None => return Ok(None),
        };
        self.inner.cache.replace(
            persisted.files.clone(),
            persisted.playlists.clone(),
            config.max_files,
        );
        *self.inner.root.lock() = Some(root.clone());
        info!(
            "Restored {} files and {} playlists for {}",
            persisted.files.len(),
            persisted.playlists.len(),
            root
        );
        Ok(Some(persisted))
    }

    pub async fn restore_or_scan(
        &self,
        root: &Handle,
        max_files: usize,
        progress: Option<&UnboundedSender<ScanProgress>>,
        cancel: &CancellationToken,
    ) -> Result<ColdStart, LibraryError> {
        if let Some(restored) = self.load_persisted(root, max_files)? {
            return Ok(ColdStart::Restored {
                files: restored.files.len(),
                playlists: restored.playlists.len(),
            });
        }
        self.rescan(root, max_files, progress, cancel).await
    }

    pub async fn rescan(
        &self,
        root: &Handle,
        max_files: usize,
        progress: Option<&UnboundedSender<ScanProgress>>,
        cancel: &CancellationToken,
    ) -> Result<ColdStart, LibraryError> {
        let stats = self.scan(root, max_files, progress, cancel).await;
        if stats.cancelled {
            warn!("Scan of {} was cancelled; not saving partial result", root);
            return Ok(ColdStart::Interrupted(stats));
        }
        self.persist(root, max_files)?;
        Ok(ColdStart::Scanned(stats))
    }

    pub fn read_playlist(&self, uri: &str) -> Result<Vec<AudioFileRecord>, PlaylistError> {
        self.inner.playlists.read_playlist(&Handle::new(uri))
    }

    pub fn create_playlist(
        &self,
        name: Option<&str>,
        files: &[AudioFileRecord],
    ) -> Result<PlaylistRecord, PlaylistError> {
        let root = self
            .current_root()
            .ok_or_else(|| PlaylistError::CreateFailed("no music folder selected".to_string()))?;
        let record = match name {
            Some(name) => self
                .inner
                .playlists
                .write_playlist_with_name(&root, files, name)?,
            None => self.inner.playlists.write_playlist(&root, files)?,
        };
        self.inner.cache.add_playlist(record.clone());
        Ok(record)
    }

    pub fn append_to_playlist(
        &self,
        uri: &str,
        files: &[AudioFileRecord],
    ) -> Result<(), PlaylistError> {
        self.inner
            .playlists
            .append_to_playlist(&Handle::new(uri), files)
    }

    pub fn delete_playlist(&self, uri: &str) -> Result<(), PlaylistError> {
        let display_name = self
            .inner
            .cache
            .snapshot_playlists()
            .into_iter()
            .find(|playlist| playlist.uri == uri)
            .map(|playlist| playlist.display_name)
            .or_else(|| last_path_segment(uri).map(String::from));
        let root = self.current_root();
        self.inner
            .playlists
            .delete_playlist(&Handle::new(uri), display_name.as_deref(), root.as_ref())?;
        self.inner.cache.remove_playlist(uri);
        Ok(())
    }

    pub fn build_queue(&self, source: &QueueSource, shuffle: bool) -> Option<PlayQueue> {
        let (name, items) = match source {
            QueueSource::AllSongs => (queue::ALL_SONGS_TITLE.to_string(), self.cached_files()),
            QueueSource::AllPlaylists => {
                let mut items = Vec::new();
                for playlist in self.discovered_playlists() {
                    match self.read_playlist(&playlist.uri) {
                        Ok(mut entries) => items.append(&mut entries),
                        Err(err) => warn!("Skipping playlist {}: {}", playlist.display_name, err),
                    }
                }
                (queue::ALL_PLAYLISTS_TITLE.to_string(), items)
            }
            QueueSource::Playlist(uri) => {
                let items = match self.read_playlist(uri) {
                    Ok(items) => items,
                    Err(err) => {
                        warn!("Could not queue playlist {}: {}", uri, err);
                        return None;
                    }
                };
                (self.playlist_title(uri), items)
            }
            QueueSource::Category(dimension, label) => {
                (label.clone(), self.songs_for(*dimension, label))
            }
        };
        PlayQueue::new(name, items, shuffle)
    }

    fn playlist_title(&self, uri: &str) -> String {
        self.inner
            .cache
            .snapshot_playlists()
            .iter()
            .find(|playlist| playlist.uri == uri)
            .map(|playlist| playlist.title().to_string())
            .or_else(|| last_path_segment(uri).map(|name| strip_playlist_suffix(name).to_string()))
            .unwrap_or_else(|| uri.to_string())
    }
}

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Redb(err) => write!(f, "db error: {}", err),
            LibraryError::Bincode(err) => write!(f, "bincode error: {}", err),
        }
    }
}

impl std::error::Error for LibraryError {}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<redb::Error> for LibraryError {
    fn from(err: redb::Error) -> Self {
        LibraryError::Redb(err)
    }
}

impl From<DatabaseError> for LibraryError {
    fn from(err: DatabaseError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TableError> for LibraryError {
    fn from(err: TableError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<TransactionError> for LibraryError {
    fn from(err: TransactionError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<StorageError> for LibraryError {
    fn from(err: StorageError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<CommitError> for LibraryError {
    fn from(err: CommitError) -> Self {
        LibraryError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for LibraryError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LibraryError::Bincode(err)
    }
}
