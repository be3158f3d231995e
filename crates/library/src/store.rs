use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::{AudioFileRecord, PersistedCache, PlaylistRecord, ScanConfiguration};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::LibraryError;

const STORE_VERSION: u32 = 1;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const FILES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const PLAYLISTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("playlists");

const META_VERSION_KEY: &str = "version";
const META_SCAN_KEY: &str = "scan_state";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ScanState {
    config: ScanConfiguration,
    scanned_at: u64,
}

/// Durable copy of the last completed scan, kept in a single redb file.
///
/// A save replaces everything in one write transaction, so readers see
/// either the previous scan or the new one and never a mix.
#[derive(Clone)]
pub struct CacheStore {
    db: Arc<Database>,
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        let db = open_or_create_db(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn save(
        &self,
        files: &[AudioFileRecord],
        playlists: &[PlaylistRecord],
        config: &ScanConfiguration,
    ) -> Result<u64, LibraryError> {
        let scanned_at = now_millis();
        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, META_TABLE)?;
        clear_table(&write_txn, FILES_TABLE)?;
        clear_table(&write_txn, PLAYLISTS_TABLE)?;
        {
            let mut files_table = write_txn.open_table(FILES_TABLE)?;
            for (position, record) in files.iter().enumerate() {
                let bytes = encode_value(record)?;
                files_table.insert(position_key(position).as_str(), bytes.as_slice())?;
            }

            let mut playlists_table = write_txn.open_table(PLAYLISTS_TABLE)?;
            for (position, record) in playlists.iter().enumerate() {
                let bytes = encode_value(record)?;
                playlists_table.insert(position_key(position).as_str(), bytes.as_slice())?;
            }

            let mut meta = write_txn.open_table(META_TABLE)?;
            let version = encode_value(&STORE_VERSION)?;
            meta.insert(META_VERSION_KEY, version.as_slice())?;
            let state = encode_value(&ScanState {
                config: config.clone(),
                scanned_at,
            })?;
            meta.insert(META_SCAN_KEY, state.as_slice())?;
        }
        write_txn.commit()?;
        info!(
            "Persisted {} files and {} playlists for {}",
            files.len(),
            playlists.len(),
            config.source
        );
        Ok(scanned_at)
    }

    /// Returns the stored scan only when it was taken with `expected`;
    /// anything else (no scan yet, other root, other limit, older layout)
    /// is `None`.
    pub fn load(
        &self,
        expected: &ScanConfiguration,
    ) -> Result<Option<PersistedCache>, LibraryError> {
        let read_txn = self.db.begin_read()?;
        let meta = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let version: Option<u32> = match meta.get(META_VERSION_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        if version != Some(STORE_VERSION) {
            warn!("Ignoring persisted cache with version {:?}", version);
            return Ok(None);
        }

        let state: ScanState = match meta.get(META_SCAN_KEY)? {
            Some(value) => decode_value(value.value())?,
            None => return Ok(None),
        };
        if &state.config != expected {
            debug!(
                "Persisted scan of {} (max {}) does not match requested {} (max {})",
                state.config.source, state.config.max_files, expected.source, expected.max_files
            );
            return Ok(None);
        }

        let mut files = Vec::new();
        let files_table = read_txn.open_table(FILES_TABLE)?;
        for entry in files_table.iter()? {
            let entry = entry?;
            files.push(decode_value::<AudioFileRecord>(entry.1.value())?);
        }

        let mut playlists = Vec::new();
        let playlists_table = read_txn.open_table(PLAYLISTS_TABLE)?;
        for entry in playlists_table.iter()? {
            let entry = entry?;
            playlists.push(decode_value::<PlaylistRecord>(entry.1.value())?);
        }

        Ok(Some(PersistedCache {
            files,
            playlists,
            config: state.config,
            scanned_at: state.scanned_at,
        }))
    }

    pub fn clear(&self) -> Result<(), LibraryError> {
        let write_txn = self.db.begin_write()?;
        clear_table(&write_txn, META_TABLE)?;
        clear_table(&write_txn, FILES_TABLE)?;
        clear_table(&write_txn, PLAYLISTS_TABLE)?;
        write_txn.commit()?;
        Ok(())
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, LibraryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), LibraryError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

// Zero-padded so key order is insertion order.
fn position_key(position: usize) -> String {
    format!("{:010}", position)
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, LibraryError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, LibraryError> {
    Ok(bincode::deserialize(bytes)?)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis()
        .min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use common::{AudioFileRecord, Handle, PlaylistRecord, ScanConfiguration};

    use super::{position_key, CacheStore};

    fn files(count: usize) -> Vec<AudioFileRecord> {
        (0..count)
            .map(|i| {
                let mut record =
                    AudioFileRecord::untagged(format!("/m/{}.mp3", i), format!("{}.mp3", i));
                record.artist = Some(format!("Artist {}", i % 3));
                record.year = Some(1990 + i as i32);
                record
            })
            .collect()
    }

    fn playlists() -> Vec<PlaylistRecord> {
        vec![PlaylistRecord {
            uri: "/m/mix.m3u".to_string(),
            display_name: "mix.m3u".to_string(),
        }]
    }

    #[test]
    fn position_keys_sort_numerically() {
        assert!(position_key(2) < position_key(10));
        assert!(position_key(99) < position_key(100));
    }

    #[test]
    fn save_then_load_restores_order_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(&dir.path().join("nested").join("cache.redb")).unwrap();
        let config = ScanConfiguration::new(&Handle::new("/m"), 20);
        let saved = files(12);

        let scanned_at = store.save(&saved, &playlists(), &config).unwrap();
        let loaded = store.load(&config).unwrap().expect("cache present");

        assert_eq!(loaded.files, saved);
        assert_eq!(loaded.playlists, playlists());
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.scanned_at, scanned_at);
    }

    #[test]
    fn mismatched_configuration_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(&dir.path().join("cache.redb")).unwrap();
        let config = ScanConfiguration::new(&Handle::new("/m"), 20);
        store.save(&files(2), &[], &config).unwrap();

        let other_root = ScanConfiguration::new(&Handle::new("/other"), 20);
        let other_limit = ScanConfiguration::new(&Handle::new("/m"), 21);
        assert!(store.load(&other_root).unwrap().is_none());
        assert!(store.load(&other_limit).unwrap().is_none());
    }

    #[test]
    fn empty_store_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(&dir.path().join("cache.redb")).unwrap();
        let config = ScanConfiguration::new(&Handle::new("/m"), 20);
        assert!(store.load(&config).unwrap().is_none());
    }

    #[test]
    fn second_save_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(&dir.path().join("cache.redb")).unwrap();
        let first = ScanConfiguration::new(&Handle::new("/m"), 20);
        let second = ScanConfiguration::new(&Handle::new("/m"), 5);
        store.save(&files(10), &playlists(), &first).unwrap();
        store.save(&files(3), &[], &second).unwrap();

        assert!(store.load(&first).unwrap().is_none());
        let loaded = store.load(&second).unwrap().expect("cache present");
        assert_eq!(loaded.files.len(), 3);
        assert!(loaded.playlists.is_empty());
    }

    #[test]
    fn reopened_database_keeps_scan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        let config = ScanConfiguration::new(&Handle::new("/m"), 20);
        {
            let store = CacheStore::open(&path).unwrap();
            store.save(&files(4), &playlists(), &config).unwrap();
        }
        let store = CacheStore::open(&path).unwrap();
        assert_eq!(store.load(&config).unwrap().map(|c| c.files.len()), Some(4));

        store.clear().unwrap();
        assert!(store.load(&config).unwrap().is_none());
    }
}
