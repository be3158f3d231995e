use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use common::Handle;
use walkdir::WalkDir;

pub const DIRECTORY_MIME: &str = "inode/directory";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentEntry {
    pub handle: Handle,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Milliseconds since the unix epoch.
    pub last_modified: Option<i64>,
}

impl DocumentEntry {
    pub fn is_directory(&self) -> bool {
        self.mime_type == DIRECTORY_MIME
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// Hierarchical document store reachable only through opaque handles.
///
/// Every call may fail; callers treat a failure as "this item is
/// unavailable" rather than as fatal.
pub trait StorageProvider: Send + Sync {
    fn list_children(&self, folder: &Handle) -> io::Result<Vec<DocumentEntry>>;

    fn open_read(&self, file: &Handle) -> io::Result<Box<dyn Read + Send>>;

    fn open_write(&self, file: &Handle, mode: WriteMode) -> io::Result<Box<dyn Write + Send>>;

    fn create_file(&self, parent: &Handle, mime_type: &str, name: &str) -> io::Result<Handle>;

    fn delete_file(&self, file: &Handle) -> io::Result<()>;

    fn find_child(&self, parent: &Handle, name: &str) -> io::Result<Option<Handle>> {
        let found = self
            .list_children(parent)?
            .into_iter()
            .find(|entry| !entry.is_directory() && entry.name == name)
            .map(|entry| entry.handle);
        Ok(found)
    }
}

/// Provider over the local filesystem; handles are absolute paths.
#[derive(Clone, Debug, Default)]
pub struct LocalFsProvider;

impl LocalFsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl StorageProvider for LocalFsProvider {
    fn list_children(&self, folder: &Handle) -> io::Result<Vec<DocumentEntry>> {
        let dir = folder.to_path();
        if !fs::metadata(&dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a folder: {}", dir.display()),
            ));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("folder listing failed")));
                }
                Err(_) => continue,
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|value| value.as_millis().min(i64::MAX as u128) as i64);
            let (mime_type, size) = if metadata.is_dir() {
                (DIRECTORY_MIME.to_string(), 0)
            } else {
                (guess_mime(entry.path()), metadata.len())
            };
            entries.push(DocumentEntry {
                handle: Handle::from_path(entry.path()),
                name,
                mime_type,
                size,
                last_modified,
            });
        }
        Ok(entries)
    }

    fn open_read(&self, file: &Handle) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(file.to_path())?))
    }

    fn open_write(&self, file: &Handle, mode: WriteMode) -> io::Result<Box<dyn Write + Send>> {
        let mut options = OpenOptions::new();
        match mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        Ok(Box::new(options.open(file.to_path())?))
    }

    fn create_file(&self, parent: &Handle, _mime_type: &str, name: &str) -> io::Result<Handle> {
        let dir = parent.to_path();
        if !fs::metadata(&dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a folder: {}", dir.display()),
            ));
        }
        let mut attempt = 0u32;
        loop {
            let path = dir.join(numbered_name(name, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Handle::from_path(&path)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists && attempt < 1000 => {
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn delete_file(&self, file: &Handle) -> io::Result<()> {
        fs::remove_file(file.to_path())
    }
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// `name`, then `name (1).ext`, `name (2).ext`, ... for taken names.
fn numbered_name(name: &str, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return PathBuf::from(name);
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            PathBuf::from(format!("{} ({}).{}", stem, attempt, ext))
        }
        _ => PathBuf::from(format!("{} ({})", name, attempt)),
    }
}
