use common::Handle;
use metadata::{read_tags, TagInfo};
use tracing::debug;

/// Best-effort tag reader. Returns `None` on any failure and never panics
/// past its boundary; callers fall back to filesystem-derived values.
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, file: &Handle) -> Option<TagInfo>;
}

/// Reads tags from local files through `lofty`.
#[derive(Clone, Debug, Default)]
pub struct LoftyExtractor;

impl MetadataExtractor for LoftyExtractor {
    fn extract(&self, file: &Handle) -> Option<TagInfo> {
        match read_tags(&file.to_path()) {
            Ok(info) => Some(info),
            Err(err) => {
                debug!("No tags for {}: {}", file, err);
                None
            }
        }
    }
}

/// Extractor that never finds anything; scans then rely purely on names
/// and modification times.
#[derive(Clone, Debug, Default)]
pub struct NoTags;

impl MetadataExtractor for NoTags {
    fn extract(&self, _file: &Handle) -> Option<TagInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use common::Handle;

    use super::{LoftyExtractor, MetadataExtractor, NoTags};

    #[test]
    fn unreadable_audio_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        fs::write(&path, b"not really audio").unwrap();
        assert!(LoftyExtractor.extract(&Handle::from_path(&path)).is_none());
        assert!(NoTags.extract(&Handle::from_path(&path)).is_none());
    }
}
