use common::AudioFileRecord;

/// Linear, case-insensitive substring match over title, artist, album and
/// genre. Blank queries match nothing.
pub fn search(files: &[AudioFileRecord], query: &str) -> Vec<AudioFileRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    files
        .iter()
        .filter(|record| matches(record, &needle))
        .cloned()
        .collect()
}

fn matches(record: &AudioFileRecord, needle: &str) -> bool {
    if record.title.to_lowercase().contains(needle) {
        return true;
    }
    [&record.artist, &record.album, &record.genre]
        .into_iter()
        .flatten()
        .any(|value| value.to_lowercase().contains(needle))
}
