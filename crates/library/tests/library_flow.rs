use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::Handle;
use library::{
    CacheStore, ColdStart, Dimension, LocalFsProvider, MediaLibrary, MetadataExtractor,
    QueueSource, ScanOptions,
};
use metadata::TagInfo;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tags derived from "<artist> - <title>.<ext>" inside a "<genre> <year>"
/// folder.
struct NameTags;

impl MetadataExtractor for NameTags {
    fn extract(&self, file: &Handle) -> Option<TagInfo> {
        let path = file.to_path();
        let stem = path.file_stem()?.to_string_lossy().to_string();
        let (artist, title) = stem.split_once(" - ")?;
        let folder = path.parent()?.file_name()?.to_string_lossy().to_string();
        let (genre, year) = folder.rsplit_once(' ')?;
        Some(TagInfo {
            title: Some(title.to_string()),
            artist: Some(artist.to_string()),
            album: Some(folder.clone()),
            genre: Some(genre.to_string()),
            year: year.parse().ok(),
            duration_ms: Some(180_000),
        })
    }
}

fn write_tree(root: &Path) {
    let layout = [
        ("Bebop 1959", "Miles Davis - So What.mp3"),
        ("Bebop 1959", "John Coltrane - Giant Steps.flac"),
        ("Hip Hop 1994", "Nas - N.Y. State of Mind.m4a"),
        ("Deep House 2001", "Daft Punk - One More Time.ogg"),
    ];
    for (folder, file) in layout {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), b"audio").unwrap();
    }
    fs::write(root.join("loose track.wav"), b"audio").unwrap();
    fs::write(root.join("notes.txt"), b"ignored").unwrap();
    fs::write(
        root.join("Favorites.m3u"),
        "#EXTM3U\n#EXTINF:-1,So What\n/elsewhere/so-what.mp3\n",
    )
    .unwrap();
}

fn open(store_path: &Path) -> MediaLibrary {
    MediaLibrary::new(
        Arc::new(LocalFsProvider::new()),
        Arc::new(NameTags),
        CacheStore::open(store_path).unwrap(),
        ScanOptions {
            batch_size: 2,
            workers: 2,
            ..ScanOptions::default()
        },
    )
}

#[tokio::test]
async fn scan_persist_restore_and_browse() {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    write_tree(&music);
    let root = Handle::from_path(&music);
    let store_path = dir.path().join("state").join("media_cache.redb");
    let cancel = CancellationToken::new();

    let library = open(&store_path);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = library
        .restore_or_scan(&root, 20, Some(&tx), &cancel)
        .await
        .unwrap();
    drop(tx);

    let stats = match outcome {
        ColdStart::Scanned(stats) => stats,
        other => panic!("expected a fresh scan, got {:?}", other),
    };
    assert_eq!(stats.files_found, 5);
    assert_eq!(stats.folders_visited, 4);
    let mut last = None;
    while let Some(update) = rx.recv().await {
        last = Some(update.files_found);
    }
    assert_eq!(last, Some(5));

    assert_eq!(
        library.labels(Dimension::Genre),
        vec!["Electronic", "Hip-Hop", "Jazz", "Other"]
    );
    assert_eq!(
        library.labels(Dimension::Decade).first().map(String::as_str),
        Some("1950s")
    );
    let jazz: Vec<_> = library
        .songs_for(Dimension::Genre, "Jazz")
        .into_iter()
        .map(|song| song.title)
        .collect();
    assert_eq!(jazz, vec!["Giant Steps", "So What"]);
    assert_eq!(library.search("nas").len(), 1);
    assert_eq!(library.discovered_playlists().len(), 1);
    let before = library.cached_files();
    drop(library);

    let restored = open(&store_path);
    let outcome = restored
        .restore_or_scan(&root, 20, None, &cancel)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ColdStart::Restored {
            files: 5,
            playlists: 1
        }
    );
    assert_eq!(restored.cached_files(), before);
    assert!(!restored.has_indexes());
    assert_eq!(restored.songs_for(Dimension::Artist, "Nas").len(), 1);
    assert!(restored.has_indexes());

    let favorites = restored
        .build_queue(
            &QueueSource::Playlist(restored.discovered_playlists()[0].uri.clone()),
            false,
        )
        .unwrap();
    assert_eq!(favorites.name(), "Favorites");
    assert_eq!(favorites.current().map(|s| s.title.as_str()), Some("So What"));
}

#[tokio::test]
async fn playlist_round_trip_through_the_library() {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    write_tree(&music);
    let root = Handle::from_path(&music);
    let library = open(&dir.path().join("cache.redb"));
    library
        .scan(&root, 20, None, &CancellationToken::new())
        .await;

    let picks = library.songs_for(Dimension::Genre, "Jazz");
    let created = library.create_playlist(None, &picks).unwrap();
    assert!(created.display_name.starts_with("playlist_"));

    let read = library.read_playlist(&created.uri).unwrap();
    let uris: Vec<_> = read.iter().map(|song| song.uri.clone()).collect();
    let expected: Vec<_> = picks.iter().map(|song| song.uri.clone()).collect();
    assert_eq!(uris, expected);

    let extra = library.songs_for(Dimension::Artist, "Nas");
    library.append_to_playlist(&created.uri, &extra).unwrap();
    assert_eq!(library.read_playlist(&created.uri).unwrap().len(), 3);

    library.delete_playlist(&created.uri).unwrap();
    assert!(!library
        .discovered_playlists()
        .iter()
        .any(|playlist| playlist.uri == created.uri));
    assert_eq!(library.cached_files().len(), 5);
}
