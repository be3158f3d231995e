use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use common::{AudioFileRecord, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_DECADE};

use crate::genre::normalize_genre;

/// Label lists longer than this are browsed through letter buckets.
pub const BUCKET_THRESHOLD: usize = 500;
pub const OTHER_BUCKET: &str = "#";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Album,
    Artist,
    Genre,
    Decade,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Album,
        Dimension::Artist,
        Dimension::Genre,
        Dimension::Decade,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "album" | "albums" => Some(Self::Album),
            "artist" | "artists" => Some(Self::Artist),
            "genre" | "genres" => Some(Self::Genre),
            "decade" | "decades" => Some(Self::Decade),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Album => "album",
            Dimension::Artist => "artist",
            Dimension::Genre => "genre",
            Dimension::Decade => "decade",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Buckets = BTreeMap<String, Vec<AudioFileRecord>>;

/// Album, artist, genre and decade groupings derived from one cache snapshot.
#[derive(Debug, Default)]
pub struct CategoryIndex {
    albums: Buckets,
    artists: Buckets,
    genres: Buckets,
    decades: Buckets,
    built_at: Option<u64>,
}

impl CategoryIndex {
    pub fn build(snapshot: &[AudioFileRecord], generation: u64) -> Self {
        let mut index = Self::default();
        index.rebuild(snapshot, generation);
        index
    }

    /// Clears every mapping and refills all four in one pass; each record
    /// lands in exactly one bucket per dimension.
    pub fn rebuild(&mut self, snapshot: &[AudioFileRecord], generation: u64) {
        self.albums.clear();
        self.artists.clear();
        self.genres.clear();
        self.decades.clear();

        for record in snapshot {
            let album = label_or(record.album.as_deref(), UNKNOWN_ALBUM);
            let artist = label_or(record.artist.as_deref(), UNKNOWN_ARTIST);
            let genre = normalize_genre(record.genre.as_deref()).to_string();
            let decade = decade_label(record.year);

            self.albums.entry(album).or_default().push(record.clone());
            self.artists.entry(artist).or_default().push(record.clone());
            self.genres.entry(genre).or_default().push(record.clone());
            self.decades.entry(decade).or_default().push(record.clone());
        }

        self.built_at = Some(generation);
    }

    pub fn is_built(&self) -> bool {
        self.built_at.is_some()
    }

    pub fn built_generation(&self) -> Option<u64> {
        self.built_at
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.built_at == Some(generation)
    }

    pub fn labels(&self, dimension: Dimension) -> Vec<String> {
        let labels: Vec<String> = self.buckets(dimension).keys().cloned().collect();
        match dimension {
            Dimension::Decade => sort_decades(labels),
            _ => labels,
        }
    }

    pub fn songs_for(&self, dimension: Dimension, label: &str) -> Vec<AudioFileRecord> {
        self.buckets(dimension)
            .get(label)
            .cloned()
            .unwrap_or_default()
    }

    fn buckets(&self, dimension: Dimension) -> &Buckets {
        match dimension {
            Dimension::Album => &self.albums,
            Dimension::Artist => &self.artists,
            Dimension::Genre => &self.genres,
            Dimension::Decade => &self.decades,
        }
    }
}

fn label_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.to_string(),
    }
}

pub fn decade_label(year: Option<i32>) -> String {
    match year {
        Some(year) if year > 0 => format!("{}s", (year / 10) * 10),
        _ => UNKNOWN_DECADE.to_string(),
    }
}

/// Ascending by decade value, with the unknown bucket always last.
pub fn sort_decades(mut labels: Vec<String>) -> Vec<String> {
    labels.sort_by_key(|label| decade_value(label).unwrap_or(i32::MAX));
    labels
}

fn decade_value(label: &str) -> Option<i32> {
    if label == UNKNOWN_DECADE {
        return None;
    }
    label.strip_suffix('s')?.parse().ok()
}

fn bucket_letter(value: &str) -> Option<char> {
    value
        .trim()
        .chars()
        .next()
        .map(|ch| ch.to_ascii_uppercase())
        .filter(|ch| ch.is_ascii_uppercase())
}

/// Distinct first letters `A`-`Z` in order, then `#` when anything else
/// (digits, symbols, blank) is present.
pub fn letter_buckets(values: &[String]) -> Vec<String> {
    let mut letters = BTreeSet::new();
    let mut has_other = false;
    for value in values {
        match bucket_letter(value) {
            Some(letter) => {
                letters.insert(letter);
            }
            None => has_other = true,
        }
    }
    let mut buckets: Vec<String> = letters.into_iter().map(String::from).collect();
    if has_other {
        buckets.push(OTHER_BUCKET.to_string());
    }
    buckets
}

pub fn filter_by_letter(values: &[String], bucket: &str) -> Vec<String> {
    let mut matched: Vec<String> = if bucket == OTHER_BUCKET {
        values
            .iter()
            .filter(|value| bucket_letter(value).is_none())
            .cloned()
            .collect()
    } else {
        let target = match bucket_letter(bucket) {
            Some(letter) => letter,
            None => return Vec::new(),
        };
        values
            .iter()
            .filter(|value| bucket_letter(value) == Some(target))
            .cloned()
            .collect()
    };
    matched.sort();
    matched
}

#[cfg(test)]
mod tests {
    use common::AudioFileRecord;

    use super::{
        decade_label, filter_by_letter, letter_buckets, sort_decades, CategoryIndex, Dimension,
    };

    fn song(
        uri: &str,
        artist: Option<&str>,
        album: Option<&str>,
        genre: Option<&str>,
        year: Option<i32>,
    ) -> AudioFileRecord {
        let mut record = AudioFileRecord::untagged(uri, format!("{}.mp3", uri));
        record.artist = artist.map(String::from);
        record.album = album.map(String::from);
        record.genre = genre.map(String::from);
        record.year = year;
        record
    }

    fn sample() -> Vec<AudioFileRecord> {
        vec![
            song("1", Some("Nas"), Some("Illmatic"), Some("Hip-Hop"), Some(1994)),
            song("2", Some("Miles Davis"), Some("Kind of Blue"), Some("Jazz"), Some(1959)),
            song("3", None, Some(" "), None, None),
            song("4", Some("Nas"), Some("Illmatic"), Some("Hip-Hop"), Some(1994)),
            song("5", Some("Daft Punk"), Some("Discovery"), Some("House"), Some(2001)),
        ]
    }

    #[test]
    fn decade_labels() {
        assert_eq!(decade_label(Some(1994)), "1990s");
        assert_eq!(decade_label(Some(2000)), "2000s");
        assert_eq!(decade_label(Some(0)), "Unknown Decade");
        assert_eq!(decade_label(Some(-5)), "Unknown Decade");
        assert_eq!(decade_label(None), "Unknown Decade");
    }

    #[test]
    fn decades_sort_numerically_with_unknown_last() {
        let sorted = sort_decades(vec![
            "Unknown Decade".to_string(),
            "2000s".to_string(),
            "950s".to_string(),
            "1990s".to_string(),
        ]);
        assert_eq!(sorted, vec!["950s", "1990s", "2000s", "Unknown Decade"]);
    }

    #[test]
    fn every_record_lands_once_per_dimension() {
        let songs = sample();
        let index = CategoryIndex::build(&songs, 7);
        for dimension in Dimension::ALL {
            let total: usize = index
                .labels(dimension)
                .iter()
                .map(|label| index.songs_for(dimension, label).len())
                .sum();
            assert_eq!(total, songs.len(), "dimension {}", dimension);
        }
        assert!(index.is_current(7));
        assert!(!index.is_current(8));
    }

    #[test]
    fn blank_tags_fall_back_to_unknown_labels() {
        let index = CategoryIndex::build(&sample(), 1);
        assert_eq!(
            index.labels(Dimension::Album),
            vec!["Discovery", "Illmatic", "Kind of Blue", "Unknown Album"]
        );
        assert_eq!(
            index.labels(Dimension::Artist),
            vec!["Daft Punk", "Miles Davis", "Nas", "Unknown Artist"]
        );
        assert_eq!(
            index.labels(Dimension::Genre),
            vec!["Electronic", "Hip-Hop", "Jazz", "Other"]
        );
        assert_eq!(
            index.labels(Dimension::Decade),
            vec!["1950s", "1990s", "2000s", "Unknown Decade"]
        );
        let nas: Vec<_> = index
            .songs_for(Dimension::Artist, "Nas")
            .into_iter()
            .map(|r| r.uri)
            .collect();
        assert_eq!(nas, vec!["1", "4"]);
        assert!(index.songs_for(Dimension::Album, "Nope").is_empty());
    }

    #[test]
    fn rebuild_is_idempotent() {
        let songs = sample();
        let mut index = CategoryIndex::build(&songs, 3);
        let before: Vec<_> = Dimension::ALL
            .iter()
            .map(|d| {
                let labels = index.labels(*d);
                let songs: Vec<_> = labels.iter().map(|l| index.songs_for(*d, l)).collect();
                (labels, songs)
            })
            .collect();
        index.rebuild(&songs, 3);
        let after: Vec<_> = Dimension::ALL
            .iter()
            .map(|d| {
                let labels = index.labels(*d);
                let songs: Vec<_> = labels.iter().map(|l| index.songs_for(*d, l)).collect();
                (labels, songs)
            })
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn empty_index_is_not_built() {
        let index = CategoryIndex::default();
        assert!(!index.is_built());
        assert!(index.labels(Dimension::Genre).is_empty());
    }

    #[test]
    fn letter_buckets_put_non_letters_last() {
        let values: Vec<String> = ["beta", "Alpha", "42nd Street", "apple", " ", "Zed"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(letter_buckets(&values), vec!["A", "B", "Z", "#"]);
        assert_eq!(filter_by_letter(&values, "a"), vec!["Alpha", "apple"]);
        assert_eq!(filter_by_letter(&values, "#"), vec![" ", "42nd Street"]);
        assert!(filter_by_letter(&values, "!").is_empty());
    }

    #[test]
    fn dimension_parsing() {
        assert_eq!(Dimension::parse("Artists"), Some(Dimension::Artist));
        assert_eq!(Dimension::parse(" decade "), Some(Dimension::Decade));
        assert_eq!(Dimension::parse("mood"), None);
    }
}
