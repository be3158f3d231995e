use std::fmt;

use common::AudioFileRecord;
use library::{Dimension, MediaLibrary, QueueSource};
use serde::Serialize;

pub const USAGE: &str = "usage: player [scan [--force] | songs | labels <dim> | bucket <dim> <letter> | \
songs-for <dim> <label> | search <query> | playlists | playlist-create <name> <query> | \
playlist-read <uri> | playlist-delete <uri> | queue <dim> <label> [--shuffle]]";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Scan { force: bool },
    Songs,
    Labels(Dimension),
    Bucket(Dimension, String),
    SongsFor(Dimension, String),
    Search(String),
    Playlists,
    PlaylistCreate { name: String, query: String },
    PlaylistRead(String),
    PlaylistDelete(String),
    Queue {
        dimension: Dimension,
        label: String,
        shuffle: bool,
    },
}

#[derive(Debug)]
pub struct UsageError(String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.0, USAGE)
    }
}

impl std::error::Error for UsageError {}

fn usage(message: impl Into<String>) -> UsageError {
    UsageError(message.into())
}

impl Command {
    pub fn parse<I>(args: I) -> Result<Self, UsageError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args: Vec<String> = args.into_iter().collect();
        let shuffle = take_flag(&mut args, "--shuffle");
        let force = take_flag(&mut args, "--force");
        let mut args = args.into_iter();

        let name = match args.next() {
            Some(name) => name,
            None => return Ok(Command::Scan { force }),
        };
        let command = match name.as_str() {
            "scan" => Command::Scan { force },
            "songs" => Command::Songs,
            "labels" => Command::Labels(dimension(args.next())?),
            "bucket" => {
                let dimension = dimension(args.next())?;
                Command::Bucket(dimension, required(args.next(), "letter")?)
            }
            "songs-for" => {
                let dimension = dimension(args.next())?;
                Command::SongsFor(dimension, rest(args, "label")?)
            }
            "search" => Command::Search(rest(args, "query")?),
            "playlists" => Command::Playlists,
            "playlist-create" => {
                let name = required(args.next(), "name")?;
                Command::PlaylistCreate {
                    name,
                    query: rest(args, "query")?,
                }
            }
            "playlist-read" => Command::PlaylistRead(required(args.next(), "uri")?),
            "playlist-delete" => Command::PlaylistDelete(required(args.next(), "uri")?),
            "queue" => {
                let dimension = dimension(args.next())?;
                Command::Queue {
                    dimension,
                    label: rest(args, "label")?,
                    shuffle,
                }
            }
            other => return Err(usage(format!("unknown command: {}", other))),
        };
        Ok(command)
    }

    pub fn force_rescan(&self) -> bool {
        matches!(self, Command::Scan { force: true })
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    args.len() != before
}

fn required(value: Option<String>, what: &str) -> Result<String, UsageError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(usage(format!("missing {}", what))),
    }
}

// Labels and queries may contain spaces; everything left is joined back.
fn rest(args: impl Iterator<Item = String>, what: &str) -> Result<String, UsageError> {
    let joined = args.collect::<Vec<_>>().join(" ");
    required(Some(joined), what)
}

fn dimension(value: Option<String>) -> Result<Dimension, UsageError> {
    let value = required(value, "dimension")?;
    Dimension::parse(&value).ok_or_else(|| usage(format!("unknown dimension: {}", value)))
}

#[derive(Serialize)]
struct SongLine<'a> {
    uri: &'a str,
    title: &'a str,
    artist: Option<&'a str>,
    album: Option<&'a str>,
    genre: Option<&'a str>,
    year: Option<i32>,
}

impl<'a> From<&'a AudioFileRecord> for SongLine<'a> {
    fn from(record: &'a AudioFileRecord) -> Self {
        Self {
            uri: &record.uri,
            title: &record.title,
            artist: record.artist.as_deref(),
            album: record.album.as_deref(),
            genre: record.genre.as_deref(),
            year: record.year,
        }
    }
}

fn print_songs(songs: &[AudioFileRecord]) -> Result<(), serde_json::Error> {
    for song in songs {
        println!("{}", serde_json::to_string(&SongLine::from(song))?);
    }
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

/// Runs one browse or playlist command against a ready library. Scanning
/// has already happened by the time this is called.
pub fn run(library: &MediaLibrary, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Scan { .. } => {
            println!(
                "{} songs, {} playlists cached",
                library.cached_files().len(),
                library.discovered_playlists().len()
            );
        }
        Command::Songs => print_songs(&library.cached_files())?,
        Command::Labels(dimension) => match library.label_buckets(dimension) {
            Some(buckets) => print_lines(&buckets),
            None => print_lines(&library.labels(dimension)),
        },
        Command::Bucket(dimension, letter) => {
            print_lines(&library.labels_in_bucket(dimension, &letter))
        }
        Command::SongsFor(dimension, label) => {
            print_songs(&library.songs_for(dimension, &label))?
        }
        Command::Search(query) => print_songs(&library.search(&query))?,
        Command::Playlists => {
            for playlist in library.discovered_playlists() {
                println!("{}\t{}", playlist.title(), playlist.uri);
            }
        }
        Command::PlaylistCreate { name, query } => {
            let songs = library.search(&query);
            let record = library.create_playlist(Some(&name), &songs)?;
            println!("Created {} with {} songs", record.display_name, songs.len());
        }
        Command::PlaylistRead(uri) => print_songs(&library.read_playlist(&uri)?)?,
        Command::PlaylistDelete(uri) => {
            library.delete_playlist(&uri)?;
            println!("Deleted {}", uri);
        }
        Command::Queue {
            dimension,
            label,
            shuffle,
        } => {
            let source = QueueSource::Category(dimension, label.clone());
            match library.build_queue(&source, shuffle) {
                Some(queue) => {
                    println!("Queue {} ({} songs)", queue.name(), queue.len());
                    print_songs(queue.items())?;
                }
                None => println!("Nothing to play for {}", label),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use library::Dimension;

    use super::Command;

    fn parse(line: &str) -> Result<Command, super::UsageError> {
        Command::parse(line.split_whitespace().map(String::from))
    }

    #[test]
    fn empty_arguments_mean_scan() {
        assert_eq!(parse("").unwrap(), Command::Scan { force: false });
        assert!(parse("scan --force").unwrap().force_rescan());
    }

    #[test]
    fn multi_word_labels_are_joined() {
        assert_eq!(
            parse("songs-for artist Miles Davis").unwrap(),
            Command::SongsFor(Dimension::Artist, "Miles Davis".to_string())
        );
        assert_eq!(
            parse("queue --shuffle decade 1990s").unwrap(),
            Command::Queue {
                dimension: Dimension::Decade,
                label: "1990s".to_string(),
                shuffle: true,
            }
        );
        assert_eq!(
            parse("playlist-create Late jazz night").unwrap(),
            Command::PlaylistCreate {
                name: "Late".to_string(),
                query: "jazz night".to_string(),
            }
        );
    }

    #[test]
    fn bad_input_is_a_usage_error() {
        assert!(parse("labels mood").is_err());
        assert!(parse("search").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("playlist-read").is_err());
    }
}
