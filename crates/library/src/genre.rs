pub const OTHER_GENRE: &str = "Other";

// Checked top to bottom; the first rule with a matching term wins.
const GENRE_RULES: &[(&str, &[&str])] = &[
    ("Hip-Hop", &["hip-hop", "hip hop", "hiphop", "rap", "trap"]),
    ("R&B", &["r&b", "rnb"]),
    (
        "Electronic",
        &["electronic", "edm", "techno", "house", "trance", "dubstep"],
    ),
    ("Rock", &["rock", "alternative", "grunge", "punk"]),
    ("Pop", &["pop", "synthpop"]),
    ("Jazz", &["jazz", "swing", "bebop"]),
    (
        "Classical",
        &["classical", "orchestral", "symphony", "baroque", "opera"],
    ),
    ("Country", &["country", "bluegrass"]),
    ("Metal", &["metal"]),
    ("Reggae", &["reggae", "ska", "dancehall"]),
    ("Latin", &["latin", "salsa", "bachata", "reggaeton", "tango"]),
];

/// Maps a raw genre tag onto the fixed browse taxonomy.
pub fn normalize_genre(raw: Option<&str>) -> &'static str {
    let lower = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => return OTHER_GENRE,
    };
    for &(label, terms) in GENRE_RULES {
        if terms.iter().any(|term| lower.contains(*term)) {
            return label;
        }
    }
    OTHER_GENRE
}
