//! Reference catalog metadata
//!
//! Two sources describe catalog tracks:
//! - the per-row metadata table (CSV), aligned with the embedding matrix rows
//! - the "known songs" text index with curated artist/title per filename,
//!   one `filename ::: artist ::: title` record per line
//!
//! Both are loaded once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Field separator in the known-songs index
const SONG_FIELD_SEPARATOR: &str = " ::: ";

pub const UNKNOWN_TITLE: &str = "Unknown Title";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_GENRE: &str = "Unknown";

/// Catalog loading errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metadata table {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One metadata row. Row `i` describes embedding matrix row `i`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    pub path: String,
    pub label: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
}

/// Per-row metadata table
#[derive(Debug, Clone, Default)]
pub struct CatalogTable {
    entries: Vec<CatalogEntry>,
}

impl CatalogTable {
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Load from a CSV file with a header row. Columns other than `path`,
    /// `label`, `title` and `artist` are ignored.
    pub fn load_csv(path: &Path) -> Result<Self, CatalogError> {
        let csv_error = |source| CatalogError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
        let entries = reader
            .deserialize()
            .collect::<Result<Vec<CatalogEntry>, _>>()
            .map_err(csv_error)?;

        info!(path = %path.display(), rows = entries.len(), "Catalog metadata loaded");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&CatalogEntry> {
        self.entries.get(row)
    }

    /// Display metadata for `row`. A known-songs record matching the row's
    /// file name takes precedence over the row's own columns.
    pub fn resolve_row(&self, row: usize, songs: &KnownSongs) -> Option<TrackInfo> {
        let entry = self.get(row)?;
        let filename = basename(&entry.path);

        if let Some(song) = songs.find_song(filename) {
            return Some(TrackInfo {
                title: song.title.clone(),
                artist: song.artist.clone(),
                genre: song.genre.clone(),
            });
        }

        Some(TrackInfo {
            title: non_empty(&entry.title).unwrap_or(UNKNOWN_TITLE).to_string(),
            artist: non_empty(&entry.artist).unwrap_or(UNKNOWN_ARTIST).to_string(),
            genre: if entry.label.is_empty() {
                UNKNOWN_GENRE.to_string()
            } else {
                entry.label.clone()
            },
        })
    }
}

/// Resolved display metadata for a catalog row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub genre: String,
}

/// Curated record from the known-songs index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnownSong {
    pub filename: String,
    pub artist: String,
    pub title: String,
    pub genre: String,
}

/// Known-songs index keyed by exact file name
#[derive(Debug, Clone, Default)]
pub struct KnownSongs {
    by_filename: HashMap<String, KnownSong>,
}

impl KnownSongs {
    /// Load the index, or an empty one when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            info!(path = %path.display(), "Known-songs index not found, continuing without it");
            return Ok(Self::default());
        }

        let bytes = std::fs::read(path).map_err(|e| CatalogError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let songs = Self::parse(&utf8_lines(&bytes));
        info!(path = %path.display(), songs = songs.len(), "Known-songs index loaded");
        Ok(songs)
    }

    /// Parse index text. Blank lines and lines with fewer than three fields
    /// are skipped; the first record for a file name wins.
    pub fn parse(text: &str) -> Self {
        let mut by_filename = HashMap::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split(SONG_FIELD_SEPARATOR).collect();
            let [filename, artist, title, ..] = fields.as_slice() else {
                debug!(line, "Skipping malformed known-songs line");
                continue;
            };

            by_filename
                .entry(filename.to_string())
                .or_insert_with(|| KnownSong {
                    filename: filename.to_string(),
                    artist: artist.to_string(),
                    title: title.to_string(),
                    genre: genre_from_filename(filename),
                });
        }

        Self { by_filename }
    }

    pub fn len(&self) -> usize {
        self.by_filename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty()
    }

    /// Exact file name lookup
    pub fn find_song(&self, filename: &str) -> Option<&KnownSong> {
        self.by_filename.get(filename)
    }
}

/// Lines of `bytes` that are valid UTF-8, rejoined. Other lines are dropped.
fn utf8_lines(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for (number, line) in bytes.split(|&b| b == b'\n').enumerate() {
        match std::str::from_utf8(line) {
            Ok(line) => {
                text.push_str(line);
                text.push('\n');
            }
            Err(e) => debug!(line = number + 1, error = %e, "Skipping undecodable known-songs line"),
        }
    }
    text
}

/// `"blues.00012.wav"` → `"Blues"`
fn genre_from_filename(filename: &str) -> String {
    capitalize(filename.split('.').next().unwrap_or_default())
}

/// Upper-case the first character and lower-case the rest
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Final path component, accepting either separator
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const INDEX: &str = "\
blues.00000.wav ::: John Lee Hooker ::: One Bourbon, One Scotch, One Beer

  jazz.00003.wav ::: Coleman Hawkins ::: Body and Soul
rock.00001.wav ::: missing title
blues.00000.wav ::: Someone Else ::: Duplicate
HIPHOP.00010.wav ::: Artist ::: Title ::: extra
";

    fn entry(path: &str, label: &str, title: Option<&str>, artist: Option<&str>) -> CatalogEntry {
        CatalogEntry {
            path: path.to_string(),
            label: label.to_string(),
            title: title.map(str::to_string),
            artist: artist.map(str::to_string),
        }
    }

    #[test]
    fn test_parse_known_songs() {
        let songs = KnownSongs::parse(INDEX);
        assert_eq!(songs.len(), 3);

        let jazz = songs.find_song("jazz.00003.wav").unwrap();
        assert_eq!(jazz.artist, "Coleman Hawkins");
        assert_eq!(jazz.title, "Body and Soul");
        assert_eq!(jazz.genre, "Jazz");

        assert!(songs.find_song("rock.00001.wav").is_none());
        assert_eq!(songs.find_song("HIPHOP.00010.wav").unwrap().genre, "Hiphop");
    }

    #[test]
    fn test_first_duplicate_wins() {
        let songs = KnownSongs::parse(INDEX);
        assert_eq!(
            songs.find_song("blues.00000.wav").unwrap().artist,
            "John Lee Hooker"
        );
    }

    #[test]
    fn test_find_song_is_exact() {
        let songs = KnownSongs::parse(INDEX);
        assert!(songs.find_song("Blues.00000.wav").is_none());
        assert!(songs.find_song("blues.00000").is_none());
    }

    #[test]
    fn test_missing_index_file_is_empty() {
        let songs = KnownSongs::load(Path::new("/nonexistent/GTZANindex.txt")).unwrap();
        assert!(songs.is_empty());
    }

    #[test]
    fn test_undecodable_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("GTZANindex.txt");
        let mut bytes = b"blues.00000.wav ::: John Lee Hooker ::: One Bourbon\r\n".to_vec();
        bytes.extend_from_slice(b"pop.00012.wav ::: Beyonc\xe9 ::: Crazy in Love\n");
        bytes.extend_from_slice(b"jazz.00001.wav ::: Coleman Hawkins ::: Body and Soul\n");
        std::fs::write(&path, bytes).unwrap();

        let songs = KnownSongs::load(&path).unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs.find_song("blues.00000.wav").unwrap().title, "One Bourbon");
        assert!(songs.find_song("pop.00012.wav").is_none());
        assert_eq!(songs.find_song("jazz.00001.wav").unwrap().artist, "Coleman Hawkins");
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("blues"), "Blues");
        assert_eq!(capitalize("ROCK"), "Rock");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_resolve_row_prefers_known_song() {
        let songs = KnownSongs::parse(INDEX);
        let table = CatalogTable::from_entries(vec![entry(
            "data/genres/jazz/jazz.00003.wav",
            "jazz",
            Some("Row Title"),
            Some("Row Artist"),
        )]);

        let info = table.resolve_row(0, &songs).unwrap();
        assert_eq!(info.title, "Body and Soul");
        assert_eq!(info.artist, "Coleman Hawkins");
        assert_eq!(info.genre, "Jazz");
    }

    #[test]
    fn test_resolve_row_uses_row_columns_then_fallbacks() {
        let songs = KnownSongs::default();
        let table = CatalogTable::from_entries(vec![
            entry("a/pop.00001.wav", "pop", Some("Row Title"), Some("Row Artist")),
            entry("b\\metal.00002.wav", "", None, Some("")),
        ]);

        let first = table.resolve_row(0, &songs).unwrap();
        assert_eq!(
            first,
            TrackInfo {
                title: "Row Title".to_string(),
                artist: "Row Artist".to_string(),
                genre: "pop".to_string(),
            }
        );

        let second = table.resolve_row(1, &songs).unwrap();
        assert_eq!(second.title, UNKNOWN_TITLE);
        assert_eq!(second.artist, UNKNOWN_ARTIST);
        assert_eq!(second.genre, UNKNOWN_GENRE);

        assert!(table.resolve_row(2, &songs).is_none());
    }

    #[test]
    fn test_load_csv_with_optional_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(
            &path,
            ",path,label,duration\n0,genres/blues/blues.00000.wav,blues,30.0\n1,genres/rock/rock.00001.wav,rock,30.0\n",
        )
        .unwrap();

        let table = CatalogTable::load_csv(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1).unwrap().label, "rock");
        assert_eq!(table.get(1).unwrap().title, None);
    }

    #[test]
    fn test_load_csv_with_all_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(
            &path,
            "path,title,artist,label\nx/jazz.00001.wav,So What,Miles Davis,jazz\n",
        )
        .unwrap();

        let table = CatalogTable::load_csv(&path).unwrap();
        let row = table.get(0).unwrap();
        assert_eq!(row.title.as_deref(), Some("So What"));
        assert_eq!(row.artist.as_deref(), Some("Miles Davis"));
    }

    #[test]
    fn test_load_csv_missing_required_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(&path, "path,title\nx.wav,Song\n").unwrap();

        assert!(matches!(
            CatalogTable::load_csv(&path),
            Err(CatalogError::Csv { .. })
        ));
    }
}
