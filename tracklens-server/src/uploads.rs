//! Upload storage
//!
//! Client file names are sanitized before touching the filesystem, only
//! audio extensions are accepted, and request handlers hold an
//! [`UploadGuard`] so the stored file is removed on every exit path.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;

/// Extensions accepted for upload (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["wav", "mp3", "ogg", "flac"];

/// Reduce a client-supplied file name to a safe ASCII name.
///
/// The name is NFKD-decomposed and whatever is still non-ASCII is dropped
/// (`ï` keeps its `i`), path separators become spaces, runs of
/// whitespace become a single `_`, anything outside `[A-Za-z0-9_.-]` is
/// removed, and leading/trailing `.` and `_` are stripped. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c == '_')
        .to_string()
}

/// True when `filename` has an allowed audio extension.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// Directory holding uploaded files under their sanitized names
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Use `dir` for uploads, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location for an already-sanitized file name
    pub fn path_for(&self, sanitized: &str) -> PathBuf {
        self.dir.join(sanitized)
    }

    /// Write an upload, replacing any previous file of the same name.
    pub async fn save(&self, sanitized: &str, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(sanitized);
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "Upload stored");
        Ok(path)
    }
}

/// Deletes an uploaded file when dropped unless [`keep`](Self::keep) was
/// called. A file that is already gone is not an error.
#[derive(Debug)]
pub struct UploadGuard {
    path: PathBuf,
    armed: bool,
}

impl UploadGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Leave the file in place after the guard is dropped.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Upload removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove upload"),
        }
    }
}
