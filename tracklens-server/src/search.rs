//! Similarity query orchestration
//!
//! normalize → embed → search → join metadata → score → rank

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{AudioError, AudioNormalizer};
use crate::catalog::KnownSongs;
use crate::embedding::{EmbeddingError, EmbeddingExtractor};
use crate::index::{IndexError, SearchIndex};
use crate::uploads::UploadGuard;

/// Album name reported for every catalog track unless configured otherwise
pub const DEFAULT_CATALOG_NAME: &str = "GTZAN Dataset";

/// Similarity query errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("File not found on server")]
    NotFound(PathBuf),

    #[error(transparent)]
    Pipeline(PipelineError),
}

/// Failure inside the normalize/embed/search pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<AudioError> for SearchError {
    fn from(e: AudioError) -> Self {
        SearchError::Pipeline(e.into())
    }
}

impl From<EmbeddingError> for SearchError {
    fn from(e: EmbeddingError) -> Self {
        SearchError::Pipeline(e.into())
    }
}

impl From<IndexError> for SearchError {
    fn from(e: IndexError) -> Self {
        SearchError::Pipeline(e.into())
    }
}

/// One ranked catalog match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// 1-based rank
    pub id: usize,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Percentage in `[0, 100]`, three decimals
    pub similarity: f64,
    pub genre: String,
}

/// Convert an inner-product score to a clamped percentage with three
/// decimals.
pub fn similarity_percent(score: f32) -> f64 {
    let percent = (score as f64 * 100.0 * 1000.0).round() / 1000.0;
    percent.clamp(0.0, 100.0)
}

/// Finds the catalog tracks closest to an uploaded clip
#[derive(Debug, Clone)]
pub struct SimilaritySearch {
    normalizer: AudioNormalizer,
    extractor: EmbeddingExtractor,
    index: Arc<SearchIndex>,
    songs: Arc<KnownSongs>,
    catalog_name: String,
}

impl SimilaritySearch {
    pub fn new(
        normalizer: AudioNormalizer,
        extractor: EmbeddingExtractor,
        index: Arc<SearchIndex>,
        songs: Arc<KnownSongs>,
        catalog_name: impl Into<String>,
    ) -> Self {
        Self {
            normalizer,
            extractor,
            index,
            songs,
            catalog_name: catalog_name.into(),
        }
    }

    pub fn extractor(&self) -> &EmbeddingExtractor {
        &self.extractor
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub fn songs(&self) -> &Arc<KnownSongs> {
        &self.songs
    }

    /// Rank the `k` catalog tracks most similar to the clip at `upload`.
    ///
    /// The uploaded file is deleted before returning, whatever the outcome.
    /// When no catalog is loaded the result is empty and the clip is not
    /// decoded.
    pub fn top_k(&self, upload: &Path, k: usize) -> Result<Vec<SearchResult>, SearchError> {
        let _guard = UploadGuard::new(upload);

        if !upload.is_file() {
            return Err(SearchError::NotFound(upload.to_path_buf()));
        }

        if !self.index.available() {
            debug!(path = %upload.display(), "No catalog loaded, returning no matches");
            return Ok(Vec::new());
        }

        let signal = self.normalizer.normalize(upload)?;
        let embedding = self.extractor.extract(&signal)?;
        let neighbors = self.index.query(&embedding, k)?;

        let results: Vec<SearchResult> = match self.index.table() {
            Some(table) => neighbors
                .iter()
                .filter_map(|n| table.resolve_row(n.row, &self.songs).map(|info| (n, info)))
                .enumerate()
                .map(|(rank, (neighbor, info))| SearchResult {
                    id: rank + 1,
                    title: info.title,
                    artist: info.artist,
                    album: self.catalog_name.clone(),
                    similarity: similarity_percent(neighbor.score),
                    genre: info.genre,
                })
                .collect(),
            None => Vec::new(),
        };

        info!(
            path = %upload.display(),
            k,
            matches = results.len(),
            best = ?results.first().map(|r| r.similarity),
            "Similarity search complete"
        );
        Ok(results)
    }
}
