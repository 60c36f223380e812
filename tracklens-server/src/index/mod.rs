//! Exact inner-product search over the reference catalog embeddings
//!
//! The matrix is L2-normalized row by row on load, so inner product equals
//! cosine similarity against a normalized query.

pub mod npy;

use ndarray::{Array2, ArrayD, ArrayView1, Axis, Ix2};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::catalog::CatalogTable;

/// Vector index errors
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Embedding matrix must be 2-D, got shape {0:?}")]
    Shape(Vec<usize>),

    #[error("Invalid embedding matrix file: {0}")]
    Format(String),

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Query has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding matrix has {vectors} rows but metadata has {rows}")]
    RowMismatch { vectors: usize, rows: usize },
}

/// One search hit: matrix row and its inner-product score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub score: f32,
}

/// Flat (brute-force) inner-product index
#[derive(Debug, Clone)]
pub struct VectorIndex {
    vectors: Array2<f32>,
}

impl VectorIndex {
    /// Build from a matrix of any rank; only 2-D input is accepted.
    pub fn from_matrix(matrix: ArrayD<f32>) -> Result<Self, IndexError> {
        let shape = matrix.shape().to_vec();
        let matrix = matrix
            .into_dimensionality::<Ix2>()
            .map_err(|_| IndexError::Shape(shape))?;

        if let Some(((row, col), value)) = matrix.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(IndexError::Format(format!(
                "non-finite value {} at row {}, column {}",
                value, row, col
            )));
        }

        let mut vectors = matrix.as_standard_layout().into_owned();
        for mut row in vectors.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }
        Ok(Self { vectors })
    }

    pub fn load_npy(path: &Path) -> Result<Self, IndexError> {
        let index = Self::from_matrix(npy::read_npy(path)?)?;
        info!(
            path = %path.display(),
            rows = index.len(),
            dim = index.dim(),
            "Embedding matrix loaded"
        );
        Ok(index)
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension
    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    /// Top `min(k, len)` rows by inner product with `query`, best first.
    /// Equal scores are ordered by ascending row.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dim() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dim(),
                actual: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::Format("query has non-finite values".to_string()));
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));
        let mut hits: Vec<Neighbor> = scores
            .iter()
            .enumerate()
            .map(|(row, &score)| Neighbor { row, score })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.row.cmp(&b.row)));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Vector index joined with its per-row metadata, or nothing when the
/// catalog files were absent at startup
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    loaded: Option<(VectorIndex, CatalogTable)>,
}

impl SearchIndex {
    /// Pair an index with its metadata. Row counts must agree.
    pub fn new(vectors: VectorIndex, table: CatalogTable) -> Result<Self, IndexError> {
        if vectors.len() != table.len() {
            return Err(IndexError::RowMismatch {
                vectors: vectors.len(),
                rows: table.len(),
            });
        }
        Ok(Self {
            loaded: Some((vectors, table)),
        })
    }

    /// Index with no catalog; every query returns no hits.
    pub fn unavailable() -> Self {
        Self { loaded: None }
    }

    pub fn available(&self) -> bool {
        self.loaded.is_some()
    }

    /// Number of catalog rows (0 when unavailable)
    pub fn len(&self) -> usize {
        self.loaded.as_ref().map_or(0, |(vectors, _)| vectors.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> Option<&CatalogTable> {
        self.loaded.as_ref().map(|(_, table)| table)
    }

    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        match &self.loaded {
            Some((vectors, _)) => vectors.search(embedding, k),
            None => Ok(Vec::new()),
        }
    }
}
