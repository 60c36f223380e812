//! Startup routine: builds every shared component from the resolved
//! configuration.
//!
//! Optional inputs degrade gracefully: a missing model leaves its component
//! in a "not loaded" state and missing catalog files disable similarity
//! search. Catalog files that exist but cannot be used abort startup.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::AudioNormalizer;
use crate::catalog::{CatalogTable, KnownSongs};
use crate::classifier::{AudioClassifier, OnnxClassifier};
use crate::config::ServerConfig;
use crate::embedding::{EmbeddingExtractor, OnnxFrameEmbedder};
use crate::index::{SearchIndex, VectorIndex};
use crate::onnx::ExecutionDevice;
use crate::search::SimilaritySearch;
use crate::uploads::UploadStore;
use crate::AppState;

/// Build the application state.
pub fn initialize(config: &ServerConfig) -> Result<AppState> {
    let paths = &config.paths;

    let uploads = UploadStore::new(&paths.uploads).with_context(|| {
        format!("Failed to create uploads directory {}", paths.uploads.display())
    })?;

    let device = ExecutionDevice::select(config.device.prefer_gpu);
    let threads = config.device.intra_threads;
    info!(%device, intra_threads = threads, "Inference device selected");

    let classifier_settings = config.classifier.settings();
    let classifier = match OnnxClassifier::load(&paths.classifier_model, device, threads) {
        Ok(model) => AudioClassifier::new(Arc::new(model), classifier_settings),
        Err(e) => {
            warn!(error = %e, "Classifier disabled, /api/predict will fail");
            AudioClassifier::unloaded(classifier_settings)
        }
    };

    let embedding_settings = config.search.embedding_settings();
    let extractor = match OnnxFrameEmbedder::load(
        &paths.embedding_model,
        device,
        threads,
        config.search.model_sample_rate,
        config.search.window_secs,
    ) {
        Ok(model) => EmbeddingExtractor::new(Arc::new(model), embedding_settings),
        Err(e) => {
            warn!(error = %e, "Embedding model disabled, similarity queries will fail");
            EmbeddingExtractor::unloaded(embedding_settings)
        }
    };

    let songs = KnownSongs::load(&paths.songs_index).unwrap_or_else(|e| {
        warn!(error = %e, "Known-songs index unreadable, continuing without it");
        KnownSongs::default()
    });

    let index = load_search_index(config)?;

    let search = SimilaritySearch::new(
        AudioNormalizer::new(config.search.sample_rate, config.search.duration_secs),
        extractor,
        Arc::new(index),
        Arc::new(songs),
        config.search.catalog_name.clone(),
    );

    info!(
        classifier_loaded = classifier.is_loaded(),
        embedding_loaded = search.extractor().is_loaded(),
        search_available = search.index().available(),
        catalog_rows = search.index().len(),
        known_songs = search.songs().len(),
        "Startup complete"
    );

    Ok(AppState::new(
        uploads,
        classifier,
        search,
        config.max_upload_bytes,
    ))
}

/// Load the embedding matrix and metadata table, or an unavailable index
/// when either file is absent.
fn load_search_index(config: &ServerConfig) -> Result<SearchIndex> {
    let paths = &config.paths;

    let missing: Vec<_> = [&paths.embeddings, &paths.metadata]
        .into_iter()
        .filter(|p| !p.exists())
        .collect();
    if !missing.is_empty() {
        for path in missing {
            warn!(path = %path.display(), "Catalog file not found");
        }
        warn!("Similarity search disabled, queries will return no matches");
        return Ok(SearchIndex::unavailable());
    }

    let vectors = VectorIndex::load_npy(&paths.embeddings)
        .with_context(|| format!("Failed to load {}", paths.embeddings.display()))?;
    if vectors.dim() != config.search.embedding_dim {
        bail!(
            "Embedding matrix {} has dimension {}, expected {}",
            paths.embeddings.display(),
            vectors.dim(),
            config.search.embedding_dim
        );
    }

    let table = CatalogTable::load_csv(&paths.metadata)
        .with_context(|| format!("Failed to load {}", paths.metadata.display()))?;

    SearchIndex::new(vectors, table).context("Catalog metadata does not match embedding matrix")
}
