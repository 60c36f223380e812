//! tracklens-server library interface
//!
//! AI-vs-human audio classification and catalog similarity search over
//! HTTP. Exposed as a library so integration tests can drive the router
//! with in-process model doubles.

pub mod api;
pub mod audio;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod onnx;
pub mod search;
pub mod startup;
pub mod uploads;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::catalog::KnownSongs;
use crate::classifier::AudioClassifier;
use crate::search::SimilaritySearch;
use crate::uploads::UploadStore;

/// Application state shared across handlers. Everything in it is built once
/// at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppState {
    pub uploads: Arc<UploadStore>,
    pub classifier: Arc<AudioClassifier>,
    pub search: Arc<SimilaritySearch>,
    pub songs: Arc<KnownSongs>,
    /// Request body limit for uploads
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        uploads: UploadStore,
        classifier: AudioClassifier,
        search: SimilaritySearch,
        max_upload_bytes: usize,
    ) -> Self {
        let songs = Arc::clone(search.songs());
        Self {
            uploads: Arc::new(uploads),
            classifier: Arc::new(classifier),
            search: Arc::new(search),
            songs,
            max_upload_bytes,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .merge(api::health_routes())
        .merge(api::predict_routes())
        .merge(api::search_routes())
        .merge(api::song_details_routes())
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
