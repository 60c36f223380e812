//! Catalog similarity endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::search::SearchResult;
use crate::uploads::{secure_filename, UploadGuard};
use crate::AppState;

/// Matches returned when `k` is omitted
pub const DEFAULT_K: usize = 5;

/// Query parameters for GET /api/topkrealsongs
///
/// `k` is kept as text so a malformed value gets a JSON error body.
#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    pub filename: Option<String>,
    pub k: Option<String>,
}

/// GET /api/topkrealsongs?filename=<name>&k=<n>
///
/// Ranks catalog tracks by similarity to a previously uploaded clip, then
/// deletes the upload.
pub async fn top_k_real_songs(
    State(state): State<AppState>,
    Query(query): Query<TopKQuery>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let filename = query
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Filename is required".to_string()))?;

    let sanitized = secure_filename(&filename);
    if sanitized.is_empty() {
        return Err(ApiError::BadRequest("Invalid filename".to_string()));
    }
    let path = state.uploads.path_for(&sanitized);
    let _guard = UploadGuard::new(&path);

    let k = match query.k.as_deref() {
        None => DEFAULT_K,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid k: {}", raw)))?,
    };

    let search = state.search.clone();
    let results = tokio::task::spawn_blocking(move || search.top_k(&path, k)).await??;

    Ok(Json(results))
}

/// Build similarity routes
pub fn search_routes() -> Router<AppState> {
    Router::new().route("/api/topkrealsongs", get(top_k_real_songs))
}
