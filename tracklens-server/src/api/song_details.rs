//! Known-song lookup endpoint

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::catalog::{UNKNOWN_ARTIST, UNKNOWN_GENRE};
use crate::classifier::Verdict;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Probability reported for catalog tracks, which are human-made by
/// construction
const CATALOG_PROBABILITY: f32 = 0.05;

#[derive(Debug, Deserialize)]
pub struct SongDetailsQuery {
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SongDetails {
    pub filename: String,
    pub artist: String,
    pub title: String,
    pub genre: String,
    pub probability: f32,
    pub result: &'static str,
}

/// GET /api/song-details?filename=<name>
pub async fn song_details(
    State(state): State<AppState>,
    Query(query): Query<SongDetailsQuery>,
) -> ApiResult<Json<SongDetails>> {
    let filename = query
        .filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Filename is required".to_string()))?;

    let details = match state.songs.find_song(&filename) {
        Some(song) => SongDetails {
            filename: song.filename.clone(),
            artist: song.artist.clone(),
            title: song.title.clone(),
            genre: song.genre.clone(),
            probability: CATALOG_PROBABILITY,
            result: Verdict::Human.label(),
        },
        None => SongDetails {
            artist: UNKNOWN_ARTIST.to_string(),
            title: strip_extension(&filename).to_string(),
            genre: UNKNOWN_GENRE.to_string(),
            filename,
            probability: CATALOG_PROBABILITY,
            result: Verdict::Human.label(),
        },
    };

    Ok(Json(details))
}

/// Remove the final extension of the last path component. Leading dots of
/// that component do not start an extension (`.hidden` stays as is).
fn strip_extension(name: &str) -> &str {
    let base_start = name.rfind('/').map_or(0, |i| i + 1);
    let base = &name[base_start..];
    let leading_dots = base.len() - base.trim_start_matches('.').len();

    match base[leading_dots..].rfind('.') {
        Some(dot) => &name[..base_start + leading_dots + dot],
        None => name,
    }
}

/// Build song detail routes
pub fn song_details_routes() -> Router<AppState> {
    Router::new().route("/api/song-details", get(song_details))
}
