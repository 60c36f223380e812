//! Clip classification endpoint

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::classifier::Verdict;
use crate::error::{ApiError, ApiResult};
use crate::uploads::{allowed_file, secure_filename, UploadGuard};
use crate::AppState;

/// Multipart field carrying the clip
const FILE_FIELD: &str = "file";

/// POST /api/predict response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    /// Sanitized name the upload is stored under
    pub filename: String,
    pub probability: f32,
    pub result: &'static str,
    pub raw_output: f32,
}

/// POST /api/predict
///
/// Classifies the uploaded clip. The stored upload is kept only when the
/// clip is classified as AI, so the client can follow up with
/// `/api/topkrealsongs`.
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictResponse>> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        // Only parts with a filename attribute are file parts
        let Some(client_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
        upload = Some((client_name, data));
        break;
    }

    let (client_name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;

    if client_name.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    let filename = secure_filename(&client_name);
    if !allowed_file(&client_name) || filename.is_empty() {
        debug!(client_name = %client_name, "Rejected upload");
        return Err(ApiError::BadRequest("Invalid file type".to_string()));
    }

    let path = state
        .uploads
        .save(&filename, &data)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;
    let guard = UploadGuard::new(&path);

    let classifier = state.classifier.clone();
    let classification =
        tokio::task::spawn_blocking(move || classifier.classify(&path)).await??;

    if classification.verdict == Verdict::Ai {
        // Kept for the similarity query that follows
        guard.keep();
    }

    info!(
        filename = %filename,
        probability = classification.probability,
        result = %classification.verdict,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        filename,
        probability: classification.probability,
        result: classification.verdict.label(),
        raw_output: classification.raw_output,
    }))
}

/// Build classification routes
pub fn predict_routes() -> Router<AppState> {
    Router::new().route("/api/predict", post(predict))
}
