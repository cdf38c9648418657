use std::collections::HashMap;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use super::{
    models::{HealthResponse, IndexResponse, UploadResponse},
    state::AppState,
    utils::{IncomingFile, read_file_field},
};
use crate::api::error::ApiError;
use crate::storage::{UploadedFile, content_type_for};

/// Multipart part carrying the uploaded image
const IMAGE_FIELD: &str = "image";

/// Upload endpoint (POST /upload)
///
/// ## Flow:
/// 1. Read the `image` part, enforcing the upload limit while streaming
/// 2. Persist it under a generated unique name
/// 3. Convert it into every target format concurrently
/// 4. Schedule the original and all artifacts for deletion
/// 5. Return the public paths and sizes
///
/// Steps 2 to 4 run in a detached task. Once the body has been read, a client
/// that disconnects cannot cancel the work, so every file written still ends
/// up either scheduled for deletion or removed.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let multipart = multipart.map_err(|rejection| {
        state.metrics.upload_rejected();
        ApiError::InvalidPayload(rejection.body_text())
    })?;

    let limit = state.config.limits.max_upload_bytes;
    let incoming = match read_file_field(multipart, IMAGE_FIELD, limit).await {
        Ok(Some(incoming)) => incoming,
        Ok(None) => {
            state.metrics.upload_rejected();
            return Err(ApiError::InvalidPayload("No image uploaded.".into()));
        }
        Err(err) => {
            state.metrics.upload_rejected();
            return Err(err);
        }
    };

    let task = tokio::spawn(process_upload(state.clone(), incoming));
    let response = task
        .await
        .map_err(|e| ApiError::Internal(format!("upload task failed: {e}")))??;

    Ok((StatusCode::OK, Json(response)))
}

/// Persist and convert an upload, then hand everything to retention
async fn process_upload(state: AppState, incoming: IncomingFile) -> Result<UploadResponse, ApiError> {
    let name = state
        .store
        .generate_name(incoming.file_name.as_deref(), incoming.content_type.as_deref());
    let uploaded = state
        .store
        .persist(name, incoming.data, incoming.content_type)
        .await?;

    let result = match state.converter.convert(&uploaded.path, &uploaded.name.stem).await {
        Ok(result) if !result.is_empty() => result,
        Ok(result) => {
            error!(
                original = %uploaded.path.display(),
                failures = ?result.failures,
                "Every conversion failed"
            );
            discard_original(&state, &uploaded).await;
            return Err(ApiError::ConversionFailed);
        }
        Err(err) => {
            error!(original = %uploaded.path.display(), error = %err, "Conversion could not start");
            discard_original(&state, &uploaded).await;
            return Err(ApiError::ConversionFailed);
        }
    };

    state.metrics.upload_accepted();
    state.metrics.artifacts_produced(result.artifacts.len());
    state.metrics.encodes_failed(result.failures.len());

    let response = UploadResponse::from_conversion(state.store.public_path(&uploaded.file_name()), &result);

    let mut delete_list = Vec::with_capacity(result.artifacts.len() + 1);
    delete_list.push(uploaded.path.clone());
    delete_list.extend(result.paths());

    let delay = state.config.retention.delay;
    let batch_id = state.retention.schedule(delete_list, delay.as_duration());

    info!(
        original = %uploaded.file_name(),
        size = uploaded.size,
        formats = result.artifacts.len(),
        failed = result.failures.len(),
        batch_id = %batch_id,
        expires_in = %delay,
        "Upload processed"
    );

    Ok(response)
}

async fn discard_original(state: &AppState, uploaded: &UploadedFile) {
    state.metrics.conversion_failed();
    if let Err(err) = tokio::fs::remove_file(&uploaded.path).await {
        warn!(path = %uploaded.path.display(), error = %err, "Failed to remove original after conversion failure");
    }
}

/// Download endpoint (GET /download/{filename})
///
/// Streams the file as an attachment. Names that could leave the storage
/// directory are rejected with 400.
pub async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    stream_file(&state, &filename, true).await
}

/// Static access endpoint (GET /uploads/{filename})
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    stream_file(&state, &filename, false).await
}

async fn stream_file(state: &AppState, filename: &str, attachment: bool) -> Result<Response, ApiError> {
    let (file, size) = state.store.open(filename).await?;
    let content_type = content_type_for(filename);

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, size);

    if attachment {
        builder = builder.header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        );
    }

    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

/// Liveness message (GET /)
pub async fn index() -> impl IntoResponse {
    Json(IndexResponse {
        message: "Welcome to the Image Multimat API",
    })
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    let storage_ok = tokio::fs::metadata(state.store.root())
        .await
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false);
    components.insert("storage".to_string(), status_label(storage_ok).to_string());

    let pending_expiries = match state.retention.pending() {
        Ok(count) => Some(count),
        Err(err) => {
            warn!(error = %err, "Failed to read expiry ledger");
            None
        }
    };
    components.insert(
        "retention".to_string(),
        status_label(pending_expiries.is_some()).to_string(),
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status_label(all_healthy).to_string(),
        components,
        pending_expiries,
        metrics: state.metrics.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

fn status_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}
