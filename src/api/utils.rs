//! API utility functions
//!
//! Helpers for pulling the uploaded file out of a multipart body while
//! enforcing the size limit.

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};

use crate::api::error::ApiError;
use crate::humanize::ByteSize;

/// Extra body allowance on top of the file limit for multipart framing
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// A file part read fully into memory
#[derive(Debug)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Read the first non-empty part named `field_name`.
///
/// Other parts are skipped. Reading stops with `PayloadTooLarge` as soon as
/// the part grows past `limit`, before anything touches the disk.
pub async fn read_file_field(
    mut multipart: Multipart,
    field_name: &str,
    limit: ByteSize,
) -> Result<Option<IncomingFile>, ApiError> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, limit))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| map_multipart_error(e, limit))? {
            check_size(data.len() + chunk.len(), limit)?;
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            continue;
        }

        return Ok(Some(IncomingFile {
            file_name,
            content_type,
            data: data.freeze(),
        }));
    }

    Ok(None)
}

/// Validates that a running size does not exceed the limit
pub fn check_size(size: usize, limit: ByteSize) -> Result<(), ApiError> {
    if size as u64 > limit.as_u64() {
        return Err(ApiError::PayloadTooLarge(limit));
    }
    Ok(())
}

fn map_multipart_error(err: MultipartError, limit: ByteSize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(limit)
    } else {
        ApiError::InvalidPayload(err.body_text())
    }
}
