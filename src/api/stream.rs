//! Range-aware asset streaming
//!
//! `GET /{id}` resolves a stored asset through the storage manager and
//! serves it honoring single-range `Range` requests. Multi-range requests
//! honor the first clause only, a documented limitation. Stored files are
//! never mutated in place, so concurrent reads need no locking.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Response, StatusCode, header};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::ApiState;

#[derive(Debug, PartialEq, Eq)]
struct ByteRange {
    start: u64,
    end: u64,
}

/// Parse a `Range` header against a known file size. Only the first clause
/// of a multi-range request is honored; a syntactically or semantically
/// unsatisfiable range yields `None` and the caller falls back to a full
/// response.
fn parse_range_header(range_str: &str, file_size: u64) -> Option<ByteRange> {
    let range_part = range_str.strip_prefix("bytes=")?;
    // first clause only
    let clause = range_part.split(',').next()?.trim();
    let (start_str, end_str) = clause.split_once('-')?;

    let start = if start_str.is_empty() {
        // suffix range: the final N bytes
        let suffix_len: u64 = end_str.parse().ok()?;
        file_size.saturating_sub(suffix_len)
    } else {
        start_str.parse().ok()?
    };

    let end = if end_str.is_empty() || start_str.is_empty() {
        file_size.checked_sub(1)?
    } else {
        let end: u64 = end_str.parse().ok()?;
        end.min(file_size.checked_sub(1)?)
    };

    (start <= end && start < file_size).then_some(ByteRange { start, end })
}

fn content_type_for(path: &std::path::Path) -> String {
    // normalized assets are extensionless mp4 containers
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "video/mp4".to_string())
}

/// `HEAD /{id}`: byte length and range support only, no body.
pub async fn asset_head(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Response<Body>, StatusCode> {
    let path = state.storage.locate(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    let size = tokio::fs::metadata(&path)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_LENGTH, size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// `GET /{id}`: full body, or a `206` span for a single-range request.
pub async fn stream_asset(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response<Body>, StatusCode> {
    let path = state.storage.locate(&id).await.ok_or(StatusCode::NOT_FOUND)?;

    let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
        warn!(id = %id, error = %e, "Failed to open stored asset");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let file_size = file
        .metadata()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .len();
    let content_type = content_type_for(&path);

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| parse_range_header(s, file_size));

    if let Some(range) = range {
        debug!(id = %id, start = range.start, end = range.end, "Range request");

        file.seek(std::io::SeekFrom::Start(range.start))
            .await
            .map_err(|e| {
                warn!(id = %id, error = %e, "Failed to seek stored asset");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let content_length = range.end - range.start + 1;
        let mut buffer = vec![0; content_length as usize];
        file.read_exact(&mut buffer).await.map_err(|e| {
            warn!(id = %id, error = %e, "Failed to read requested range");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        return Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, content_length.to_string())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, file_size),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from(buffer))
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR);
    }

    // full body; a stream error after these headers commit is only logged
    let stream = ReaderStream::new(file);
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, file_size.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
