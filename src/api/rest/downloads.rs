//! Simple file download endpoint and the shared streaming body

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use chrono::Utc;
use futures::Stream;
use tokio::io::AsyncReadExt;

use super::extract::ApiPath;
use super::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::guard::TransferTicket;
use crate::types::{NewOperation, Principal, DOWNLOAD_OPERATION};

/// Read size per streamed chunk
const CHUNK_SIZE: usize = 64 * 1024;

/// Stream exactly `size` bytes of a file in chunks.
///
/// The ticket, if any, is finished as soon as the last byte is read and
/// before that chunk is yielded, since the transport stops polling once
/// `Content-Length` bytes are out. A short file or a read error aborts it.
/// Dropping the stream early drops the ticket, which fails the session.
pub(crate) fn file_stream(
    mut file: tokio::fs::File,
    size: u64,
    ticket: Option<TransferTicket>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        let mut ticket = ticket;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        if size == 0 {
            if let Some(ticket) = ticket.take() {
                ticket.finish();
            }
        }
        while sent < size {
            let want = usize::try_from(size - sent).map_or(CHUNK_SIZE, |left| left.min(CHUNK_SIZE));
            match file.read(&mut buf[..want]).await {
                Ok(0) => {
                    let message = format!("file truncated: sent {} of {} bytes", sent, size);
                    if let Some(ticket) = ticket.take() {
                        ticket.abort(message.clone());
                    }
                    yield Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, message));
                    break;
                }
                Ok(n) => {
                    sent += n as u64;
                    if sent == size {
                        if let Some(ticket) = ticket.take() {
                            ticket.finish();
                        }
                    }
                    yield Ok(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    if let Some(ticket) = ticket.take() {
                        ticket.abort(format!("read error: {}", e));
                    }
                    yield Err(e);
                    break;
                }
            }
        }
    }
}

/// Build an attachment response around a streamed body
pub(crate) fn attachment(
    file_name: &str,
    size: u64,
    stream: impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
) -> ApiResult<Response> {
    Response::builder()
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename*=UTF-8''{}", urlencoding::encode(file_name)),
        )
        .header(CONTENT_LENGTH, size)
        .body(Body::from_stream(stream))
        .map_err(|e| {
            tracing::error!(error = %e, file_name, "failed to build download response");
            ApiError::internal("internal server error")
        })
}

/// GET /download/:file_name - Download a generated script or export
pub async fn download_file(
    principal: Principal,
    State(state): State<Arc<AppState>>,
    ApiPath(file_name): ApiPath<String>,
) -> ApiResult<Response> {
    let size = match state.outputs.size(&file_name).await {
        Ok(size) => size,
        Err(e) => {
            state
                .store
                .audit(NewOperation::failed(
                    principal.user_id,
                    DOWNLOAD_OPERATION,
                    file_name.clone(),
                    &e,
                ))
                .await;
            return Err(e.into());
        }
    };
    let file = state.outputs.open(&file_name).await?;

    let occurred_at = Utc::now();
    state
        .store
        .record_download(principal.user_id, &file_name, occurred_at)
        .await?;
    // Hidden from the feed by the specialized download record
    state
        .store
        .audit(NewOperation::succeeded(principal.user_id, DOWNLOAD_OPERATION, file_name.clone()).at(occurred_at))
        .await;

    tracing::info!(user_id = principal.user_id, file_name = %file_name, size, "file download started");
    attachment(&file_name, size, file_stream(file, size, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    async fn collect(stream: impl Stream<Item = Result<Bytes, std::io::Error>>) -> (usize, bool) {
        futures::pin_mut!(stream);
        let mut total = 0;
        let mut failed = false;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => total += bytes.len(),
                Err(_) => failed = true,
            }
        }
        (total, failed)
    }

    #[tokio::test]
    async fn test_stream_stops_at_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![7u8; CHUNK_SIZE * 2 + 10]).unwrap();
        let file = tokio::fs::File::open(tmp.path()).await.unwrap();

        let (total, failed) = collect(file_stream(file, (CHUNK_SIZE + 5) as u64, None)).await;
        assert_eq!(total, CHUNK_SIZE + 5);
        assert!(!failed);
    }

    #[tokio::test]
    async fn test_short_file_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();
        let file = tokio::fs::File::open(tmp.path()).await.unwrap();

        let (total, failed) = collect(file_stream(file, 10, None)).await;
        assert_eq!(total, 3);
        assert!(failed);
    }
}
