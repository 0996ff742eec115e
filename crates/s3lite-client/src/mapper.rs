//! Classification of failed exchanges into [`ClientError`]

use crate::{
    content::ByteStream,
    error::BoxError,
    types::{header_string, Bucket, Key},
    ClientError,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{header::HeaderMap, StatusCode};
use serde::Deserialize;

/// Error code used for a 404 whose response named no code (HEAD responses)
pub(crate) const UNCLASSIFIED_NOT_FOUND: &str = "NotFound";

/// S3 `<Error>` document
#[derive(Debug, Default, Deserialize)]
struct ErrorDocument {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "RequestId")]
    request_id: Option<String>,
    #[serde(rename = "Key")]
    key: Option<String>,
}

/// Map a non-2xx response onto a [`ClientError`].
///
/// The error code comes from the XML body, falling back to the
/// `x-amz-error-code` header. The targeted bucket, and the key for
/// key-scoped operations, are always attached.
pub fn classify(
    bucket: &Bucket,
    key: Option<&Key>,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> ClientError {
    let document = parse_error_document(body).unwrap_or_default();
    let request_id = document
        .request_id
        .or_else(|| header_string(headers, "x-amz-request-id"));
    let code = document
        .code
        .filter(|c| !c.trim().is_empty())
        .or_else(|| header_string(headers, "x-amz-error-code"));
    let bucket_name = bucket.as_str().to_string();
    let key_name = key.map(|k| k.as_str().to_string());

    match code.as_deref() {
        Some("NoSuchKey") => ClientError::NoSuchKey {
            bucket: bucket_name,
            key: key_name.or(document.key).unwrap_or_default(),
            message: document.message,
            request_id,
        },
        Some("NoSuchBucket") => ClientError::NoSuchBucket {
            bucket: bucket_name,
            key: key_name,
            message: document.message,
            request_id,
        },
        Some(code) => ClientError::StoreRejected {
            code: code.to_string(),
            status,
            message: document.message,
            bucket: Some(bucket_name),
            key: key_name,
            request_id,
        },
        None => ClientError::StoreRejected {
            code: fallback_code(status),
            status,
            message: None,
            bucket: Some(bucket_name),
            key: key_name,
            request_id,
        },
    }
}

/// Wrap a failure that never produced an HTTP response
pub fn transport_failure(bucket: Option<&Bucket>, key: Option<&Key>, cause: BoxError) -> ClientError {
    ClientError::Transport {
        bucket: bucket.map(|b| b.as_str().to_string()),
        key: key.map(|k| k.as_str().to_string()),
        source: cause,
    }
}

/// A 404 that named neither bucket nor key
pub(crate) fn is_unclassified_not_found(error: &ClientError) -> bool {
    matches!(
        error,
        ClientError::StoreRejected { code, status, .. }
            if *status == StatusCode::NOT_FOUND && code == UNCLASSIFIED_NOT_FOUND
    )
}

/// Read an error body, keeping at most `limit` bytes.
///
/// The remainder is read and dropped so the connection is released before
/// the error is returned. A read failure stops early; the partial body is
/// still used for classification.
pub(crate) async fn read_error_body(mut body: ByteStream, limit: usize) -> Bytes {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                let room = limit.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Err(e) => {
                tracing::debug!(error = %e, "error body read failed");
                break;
            }
        }
    }
    buf.freeze()
}

fn parse_error_document(body: &[u8]) -> Option<ErrorDocument> {
    let text = std::str::from_utf8(body).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    quick_xml::de::from_str::<ErrorDocument>(text).ok()
}

fn fallback_code(status: StatusCode) -> String {
    match status {
        StatusCode::NOT_FOUND => UNCLASSIFIED_NOT_FOUND.to_string(),
        _ => format!("HTTP{}", status.as_u16()),
    }
}
