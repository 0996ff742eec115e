//! Client error types

use reqwest::StatusCode;
use thiserror::Error;

/// Boxed cause carried by transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
///
/// Store-reported failures always carry the bucket that was targeted and,
/// for key-scoped operations, the key. Transport failures carry them when
/// they are known at the point of failure.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Object not found
    #[error("no such key: {bucket}/{key}")]
    NoSuchKey {
        bucket: String,
        key: String,
        message: Option<String>,
        request_id: Option<String>,
    },

    /// Bucket not found
    #[error("no such bucket: {bucket}")]
    NoSuchBucket {
        bucket: String,
        key: Option<String>,
        message: Option<String>,
        request_id: Option<String>,
    },

    /// Any other error code reported by the store
    #[error("S3 error ({code}, {status}): {}", .message.as_deref().unwrap_or("no message"))]
    StoreRejected {
        code: String,
        status: StatusCode,
        message: Option<String>,
        bucket: Option<String>,
        key: Option<String>,
        request_id: Option<String>,
    },

    /// Connection, timeout or body I/O failure
    #[error("transport failure: {source}")]
    Transport {
        bucket: Option<String>,
        key: Option<String>,
        #[source]
        source: BoxError,
    },

    /// A streaming content was drained more than once
    #[error("stream already consumed")]
    StreamAlreadyConsumed,

    /// A response that must carry data produced no chunks
    #[error("response stream contained no data")]
    EmptyResponseStream {
        bucket: Option<String>,
        key: Option<String>,
    },

    /// Invalid bucket, key, metadata or configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Request signing failed
    #[error("signing error: {0}")]
    Signing(String),

    /// Credentials could not be resolved
    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

impl ClientError {
    /// Create a transport failure with optional bucket/key context
    pub fn transport(
        bucket: Option<&str>,
        key: Option<&str>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Transport {
            bucket: bucket.map(str::to_string),
            key: key.map(str::to_string),
            source: source.into(),
        }
    }

    /// Symbolic error code.
    ///
    /// Store-reported errors return the store's own code; client-side
    /// failures return a fixed code so callers can match on a single field.
    pub fn code(&self) -> &str {
        match self {
            Self::NoSuchKey { .. } => "NoSuchKey",
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::StoreRejected { code, .. } => code,
            Self::Transport { .. } => "TransportFailure",
            Self::StreamAlreadyConsumed => "StreamAlreadyConsumed",
            Self::EmptyResponseStream { .. } => "EmptyResponseStream",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Signing(_) => "SigningFailed",
            Self::Credentials(_) => "CredentialsUnavailable",
        }
    }

    /// Bucket the failed operation targeted, if known
    pub fn bucket_name(&self) -> Option<&str> {
        match self {
            Self::NoSuchKey { bucket, .. } | Self::NoSuchBucket { bucket, .. } => Some(bucket),
            Self::StoreRejected { bucket, .. }
            | Self::Transport { bucket, .. }
            | Self::EmptyResponseStream { bucket, .. } => bucket.as_deref(),
            _ => None,
        }
    }

    /// Key the failed operation targeted, if known
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::NoSuchKey { key, .. } => Some(key),
            Self::NoSuchBucket { key, .. }
            | Self::StoreRejected { key, .. }
            | Self::Transport { key, .. }
            | Self::EmptyResponseStream { key, .. } => key.as_deref(),
            _ => None,
        }
    }

    /// HTTP status, when the store answered
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NoSuchKey { .. } | Self::NoSuchBucket { .. } => Some(StatusCode::NOT_FOUND),
            Self::StoreRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Request id reported by the store
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::NoSuchKey { request_id, .. }
            | Self::NoSuchBucket { request_id, .. }
            | Self::StoreRejected { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. } | Self::NoSuchBucket { .. })
    }

    /// Fill in missing bucket/key context.
    ///
    /// Context already present is kept; variants that carry no context are
    /// returned unchanged.
    pub fn with_context(self, bucket: &str, key: Option<&str>) -> Self {
        fn fill(current: Option<String>, value: Option<&str>) -> Option<String> {
            current.or_else(|| value.map(str::to_string))
        }

        match self {
            Self::Transport {
                bucket: b,
                key: k,
                source,
            } => Self::Transport {
                bucket: fill(b, Some(bucket)),
                key: fill(k, key),
                source,
            },
            Self::EmptyResponseStream { bucket: b, key: k } => Self::EmptyResponseStream {
                bucket: fill(b, Some(bucket)),
                key: fill(k, key),
            },
            Self::StoreRejected {
                code,
                status,
                message,
                bucket: b,
                key: k,
                request_id,
            } => Self::StoreRejected {
                code,
                status,
                message,
                bucket: fill(b, Some(bucket)),
                key: fill(k, key),
                request_id,
            },
            other => other,
        }
    }
}
