//! Common types for the client SDK

use crate::{content::StreamingContent, ClientError, Result};
use chrono::{DateTime, Utc};
use reqwest::header::{self, AsHeaderName, HeaderMap};
use std::{collections::HashMap, fmt, str::FromStr};

/// Prefix for user-defined metadata headers
pub const METADATA_HEADER_PREFIX: &str = "x-amz-meta-";

/// Longest bucket name accepted by S3-compatible stores
const MAX_BUCKET_LEN: usize = 63;

/// Longest object key accepted by S3-compatible stores (bytes)
const MAX_KEY_LEN: usize = 1024;

/// User-defined object metadata
pub type Metadata = HashMap<String, String>;

/// A validated bucket name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bucket(String);

impl Bucket {
    /// Validate and wrap a bucket name
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "bucket name must not be empty".to_string(),
            ));
        }
        if name.len() > MAX_BUCKET_LEN {
            return Err(ClientError::InvalidArgument(format!(
                "bucket name exceeds {} characters: {}",
                MAX_BUCKET_LEN, name
            )));
        }
        if name.contains('/') || name.chars().any(char::is_whitespace) {
            return Err(ClientError::InvalidArgument(format!(
                "bucket name contains '/' or whitespace: {:?}",
                name
            )));
        }
        Ok(Self(name))
    }

    /// Bucket name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A validated object key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    /// Validate and wrap an object key
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ClientError::InvalidArgument(
                "object key must not be empty".to_string(),
            ));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(ClientError::InvalidArgument(format!(
                "object key exceeds {} bytes",
                MAX_KEY_LEN
            )));
        }
        // URL normalization would collapse these and address another object
        if key.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(ClientError::InvalidArgument(format!(
                "object key contains a '.' or '..' path segment: {:?}",
                key
            )));
        }
        Ok(Self(key))
    }

    /// Object key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! impl_name_traits {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $ty {
            type Err = ClientError;

            fn from_str(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = ClientError;

            fn try_from(value: &str) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ClientError;

            fn try_from(value: String) -> Result<Self> {
                Self::new(value)
            }
        }
    };
}

impl_name_traits!(Bucket);
impl_name_traits!(Key);

/// Opaque entity tag returned by the store
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    /// Wrap an entity tag, dropping surrounding quotes
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim_matches('"').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object metadata parsed from response headers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    key: Key,
    etag: ETag,
    metadata: Metadata,
    size: Option<u64>,
    last_modified: Option<DateTime<Utc>>,
}

impl ObjectSummary {
    pub fn new(
        key: Key,
        etag: ETag,
        metadata: Metadata,
        size: Option<u64>,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key,
            etag,
            metadata,
            size,
            last_modified,
        }
    }

    /// Build a summary from HEAD/GET response headers
    pub(crate) fn from_headers(key: Key, headers: &HeaderMap) -> Self {
        let etag = header_string(headers, header::ETAG)
            .map(ETag::new)
            .unwrap_or_default();

        let last_modified = header_string(headers, header::LAST_MODIFIED)
            .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
            .map(|d| d.with_timezone(&Utc));

        let mut metadata = Metadata::new();
        for (name, value) in headers.iter() {
            if let Some(meta_key) = name.as_str().strip_prefix(METADATA_HEADER_PREFIX) {
                if let Ok(v) = value.to_str() {
                    metadata.insert(meta_key.to_string(), v.to_string());
                }
            }
        }

        Self {
            key,
            etag,
            metadata,
            size: header_u64(headers, header::CONTENT_LENGTH),
            last_modified,
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn etag(&self) -> &ETag {
        &self.etag
    }

    /// User-defined metadata (keys without the `x-amz-meta-` prefix)
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Object size in bytes, when the store reported it
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }
}

/// A fetched object: its summary and its not-yet-drained content
#[derive(Debug)]
pub struct Object {
    summary: ObjectSummary,
    content: StreamingContent,
}

impl Object {
    pub fn new(summary: ObjectSummary, content: StreamingContent) -> Self {
        Self { summary, content }
    }

    pub fn summary(&self) -> &ObjectSummary {
        &self.summary
    }

    /// Content to drain or discard
    pub fn content(&mut self) -> &mut StreamingContent {
        &mut self.content
    }

    pub fn into_parts(self) -> (ObjectSummary, StreamingContent) {
        (self.summary, self.content)
    }
}

pub(crate) fn header_string<N: AsHeaderName>(headers: &HeaderMap, name: N) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

pub(crate) fn header_u64<N: AsHeaderName>(headers: &HeaderMap, name: N) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
