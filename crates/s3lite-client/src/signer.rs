//! Request signing
//!
//! The facade hands every request to a [`RequestSigner`] together with a
//! [`PayloadDescriptor`], because the signature covers the declared content
//! length or transfer mode. [`SigV4Signer`] implements AWS Signature
//! Version 4 for the `s3` service.

use crate::{credentials::Credentials, ClientError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method, Url,
};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Payload hash sent for streamed bodies
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// SHA-256 of the empty string
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const DEFAULT_SERVICE: &str = "s3";

/// What the request body looks like, as far as the signature is concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadDescriptor {
    /// No body
    Empty,
    /// Fixed-length body of the given size
    Length(u64),
    /// Chunked transfer; the decoded size when known
    Chunked { decoded_length: Option<u64> },
}

impl PayloadDescriptor {
    fn content_sha256(&self) -> &'static str {
        match self {
            Self::Empty => EMPTY_PAYLOAD_SHA256,
            Self::Length(_) | Self::Chunked { .. } => UNSIGNED_PAYLOAD,
        }
    }
}

/// Canonical request input handed to a signer
#[derive(Clone, Copy, Debug)]
pub struct SigningRequest<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub payload: PayloadDescriptor,
}

/// Produces the signed header set for a request
pub trait RequestSigner: Send + Sync {
    /// Return the complete set of headers to send, signature included
    fn sign(
        &self,
        request: &SigningRequest<'_>,
        credentials: &Credentials,
        region: &str,
    ) -> Result<HeaderMap>;
}

/// AWS Signature Version 4 signer
#[derive(Clone, Debug)]
pub struct SigV4Signer {
    service: String,
}

impl SigV4Signer {
    pub fn new() -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
        }
    }

    /// Sign for a service other than `s3`
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Sign as of the given instant
    pub fn sign_at(
        &self,
        request: &SigningRequest<'_>,
        credentials: &Credentials,
        region: &str,
        now: DateTime<Utc>,
    ) -> Result<HeaderMap> {
        let mut headers = request.headers.clone();
        let payload_hash = request.payload.content_sha256();
        let amz_date = amz_datetime(now);

        headers.insert("x-amz-date", header_value(&amz_date, "x-amz-date")?);
        headers.insert(
            "x-amz-content-sha256",
            header_value(payload_hash, "x-amz-content-sha256")?,
        );
        if let Some(token) = &credentials.session_token {
            headers.insert("x-amz-security-token", header_value(token, "x-amz-security-token")?);
        }
        headers.insert(header::HOST, header_value(&host(request.url)?, "host")?);

        let sign_length = matches!(request.payload, PayloadDescriptor::Length(_));
        let (canonical_headers, signed_headers) = canonicalize_headers(&headers, sign_length);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method.as_str(),
            canonical_uri(request.url),
            canonical_query_string(request.url),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp(now),
            region,
            self.service
        );
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", credentials.secret_access_key).as_bytes(),
            date_stamp(now).as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, scope, signed_headers, signature
        );
        headers.insert(
            header::AUTHORIZATION,
            header_value(&authorization, "authorization")?,
        );

        Ok(headers)
    }
}

impl Default for SigV4Signer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestSigner for SigV4Signer {
    fn sign(
        &self,
        request: &SigningRequest<'_>,
        credentials: &Credentials,
        region: &str,
    ) -> Result<HeaderMap> {
        self.sign_at(request, credentials, region, Utc::now())
    }
}

/// Percent-encode with the SigV4 unreserved set, optionally keeping '/'
pub(crate) fn aws_percent_encode(input: &str, preserve_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        let unreserved = matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~');
        if unreserved || (preserve_slash && b == b'/') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn header_value(value: &str, name: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Signing(format!("invalid {} header value", name)))
}

fn host(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::Signing("endpoint has no host".to_string()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn canonical_uri(url: &Url) -> &str {
    match url.path() {
        "" => "/",
        path => path,
    }
}

fn canonical_query_string(url: &Url) -> String {
    let mut pairs = url
        .query_pairs()
        .map(|(k, v)| (aws_percent_encode(&k, false), aws_percent_encode(&v, false)))
        .collect::<Vec<_>>();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonicalize_headers(headers: &HeaderMap, sign_length: bool) -> (String, String) {
    let mut pairs = headers
        .iter()
        .filter(|(name, _)| should_sign_header(name.as_str(), sign_length))
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_ascii_lowercase(), normalize_header_value(value)))
        })
        .collect::<Vec<_>>();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut canonical = String::new();
    let mut signed = Vec::with_capacity(pairs.len());
    for (name, value) in &pairs {
        canonical.push_str(name);
        canonical.push(':');
        canonical.push_str(value);
        canonical.push('\n');
        signed.push(name.as_str());
    }
    (canonical, signed.join(";"))
}

fn should_sign_header(name: &str, sign_length: bool) -> bool {
    match name {
        "host" | "content-type" | "content-md5" | "range" | "if-match" | "if-none-match"
        | "if-modified-since" | "if-unmodified-since" => true,
        "content-length" => sign_length,
        _ => name.starts_with("x-amz-"),
    }
}

/// Trim and collapse runs of whitespace
fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| ClientError::Signing("invalid HMAC key".to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn date_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

fn amz_datetime(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%SZ").to_string()
}
