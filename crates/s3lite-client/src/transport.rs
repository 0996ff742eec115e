//! HTTP transport seam
//!
//! A [`Transport`] sends a fully signed request and yields the status, the
//! headers and a lazy body. The body owns the connection: it goes back to the
//! pool once read to the end and is closed if dropped early.

use crate::{content::ByteStream, error::BoxError, ClientError, Config, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::{header::HeaderMap, Method, StatusCode, Url};
use std::io;

/// A signed request ready to send
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// Outgoing request body
pub enum RequestBody {
    Empty,
    Stream(ByteStream),
}

/// Status, headers and a not-yet-read body
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

/// Sends requests to the store
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request; errors are failures that produced no HTTP response
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BoxError>;
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &Config) -> Result<Self> {
        // Bounds connecting and each idle read, so long bodies keep streaming
        let http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::transport(None, None, e))?;

        Ok(Self { http })
    }

    /// Wrap an already configured `reqwest` client
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, BoxError> {
        let mut req = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);

        if let RequestBody::Stream(stream) = request.body {
            req = req.body(reqwest::Body::wrap_stream(stream));
        }

        let response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
