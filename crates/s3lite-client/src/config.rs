//! Client configuration

use crate::{ClientError, Result};
use reqwest::Url;
use std::time::Duration;

/// Client configuration, fixed for the lifetime of a client
#[derive(Clone, Debug)]
pub struct Config {
    /// Store endpoint URL (path-style addressing)
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Connect timeout, and the longest wait for the next body bytes
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum error body bytes kept for classification
    pub max_error_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: format!("s3lite-client/{}", env!("CARGO_PKG_VERSION")),
            max_error_body_bytes: 64 * 1024, // 64 KiB
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the signing region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Parse and check the endpoint and region
    pub(crate) fn validate(&self) -> Result<Url> {
        if self.region.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "region must not be empty".to_string(),
            ));
        }

        let url = Url::parse(&self.endpoint).map_err(|e| {
            ClientError::InvalidArgument(format!("invalid endpoint {}: {}", self.endpoint, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ClientError::InvalidArgument(format!(
                "endpoint must be an http(s) URL with a host: {}",
                self.endpoint
            )));
        }
        if url.query().is_some() {
            return Err(ClientError::InvalidArgument(format!(
                "endpoint must not carry a query string: {}",
                self.endpoint
            )));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.region, "us-east-1");
        assert!(config.user_agent.starts_with("s3lite-client/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(Config::new("not a url").validate().is_err());
        assert!(Config::new("ftp://example.com").validate().is_err());
        assert!(Config::new("http://example.com/?x=1").validate().is_err());
    }

    #[test]
    fn test_rejects_empty_region() {
        assert!(Config::new("http://localhost:9000")
            .with_region(" ")
            .validate()
            .is_err());
    }
}
