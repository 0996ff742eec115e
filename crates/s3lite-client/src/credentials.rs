//! Credentials and credential providers
//!
//! Providers are queried on every request so that rotation performed outside
//! the client is picked up without rebuilding it.

use crate::{ClientError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{fmt, sync::Arc};

/// Access key, secret and optional session token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Result<Self> {
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();

        if access_key_id.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "access_key_id must not be empty".to_string(),
            ));
        }
        if secret_access_key.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "secret_access_key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: None,
        })
    }

    pub fn with_session_token(mut self, session_token: impl Into<String>) -> Result<Self> {
        let session_token = session_token.into();
        if session_token.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "session_token must not be empty".to_string(),
            ));
        }
        self.session_token = Some(session_token);
        Ok(self)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Keep the first and last four characters of a value
fn redact(value: &str) -> String {
    let chars: Vec<char> = value.trim().chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Source of the credentials current at call time
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn current(&self) -> Result<Credentials>;
}

/// Fixed credentials
#[derive(Clone, Debug)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl CredentialsProvider for StaticCredentials {
    async fn current(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}

/// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
/// `AWS_SESSION_TOKEN` from the environment on every call
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialsProvider for EnvCredentials {
    async fn current(&self) -> Result<Credentials> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| ClientError::Credentials("missing AWS_ACCESS_KEY_ID".to_string()))?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| ClientError::Credentials("missing AWS_SECRET_ACCESS_KEY".to_string()))?;

        let mut credentials = Credentials::new(access_key_id, secret_access_key)
            .map_err(|e| ClientError::Credentials(e.to_string()))?;
        if let Some(token) = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            credentials = credentials
                .with_session_token(token)
                .map_err(|e| ClientError::Credentials(e.to_string()))?;
        }
        Ok(credentials)
    }
}

/// Credentials that an external process replaces over time
#[derive(Clone, Debug)]
pub struct RotatingCredentials {
    inner: Arc<RwLock<Credentials>>,
}

impl RotatingCredentials {
    pub fn new(initial: Credentials) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Replace the credentials; subsequent requests sign with the new value
    pub fn rotate(&self, next: Credentials) {
        *self.inner.write() = next;
    }
}

#[async_trait]
impl CredentialsProvider for RotatingCredentials {
    async fn current(&self) -> Result<Credentials> {
        Ok(self.inner.read().clone())
    }
}
