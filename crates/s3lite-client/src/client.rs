//! S3 facade

use crate::{
    content::{ByteStream, StreamingContent},
    credentials::{CredentialsProvider, EnvCredentials},
    mapper,
    signer::{aws_percent_encode, PayloadDescriptor, RequestSigner, SigV4Signer, SigningRequest},
    transport::{HttpRequest, HttpResponse, RequestBody, ReqwestTransport, Transport},
    types::{header_u64, Bucket, Key, Metadata, Object, ObjectSummary, METADATA_HEADER_PREFIX},
    ClientError, Config, Result,
};
use futures::StreamExt;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method, Url,
};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument, warn};

/// Client for an S3-compatible store
///
/// Every operation resolves credentials, signs, sends once and classifies the
/// response. Nothing is retried.
#[derive(Clone)]
pub struct S3Client {
    config: Config,
    endpoint: Url,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn RequestSigner>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl S3Client {
    /// Create a client with the reqwest transport, the SigV4 signer and
    /// credentials from the environment
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> S3ClientBuilder {
        S3ClientBuilder {
            config,
            transport: None,
            signer: None,
            credentials: None,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Object Operations ====================

    /// Fetch object metadata without opening a body
    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    pub async fn head_object(&self, bucket: &Bucket, key: &Key) -> Result<ObjectSummary> {
        let response = self
            .execute_object(
                Method::HEAD,
                bucket,
                key,
                HeaderMap::new(),
                RequestBody::Empty,
                PayloadDescriptor::Empty,
            )
            .await?;

        let summary = ObjectSummary::from_headers(key.clone(), &response.headers);
        release(response.body).await;
        Ok(summary)
    }

    /// Fetch an object. The returned content holds the connection until it is
    /// drained, discarded or dropped.
    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    pub async fn get_object(&self, bucket: &Bucket, key: &Key) -> Result<Object> {
        let response = self
            .execute_object(
                Method::GET,
                bucket,
                key,
                HeaderMap::new(),
                RequestBody::Empty,
                PayloadDescriptor::Empty,
            )
            .await?;

        let summary = ObjectSummary::from_headers(key.clone(), &response.headers);
        let length = header_u64(&response.headers, header::CONTENT_LENGTH);
        let content = StreamingContent::from_response(response.body, length)
            .with_target(bucket.as_str(), key.as_str());

        Ok(Object::new(summary, content))
    }

    /// Upload an object with user metadata.
    ///
    /// The content is consumed whatever the outcome.
    #[instrument(skip_all, fields(bucket = %bucket, key = %key))]
    pub async fn put_object(
        &self,
        bucket: &Bucket,
        key: &Key,
        mut content: StreamingContent,
        metadata: &Metadata,
    ) -> Result<()> {
        let body = content
            .take_upload_body()
            .map_err(|e| e.with_context(bucket.as_str(), Some(key.as_str())))?;
        let mut headers = metadata_headers(metadata)?;

        // A known size is always declared, even for streamed content: stores
        // reject PUTs without Content-Length unless aws-chunked framing is used
        let payload = match content.length() {
            Some(length) => {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
                PayloadDescriptor::Length(length)
            }
            None => PayloadDescriptor::Chunked {
                decoded_length: None,
            },
        };

        let response = self
            .execute_object(
                Method::PUT,
                bucket,
                key,
                headers,
                RequestBody::Stream(body),
                payload,
            )
            .await?;
        release(response.body).await;
        Ok(())
    }

    /// Upload an object without metadata
    pub async fn put_object_default(
        &self,
        bucket: &Bucket,
        key: &Key,
        content: StreamingContent,
    ) -> Result<()> {
        self.put_object(bucket, key, content, &Metadata::new()).await
    }

    // ==================== Helper Methods ====================

    /// [`Self::execute`] for a key-scoped request. A 404 that names neither
    /// bucket nor key is resolved with a bucket lookup.
    async fn execute_object(
        &self,
        method: Method,
        bucket: &Bucket,
        key: &Key,
        headers: HeaderMap,
        body: RequestBody,
        payload: PayloadDescriptor,
    ) -> Result<HttpResponse> {
        match self
            .execute(method, bucket, Some(key), headers, body, payload)
            .await
        {
            Err(e) if mapper::is_unclassified_not_found(&e) => {
                let err = self.resolve_not_found(bucket, key, e).await;
                warn!(code = err.code(), "store rejected request");
                Err(err)
            }
            other => other,
        }
    }

    /// Sign and send one request; non-2xx responses are read, released and
    /// classified
    async fn execute(
        &self,
        method: Method,
        bucket: &Bucket,
        key: Option<&Key>,
        headers: HeaderMap,
        body: RequestBody,
        payload: PayloadDescriptor,
    ) -> Result<HttpResponse> {
        let url = self.object_url(bucket, key);
        let credentials = self.credentials.current().await?;
        let signed = self.signer.sign(
            &SigningRequest {
                method: &method,
                url: &url,
                headers: &headers,
                payload,
            },
            &credentials,
            &self.config.region,
        )?;

        debug!("Sending {} request to {}", method, url);
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers: signed,
                body,
            })
            .await
            .map_err(|e| mapper::transport_failure(Some(bucket), key, e))?;

        let status = response.status;
        debug!(status = %status, "received response");
        if status.is_success() {
            return Ok(response);
        }

        let error_body =
            mapper::read_error_body(response.body, self.config.max_error_body_bytes).await;
        let err = mapper::classify(bucket, key, status, &response.headers, &error_body);
        if !mapper::is_unclassified_not_found(&err) {
            warn!(code = err.code(), status = %status, "store rejected request");
        }
        Err(err)
    }

    /// Decide between a missing bucket and a missing key after a bare 404
    async fn resolve_not_found(
        &self,
        bucket: &Bucket,
        key: &Key,
        original: ClientError,
    ) -> ClientError {
        let request_id = original.request_id().map(str::to_string);
        let lookup = self
            .execute(
                Method::HEAD,
                bucket,
                None,
                HeaderMap::new(),
                RequestBody::Empty,
                PayloadDescriptor::Empty,
            )
            .await;

        match lookup {
            Err(e) if e.status() == Some(reqwest::StatusCode::NOT_FOUND) => ClientError::NoSuchBucket {
                bucket: bucket.as_str().to_string(),
                key: Some(key.as_str().to_string()),
                message: None,
                request_id,
            },
            Ok(response) => {
                release(response.body).await;
                no_such_key(bucket, key, request_id)
            }
            Err(e) => {
                debug!(error = %e, "bucket lookup inconclusive");
                no_such_key(bucket, key, request_id)
            }
        }
    }

    /// Path-style URL for a bucket or an object
    fn object_url(&self, bucket: &Bucket, key: Option<&Key>) -> Url {
        let mut path = self.endpoint.path().trim_end_matches('/').to_string();
        path.push('/');
        path.push_str(&aws_percent_encode(bucket.as_str(), false));
        if let Some(key) = key {
            path.push('/');
            path.push_str(&aws_percent_encode(key.as_str(), true));
        }

        let mut url = self.endpoint.clone();
        url.set_path(&path);
        url
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("endpoint", &self.endpoint.as_str())
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

/// Builder for [`S3Client`] with injectable collaborators
pub struct S3ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    signer: Option<Arc<dyn RequestSigner>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl S3ClientBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Validate the configuration and build the client
    pub fn build(self) -> Result<S3Client> {
        let endpoint = self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };

        Ok(S3Client {
            endpoint,
            transport,
            signer: self.signer.unwrap_or_else(|| Arc::new(SigV4Signer::new())),
            credentials: self.credentials.unwrap_or_else(|| Arc::new(EnvCredentials)),
            config: self.config,
        })
    }
}

fn no_such_key(bucket: &Bucket, key: &Key, request_id: Option<String>) -> ClientError {
    ClientError::NoSuchKey {
        bucket: bucket.as_str().to_string(),
        key: key.as_str().to_string(),
        message: None,
        request_id,
    }
}

/// `x-amz-meta-*` request headers for user metadata
fn metadata_headers(metadata: &Metadata) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(metadata.len());
    for (name, value) in metadata {
        if name.trim().is_empty() {
            return Err(ClientError::InvalidArgument(
                "metadata key must not be empty".to_string(),
            ));
        }
        let header_name = format!("{}{}", METADATA_HEADER_PREFIX, name.to_ascii_lowercase());
        let header_name = HeaderName::from_bytes(header_name.as_bytes()).map_err(|_| {
            ClientError::InvalidArgument(format!("invalid metadata key: {:?}", name))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| {
            ClientError::InvalidArgument(format!("invalid value for metadata key {:?}", name))
        })?;
        if headers.contains_key(&header_name) {
            return Err(ClientError::InvalidArgument(format!(
                "metadata key {:?} collides with another key once lower-cased",
                name
            )));
        }
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// Read a response body to the end so the connection can be reused
async fn release(mut body: ByteStream) {
    while let Some(chunk) = body.next().await {
        if chunk.is_err() {
            break;
        }
    }
}
