//! In-process S3-compatible store for integration tests
#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, head},
    Router,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use s3lite_client::{Config, Credentials, CredentialsProvider, S3Client, StaticCredentials};
use sha2::{Digest, Sha256};
use futures::StreamExt;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;

pub const ACCESS_KEY: &str = "AKIAFAKESTORE0000001";
pub const SECRET_KEY: &str = "fake-store-secret-key";

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Bytes,
    pub etag: String,
    pub metadata: BTreeMap<String, String>,
    pub last_modified: DateTime<Utc>,
    /// Serve GET bodies with chunked transfer instead of Content-Length
    pub chunked: bool,
    pub chunk_size: usize,
    /// Pause before each chunk of a chunked GET body
    pub chunk_delay: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub access_key: String,
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<String, HashMap<String, StoredObject>>,
    requests: Vec<RecordedRequest>,
}

type SharedState = Arc<Mutex<StoreState>>;

/// A running fake store
pub struct FakeStore {
    pub endpoint: String,
    state: SharedState,
}

impl FakeStore {
    /// Spawn a store on a random port
    pub async fn spawn() -> Self {
        let state = SharedState::default();
        let app = Router::new()
            .route("/{bucket}", head(head_bucket))
            .route("/{bucket}/{*key}", get(object).head(object).put(object))
            .layer(DefaultBodyLimit::disable())
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{}", addr),
            state,
        }
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// Seed an object with an explicit entity tag
    pub fn seed(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        etag: &str,
        metadata: &[(&str, &str)],
        chunked: bool,
    ) {
        let object = StoredObject {
            data: data.into(),
            etag: etag.to_string(),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            last_modified: Utc::now(),
            chunked,
            chunk_size: 4096,
            chunk_delay: None,
        };
        self.insert(bucket, key, object);
    }

    /// Seed an object whose GET body trickles out `chunk_size` bytes at a time
    pub fn seed_slow(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        chunk_size: usize,
        delay: Duration,
    ) {
        let data = data.into();
        let object = StoredObject {
            etag: hex::encode(&Sha256::digest(&data)[..16]),
            data,
            metadata: BTreeMap::new(),
            last_modified: Utc::now(),
            chunked: true,
            chunk_size,
            chunk_delay: Some(delay),
        };
        self.insert(bucket, key, object);
    }

    fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Last request matching `method`
    pub fn last_request(&self, method: Method) -> Option<RecordedRequest> {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.method == method)
    }

    pub fn client(&self) -> S3Client {
        client_with(&self.endpoint, Arc::new(StaticCredentials::new(credentials())))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> S3Client {
        S3Client::builder(Config::new(&self.endpoint).with_timeout(timeout))
            .credentials(Arc::new(StaticCredentials::new(credentials())))
            .build()
            .unwrap()
    }
}

pub fn credentials() -> Credentials {
    Credentials::new(ACCESS_KEY, SECRET_KEY).unwrap()
}

pub fn client_with(endpoint: &str, provider: Arc<dyn CredentialsProvider>) -> S3Client {
    S3Client::builder(Config::new(endpoint))
        .credentials(provider)
        .build()
        .unwrap()
}

// ==================== Handlers ====================

async fn head_bucket(
    State(state): State<SharedState>,
    uri: Uri,
    Path(bucket): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = record(&state, Method::HEAD, &uri, &headers) {
        return denied;
    }

    if state.lock().buckets.contains_key(&bucket) {
        StatusCode::OK.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn object(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = record(&state, method.clone(), &uri, &headers) {
        return denied;
    }

    let mut state = state.lock();
    let Some(objects) = state.buckets.get_mut(&bucket) else {
        return error_response(&method, StatusCode::NOT_FOUND, "NoSuchBucket", &bucket);
    };

    if method == Method::PUT {
        if !headers.contains_key(header::CONTENT_LENGTH) {
            return error_response(
                &method,
                StatusCode::LENGTH_REQUIRED,
                "MissingContentLength",
                &format!("{}/{}", bucket, key),
            );
        }

        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                let meta_key = name.as_str().strip_prefix("x-amz-meta-")?;
                Some((meta_key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let etag = hex::encode(&Sha256::digest(&body)[..16]);
        objects.insert(
            key,
            StoredObject {
                data: body,
                etag: etag.clone(),
                metadata,
                last_modified: Utc::now(),
                chunked: false,
                chunk_size: 4096,
                chunk_delay: None,
            },
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(header::ETAG, quoted(&etag));
        return (StatusCode::OK, response_headers).into_response();
    }

    match objects.get(&key) {
        Some(object) => object_response(&method, object),
        None => error_response(
            &method,
            StatusCode::NOT_FOUND,
            "NoSuchKey",
            &format!("{}/{}", bucket, key),
        ),
    }
}

/// Record the request and check it carries a SigV4 authorization
fn record(
    state: &SharedState,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<(), Response> {
    let access_key = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("AWS4-HMAC-SHA256 Credential="))
        .and_then(|v| v.split('/').next())
        .map(str::to_string);

    let Some(access_key) = access_key else {
        return Err(error_response(
            &method,
            StatusCode::FORBIDDEN,
            "AccessDenied",
            uri.path(),
        ));
    };

    state.lock().requests.push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        headers: headers.clone(),
        access_key,
    });
    Ok(())
}

fn object_response(method: &Method, object: &StoredObject) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, quoted(&object.etag));
    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(
            &object
                .last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        )
        .unwrap(),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    for (name, value) in &object.metadata {
        headers.insert(
            HeaderName::from_bytes(format!("x-amz-meta-{}", name).as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }

    if method == Method::HEAD {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.data.len()));
        return (StatusCode::OK, headers).into_response();
    }

    let body = if object.chunked {
        let chunks = object
            .data
            .chunks(object.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect::<Vec<_>>();
        let delay = object.chunk_delay;
        Body::from_stream(futures::stream::iter(chunks).then(move |chunk| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, std::io::Error>(chunk)
        }))
    } else {
        Body::from(object.data.clone())
    };
    (StatusCode::OK, headers, body).into_response()
}

/// S3 error document; HEAD responses carry no body
fn error_response(method: &Method, status: StatusCode, code: &str, resource: &str) -> Response {
    if method == Method::HEAD {
        return status.into_response();
    }

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{} rejected the request</Message>
    <Resource>/{}</Resource>
    <RequestId>fake-request-id</RequestId>
</Error>"#,
        code, code, resource
    );
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        xml,
    )
        .into_response()
}

fn quoted(etag: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{}\"", etag)).unwrap()
}
