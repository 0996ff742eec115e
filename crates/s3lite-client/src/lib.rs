//! # s3lite client
//!
//! A minimal streaming client for S3-compatible object stores.
//!
//! ## Features
//!
//! - **Three operations**: `head_object`, `get_object` and `put_object`
//! - **Streaming**: bodies are never buffered whole; content drains once
//! - **Typed errors**: every failure carries a store code and bucket/key context
//! - **Pluggable**: transport, signer and credentials are injectable traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use s3lite_client::{Bucket, Config, Key, Metadata, S3Client, StreamingContent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = S3Client::new(Config::new("http://localhost:9000"))?;
//!     let bucket = Bucket::new("my-bucket")?;
//!     let key = Key::new("hello.txt")?;
//!
//!     let mut metadata = Metadata::new();
//!     metadata.insert("test".to_string(), "yes".to_string());
//!     client
//!         .put_object(&bucket, &key, StreamingContent::from_bytes("Hello, World!"), &metadata)
//!         .await?;
//!
//!     let mut object = client.get_object(&bucket, &key).await?;
//!     let data = object.content().bytes().await?;
//!     println!("Content: {}", String::from_utf8_lossy(&data));
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod content;
mod credentials;
mod error;
pub mod mapper;
pub mod signer;
pub mod transport;
mod types;

pub use client::{S3Client, S3ClientBuilder};
pub use config::Config;
pub use content::{ByteStream, StreamingContent};
pub use credentials::{
    Credentials, CredentialsProvider, EnvCredentials, RotatingCredentials, StaticCredentials,
};
pub use error::{BoxError, ClientError, Result};
pub use signer::{PayloadDescriptor, RequestSigner, SigV4Signer, SigningRequest};
pub use transport::{HttpRequest, HttpResponse, RequestBody, ReqwestTransport, Transport};
pub use types::*;
