//! Once-drainable streaming object content
//!
//! A [`StreamingContent`] wraps a lazy byte source together with its declared
//! length and transfer mode. The source can be drained exactly once: a second
//! attempt fails with [`ClientError::StreamAlreadyConsumed`] instead of
//! returning an empty result.
//!
//! Content handed out by a GET owns the response body, and with it the
//! connection. Draining it to the end, or calling [`StreamingContent::discard`],
//! lets the connection go back to the pool. Content dropped while still
//! holding a response body is drained in the background when a Tokio runtime
//! is available.

use crate::{ClientError, Result};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use std::{fmt, io, pin::Pin};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::io::ReaderStream;
use tracing::{error, trace};

/// Lazy byte stream used for request and response bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>;

/// Upper bound on bytes read off an abandoned response body before the
/// connection is closed instead of reused
const ABANDONED_DISCARD_LIMIT: u64 = 8 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    /// Built by the application for an upload
    Application,
    /// Wraps a response body from the store
    Response,
}

/// A lazy, length-aware byte sequence that can be drained once
pub struct StreamingContent {
    source: Option<ByteStream>,
    length: Option<u64>,
    chunked: bool,
    consumed: bool,
    origin: Origin,
    target: Option<(String, String)>,
}

impl StreamingContent {
    /// Content from an in-memory block: fixed-length transfer
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        Self::new(
            Box::pin(stream::once(async move { Ok::<_, io::Error>(data) })),
            Some(length),
            false,
            Origin::Application,
        )
    }

    /// Content from an open reader whose size is known up front.
    ///
    /// The body is sent with chunked transfer so the payload never has to be
    /// materialized; `size` is still carried for request headers.
    pub fn from_reader<R>(reader: R, size: u64) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(
            Box::pin(ReaderStream::new(reader)),
            Some(size),
            true,
            Origin::Application,
        )
    }

    /// Content from an arbitrary byte stream; chunked when `length` is unknown
    pub fn from_stream<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::new(
            Box::pin(stream),
            length,
            length.is_none(),
            Origin::Application,
        )
    }

    /// Wrap a response body. `length` is the response `Content-Length`.
    pub(crate) fn from_response(body: ByteStream, length: Option<u64>) -> Self {
        Self::new(body, length, length.is_none(), Origin::Response)
    }

    fn new(source: ByteStream, length: Option<u64>, chunked: bool, origin: Origin) -> Self {
        Self {
            source: Some(source),
            length,
            chunked,
            consumed: false,
            origin,
            target: None,
        }
    }

    /// Record the bucket and key this content was fetched from
    pub(crate) fn with_target(mut self, bucket: &str, key: &str) -> Self {
        self.target = Some((bucket.to_string(), key.to_string()));
        self
    }

    fn attach_target(&self, err: ClientError) -> ClientError {
        match &self.target {
            Some((bucket, key)) => err.with_context(bucket, Some(key)),
            None => err,
        }
    }

    /// Declared length in bytes
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Whether the content is transferred chunked rather than fixed-length
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Drain the content into `sink`, returning the number of bytes written.
    ///
    /// Fails with [`ClientError::StreamAlreadyConsumed`] on a second call.
    /// For content fetched from the store, a body with no chunks (unless the
    /// declared length is zero) fails with [`ClientError::EmptyResponseStream`],
    /// and a byte count that differs from the declared length is a transport
    /// failure.
    pub async fn drain<W>(&mut self, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let source = self.take_source()?;
        let (written, chunks) = copy_stream(source, sink)
            .await
            .map_err(|e| self.attach_target(e))?;
        if self.origin == Origin::Response {
            self.verify_received(written, chunks)
                .map_err(|e| self.attach_target(e))?;
        }
        Ok(written)
    }

    /// Drain the content into memory
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(self.length.unwrap_or(0).min(8 * 1024 * 1024) as usize);
        self.drain(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Read the rest of the content and throw it away.
    ///
    /// Releases the underlying connection for reuse. No emptiness or length
    /// checks are applied.
    pub async fn discard(&mut self) -> Result<u64> {
        let source = self.take_source()?;
        let mut sink = tokio::io::sink();
        let (discarded, _) = copy_stream(source, &mut sink)
            .await
            .map_err(|e| self.attach_target(e))?;
        trace!(discarded, "discarded streaming content");
        Ok(discarded)
    }

    /// Hand the byte source over to an outgoing request body
    pub(crate) fn take_upload_body(&mut self) -> Result<ByteStream> {
        self.take_source()
    }

    fn take_source(&mut self) -> Result<ByteStream> {
        if self.consumed {
            error!("streaming content drained more than once");
            return Err(ClientError::StreamAlreadyConsumed);
        }
        self.consumed = true;
        self.source.take().ok_or(ClientError::StreamAlreadyConsumed)
    }

    fn verify_received(&self, written: u64, chunks: usize) -> Result<()> {
        if chunks == 0 && self.length != Some(0) {
            return Err(ClientError::EmptyResponseStream {
                bucket: None,
                key: None,
            });
        }
        if let Some(expected) = self.length {
            if expected != written {
                return Err(ClientError::transport(
                    None,
                    None,
                    io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "content length mismatch: expected {} bytes, received {}",
                            expected, written
                        ),
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Copy every chunk into `sink`; returns (bytes written, non-empty chunks)
async fn copy_stream<W>(mut source: ByteStream, sink: &mut W) -> Result<(u64, usize)>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut written = 0u64;
    let mut chunks = 0usize;
    while let Some(chunk) = source.next().await {
        let chunk = chunk.map_err(|e| ClientError::transport(None, None, e))?;
        if chunk.is_empty() {
            continue;
        }
        sink.write_all(&chunk)
            .await
            .map_err(|e| ClientError::transport(None, None, e))?;
        written += chunk.len() as u64;
        chunks += 1;
    }
    sink.flush()
        .await
        .map_err(|e| ClientError::transport(None, None, e))?;
    Ok((written, chunks))
}

impl Drop for StreamingContent {
    fn drop(&mut self) {
        if self.origin != Origin::Response {
            return;
        }
        let Some(mut source) = self.source.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut discarded = 0u64;
                    while let Some(Ok(chunk)) = source.next().await {
                        discarded += chunk.len() as u64;
                        if discarded > ABANDONED_DISCARD_LIMIT {
                            trace!(discarded, "abandoned body too large, closing connection");
                            return;
                        }
                    }
                    trace!(discarded, "drained abandoned response body");
                });
            }
            Err(_) => trace!("no runtime to drain abandoned response body, closing connection"),
        }
    }
}

impl fmt::Debug for StreamingContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingContent")
            .field("source", &"<stream>")
            .field("length", &self.length)
            .field("chunked", &self.chunked)
            .field("consumed", &self.consumed)
            .field("target", &self.target)
            .finish()
    }
}
