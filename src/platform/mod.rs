//! Host runtime seams.
//!
//! The transport never talks to the network itself. Everything it needs from
//! the host (capability probes, the asynchronous fetch call, timers, and the
//! legacy fallback transport) is reached through the traits in this module.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_lite::Stream;
use http::Method;
use simple_error::SimpleError;

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

#[cfg(feature = "native")]
pub mod native;

/// An in-flight host operation: the fetch call, a chunk read, a whole-body
/// read, or a reader cancellation.
pub type PendingOperation<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, HostError>> + Send + 'a>>;

/// A type-erased stream of request body chunks handed to the host.
pub type ByteStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// A one-shot timer. Completes when the duration elapses; dropping it disarms it.
pub type TimerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// How a host operation settled when it did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The operation observed its cancellation token and gave up.
    #[error("operation aborted")]
    Aborted,
    /// Any other host-reported failure.
    #[error("{0}")]
    Failed(SimpleError),
}

impl HostError {
    pub fn failed(message: impl Into<String>) -> Self {
        HostError::Failed(SimpleError::new(message.into()))
    }
}

impl From<SimpleError> for HostError {
    fn from(err: SimpleError) -> Self {
        HostError::Failed(err)
    }
}

pub trait Capabilities: Send + Sync {
    /// Whether the caller may be parked on a pending operation right now.
    fn suspension_available(&self) -> bool;

    /// Whether the host is a server-side runtime without a browser-style fallback.
    fn is_server_side_runtime(&self) -> bool;
}

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> TimerFuture;
}

/// The outgoing call handed to the host fetch implementation.
#[derive(Debug)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<FetchBody>,
}

pub enum FetchBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

impl fmt::Debug for FetchBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            FetchBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

pub trait HostFetch: Send + Sync {
    /// Issues the request. The returned operation settles once the response
    /// head is available, and must settle with [`HostError::Aborted`] after
    /// `signal` fires.
    fn fetch(
        &self,
        request: FetchRequest,
        signal: CancellationToken,
    ) -> PendingOperation<'static, Box<dyn HostResponse>>;
}

/// A response head as reported by the host, with access to its body.
pub trait HostResponse: Send {
    fn status(&self) -> u16;

    fn headers(&self) -> Vec<(String, String)>;

    /// The incremental body reader, or `None` when the response has no body.
    fn body_reader(&mut self) -> Option<Box<dyn ChunkReader>>;

    /// Materializes the whole body.
    fn bytes(self: Box<Self>) -> PendingOperation<'static, Bytes>;
}

pub trait ChunkReader: Send {
    /// The next chunk, or `None` once the body is complete.
    fn read(&mut self) -> PendingOperation<'_, Option<Bytes>>;

    fn cancel(&mut self) -> PendingOperation<'_, ()>;
}

/// The transport used when suspension is unavailable outside a server-side runtime.
pub trait FallbackTransport: Send + Sync {
    fn send_request(&self, request: &Request) -> Result<Response>;

    /// `Ok(None)` means streaming is not possible and the caller should fall back.
    fn send_streaming_request(&self, request: &Request) -> Result<Option<Response>>;

    /// `None` when the fallback has no streaming machinery at all.
    fn streaming_ready(&self) -> Option<bool> {
        None
    }

    fn wait_for_streaming_ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async { false })
    }
}
