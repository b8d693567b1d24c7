//! Synchronous HTTP transport over an asynchronous host fetch.
//!
//! The host exposes networking only as futures; callers of this crate want a
//! blocking `send_request`. [`FetchTransport`] bridges the two: it checks
//! whether the caller may be parked, issues the host fetch, parks the caller
//! until each step settles or its timeout fires, and hands back either a
//! buffered body or a pull-based [`StreamReader`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fetch_transport::{FetchTransport, HostFetch, Request};
//!
//! fn get(fetch: Arc<dyn HostFetch>) -> fetch_transport::Result<()> {
//!     let transport = FetchTransport::new(fetch);
//!     let request = Request::get("https://example.com/").with_timeout(Duration::from_secs(5));
//!     let response = transport.send_request(&request)?;
//!     log::info!("status = {}", response.status());
//!     Ok(())
//! }
//! ```

mod bridge;
mod cancel;
mod config;
mod error;
mod executor;
pub mod platform;
mod request;
mod response;
mod stream;

pub use bridge::is_suspended;
pub use cancel::{CancellationToken, Cancelled};
pub use config::TransportConfig;
pub use error::{Error, IntoSimpleError, Result};
pub use executor::{FetchTransport, FetchTransportBuilder, Strategy};
pub use platform::{
    ByteStream, Capabilities, ChunkReader, Clock, FallbackTransport, FetchBody, FetchRequest,
    HostError, HostFetch, HostResponse, PendingOperation, TimerFuture,
};
pub use request::{BodySource, Request, RequestBody, RequestContext, STRIPPED_HEADERS};
pub use response::{Body, Response, ResponseHead};
pub use stream::StreamReader;
