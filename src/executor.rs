use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bridge::{StepContext, SuspendBridge};
use crate::cancel::CancellationToken;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::platform::{Capabilities, Clock, FallbackTransport, HostFetch};
use crate::request::Request;
use crate::response::{Body, Response, ResponseHead};
use crate::stream::StreamReader;

const SERVER_SIDE_UNAVAILABLE: &str = "synchronous requests need a suspendable execution context; \
     server-side runtimes have no fallback transport, so enter the runtime asynchronously";

/// How a single call is carried out. Resolved afresh for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Suspend,
    Unavailable,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Buffered,
    Streaming,
}

/// Synchronous HTTP transport over the host's asynchronous fetch.
pub struct FetchTransport {
    capabilities: Arc<dyn Capabilities>,
    fetch: Arc<dyn HostFetch>,
    clock: Arc<dyn Clock>,
    fallback: Option<Arc<dyn FallbackTransport>>,
    config: TransportConfig,
    streaming_warning_shown: AtomicBool,
}

impl FetchTransport {
    #[cfg(feature = "native")]
    pub fn new(fetch: Arc<dyn HostFetch>) -> Self {
        Self::builder(
            fetch,
            Arc::new(crate::platform::native::NativeCapabilities),
            Arc::new(crate::platform::native::AsyncIoClock),
        )
        .build()
    }

    pub fn builder(
        fetch: Arc<dyn HostFetch>,
        capabilities: Arc<dyn Capabilities>,
        clock: Arc<dyn Clock>,
    ) -> FetchTransportBuilder {
        FetchTransportBuilder {
            capabilities,
            fetch,
            clock,
            fallback: None,
            config: TransportConfig::default(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        if self.capabilities.suspension_available() {
            Strategy::Suspend
        } else if self.capabilities.is_server_side_runtime() {
            Strategy::Unavailable
        } else {
            Strategy::Fallback
        }
    }

    pub fn send_request(&self, request: &Request) -> Result<Response> {
        match self.strategy() {
            Strategy::Suspend => self.send_suspended(request, Mode::Buffered),
            Strategy::Unavailable => Err(unavailable()),
            Strategy::Fallback => match &self.fallback {
                Some(fallback) => {
                    log::debug!("{}: delegating to fallback transport", request.context());
                    fallback.send_request(request)
                }
                None => Err(Error::CapabilityUnavailable(
                    "suspension is unavailable and no fallback transport is configured"
                        .to_string(),
                )),
            },
        }
    }

    /// Sends a request whose body is read incrementally.
    ///
    /// `Ok(None)` means no streaming path exists right now and the caller
    /// should fall back to [`send_request`](Self::send_request).
    pub fn send_streaming_request(&self, request: &Request) -> Result<Option<Response>> {
        match self.strategy() {
            Strategy::Suspend => self.send_suspended(request, Mode::Streaming).map(Some),
            Strategy::Unavailable => Err(unavailable()),
            Strategy::Fallback => {
                if let Some(fallback) = &self.fallback {
                    if fallback.streaming_ready().unwrap_or(false) {
                        log::debug!(
                            "{}: delegating streaming request to fallback transport",
                            request.context()
                        );
                        return fallback.send_streaming_request(request);
                    }
                }
                self.warn_streaming_unavailable();
                Ok(None)
            }
        }
    }

    /// Whether streaming requests can be served right now. `None` when there
    /// is no streaming machinery at all.
    pub fn streaming_ready(&self) -> Option<bool> {
        match self.strategy() {
            Strategy::Suspend => Some(true),
            Strategy::Unavailable => Some(false),
            Strategy::Fallback => self
                .fallback
                .as_ref()
                .and_then(|fallback| fallback.streaming_ready()),
        }
    }

    /// Waits until streaming requests can be served. Returns `false` when they
    /// never will be.
    pub async fn wait_for_streaming_ready(&self) -> bool {
        match self.strategy() {
            Strategy::Suspend => true,
            Strategy::Unavailable => false,
            Strategy::Fallback => match &self.fallback {
                Some(fallback) => fallback.wait_for_streaming_ready().await,
                None => false,
            },
        }
    }

    fn send_suspended(&self, request: &Request, mode: Mode) -> Result<Response> {
        let context = request.context();
        let timeout = request.timeout();
        let token = CancellationToken::new();
        let bridge = SuspendBridge::new(&*self.clock);

        log::debug!("{context}: fetching ({mode:?}, timeout {timeout:?})");
        let fetch_request = request.to_fetch_request(&self.config.extra_stripped_headers);
        let mut host_response = bridge.run_with_timeout(
            self.fetch.fetch(fetch_request, token.clone()),
            timeout,
            &token,
            &StepContext {
                request: &context,
                response: None,
                step: "response head",
            },
        )?;

        let head =
            ResponseHead::from_host(&*host_response).map_err(|e| Error::RequestFailed {
                message: format!("malformed response: {e}"),
                request: context.clone(),
                response: None,
            })?;
        log::debug!("{context}: status {}", head.status());

        match mode {
            Mode::Streaming => {
                let body = match host_response.body_reader() {
                    Some(source) => Body::Streaming(StreamReader::new(
                        source,
                        timeout,
                        token,
                        self.clock.clone(),
                        context.clone(),
                        head.clone(),
                    )),
                    None => Body::empty(),
                };
                Ok(Response::new(head, context).with_body(body))
            }
            Mode::Buffered => {
                let body = bridge.run_with_timeout(
                    host_response.bytes(),
                    timeout,
                    &token,
                    &StepContext {
                        request: &context,
                        response: Some(&head),
                        step: "response body",
                    },
                )?;
                log::debug!("{context}: read {} body bytes", body.len());
                Ok(Response::new(head, context).with_body(Body::Buffered(body)))
            }
        }
    }

    fn warn_streaming_unavailable(&self) {
        if !self.config.warn_on_streaming_fallback {
            return;
        }
        if !self.streaming_warning_shown.swap(true, Ordering::Relaxed) {
            log::warn!(
                "streaming requests are unavailable: the caller cannot be suspended and no \
                 streaming fallback is ready; responses will be fully buffered"
            );
        }
    }
}

fn unavailable() -> Error {
    log::debug!("no suspension available in a server-side runtime");
    Error::CapabilityUnavailable(SERVER_SIDE_UNAVAILABLE.to_string())
}

pub struct FetchTransportBuilder {
    capabilities: Arc<dyn Capabilities>,
    fetch: Arc<dyn HostFetch>,
    clock: Arc<dyn Clock>,
    fallback: Option<Arc<dyn FallbackTransport>>,
    config: TransportConfig,
}

impl FetchTransportBuilder {
    pub fn fallback(mut self, fallback: Arc<dyn FallbackTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FetchTransport {
        FetchTransport {
            capabilities: self.capabilities,
            fetch: self.fetch,
            clock: self.clock,
            fallback: self.fallback,
            config: self.config,
            streaming_warning_shown: AtomicBool::new(false),
        }
    }
}
