//! Fake host runtime shared by the integration tests.
//!
//! The clock is virtual: time only moves when a scripted host operation
//! advances it, so timeouts are deterministic and every armed timer can be
//! counted.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use bytes::Bytes;
use fetch_transport::{
    Capabilities, CancellationToken, ChunkReader, Clock, FallbackTransport, FetchBody,
    FetchRequest, FetchTransport, HostError, HostFetch, HostResponse, PendingOperation, Request,
    Response, Result, TimerFuture,
};
use http::Method;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Capabilities ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCapabilities {
    suspension: AtomicBool,
    server_side: AtomicBool,
}

impl FakeCapabilities {
    pub fn suspendable() -> Arc<Self> {
        let caps = Self::default();
        caps.suspension.store(true, Ordering::SeqCst);
        Arc::new(caps)
    }

    pub fn server_side_without_suspension() -> Arc<Self> {
        let caps = Self::default();
        caps.server_side.store(true, Ordering::SeqCst);
        Arc::new(caps)
    }

    pub fn browser_without_suspension() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_suspension(&self, available: bool) {
        self.suspension.store(available, Ordering::SeqCst);
    }
}

impl Capabilities for FakeCapabilities {
    fn suspension_available(&self) -> bool {
        self.suspension.load(Ordering::SeqCst)
    }

    fn is_server_side_runtime(&self) -> bool {
        self.server_side.load(Ordering::SeqCst)
    }
}

// ── Virtual clock ───────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeClock {
    state: Arc<ClockState>,
}

#[derive(Default)]
struct ClockState {
    now: Mutex<Duration>,
    waiters: Mutex<Vec<Waker>>,
    armed: AtomicUsize,
    disarmed: AtomicUsize,
    fired: AtomicUsize,
}

impl FakeClock {
    pub fn now(&self) -> Duration {
        *self.state.now.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.state.now.lock().unwrap() += by;
        let waiters = std::mem::take(&mut *self.state.waiters.lock().unwrap());
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn armed(&self) -> usize {
        self.state.armed.load(Ordering::SeqCst)
    }

    pub fn disarmed(&self) -> usize {
        self.state.disarmed.load(Ordering::SeqCst)
    }

    pub fn fired(&self) -> usize {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Armed timers that have not been disarmed yet.
    pub fn outstanding(&self) -> usize {
        self.armed() - self.disarmed()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) -> TimerFuture {
        self.state.armed.fetch_add(1, Ordering::SeqCst);
        Box::pin(FakeTimer {
            state: self.state.clone(),
            deadline: self.now().saturating_add(duration),
            fired: false,
        })
    }
}

struct FakeTimer {
    state: Arc<ClockState>,
    deadline: Duration,
    fired: bool,
}

impl Future for FakeTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if *self.state.now.lock().unwrap() >= self.deadline {
            if !self.fired {
                self.fired = true;
                self.state.fired.fetch_add(1, Ordering::SeqCst);
            }
            return Poll::Ready(());
        }
        self.state.waiters.lock().unwrap().push(cx.waker().clone());
        Poll::Pending
    }
}

impl Drop for FakeTimer {
    fn drop(&mut self) {
        self.state.disarmed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Scripted fetch ──────────────────────────────────────────────────

/// How a scripted host step settles.
#[derive(Clone, Debug)]
pub enum Step<T> {
    /// Settles immediately with the value.
    Ready(T),
    /// Advances the clock, then settles with the value.
    Slow(Duration, T),
    /// Advances the clock, then waits for cancellation and settles as aborted.
    Stall(Duration),
    /// Settles immediately with a host failure.
    Fail(&'static str),
}

#[derive(Clone, Debug)]
pub enum FakeBody {
    None,
    Whole(Step<Bytes>),
    Chunks(Vec<Step<Bytes>>),
}

#[derive(Clone, Debug)]
pub struct FakeResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: FakeBody,
}

impl FakeResponse {
    pub fn ok(body: FakeBody) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

#[derive(Default)]
pub struct FetchLog {
    pub fetches: AtomicUsize,
    pub chunk_reads: AtomicUsize,
    pub reader_cancels: AtomicUsize,
    pub requests: Mutex<Vec<RecordedRequest>>,
    pub tokens: Mutex<Vec<CancellationToken>>,
}

impl FetchLog {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn chunk_reads(&self) -> usize {
        self.chunk_reads.load(Ordering::SeqCst)
    }

    pub fn reader_cancels(&self) -> usize {
        self.reader_cancels.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request recorded")
    }

    pub fn last_token(&self) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no token recorded")
    }
}

pub struct FakeFetch {
    head: Step<FakeResponse>,
    clock: FakeClock,
    pub log: Arc<FetchLog>,
}

impl FakeFetch {
    pub fn new(head: Step<FakeResponse>, clock: FakeClock) -> Arc<Self> {
        Arc::new(Self {
            head,
            clock,
            log: Arc::new(FetchLog::default()),
        })
    }
}

fn settle<T: Send + 'static>(
    step: Step<T>,
    clock: FakeClock,
    token: CancellationToken,
) -> PendingOperation<'static, T> {
    Box::pin(async move {
        match step {
            Step::Ready(value) => Ok(value),
            Step::Slow(elapse, value) => {
                clock.advance(elapse);
                Ok(value)
            }
            Step::Stall(elapse) => {
                clock.advance(elapse);
                token.cancelled().await;
                Err(HostError::Aborted)
            }
            Step::Fail(message) => Err(HostError::failed(message)),
        }
    })
}

impl HostFetch for FakeFetch {
    fn fetch(
        &self,
        request: FetchRequest,
        signal: CancellationToken,
    ) -> PendingOperation<'static, Box<dyn HostResponse>> {
        self.log.fetches.fetch_add(1, Ordering::SeqCst);
        let body = match request.body {
            Some(FetchBody::Bytes(bytes)) => Some(bytes),
            Some(FetchBody::Stream(stream)) => {
                use futures_lite::StreamExt;
                let chunks: Vec<Bytes> = futures_lite::future::block_on(stream.collect());
                Some(Bytes::from(chunks.concat()))
            }
            None => None,
        };
        self.log.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
        });
        self.log.tokens.lock().unwrap().push(signal.clone());

        let clock = self.clock.clone();
        let log = self.log.clone();
        let token = signal.clone();
        let head_op = settle(self.head.clone(), clock.clone(), signal);
        Box::pin(async move {
            let response = head_op.await?;
            Ok(Box::new(FakeHostResponse {
                response,
                clock,
                token,
                log,
            }) as Box<dyn HostResponse>)
        })
    }
}

struct FakeHostResponse {
    response: FakeResponse,
    clock: FakeClock,
    token: CancellationToken,
    log: Arc<FetchLog>,
}

impl HostResponse for FakeHostResponse {
    fn status(&self) -> u16 {
        self.response.status
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.response.headers.clone()
    }

    fn body_reader(&mut self) -> Option<Box<dyn ChunkReader>> {
        let steps = match &self.response.body {
            FakeBody::None => return None,
            FakeBody::Whole(step) => vec![step.clone()],
            FakeBody::Chunks(steps) => steps.clone(),
        };
        Some(Box::new(FakeChunkReader {
            steps: steps.into(),
            clock: self.clock.clone(),
            token: self.token.clone(),
            log: self.log.clone(),
        }))
    }

    fn bytes(self: Box<Self>) -> PendingOperation<'static, Bytes> {
        let this = *self;
        let step = match this.response.body {
            FakeBody::None => Step::Ready(Bytes::new()),
            FakeBody::Whole(step) => step,
            FakeBody::Chunks(steps) => {
                let mut whole = Vec::new();
                for step in steps {
                    match step {
                        Step::Ready(chunk) | Step::Slow(_, chunk) => whole.extend_from_slice(&chunk),
                        other => return settle(other, this.clock, this.token),
                    }
                }
                Step::Ready(Bytes::from(whole))
            }
        };
        settle(step, this.clock, this.token)
    }
}

struct FakeChunkReader {
    steps: VecDeque<Step<Bytes>>,
    clock: FakeClock,
    token: CancellationToken,
    log: Arc<FetchLog>,
}

impl ChunkReader for FakeChunkReader {
    fn read(&mut self) -> PendingOperation<'_, Option<Bytes>> {
        self.log.chunk_reads.fetch_add(1, Ordering::SeqCst);
        let step = match self.steps.pop_front() {
            None => Step::Ready(None),
            Some(Step::Ready(chunk)) => Step::Ready(Some(chunk)),
            Some(Step::Slow(elapse, chunk)) => Step::Slow(elapse, Some(chunk)),
            Some(Step::Stall(elapse)) => Step::Stall(elapse),
            Some(Step::Fail(message)) => Step::Fail(message),
        };
        settle(step, self.clock.clone(), self.token.clone())
    }

    fn cancel(&mut self) -> PendingOperation<'_, ()> {
        self.log.reader_cancels.fetch_add(1, Ordering::SeqCst);
        self.steps.clear();
        Box::pin(async { Ok(()) })
    }
}

// ── Fallback ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeFallback {
    pub streaming_ready: Option<bool>,
    pub sends: AtomicUsize,
    pub streaming_sends: AtomicUsize,
}

impl FallbackTransport for FakeFallback {
    fn send_request(&self, request: &Request) -> Result<Response> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(fallback_response(request))
    }

    fn send_streaming_request(&self, request: &Request) -> Result<Option<Response>> {
        self.streaming_sends.fetch_add(1, Ordering::SeqCst);
        Ok(Some(fallback_response(request)))
    }

    fn streaming_ready(&self) -> Option<bool> {
        self.streaming_ready
    }

    fn wait_for_streaming_ready(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let ready = self.streaming_ready.is_some();
        Box::pin(async move { ready })
    }
}

fn fallback_response(request: &Request) -> Response {
    use fetch_transport::{Body, ResponseHead};
    Response::new(
        ResponseHead::new(http::StatusCode::ACCEPTED, http::HeaderMap::new()),
        request.context(),
    )
    .with_body(Body::Buffered(Bytes::from_static(b"from fallback")))
}

// ── Assembly ────────────────────────────────────────────────────────

pub struct Harness {
    pub transport: FetchTransport,
    pub clock: FakeClock,
    pub fetch: Arc<FakeFetch>,
    pub capabilities: Arc<FakeCapabilities>,
}

impl Harness {
    pub fn suspendable(head: Step<FakeResponse>) -> Self {
        Self::with_capabilities(head, FakeCapabilities::suspendable(), None)
    }

    pub fn with_capabilities(
        head: Step<FakeResponse>,
        capabilities: Arc<FakeCapabilities>,
        fallback: Option<Arc<FakeFallback>>,
    ) -> Self {
        init_logging();
        let clock = FakeClock::default();
        let fetch = FakeFetch::new(head, clock.clone());
        let mut builder = FetchTransport::builder(
            fetch.clone(),
            capabilities.clone(),
            Arc::new(clock.clone()),
        );
        if let Some(fallback) = fallback {
            builder = builder.fallback(fallback);
        }
        Self {
            transport: builder.build(),
            clock,
            fetch,
            capabilities,
        }
    }
}
