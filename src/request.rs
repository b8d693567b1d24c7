use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use simple_error::{SimpleError, SimpleResult};

use crate::platform::{ByteStream, FetchBody, FetchRequest};

/// Headers the host sets itself and rejects when supplied manually.
pub const STRIPPED_HEADERS: &[&str] = &[
    "user-agent",
    "host",
    "connection",
    "keep-alive",
    "content-length",
    "transfer-encoding",
    "accept-encoding",
];

/// A replayable request body source. Each call yields a fresh stream, so the
/// same request can be sent more than once.
pub type BodySource = Arc<dyn Fn() -> ByteStream + Send + Sync>;

#[derive(Clone)]
pub enum RequestBody {
    Bytes(Bytes),
    Stream(BodySource),
}

impl RequestBody {
    pub fn stream<F>(source: F) -> Self
    where
        F: Fn() -> ByteStream + Send + Sync + 'static,
    {
        RequestBody::Stream(Arc::new(source))
    }

    fn to_fetch_body(&self) -> FetchBody {
        match self {
            RequestBody::Bytes(bytes) => FetchBody::Bytes(bytes.clone()),
            RequestBody::Stream(source) => FetchBody::Stream(source()),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            RequestBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(body: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(body))
    }
}

impl From<Bytes> for RequestBody {
    fn from(body: Bytes) -> Self {
        RequestBody::Bytes(body)
    }
}

impl From<&'static str> for RequestBody {
    fn from(body: &'static str) -> Self {
        RequestBody::Bytes(Bytes::from_static(body.as_bytes()))
    }
}

/// An outgoing request. Built once, then only read by the transport.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    timeout: Duration,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self::new(Method::POST, url).with_body(body)
    }

    /// Sets a header, replacing any existing one whose name matches ignoring case.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.headers.push((name, value)),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Per-step timeout. Zero disables it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-step timeout in seconds. Zero, negative and non-finite values disable it;
    /// values too large for a `Duration` saturate.
    pub fn with_timeout_secs(self, secs: f64) -> Self {
        let timeout = if secs.is_finite() && secs > 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        self.with_timeout(timeout)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.method.clone(), self.url.clone())
    }

    // Builds the host fetch call, dropping headers the host owns
    pub(crate) fn to_fetch_request(&self, extra_stripped: &[String]) -> FetchRequest {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| {
                let stripped = is_stripped(name, extra_stripped);
                if stripped {
                    log::debug!("not forwarding host-managed header {name}");
                }
                !stripped
            })
            .cloned()
            .collect();

        FetchRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body: self.body.as_ref().map(RequestBody::to_fetch_body),
        }
    }
}

fn is_stripped(name: &str, extra_stripped: &[String]) -> bool {
    STRIPPED_HEADERS
        .iter()
        .any(|stripped| stripped.eq_ignore_ascii_case(name))
        || extra_stripped
            .iter()
            .any(|stripped| stripped.eq_ignore_ascii_case(name))
}

impl<T> TryFrom<http::Request<T>> for Request
where
    T: Into<Bytes>,
{
    type Error = SimpleError;

    fn try_from(req: http::Request<T>) -> SimpleResult<Self> {
        let (parts, body) = req.into_parts();
        let mut request = Request::new(parts.method, parts.uri.to_string());
        for (name, value) in &parts.headers {
            let value = value
                .to_str()
                .map_err(|e| SimpleError::new(format!("header {name}: {e}")))?;
            request = request.with_header(name.as_str(), value);
        }
        let body: Bytes = body.into();
        if !body.is_empty() {
            request = request.with_body(body);
        }
        Ok(request)
    }
}

/// Method and URL of a request, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    method: Method,
    url: String,
}

impl RequestContext {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
