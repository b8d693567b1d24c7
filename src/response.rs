use std::fmt;
use std::io::Read;
use std::str::FromStr;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use simple_error::SimpleResult;

use crate::error::{IntoSimpleError, Result};
use crate::platform::HostResponse;
use crate::request::RequestContext;
use crate::stream::StreamReader;

/// Status and headers, available before the body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    // Converts the host's status and header pairs into `http` types
    pub(crate) fn from_host(response: &dyn HostResponse) -> SimpleResult<Self> {
        let status = StatusCode::from_u16(response.status()).into_simple_error()?;
        let headers = parse_header_pairs(response.headers())?;
        Ok(Self { status, headers })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

fn parse_header_pairs(pairs: Vec<(String, String)>) -> SimpleResult<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let header_name = HeaderName::from_str(&name.to_lowercase()).into_simple_error()?;
        let header_value = HeaderValue::from_str(value.trim()).into_simple_error()?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

pub enum Body {
    Buffered(Bytes),
    Streaming(StreamReader),
    /// A reader supplied by a fallback transport.
    Reader(Box<dyn Read + Send>),
}

impl Body {
    pub fn empty() -> Self {
        Body::Buffered(Bytes::new())
    }

    pub fn is_streaming(&self) -> bool {
        !matches!(self, Body::Buffered(_))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Buffered(bytes) => f.debug_tuple("Buffered").field(bytes).finish(),
            Body::Streaming(reader) => f.debug_tuple("Streaming").field(reader).finish(),
            Body::Reader(_) => f.write_str("Reader"),
        }
    }
}

/// A response handed back to the caller, who owns it from then on.
#[derive(Debug)]
pub struct Response {
    head: ResponseHead,
    body: Body,
    request: RequestContext,
}

impl Response {
    /// A response whose body is attached later with [`Response::set_body`].
    pub fn new(head: ResponseHead, request: RequestContext) -> Self {
        Self {
            head,
            body: Body::empty(),
            request,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Collects the body into memory, draining a streaming body to its end.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self.body {
            Body::Buffered(bytes) => Ok(bytes),
            Body::Streaming(mut reader) => {
                let mut collected = Vec::new();
                let mut chunk = [0u8; 8 * 1024];
                loop {
                    let n = reader.read_into(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    collected.extend_from_slice(&chunk[..n]);
                }
                Ok(Bytes::from(collected))
            }
            Body::Reader(mut reader) => {
                let mut collected = Vec::new();
                reader.read_to_end(&mut collected).map_err(|e| {
                    crate::Error::RequestFailed {
                        message: e.to_string(),
                        request: self.request.clone(),
                        response: Some(self.head.clone()),
                    }
                })?;
                Ok(Bytes::from(collected))
            }
        }
    }

    /// Converts into an `http::Response`, keeping the body as is.
    pub fn into_http(self) -> http::Response<Body> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.head.status;
        *response.headers_mut() = self.head.headers;
        response
    }
}
