use std::io;

use http::header::{InvalidHeaderName, InvalidHeaderValue};
use http::status::InvalidStatusCode;
use simple_error::{SimpleError, SimpleResult};

use crate::request::RequestContext;
use crate::response::ResponseHead;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced to callers of the transport.
///
/// Every failure of a suspended step is translated into [`Error::Timeout`] or
/// [`Error::RequestFailed`] before it leaves the bridge. Nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No suspension and no fallback path exist in this context.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A single awaited step exceeded its deadline.
    #[error("{request} timed out")]
    Timeout {
        request: RequestContext,
        response: Option<ResponseHead>,
    },

    /// The host reported a network or protocol failure.
    #[error("{request} failed: {message}")]
    RequestFailed {
        message: String,
        request: RequestContext,
        response: Option<ResponseHead>,
    },

    /// The stream was read after it was closed.
    #[error("stream is closed")]
    StreamClosed,
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn request(&self) -> Option<&RequestContext> {
        match self {
            Error::Timeout { request, .. } | Error::RequestFailed { request, .. } => Some(request),
            _ => None,
        }
    }

    /// The response head, if the failure happened after it arrived.
    pub fn response(&self) -> Option<&ResponseHead> {
        match self {
            Error::Timeout { response, .. } | Error::RequestFailed { response, .. } => {
                response.as_ref()
            }
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Timeout { .. } => io::ErrorKind::TimedOut,
            Error::StreamClosed => io::ErrorKind::NotConnected,
            Error::CapabilityUnavailable(_) => io::ErrorKind::Unsupported,
            Error::RequestFailed { .. } => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

pub trait IntoSimpleError<T> {
    fn into_simple_error(self) -> SimpleResult<T>;
}

impl<T> IntoSimpleError<T> for std::result::Result<T, InvalidStatusCode> {
    fn into_simple_error(self) -> SimpleResult<T> {
        self.map_err(|e| SimpleError::new(e.to_string()))
    }
}

impl<T> IntoSimpleError<T> for std::result::Result<T, InvalidHeaderName> {
    fn into_simple_error(self) -> SimpleResult<T> {
        self.map_err(|e| SimpleError::new(e.to_string()))
    }
}

impl<T> IntoSimpleError<T> for std::result::Result<T, InvalidHeaderValue> {
    fn into_simple_error(self) -> SimpleResult<T> {
        self.map_err(|e| SimpleError::new(e.to_string()))
    }
}

impl<T> IntoSimpleError<T> for std::result::Result<T, miniserde::Error> {
    fn into_simple_error(self) -> SimpleResult<T> {
        self.map_err(|e| SimpleError::new(e.to_string()))
    }
}
