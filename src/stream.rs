use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_lite::future;

use crate::bridge::{StepContext, SuspendBridge};
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::platform::{ChunkReader, Clock};
use crate::request::RequestContext;
use crate::response::ResponseHead;

/// Pull-based reader over a streaming response body.
///
/// Chunks are requested from the host only when the previous one has been
/// consumed, one suspension per chunk, each bounded by the request timeout.
/// Dropping the reader closes it.
pub struct StreamReader {
    source: Option<Box<dyn ChunkReader>>,
    current: Option<Bytes>,
    offset: usize,
    done: bool,
    closed: bool,
    timeout: Duration,
    token: CancellationToken,
    clock: Arc<dyn Clock>,
    request: RequestContext,
    head: ResponseHead,
}

impl StreamReader {
    pub(crate) fn new(
        source: Box<dyn ChunkReader>,
        timeout: Duration,
        token: CancellationToken,
        clock: Arc<dyn Clock>,
        request: RequestContext,
        head: ResponseHead,
    ) -> Self {
        Self {
            source: Some(source),
            current: None,
            offset: 0,
            done: false,
            closed: false,
            timeout,
            token,
            clock,
            request,
            head,
        }
    }

    /// Copies the next bytes of the body into `buf`.
    ///
    /// Returns 0 only at the end of the body (or for an empty `buf`). Fails
    /// with [`Error::StreamClosed`] once [`close`](Self::close) has been called.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        let chunk = match self.current.take() {
            Some(chunk) => chunk,
            None => match self.next_chunk()? {
                Some(chunk) => chunk,
                None => return Ok(0),
            },
        };

        let remaining = &chunk[self.offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        if self.offset < chunk.len() {
            self.current = Some(chunk);
        } else {
            self.offset = 0;
        }
        Ok(n)
    }

    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            let Some(source) = self.source.as_mut() else {
                self.done = true;
                return Ok(None);
            };
            let bridge = SuspendBridge::new(&*self.clock);
            let context = StepContext {
                request: &self.request,
                response: Some(&self.head),
                step: "body chunk",
            };
            match bridge.run_with_timeout(source.read(), self.timeout, &self.token, &context)? {
                Some(chunk) if chunk.is_empty() => continue,
                Some(chunk) => {
                    log::trace!("{}: received {} body bytes", self.request, chunk.len());
                    return Ok(Some(chunk));
                }
                None => {
                    self.finish();
                    return Ok(None);
                }
            }
        }
    }

    // Natural end of the body: the source is released but the reader stays open
    fn finish(&mut self) {
        log::debug!("{}: body complete", self.request);
        self.done = true;
        self.current = None;
        self.offset = 0;
        self.source = None;
    }

    /// Releases the reader. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.done = true;
        self.current = None;
        self.offset = 0;

        if let Some(mut source) = self.source.take() {
            log::debug!("{}: closing body stream early", self.request);
            self.token.cancel();
            // best effort: the stream is being torn down, so the outcome is ignored
            if let Some(Err(err)) = future::block_on(future::poll_once(source.cancel())) {
                log::debug!("{}: ignoring body cancel failure: {err}", self.request);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True once the body has ended or the reader was closed.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether a read may still return bytes: not closed and not at the end of the body.
    pub fn readable(&self) -> bool {
        !self.closed && !self.done
    }
}

impl io::Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::from)
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamReader")
            .field("request", &self.request)
            .field("buffered", &self.current.as_ref().map(|c| c.len() - self.offset))
            .field("done", &self.done)
            .field("closed", &self.closed)
            .finish()
    }
}
