// The only place the crate blocks. The per-step timer is a future owned by
// the suspension, so it is dropped on every exit path.

use std::cell::Cell;
use std::time::Duration;

use futures_lite::future;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::platform::{Clock, HostError, PendingOperation};
use crate::request::RequestContext;
use crate::response::ResponseHead;

thread_local! {
    static SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is parked inside the bridge.
pub fn is_suspended() -> bool {
    SUSPENDED.with(Cell::get)
}

struct Suspension;

impl Suspension {
    fn enter() -> Option<Self> {
        SUSPENDED.with(|suspended| {
            if suspended.replace(true) {
                None
            } else {
                Some(Suspension)
            }
        })
    }
}

impl Drop for Suspension {
    fn drop(&mut self) {
        SUSPENDED.with(|suspended| suspended.set(false));
    }
}

/// Diagnostics attached to errors raised by a step.
pub(crate) struct StepContext<'a> {
    pub request: &'a RequestContext,
    pub response: Option<&'a ResponseHead>,
    pub step: &'static str,
}

pub(crate) struct SuspendBridge<'a> {
    clock: &'a dyn Clock,
}

impl<'a> SuspendBridge<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self { clock }
    }

    pub fn run_with_timeout<T>(
        &self,
        operation: PendingOperation<'_, T>,
        timeout: Duration,
        token: &CancellationToken,
        context: &StepContext<'_>,
    ) -> Result<T> {
        let Some(_suspension) = Suspension::enter() else {
            return Err(Error::CapabilityUnavailable(format!(
                "{}: nested suspension while awaiting {}",
                context.request, context.step
            )));
        };

        let settled = if timeout.is_zero() {
            log::debug!("{}: awaiting {} without timeout", context.request, context.step);
            block_on(operation)
        } else {
            log::debug!(
                "{}: awaiting {} with timeout {timeout:?}",
                context.request,
                context.step
            );
            let timer = self.clock.sleep(timeout);
            let expiry = async {
                timer.await;
                if token.cancel() {
                    log::debug!(
                        "{}: {} exceeded {timeout:?}, cancelling",
                        context.request,
                        context.step
                    );
                }
                future::pending::<std::result::Result<T, HostError>>().await
            };
            // the operation is polled first, so a settled result wins over a
            // timer that expired in the same wakeup
            block_on(future::or(operation, expiry))
        };

        match settled {
            Ok(value) => Ok(value),
            Err(HostError::Aborted) => Err(Error::Timeout {
                request: context.request.clone(),
                response: context.response.cloned(),
            }),
            Err(HostError::Failed(err)) => {
                log::debug!("{}: {} failed: {err}", context.request, context.step);
                Err(Error::RequestFailed {
                    message: err.as_str().to_string(),
                    request: context.request.clone(),
                    response: context.response.cloned(),
                })
            }
        }
    }
}

#[cfg(feature = "native")]
fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
    async_io::block_on(future)
}

#[cfg(not(feature = "native"))]
fn block_on<T>(future: impl std::future::Future<Output = T>) -> T {
    future::block_on(future)
}
