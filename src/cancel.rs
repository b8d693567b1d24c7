// One token per send_request / send_streaming_request call. The step timer
// fires it; host operations wait on it through `cancelled()`.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    waiters: Mutex<Waiters>,
}

// Each pending `Cancelled` owns one keyed slot and removes it when dropped.
#[derive(Default)]
struct Waiters {
    next_key: usize,
    slots: Vec<(usize, Waker)>,
}

impl Inner {
    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token. Returns `true` only for the call that actually fired it.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let slots = std::mem::take(&mut self.inner.waiters().slots);
        for (_, waker) in slots {
            waker.wake();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Completes once the token has been fired.
    pub fn cancelled(&self) -> Cancelled<'_> {
        Cancelled {
            token: self,
            key: None,
        }
    }

    #[cfg(test)]
    fn registered_waiters(&self) -> usize {
        self.inner.waiters().slots.len()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub struct Cancelled<'a> {
    token: &'a CancellationToken,
    key: Option<usize>,
}

impl Future for Cancelled<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let token = self.token;
        if token.is_cancelled() {
            return Poll::Ready(());
        }
        let key = {
            let mut waiters = token.inner.waiters();
            let slot = self
                .key
                .and_then(|key| waiters.slots.iter_mut().find(|(k, _)| *k == key));
            match slot {
                Some((key, waker)) => {
                    if !waker.will_wake(cx.waker()) {
                        *waker = cx.waker().clone();
                    }
                    *key
                }
                None => {
                    let key = waiters.next_key;
                    waiters.next_key = waiters.next_key.wrapping_add(1);
                    waiters.slots.push((key, cx.waker().clone()));
                    key
                }
            }
        };
        self.key = Some(key);
        // cancel() may have drained the slots between the first check and the push
        if token.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

impl Drop for Cancelled<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.token.inner.waiters().slots.retain(|(k, _)| *k != key);
        }
    }
}
