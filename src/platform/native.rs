use std::time::Duration;

use async_io::Timer;

use crate::bridge;

use super::{Capabilities, Clock, TimerFuture};

/// Capabilities of a native process.
///
/// Any thread may park, except one that is already parked inside the bridge:
/// a host operation calling back into the transport on the same thread would
/// never be resumed. A native process has no browser fallback, so it always
/// reports itself as server-side.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCapabilities;

impl Capabilities for NativeCapabilities {
    fn suspension_available(&self) -> bool {
        !bridge::is_suspended()
    }

    fn is_server_side_runtime(&self) -> bool {
        true
    }
}

/// Timers backed by the `async-io` reactor.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncIoClock;

impl Clock for AsyncIoClock {
    fn sleep(&self, duration: Duration) -> TimerFuture {
        let timer = Timer::after(duration);
        Box::pin(async move {
            timer.await;
        })
    }
}
