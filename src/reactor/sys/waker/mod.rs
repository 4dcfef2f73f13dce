//! Interruptor used to wake a thread blocked inside the OS poller.
//!
//! Grounded on mio's `sys/unix/waker` module: `eventfd` where available
//! (Linux), a self-pipe otherwise. Registered with the same selector the
//! reactor already polls, under a reserved sentinel handle, so waking a
//! waiter is just another readiness event rather than a separate wait path.

#[cfg(target_os = "linux")]
mod eventfd;
#[cfg(target_os = "linux")]
use eventfd::WakerInternal;

#[cfg(all(unix, not(target_os = "linux")))]
mod pipe;
#[cfg(all(unix, not(target_os = "linux")))]
use pipe::WakerInternal;

#[cfg(not(unix))]
mod noop;
#[cfg(not(unix))]
use noop::WakerInternal;

use crate::error::Error;
use crate::handle::Handle;

/// Wraps the platform interruptor and the handle it was registered under.
pub(crate) struct Waker {
    internal: WakerInternal,
}

impl Waker {
    pub(crate) fn new() -> Result<Waker, Error> {
        Ok(Waker {
            internal: WakerInternal::new()?,
        })
    }

    pub(crate) fn handle(&self) -> Handle {
        self.internal.handle()
    }

    /// Wake every thread currently blocked inside this interruptor's
    /// selector. Idempotent: repeated wakes before the waiter drains the
    /// interruptor coalesce into one wakeup.
    pub(crate) fn wake(&self) -> Result<(), Error> {
        self.internal.wake()
    }

    /// Drain the interruptor after a wakeup so the next `select` blocks
    /// again rather than immediately returning.
    pub(crate) fn ack(&self) {
        self.internal.ack();
    }
}
