//! Platform polling backend selection.
//!
//! Grounded on mio's `sys` module (`src/sys/mod.rs`), which cfg-selects
//! between `unix`/`windows`/`wasi` backends and re-exports a uniform
//! `Selector`/`Event`/`Events` surface. This crate narrows that matrix to
//! what the corpus demonstrates concretely: `epoll` on Linux (mio's
//! `sys/unix/selector/epoll.rs`), portable `poll(2)` elsewhere on Unix
//! (mio's `sys/unix/selector/poll.rs`, which is what BSD/Darwin also falls
//! back to here rather than a dedicated kqueue backend), and a
//! `NotImplemented`-returning shell on anything else (mio's `sys/shell`).

use crate::error::Error;
use crate::event::ReadySet;
use crate::handle::Handle;
use std::time::Duration;

#[cfg(all(target_os = "linux", not(reax_force_poll_poll)))]
mod epoll;
#[cfg(all(target_os = "linux", not(reax_force_poll_poll)))]
pub(crate) use epoll::Selector;

// `reax_force_poll_poll` exercises the portable backend on Linux CI
// without needing a non-Linux runner; see DESIGN.md.
#[cfg(any(all(unix, not(target_os = "linux")), all(target_os = "linux", reax_force_poll_poll)))]
mod poll;
#[cfg(any(all(unix, not(target_os = "linux")), all(target_os = "linux", reax_force_poll_poll)))]
pub(crate) use poll::Selector;

#[cfg(not(unix))]
mod shell;
#[cfg(not(unix))]
pub(crate) use shell::Selector;

pub(crate) mod waker;

/// One raw readiness record translated out of the OS poller: the handle it
/// belongs to and the bits observed.
pub(crate) struct RawEvent {
    pub handle: Handle,
    pub ready: ReadySet,
}

pub(crate) trait PollBackend: Sized {
    fn new() -> Result<Self, Error>;

    /// Register `handle` for the given interest bits. `writable`/`readable`
    /// select `EPOLLIN`/`EPOLLOUT` (or their portable-poll equivalents);
    /// `oneshot` requests the backend re-arm-on-show discipline spec.md
    /// §4.5 calls "oneShot".
    fn register(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error>;

    fn reregister(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error>;

    fn deregister(&self, handle: Handle) -> Result<(), Error>;

    /// Block until an event arrives, the timeout elapses, or the
    /// interruptor fires. Appends discovered events to `out`.
    fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> Result<(), Error>;
}
