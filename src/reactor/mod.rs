//! Readiness-based event demultiplexer bound to one OS polling mechanism.
//!
//! Grounded on mio's `Poll`/`Registry` split (`src/poll.rs`): a selector
//! owns the OS-level subscription table, a `run`/`poll` loop translates raw
//! events and dispatches them, and an interruptor lets any thread unblock a
//! waiter. Generalized per spec.md §4.5 with the in-memory `InterestSet`,
//! the per-handle callback `Registry`, the `Chronology` drain, and the
//! `Running`/`Stopping`/`Stopped` state machine mio itself does not need
//! (mio has no embedded run loop; this reactor does).

mod registry;
pub(crate) mod sys;
mod token;

pub use crate::event::{Event, ReadySet};
pub use crate::interest::{Shot, Trigger};
pub use registry::{DetachCallback, ReadinessCallback};
pub use token::{CancellationToken, Strand};

use crate::chronology::{Chronology, Timer, TimerContext, TimerOptions};
use crate::config::{Config, MAX_POLL_TIMEOUT};
use crate::error::{Error, ErrorKind};
use crate::handle::Handle;
use crate::interest::InterestSet;
use registry::Registry;
use sys::{PollBackend, RawEvent};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const RUNNING: u8 = 0;
const STOPPING: u8 = 1;
const STOPPED: u8 = 2;

/// Owns an `InterestSet`, a callback `Registry`, a `Chronology`, and an
/// interruptor bound to one OS polling mechanism.
pub struct Reactor {
    interests: Mutex<InterestSet>,
    registry: Registry,
    chronology: Chronology,
    selector: sys::Selector,
    waker: sys::waker::Waker,
    state: AtomicU8,
    waiters: AtomicUsize,
    load: AtomicUsize,
    config: Config,
}

impl Reactor {
    pub fn new(config: Config) -> Result<Reactor, Error> {
        let selector = sys::Selector::new()?;
        let waker = sys::waker::Waker::new()?;
        // The waker's own fd needs a standing readable registration so a
        // blocked `select` actually wakes on it; it never goes through the
        // public InterestSet/Registry since callers never see its handle.
        selector.register(waker.handle(), true, false, false)?;
        Ok(Reactor {
            interests: Mutex::new(InterestSet::new()),
            registry: Registry::new(),
            chronology: Chronology::new(),
            selector,
            waker,
            state: AtomicU8::new(RUNNING),
            waiters: AtomicUsize::new(0),
            load: AtomicUsize::new(0),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chronology(&self) -> &Chronology {
        &self.chronology
    }

    /// Current load counter, maintained by the owning thread pool's
    /// acquire/release bookkeeping.
    pub fn load(&self) -> usize {
        self.load.load(Ordering::Acquire)
    }

    pub(crate) fn add_load(&self, weight: usize) {
        self.load.fetch_add(weight, Ordering::AcqRel);
    }

    pub(crate) fn sub_load(&self, weight: usize) {
        self.load.fetch_sub(weight, Ordering::AcqRel);
    }

    pub fn create_timer(
        &self,
        options: TimerOptions,
        callback: impl FnMut(TimerContext) + Send + 'static,
    ) -> Timer {
        self.chronology.create_timer(options, callback)
    }

    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        self.chronology.execute(f);
        let _ = self.waker.wake();
    }

    /// Add `handle` to the `InterestSet` with no interest yet. Registers
    /// with the OS immediately unless `autoAttach` defers that to the first
    /// `show*` call.
    pub fn attach(&self, handle: Handle) -> Result<(), Error> {
        {
            let mut interests = self.interests.lock().unwrap();
            interests.attach(handle, self.config.trigger(), self.default_shot())?;
        }
        self.registry.attach(handle);
        if !self.config.auto_attach() {
            self.selector.register(handle, false, false, self.config.one_shot())?;
            self.registry.mark_os_registered(handle);
        }
        Ok(())
    }

    fn default_shot(&self) -> Shot {
        if self.config.one_shot() {
            Shot::OneShot
        } else {
            Shot::Persistent
        }
    }

    fn ensure_attached(&self, handle: Handle) -> Result<(), Error> {
        let mut interests = self.interests.lock().unwrap();
        if interests.contains(handle) {
            return Ok(());
        }
        if !self.config.auto_attach() {
            return Err(Error::from_kind(ErrorKind::Invalid));
        }
        interests.attach(handle, self.config.trigger(), self.default_shot())?;
        self.registry.attach(handle);
        Ok(())
    }

    fn reprogram(&self, handle: Handle) -> Result<(), Error> {
        let (readable, writable) = {
            let interests = self.interests.lock().unwrap();
            match interests.get(handle) {
                Some(i) => (i.wants_readable(), i.wants_writable()),
                None => return Ok(()),
            }
        };
        if self.registry.mark_os_registered(handle) {
            self.selector.reregister(handle, readable, writable, self.config.one_shot())
        } else {
            self.selector.register(handle, readable, writable, self.config.one_shot())
        }
    }

    /// Install `callback` as `handle`'s readable callback, update interest,
    /// and program the OS. Implicitly attaches first if `autoAttach`.
    pub fn show_readable(&self, handle: Handle, callback: ReadinessCallback) -> Result<(), Error> {
        self.show_readable_with(handle, callback, None, None)
    }

    pub fn show_writable(&self, handle: Handle, callback: ReadinessCallback) -> Result<(), Error> {
        self.show_writable_with(handle, callback, None, None)
    }

    /// Like `show_readable`, additionally binding the callback to an
    /// execution strand (never runs concurrently with other callbacks on
    /// the same strand) and an authorization token (checked immediately
    /// before dispatch; a cancelled callback is silently skipped).
    pub fn show_readable_with(
        &self,
        handle: Handle,
        callback: ReadinessCallback,
        strand: Option<Strand>,
        token: Option<CancellationToken>,
    ) -> Result<(), Error> {
        self.ensure_attached(handle)?;
        self.interests.lock().unwrap().show_readable(handle)?;
        self.registry.set_readable(
            handle,
            Some(registry::Subscription { callback, strand, token }),
        );
        self.reprogram(handle)
    }

    pub fn show_writable_with(
        &self,
        handle: Handle,
        callback: ReadinessCallback,
        strand: Option<Strand>,
        token: Option<CancellationToken>,
    ) -> Result<(), Error> {
        self.ensure_attached(handle)?;
        self.interests.lock().unwrap().show_writable(handle)?;
        self.registry.set_writable(
            handle,
            Some(registry::Subscription { callback, strand, token }),
        );
        self.reprogram(handle)
    }

    pub fn hide_readable(&self, handle: Handle) -> Result<(), Error> {
        self.interests.lock().unwrap().hide_readable(handle)?;
        self.registry.set_readable(handle, None);
        self.reprogram_or_auto_detach(handle)
    }

    pub fn hide_writable(&self, handle: Handle) -> Result<(), Error> {
        self.interests.lock().unwrap().hide_writable(handle)?;
        self.registry.set_writable(handle, None);
        self.reprogram_or_auto_detach(handle)
    }

    /// No platform backend in this crate exposes a notification queue
    /// (Linux `MSG_ERRQUEUE` zero-copy/timestamp completions): always
    /// `NotImplemented`, the same answer every non-Linux backend gives.
    pub fn show_notifications(&self, _handle: Handle, _callback: ReadinessCallback) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    pub fn hide_notifications(&self, _handle: Handle) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    fn reprogram_or_auto_detach(&self, handle: Handle) -> Result<(), Error> {
        let quiescent = {
            let interests = self.interests.lock().unwrap();
            interests.get(handle).map(|i| i.is_quiescent()).unwrap_or(true)
        };
        if quiescent && self.config.auto_detach() {
            self.detach(handle, None)
        } else {
            self.reprogram(handle)
        }
    }

    /// Asynchronous: marks the registry entry detaching, waits for any
    /// in-flight dispatch to finish, removes the OS registration, and
    /// invokes `on_detached` (if given) once teardown completes.
    pub fn detach(&self, handle: Handle, on_detached: Option<DetachCallback>) -> Result<(), Error> {
        #[cfg(feature = "log")]
        log::debug!("detaching {:?}", handle);
        {
            let mut interests = self.interests.lock().unwrap();
            interests.detach(handle)?;
        }
        let _ = self.selector.deregister(handle);
        if !self.registry.begin_detach(handle, on_detached) {
            return Err(Error::from_kind(ErrorKind::Invalid));
        }
        Ok(())
    }

    /// Synchronous variant: blocks until teardown (including any in-flight
    /// dispatch) has completed.
    pub fn detach_and_wait(&self, handle: Handle) -> Result<(), Error> {
        self.detach(handle, None)?;
        self.registry.wait_idle(handle);
        Ok(())
    }

    pub fn state(&self) -> ReactorState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => ReactorState::Running,
            STOPPING => ReactorState::Stopping,
            _ => ReactorState::Stopped,
        }
    }

    pub fn stop(&self) {
        self.state.store(STOPPING, Ordering::Release);
        let _ = self.waker.wake();
    }

    pub fn restart(&self) {
        self.state.store(RUNNING, Ordering::Release);
    }

    pub fn interrupt_one(&self) {
        let _ = self.waker.wake();
    }

    pub fn interrupt_all(&self) {
        let _ = self.waker.wake();
    }

    /// Drain deferred functions, compute the wait timeout, block in the OS
    /// poller, translate and dispatch events, then announce timers. One
    /// iteration of `run`.
    pub fn poll(&self) -> Result<usize, Error> {
        self.chronology.announce(false);

        let timeout = self
            .chronology
            .earliest_deadline_hint()
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(MAX_POLL_TIMEOUT)
            .min(MAX_POLL_TIMEOUT);

        let mut raw = Vec::with_capacity(self.config.max_events_per_wait());
        self.selector.select(&mut raw, Some(timeout))?;

        let waker_handle = self.waker.handle();
        let mut dispatched = 0usize;
        let mut by_handle: std::collections::BTreeMap<Handle, Event> = std::collections::BTreeMap::new();
        for RawEvent { handle, ready } in raw {
            if handle == waker_handle {
                self.waker.ack();
                continue;
            }
            let translated = raw_event_to_event(handle, ready);
            by_handle
                .entry(handle)
                .and_modify(|e| e.merge_from(&translated))
                .or_insert(translated);
        }

        for (handle, event) in by_handle {
            if event.is_readable() || event.is_error() || event.is_hangup() {
                self.registry.dispatch_readable(handle, &event);
                dispatched += 1;
            }
            if event.is_writable() {
                self.registry.dispatch_writable(handle, &event);
                dispatched += 1;
            }
            if self.config.one_shot() {
                // One-shot interests clear until re-shown; the OS side has
                // already dropped the registration (EPOLLONESHOT / consumed
                // poll entry), so only the in-memory bookkeeping follows.
                let mut interests = self.interests.lock().unwrap();
                let _ = interests.hide_readable(handle);
                let _ = interests.hide_writable(handle);
            }
        }

        self.chronology.announce(false);
        Ok(dispatched)
    }

    /// Loop calling `poll` until the reactor transitions out of `Running`.
    pub fn run(&self) -> Result<(), Error> {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let result = loop {
            if self.state.load(Ordering::Acquire) != RUNNING {
                break Ok(());
            }
            if let Err(e) = self.poll() {
                break Err(e);
            }
        };
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        if self.waiters.load(Ordering::Acquire) == 0 && self.state.load(Ordering::Acquire) == STOPPING {
            self.state.store(STOPPED, Ordering::Release);
        }
        result
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Running,
    Stopping,
    Stopped,
}

/// Translate a raw selector readiness mask into an `Event`, populating the
/// error field whenever the `ERROR` bit is set so `Event`'s invariant holds.
fn raw_event_to_event(handle: Handle, ready: ReadySet) -> Event {
    if ready.contains(ReadySet::ERROR) {
        let mut event = Event::with_error(handle, Error::from_kind(ErrorKind::Unknown));
        event.merge_from(&Event::new(handle, ready));
        event
    } else {
        Event::new(handle, ready)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn socketpair_echo_round_trip() {
        let reactor = Reactor::new(Config::new().with_one_shot(true)).unwrap();
        let (client, server) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();
        server.set_nonblocking(true).unwrap();
        let client_handle = Handle::from(client.as_raw_fd());
        let server_handle = Handle::from(server.as_raw_fd());

        reactor.attach(client_handle).unwrap();
        reactor.attach(server_handle).unwrap();

        let got_writable = Arc::new(AtomicBool::new(false));
        let g = got_writable.clone();
        reactor
            .show_writable(
                client_handle,
                Box::new(move |event: Event| {
                    assert!(event.is_writable());
                    g.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        reactor.poll().unwrap();
        assert!(got_writable.load(Ordering::SeqCst));

        use std::io::Write;
        (&client).write_all(b"X").unwrap();

        let got_byte = Arc::new(AtomicBool::new(false));
        let g = got_byte.clone();
        reactor
            .show_readable(
                server_handle,
                Box::new(move |event: Event| {
                    assert!(event.is_readable());
                    g.store(true, Ordering::SeqCst);
                }),
            )
            .unwrap();

        reactor.poll().unwrap();
        assert!(got_byte.load(Ordering::SeqCst));

        reactor.detach_and_wait(client_handle).unwrap();
        reactor.detach_and_wait(server_handle).unwrap();
    }

    #[test]
    fn cancelled_token_skips_dispatch() {
        let reactor = Reactor::new(Config::new()).unwrap();
        let (client, _server) = UnixStream::pair().unwrap();
        client.set_nonblocking(true).unwrap();
        let handle = Handle::from(client.as_raw_fd());
        reactor.attach(handle).unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let token = CancellationToken::new();
        token.cancel();
        reactor
            .show_writable_with(
                handle,
                Box::new(move |_event: Event| {
                    r.store(true, Ordering::SeqCst);
                }),
                None,
                Some(token),
            )
            .unwrap();

        reactor.poll().unwrap();
        assert!(!ran.load(Ordering::SeqCst));

        reactor.detach_and_wait(handle).unwrap();
    }

    #[test]
    fn notifications_are_not_implemented() {
        let reactor = Reactor::new(Config::new()).unwrap();
        let (client, _server) = UnixStream::pair().unwrap();
        let handle = Handle::from(client.as_raw_fd());
        reactor.attach(handle).unwrap();
        let err = reactor
            .show_notifications(handle, Box::new(|_| {}))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotImplemented);
    }
}
