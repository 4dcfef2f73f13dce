//! Per-handle callback bookkeeping and the detach-race guard.
//!
//! Grounded on spec.md §4.5's "Concurrency with detach" paragraph and §9's
//! re-architecture guidance away from shared-pointer object graphs: the
//! registry holds strong ownership of each handle's callbacks, keyed by
//! `Handle`, with an in-flight dispatch counter so a `detach` on one thread
//! waits for a readiness callback already running on another thread before
//! tearing down the entry. This plays the role mio's `IoSourceState`
//! (`src/sys/unix/selector/stateless_io_source.rs`) plays for lifetime
//! tracking, generalized from one registration to a full callback registry.

use super::token::{CancellationToken, Strand};
use crate::event::Event;
use crate::handle::Handle;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};

pub type ReadinessCallback = Box<dyn FnMut(Event) + Send>;
pub type DetachCallback = Box<dyn FnOnce() + Send>;

/// A callback plus the strand it must be serialized on and the token that
/// can cancel it before dispatch.
pub(crate) struct Subscription {
    pub(crate) callback: ReadinessCallback,
    pub(crate) strand: Option<Strand>,
    pub(crate) token: Option<CancellationToken>,
}

struct Entry {
    readable: Option<Subscription>,
    writable: Option<Subscription>,
    /// Set once `detach` has been requested; the entry is torn down once
    /// `in_flight` drains to zero.
    detaching: bool,
    on_detached: Option<DetachCallback>,
    /// Whether the OS poller already holds a registration for this handle,
    /// so the reactor knows whether its next program step is `register` or
    /// `reregister` regardless of how the handle came to be attached.
    os_registered: bool,
}

/// Tracks dispatch-in-flight per handle so `detach` never races a callback
/// that is actively executing on another thread.
pub(crate) struct Registry {
    entries: Mutex<BTreeMap<Handle, Entry>>,
    in_flight: Mutex<BTreeMap<Handle, usize>>,
    idle: Condvar,
}

impl Registry {
    pub(crate) fn new() -> Registry {
        Registry {
            entries: Mutex::new(BTreeMap::new()),
            in_flight: Mutex::new(BTreeMap::new()),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn attach(&self, handle: Handle) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(&handle) {
            return false;
        }
        entries.insert(
            handle,
            Entry {
                readable: None,
                writable: None,
                detaching: false,
                on_detached: None,
                os_registered: false,
            },
        );
        true
    }

    /// Returns whether `handle` was previously registered with the OS
    /// poller, then marks it registered. Used to decide `register` vs
    /// `reregister` independent of how the handle came to be attached.
    pub(crate) fn mark_os_registered(&self, handle: Handle) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&handle) {
            Some(e) => std::mem::replace(&mut e.os_registered, true),
            None => false,
        }
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().unwrap().contains_key(&handle)
    }

    pub(crate) fn set_readable(&self, handle: Handle, sub: Option<Subscription>) -> bool {
        self.mutate(handle, |e| e.readable = sub)
    }

    pub(crate) fn set_writable(&self, handle: Handle, sub: Option<Subscription>) -> bool {
        self.mutate(handle, |e| e.writable = sub)
    }

    fn mutate(&self, handle: Handle, f: impl FnOnce(&mut Entry)) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(&handle) {
            Some(e) => {
                f(e);
                true
            }
            None => false,
        }
    }

    /// Mark `handle` as detaching. If no dispatch is currently in flight,
    /// tears the entry down and invokes `on_detached` immediately; otherwise
    /// defers the teardown until the last in-flight dispatch completes.
    pub(crate) fn begin_detach(&self, handle: Handle, on_detached: Option<DetachCallback>) -> bool {
        let still_in_flight = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(&handle) {
                Some(e) => {
                    e.detaching = true;
                    e.on_detached = on_detached;
                    e.readable = None;
                    e.writable = None;
                }
                None => return false,
            }
            *self.in_flight.lock().unwrap().get(&handle).unwrap_or(&0) > 0
        };
        if !still_in_flight {
            self.finish_detach(handle);
        }
        true
    }

    fn finish_detach(&self, handle: Handle) {
        let removed = self.entries.lock().unwrap().remove(&handle);
        self.in_flight.lock().unwrap().remove(&handle);
        self.idle.notify_all();
        if let Some(entry) = removed {
            if let Some(cb) = entry.on_detached {
                cb();
            }
        }
    }

    /// Bump `handle`'s in-flight dispatch count. Returns `false` if the
    /// handle is not registered or is already detaching, in which case the
    /// caller must not dispatch.
    fn begin_dispatch(&self, handle: Handle) -> bool {
        let entries = self.entries.lock().unwrap();
        match entries.get(&handle) {
            Some(e) if !e.detaching => {
                *self.in_flight.lock().unwrap().entry(handle).or_insert(0) += 1;
                true
            }
            _ => false,
        }
    }

    /// Run `f` with exclusive mutable access to `handle`'s readable callback,
    /// bracketed by the in-flight counter so a concurrent `begin_detach`
    /// waits for this call to return before tearing the entry down.
    pub(crate) fn dispatch_readable(&self, handle: Handle, event: &Event) {
        self.dispatch(handle, event, true);
    }

    pub(crate) fn dispatch_writable(&self, handle: Handle, event: &Event) {
        self.dispatch(handle, event, false);
    }

    fn dispatch(&self, handle: Handle, event: &Event, readable: bool) {
        if !self.begin_dispatch(handle) {
            return;
        }
        let mut sub = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(&handle) {
                Some(e) => {
                    if readable {
                        e.readable.take()
                    } else {
                        e.writable.take()
                    }
                }
                None => None,
            }
        };
        if let Some(s) = sub.as_mut() {
            let cancelled = s.token.as_ref().is_some_and(|t| t.is_cancelled());
            if !cancelled {
                let event = *event;
                match s.strand.clone() {
                    Some(strand) => strand.run(|| (s.callback)(event)),
                    None => (s.callback)(event),
                }
            }
        }
        let mut entries = self.entries.lock().unwrap();
        let detaching = match entries.get_mut(&handle) {
            Some(e) => {
                if let Some(s) = sub {
                    if readable {
                        e.readable = Some(s);
                    } else {
                        e.writable = Some(s);
                    }
                }
                e.detaching
            }
            None => false,
        };
        drop(entries);
        let remaining = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(handle).or_insert(0);
            *count = count.saturating_sub(1);
            *count
        };
        self.idle.notify_all();
        if detaching && remaining == 0 {
            self.finish_detach(handle);
        }
    }

    /// Block the calling thread until `handle` has no dispatch in flight.
    /// Used by a synchronous `detach` that wants to return only once
    /// teardown is complete.
    pub(crate) fn wait_idle(&self, handle: Handle) {
        let guard = self.in_flight.lock().unwrap();
        let _unused = self
            .idle
            .wait_while(guard, |m| *m.get(&handle).unwrap_or(&0) > 0)
            .unwrap();
    }

    pub(crate) fn handles(&self) -> Vec<Handle> {
        self.entries.lock().unwrap().keys().copied().collect()
    }
}
