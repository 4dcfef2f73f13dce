//! The minimal surface the reactor expects from external socket code.
//!
//! Per spec.md's "Socket interface consumed" paragraph, the core only needs
//! a handle and a way to keep a socket alive for the duration of an
//! in-flight dispatch; actual I/O (send/receive/connect/accept/bind/
//! shutdown) lives entirely outside this crate. Grounded on mio's
//! `event::Source` (`src/sys/unix/mod.rs`) for the "just hand over a raw
//! descriptor" shape, generalized with an `Arc` reference count standing in
//! for the original's intrusive `bslma::SharedObject` refcounting — `Arc`
//! already gives pinned-in-memory, atomically-refcounted lifetime extension
//! for free, so there is nothing to build on top of it.

use crate::handle::Handle;
use std::sync::Arc;

/// Implemented by external socket types that want reactor interest tracking.
///
/// `handle` must keep returning the same value for the lifetime of the
/// registration; the reactor uses it as the key into its interest and
/// registry tables.
pub trait Socket: Send + Sync {
    fn handle(&self) -> Handle;
}

/// Keeps a socket alive for as long as the reactor might still be running a
/// readiness or detach callback against it.
///
/// A readiness callback built from a `SocketRef` clones the inner `Arc`
/// into the closure, so the socket cannot be dropped mid-dispatch even if
/// every other owner has already released it — the registry's in-flight
/// count (see `reactor::registry`) only guarantees the *callback* isn't
/// torn down concurrently; this guarantees the *socket it closes over*
/// isn't either.
#[derive(Clone)]
pub struct SocketRef<S: Socket>(Arc<S>);

impl<S: Socket> SocketRef<S> {
    pub fn new(socket: S) -> SocketRef<S> {
        SocketRef(Arc::new(socket))
    }

    pub fn handle(&self) -> Handle {
        self.0.handle()
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl<S: Socket> std::ops::Deref for SocketRef<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Dummy(Handle);

    impl Socket for Dummy {
        fn handle(&self) -> Handle {
            self.0
        }
    }

    #[test]
    fn clone_extends_refcount_and_shares_handle() {
        let s = SocketRef::new(Dummy(Handle::new(7)));
        let clone = s.clone();
        assert_eq!(s.handle(), clone.handle());
        assert_eq!(s.strong_count(), 2);
        drop(clone);
        assert_eq!(s.strong_count(), 1);
    }
}
