//! Authorization tokens and execution strands for readiness callbacks.
//!
//! Grounded on spec.md §4.5/§6's "execution strand" and "authorization
//! token" language: a strand serializes callbacks that share it (so two
//! reactor threads under dynamic load balancing never run them
//! concurrently), and a token lets a caller cancel a callback after it has
//! been installed but before the reactor gets around to dispatching it.
//! Modeled the same way `Chronology::cancel` uses a plain `AtomicBool`-style
//! flag rather than a full cancellation-token crate, since the only
//! operation needed is "has someone asked to skip this."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Shared cancel flag. Cloning shares the same underlying flag; the
/// registry checks it immediately before invoking a callback and skips
/// dispatch (without consuming the readiness event) if it is set.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A serializer shared by callbacks that must never run concurrently.
/// `run` blocks the calling thread for the duration of another callback
/// already running on the same strand, which is sufficient for this
/// crate's single-poll-thread-per-handle dispatch model: the only actual
/// concurrency a strand needs to rule out is two *different* handles whose
/// callbacks happen to share one strand being dispatched by two different
/// reactor driver threads at once (dynamic load balancing).
#[derive(Clone, Default)]
pub struct Strand(Arc<Mutex<()>>);

impl Strand {
    pub fn new() -> Strand {
        Strand(Arc::new(Mutex::new(())))
    }

    pub fn run(&self, f: impl FnOnce()) {
        let _guard = self.0.lock().unwrap();
        f();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn strand_serializes_concurrent_callers() {
        let strand = Strand::new();
        let count = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = strand.clone();
            let c = count.clone();
            handles.push(thread::spawn(move || {
                s.run(|| {
                    let before = c.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(before, 0, "strand allowed concurrent execution");
                    thread::yield_now();
                    c.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
