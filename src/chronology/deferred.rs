use std::collections::VecDeque;

pub(super) type Functor = Box<dyn FnOnce() + Send>;

/// FIFO of type-erased deferred callables.
///
/// Grounded on spec.md §4.4's "deferred-function queue" and mio's habit of
/// boxing callbacks (`Waker`/selector registration closures); `VecDeque` is
/// the idiomatic Rust FIFO, playing the role the source's intrusive list
/// plays for a slab-backed queue.
#[derive(Default)]
pub(super) struct DeferredQueue {
    queue: VecDeque<Functor>,
}

impl DeferredQueue {
    pub(super) fn new() -> DeferredQueue {
        DeferredQueue {
            queue: VecDeque::new(),
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(super) fn push(&mut self, f: Functor) {
        self.queue.push_back(f);
    }

    /// Atomically append a caller-owned sequence of functors followed by
    /// one more, clearing the caller's sequence. Preserves ordering when a
    /// batch of callbacks must be delivered without interleaving.
    pub(super) fn append_sequence_and_push(&mut self, seq: &mut VecDeque<Functor>, f: Functor) {
        self.queue.append(seq);
        self.queue.push_back(f);
    }

    pub(super) fn pop_one(&mut self) -> Option<Functor> {
        self.queue.pop_front()
    }

    pub(super) fn drain_all(&mut self) -> VecDeque<Functor> {
        std::mem::take(&mut self.queue)
    }
}
