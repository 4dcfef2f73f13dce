//! Deferred-function FIFO + timer priority queue, bound together as the
//! `Chronology` a `Reactor` drains on every poll iteration.
//!
//! Grounded on `examples/original_source/groups/ntc/ntcs/ntcs_chronology.h`
//! (`bloomberg/ntf-core`): a skip-list keyed by absolute deadline mapping to
//! a slab-allocated timer, plus a FIFO of deferred functions, plus two
//! atomic hints (`earliestDeadline`, `functorsEmpty`) for lock-free
//! fast-path polling decisions. The ordered map is realized here with
//! `BTreeMap<(Instant, u64), usize>` — see SPEC_FULL.md §3 for why a
//! `BTreeMap` stands in for the source's skip-list.

mod deferred;
mod timer;

pub use timer::{TimerContext, TimerEvent, TimerOptions, TimerState};

use deferred::{DeferredQueue, Functor};
use timer::{SlotRef, TimerSlot};

use crate::error::{Error, ErrorKind};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

enum Slot {
    Occupied(TimerSlot),
    Free(Option<usize>),
}

struct Core {
    slots: Vec<Slot>,
    free_head: Option<usize>,
    deadline_index: BTreeMap<(Instant, u64), usize>,
    next_seq: u64,
    deferred: DeferredQueue,
}

impl Core {
    fn new() -> Core {
        Core {
            slots: Vec::new(),
            free_head: None,
            deadline_index: BTreeMap::new(),
            next_seq: 0,
            deferred: DeferredQueue::new(),
        }
    }

    fn allocate(&mut self, slot: TimerSlot) -> usize {
        match self.free_head {
            Some(index) => {
                let next = match &self.slots[index] {
                    Slot::Free(next) => *next,
                    Slot::Occupied(_) => unreachable!("free list points at occupied slot"),
                };
                self.free_head = next;
                self.slots[index] = Slot::Occupied(slot);
                index
            }
            None => {
                self.slots.push(Slot::Occupied(slot));
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, index: usize) {
        self.slots[index] = Slot::Free(self.free_head);
        self.free_head = Some(index);
    }

    fn get(&self, r: SlotRef) -> Option<&TimerSlot> {
        match self.slots.get(r.index) {
            Some(Slot::Occupied(t)) if t.generation == r.generation => Some(t),
            _ => None,
        }
    }

    fn get_mut(&mut self, r: SlotRef) -> Option<&mut TimerSlot> {
        match self.slots.get_mut(r.index) {
            Some(Slot::Occupied(t)) if t.generation == r.generation => Some(t),
            _ => None,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.deadline_index.keys().next().map(|(d, _)| *d)
    }
}

struct Inner {
    core: Mutex<Core>,
    earliest_deadline_nanos: AtomicU64,
    functors_empty: AtomicBool,
    epoch: Instant,
}

const NO_DEADLINE: u64 = u64::MAX;

impl Inner {
    fn refresh_hints(&self, core: &Core) {
        let deadline_nanos = core
            .earliest_deadline()
            .map(|d| d.saturating_duration_since(self.epoch).as_nanos() as u64)
            .unwrap_or(NO_DEADLINE);
        self.earliest_deadline_nanos
            .store(deadline_nanos, Ordering::Release);
        self.functors_empty
            .store(core.deferred.is_empty(), Ordering::Release);
    }
}

/// Owns the timer slab, the deadline index, and the deferred-function FIFO.
///
/// Cheaply cloneable (an `Arc` around the shared state), mirroring the way
/// `mio::poll::Registry` wraps an `Arc<sys::Selector>` so the same
/// chronology can be shared between a `Reactor` and the `TimerHandle`s it
/// hands out.
#[derive(Clone)]
pub struct Chronology {
    inner: Arc<Inner>,
}

impl Chronology {
    pub fn new() -> Chronology {
        Chronology {
            inner: Arc::new(Inner {
                core: Mutex::new(Core::new()),
                earliest_deadline_nanos: AtomicU64::new(NO_DEADLINE),
                functors_empty: AtomicBool::new(true),
                epoch: Instant::now(),
            }),
        }
    }

    /// Lock-free hint: is there no deadline pending? May be stale by one
    /// mutation; callers that need authoritative state take the lock via
    /// `announce`.
    pub fn earliest_deadline_hint(&self) -> Option<Instant> {
        let nanos = self.inner.earliest_deadline_nanos.load(Ordering::Acquire);
        if nanos == NO_DEADLINE {
            None
        } else {
            Some(self.inner.epoch + std::time::Duration::from_nanos(nanos))
        }
    }

    pub fn functors_empty_hint(&self) -> bool {
        self.inner.functors_empty.load(Ordering::Acquire)
    }

    /// Append a deferred function to the FIFO.
    pub fn execute(&self, f: impl FnOnce() + Send + 'static) {
        let mut core = self.inner.core.lock().unwrap();
        core.deferred.push(Box::new(f));
        self.inner.refresh_hints(&core);
    }

    /// Atomically append a caller-owned sequence of functors followed by
    /// `f`, clearing the caller's sequence.
    pub fn move_and_execute(&self, seq: &mut VecDeque<Functor>, f: impl FnOnce() + Send + 'static) {
        let mut core = self.inner.core.lock().unwrap();
        core.deferred.append_sequence_and_push(seq, Box::new(f));
        self.inner.refresh_hints(&core);
    }

    /// Create a new `Timer` in the `Waiting` state.
    pub fn create_timer(
        &self,
        options: TimerOptions,
        callback: impl FnMut(TimerContext) + Send + 'static,
    ) -> Timer {
        let mut core = self.inner.core.lock().unwrap();
        let slot = TimerSlot {
            state: TimerState::Waiting,
            generation: 0,
            options,
            callback: Some(Box::new(callback)),
            deadline: Instant::now(),
            period: None,
            index_key: None,
        };
        let index = core.allocate(slot);
        let generation = match &core.slots[index] {
            Slot::Occupied(t) => t.generation,
            Slot::Free(_) => unreachable!(),
        };
        Timer {
            chronology: self.clone(),
            slot: SlotRef { index, generation },
        }
    }

    /// Drain deferred functions (all, or just one if `single`), then
    /// repeatedly pop and fire timers whose deadline is `<= now` while
    /// there are any. Returns the number of callbacks invoked.
    ///
    /// Ordering contract (spec.md §5): deferred functions run before
    /// timers, both under this one call, matching the per-iteration
    /// ordering a `Reactor::run` loop enforces across deferred functions,
    /// readiness events, and timers.
    pub fn announce(&self, single: bool) -> usize {
        let mut fired = 0usize;

        let drained = {
            let mut core = self.inner.core.lock().unwrap();
            let batch = if single {
                core.deferred.pop_one().into_iter().collect::<VecDeque<_>>()
            } else {
                core.deferred.drain_all()
            };
            self.inner.refresh_hints(&core);
            batch
        };
        for f in drained {
            f();
            fired += 1;
        }

        let now = Instant::now();
        let mut iters = 0;
        loop {
            iters += 1;
            eprintln!("DEBUG announce loop iter {}", iters);
            if iters > 20 {
                eprintln!("DEBUG bailing after 20 iters");
                break;
            }
            let due = {
                let core = self.inner.core.lock().unwrap();
                core.earliest_deadline().filter(|d| *d <= now)
            };
            eprintln!("DEBUG due = {:?}", due.is_some());
            if due.is_none() {
                break;
            }
            let r = self.fire_earliest(now);
            eprintln!("DEBUG fire_earliest returned {:?}", r.is_some());
            if r.is_none() {
                break;
            }
            fired += 1;
        }
        fired
    }

    /// Pop the earliest-deadline timer and invoke it (collapsing missed
    /// periods for recurring timers), or return `None` if nothing is due.
    fn fire_earliest(&self, now: Instant) -> Option<()> {
        let (slot_ref, ctx, requeue) = {
            let mut core = self.inner.core.lock().unwrap();
            let (&key, &index) = core.deadline_index.iter().next()?;
            if key.0 > now {
                return None;
            }
            core.deadline_index.remove(&key);

            let timer = match core.slots.get_mut(index) {
                Some(Slot::Occupied(t)) => t,
                _ => {
                    self.inner.refresh_hints(&core);
                    return Some(());
                }
            };
            let generation = timer.generation;
            let scheduled_deadline = timer.deadline;
            let user_id = timer.options.user_id;
            let wants_deadline = timer.options.wants_event(TimerEvent::Deadline);
            let period = timer.period;
            let one_shot = timer.options.one_shot;

            let next_deadline = match period {
                Some(period) if !one_shot => {
                    // Advance to the next deadline strictly greater than
                    // now, collapsing any missed periods rather than
                    // replaying them.
                    let mut next = scheduled_deadline + period;
                    while next <= now {
                        next += period;
                    }
                    Some(next)
                }
                _ => None,
            };

            let requeue = match next_deadline {
                Some(next) => {
                    let seq = core.next_seq;
                    core.next_seq += 1;
                    let k = (next, seq);
                    let timer = match core.slots.get_mut(index) {
                        Some(Slot::Occupied(t)) => t,
                        _ => unreachable!("slot vanished while held"),
                    };
                    timer.deadline = next;
                    timer.index_key = Some(k);
                    core.deadline_index.insert(k, index);
                    true
                }
                None => {
                    let timer = match core.slots.get_mut(index) {
                        Some(Slot::Occupied(t)) => t,
                        _ => unreachable!("slot vanished while held"),
                    };
                    timer.state = TimerState::Waiting;
                    timer.index_key = None;
                    if timer.options.one_shot {
                        timer.state = TimerState::Closed;
                    }
                    false
                }
            };

            self.inner.refresh_hints(&core);

            let ctx = wants_deadline.then_some(TimerContext {
                user_id,
                scheduled_deadline,
                now,
                event: TimerEvent::Deadline,
            });
            (SlotRef { index, generation }, ctx, requeue)
        };
        let _ = requeue;

        if let Some(ctx) = ctx {
            self.invoke_callback(slot_ref, ctx);
        }
        Some(())
    }

    fn invoke_callback(&self, slot_ref: SlotRef, ctx: TimerContext) {
        let mut callback = {
            let mut core = self.inner.core.lock().unwrap();
            match core.get_mut(slot_ref) {
                Some(t) => t.callback.take(),
                None => None,
            }
        };
        if let Some(cb) = callback.as_mut() {
            cb(ctx);
        }
        let mut core = self.inner.core.lock().unwrap();
        if let Some(t) = core.get_mut(slot_ref) {
            t.callback = callback;
        }
    }
}

impl Default for Chronology {
    fn default() -> Chronology {
        Chronology::new()
    }
}

/// A handle to a single scheduled/schedulable unit of work living in a
/// `Chronology`'s slab.
pub struct Timer {
    chronology: Chronology,
    slot: SlotRef,
}

impl Timer {
    /// Transition `Waiting` -> `Scheduled` (or re-key an already-`Scheduled`
    /// timer) with the given absolute `deadline` and optional `period`.
    /// Fails with `Invalid` if the timer is `Closed`.
    pub fn schedule(
        &self,
        deadline: Instant,
        period: Option<std::time::Duration>,
    ) -> Result<(), Error> {
        let mut core = self.chronology.inner.core.lock().unwrap();
        let seq = core.next_sequence();
        let timer = core
            .get_mut(self.slot)
            .ok_or_else(|| Error::from_kind(ErrorKind::Invalid))?;
        if timer.state == TimerState::Closed {
            return Err(Error::from_kind(ErrorKind::Invalid));
        }
        if let Some(key) = timer.index_key.take() {
            core.deadline_index.remove(&key);
        }
        let timer = core.get_mut(self.slot).unwrap();
        timer.state = TimerState::Scheduled;
        timer.deadline = deadline;
        timer.period = period;
        let key = (deadline, seq);
        timer.index_key = Some(key);
        core.deadline_index.insert(key, self.slot.index);
        self.chronology.inner.refresh_hints(&core);
        Ok(())
    }

    /// `Waiting` -> no-op (`Ok`, cancellation is idempotent). `Scheduled` ->
    /// `Waiting`, removed from the index, and a `Cancelled` announcement is
    /// queued if that event type is shown (returns `Cancelled` to signal
    /// the caller one is coming).
    pub fn cancel(&self) -> Result<(), Error> {
        let (fire, ctx) = {
            let mut core = self.chronology.inner.core.lock().unwrap();
            let timer = core
                .get_mut(self.slot)
                .ok_or_else(|| Error::from_kind(ErrorKind::Invalid))?;
            match timer.state {
                TimerState::Closed => return Err(Error::from_kind(ErrorKind::Invalid)),
                TimerState::Waiting => {
                    self.chronology.inner.refresh_hints(&core);
                    return Ok(());
                }
                TimerState::Scheduled => {
                    if let Some(key) = timer.index_key.take() {
                        core.deadline_index.remove(&key);
                    }
                    let timer = core.get_mut(self.slot).unwrap();
                    timer.state = TimerState::Waiting;
                    let user_id = timer.options.user_id;
                    let announce = timer.options.wants_event(TimerEvent::Cancelled);
                    let deadline = timer.deadline;
                    self.chronology.inner.refresh_hints(&core);
                    let ctx = announce.then_some(TimerContext {
                        user_id,
                        scheduled_deadline: deadline,
                        now: Instant::now(),
                        event: TimerEvent::Cancelled,
                    });
                    (announce, ctx)
                }
            }
        };
        if fire {
            if let Some(ctx) = ctx {
                self.chronology.invoke_callback(self.slot, ctx);
            }
            return Err(Error::from_kind(ErrorKind::Cancelled));
        }
        Ok(())
    }

    /// Cancel, transition to `Closed`, announce `Closed` if shown. Terminal:
    /// no further operation on this timer succeeds.
    pub fn close(&self) -> Result<(), Error> {
        let _ = self.cancel();
        let ctx = {
            let mut core = self.chronology.inner.core.lock().unwrap();
            let timer = match core.get_mut(self.slot) {
                Some(t) => t,
                None => return Ok(()),
            };
            if timer.state == TimerState::Closed {
                return Ok(());
            }
            timer.state = TimerState::Closed;
            let user_id = timer.options.user_id;
            let announce = timer.options.wants_event(TimerEvent::Closed);
            let deadline = timer.deadline;
            announce.then_some(TimerContext {
                user_id,
                scheduled_deadline: deadline,
                now: Instant::now(),
                event: TimerEvent::Closed,
            })
        };
        if let Some(ctx) = ctx {
            self.chronology.invoke_callback(self.slot, ctx);
        }
        Ok(())
    }

    pub fn state(&self) -> Option<TimerState> {
        let core = self.chronology.inner.core.lock().unwrap();
        core.get(self.slot).map(|t| t.state)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let mut core = self.chronology.inner.core.lock().unwrap();
        let found = match core.get_mut(self.slot) {
            Some(timer) => {
                let key = timer.index_key.take();
                timer.generation = timer.generation.wrapping_add(1);
                Some(key)
            }
            None => None,
        };
        if let Some(key) = found {
            if let Some(key) = key {
                core.deadline_index.remove(&key);
            }
            core.release(self.slot.index);
        }
        self.chronology.inner.refresh_hints(&core);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn one_shot_timer_fires_once() {
        let chrono = Chronology::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = chrono.create_timer(TimerOptions::default(), move |ctx| {
            assert_eq!(ctx.event, TimerEvent::Deadline);
            assert!(ctx.now >= ctx.scheduled_deadline);
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.schedule(Instant::now(), None).unwrap();

        thread::sleep(Duration::from_millis(5));
        chrono.announce(false);
        chrono.announce(false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(timer.state(), Some(TimerState::Closed));
    }

    #[test]
    fn recurring_timer_stride_is_period_multiples() {
        let chrono = Chronology::new();
        let fires = Arc::new(Mutex::new(Vec::new()));
        let f = fires.clone();
        let start = Instant::now();
        let period = Duration::from_millis(10);
        let timer = chrono.create_timer(
            TimerOptions {
                one_shot: false,
                ..TimerOptions::default()
            },
            move |ctx| {
                f.lock().unwrap().push(ctx.scheduled_deadline);
            },
        );
        timer.schedule(start, Some(period)).unwrap();

        for _ in 0..5 {
            thread::sleep(period);
            chrono.announce(false);
        }

        let got = fires.lock().unwrap();
        assert!(got.len() >= 4);
        for (k, deadline) in got.iter().enumerate() {
            assert!(*deadline >= start + period * (k as u32));
        }
        timer.close().unwrap();
    }

    #[test]
    fn cancel_is_idempotent() {
        let chrono = Chronology::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = chrono.create_timer(TimerOptions::default(), move |ctx| {
            if ctx.event == TimerEvent::Cancelled {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        timer
            .schedule(Instant::now() + Duration::from_secs(60), None)
            .unwrap();
        let _ = timer.cancel();
        let _ = timer.cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reschedule_pending_timer_uses_latest_deadline() {
        let chrono = Chronology::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let timer = chrono.create_timer(TimerOptions::default(), move |_ctx| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer
            .schedule(Instant::now() + Duration::from_secs(86_400), None)
            .unwrap();
        timer
            .schedule(Instant::now() + Duration::from_millis(5), None)
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        chrono.announce(false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn deferred_functions_run_in_fifo_order() {
        let chrono = Chronology::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let o = order.clone();
            chrono.execute(move || o.lock().unwrap().push(i));
        }
        chrono.announce(false);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
