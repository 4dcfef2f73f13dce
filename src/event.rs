//! Readiness events and the ordered per-handle map that coalesces them.
//!
//! Grounded on mio's `event::Event`/`event::Events` (`src/event/event.rs`,
//! `src/event/events.rs`): a small bag of readiness bits plus optional byte
//! counters, paired with an ordered container keyed by handle so dispatch
//! within one poll cycle is deterministic.

use crate::error::Error;
use crate::handle::Handle;
use crate::bitflags_like;
use std::collections::BTreeMap;
use std::fmt;

bitflags_like! {
    /// Bitset over the readiness conditions a handle can report.
    pub struct ReadySet: u8 {
        const READABLE   = 0b0000_0001;
        const WRITABLE   = 0b0000_0010;
        const EXCEPTIONAL= 0b0000_0100;
        const ERROR      = 0b0000_1000;
        const SHUTDOWN   = 0b0001_0000;
        const HANGUP     = 0b0010_0000;
    }
}

/// A readiness event for a single handle.
///
/// Invariant: if `ERROR` is set, `error` is `Some`. If `HANGUP` is set, no
/// further reads will succeed on this handle.
#[derive(Clone, Copy)]
pub struct Event {
    handle: Handle,
    ready: ReadySet,
    bytes_readable: Option<u64>,
    bytes_writable: Option<u64>,
    error: Option<Error>,
}

impl Event {
    pub fn new(handle: Handle, ready: ReadySet) -> Event {
        Event {
            handle,
            ready,
            bytes_readable: None,
            bytes_writable: None,
            error: None,
        }
    }

    pub fn with_error(handle: Handle, error: Error) -> Event {
        Event {
            handle,
            ready: ReadySet::ERROR,
            bytes_readable: None,
            bytes_writable: None,
            error: Some(error),
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn ready(&self) -> ReadySet {
        self.ready
    }

    pub fn is_readable(&self) -> bool {
        self.ready.contains(ReadySet::READABLE)
    }

    pub fn is_writable(&self) -> bool {
        self.ready.contains(ReadySet::WRITABLE)
    }

    pub fn is_error(&self) -> bool {
        self.ready.contains(ReadySet::ERROR)
    }

    pub fn is_hangup(&self) -> bool {
        self.ready.contains(ReadySet::HANGUP)
    }

    pub fn bytes_readable(&self) -> Option<u64> {
        self.bytes_readable
    }

    pub fn bytes_writable(&self) -> Option<u64> {
        self.bytes_writable
    }

    pub fn error(&self) -> Option<Error> {
        self.error
    }

    pub fn set_bytes_readable(&mut self, n: u64) {
        self.bytes_readable = Some(n);
    }

    pub fn set_bytes_writable(&mut self, n: u64) {
        self.bytes_writable = Some(n);
    }

    /// Fold `other` into `self`: union the bitset, take the element-wise max
    /// of the byte hints, and keep `self`'s error if present (first-wins),
    /// otherwise take `other`'s.
    pub fn merge_from(&mut self, other: &Event) {
        debug_assert_eq!(self.handle, other.handle);
        self.ready |= other.ready;
        self.bytes_readable = max_option(self.bytes_readable, other.bytes_readable);
        self.bytes_writable = max_option(self.bytes_writable, other.bytes_writable);
        if self.error.is_none() {
            self.error = other.error;
        }
        if self.ready.contains(ReadySet::ERROR) {
            debug_assert!(self.error.is_some());
        }
    }
}

fn max_option(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("handle", &self.handle)
            .field("ready", &self.ready)
            .field("bytes_readable", &self.bytes_readable)
            .field("bytes_writable", &self.bytes_writable)
            .field("error", &self.error)
            .finish()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Event) -> bool {
        self.handle == other.handle
    }
}
impl Eq for Event {}
impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Event) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Event {
    fn cmp(&self, other: &Event) -> std::cmp::Ordering {
        self.handle.cmp(&other.handle)
    }
}

/// A keyed-unique mapping from handle to `Event`, iterated in ascending
/// handle order so dispatch within a poll cycle is deterministic.
#[derive(Default)]
pub struct EventSet {
    events: BTreeMap<Handle, Event>,
}

impl EventSet {
    pub fn new() -> EventSet {
        EventSet {
            events: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Insert, overwriting any existing event for this handle. Used on the
    /// OS-translation path where a fresh `Events` buffer is populated once
    /// per poll call.
    pub fn insert(&mut self, event: Event) {
        self.events.insert(event.handle(), event);
    }

    /// Coalesce `event` into the set: if the handle is absent, insert it;
    /// otherwise fold it into the existing entry via `Event::merge_from`.
    pub fn merge(&mut self, event: Event) {
        self.events
            .entry(event.handle())
            .and_modify(|existing| existing.merge_from(&event))
            .or_insert(event);
    }

    pub fn get(&self, handle: Handle) -> Option<&Event> {
        self.events.get(&handle)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Event> {
        self.events.remove(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }
}

impl<'a> IntoIterator for &'a EventSet {
    type Item = &'a Event;
    type IntoIter = std::collections::btree_map::Values<'a, Handle, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_bits_and_max_hints() {
        let h = Handle::new(3);
        let mut a = Event::new(h, ReadySet::READABLE);
        a.set_bytes_readable(10);
        let mut b = Event::new(h, ReadySet::WRITABLE);
        b.set_bytes_readable(40);

        let mut set = EventSet::new();
        set.merge(a);
        set.merge(b);

        let merged = set.get(h).unwrap();
        assert!(merged.is_readable());
        assert!(merged.is_writable());
        assert_eq!(merged.bytes_readable(), Some(40));
    }

    #[test]
    fn merge_prefers_present_error_over_absent() {
        let h = Handle::new(1);
        let err = Error::from_kind(crate::error::ErrorKind::ConnectionReset);
        let mut set = EventSet::new();
        set.merge(Event::with_error(h, err));
        set.merge(Event::new(h, ReadySet::READABLE));

        let merged = set.get(h).unwrap();
        assert!(merged.is_error());
        assert_eq!(merged.error().unwrap().kind(), crate::error::ErrorKind::ConnectionReset);
    }

    #[test]
    fn iteration_is_ascending_by_handle() {
        let mut set = EventSet::new();
        set.insert(Event::new(Handle::new(5), ReadySet::READABLE));
        set.insert(Event::new(Handle::new(1), ReadySet::READABLE));
        set.insert(Event::new(Handle::new(3), ReadySet::READABLE));

        let order: Vec<i64> = set.iter().map(|e| e.handle().raw()).collect();
        assert_eq!(order, vec![1, 3, 5]);
    }
}
