//! Per-handle subscription state the reactor uses to program the OS poller.
//!
//! Grounded on mio's `Interests` (`src/interests.rs`) for the bitset shape,
//! generalized per spec.md §4.3 with the trigger/shot mode fields and the
//! attach/detach/show/hide bookkeeping operations the source's
//! `InterestSet` exposes.

use crate::bitflags_like;
use crate::error::{Error, ErrorKind};
use crate::handle::Handle;
use std::collections::BTreeMap;

bitflags_like! {
    pub struct WantSet: u8 {
        const READABLE = 0b01;
        const WRITABLE = 0b10;
    }
}

/// Level-triggered re-fires while the condition persists; edge-triggered
/// requires the caller to drain the handle until `WouldBlock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Level,
    Edge,
}

/// Persistent interests stay armed across dispatches; one-shot interests
/// clear after each delivered readiness event until re-shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shot {
    Persistent,
    OneShot,
}

/// Per-handle subscription record.
///
/// An `Interest` whose `want` is empty may still be retained: that is how
/// the reactor distinguishes "attached with no interest" from "not
/// attached."
#[derive(Debug, Clone, Copy)]
pub struct Interest {
    handle: Handle,
    want: WantSet,
    trigger: Trigger,
    shot: Shot,
}

impl Interest {
    pub fn new(handle: Handle, trigger: Trigger, shot: Shot) -> Interest {
        Interest {
            handle,
            want: WantSet::empty(),
            trigger,
            shot,
        }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn wants_readable(&self) -> bool {
        self.want.contains(WantSet::READABLE)
    }

    pub fn wants_writable(&self) -> bool {
        self.want.contains(WantSet::WRITABLE)
    }

    pub fn want(&self) -> WantSet {
        self.want
    }

    pub fn is_quiescent(&self) -> bool {
        self.want.is_empty()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn shot(&self) -> Shot {
        self.shot
    }

    fn show(&mut self, flag: WantSet) {
        self.want.insert(flag);
    }

    fn hide(&mut self, flag: WantSet) {
        self.want.remove(flag);
    }
}

/// Mapping from handle to `Interest`. Pure in-memory bookkeeping: the
/// reactor is responsible for also propagating changes to the OS poller.
#[derive(Default)]
pub struct InterestSet {
    interests: BTreeMap<Handle, Interest>,
}

impl InterestSet {
    pub fn new() -> InterestSet {
        InterestSet {
            interests: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.interests.len()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.interests.contains_key(&handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&Interest> {
        self.interests.get(&handle)
    }

    /// Insert a new, quiescent `Interest` for `handle`. Fails with
    /// `Invalid` if `handle` is already present.
    pub fn attach(&mut self, handle: Handle, trigger: Trigger, shot: Shot) -> Result<(), Error> {
        if self.interests.contains_key(&handle) {
            return Err(Error::from_kind(ErrorKind::Invalid));
        }
        self.interests
            .insert(handle, Interest::new(handle, trigger, shot));
        Ok(())
    }

    /// Remove `handle`'s interest record. Succeeds even if interest was
    /// non-empty; the caller (the reactor) is responsible for also removing
    /// any OS-level registration.
    pub fn detach(&mut self, handle: Handle) -> Result<Interest, Error> {
        self.interests
            .remove(&handle)
            .ok_or_else(|| Error::from_kind(ErrorKind::Invalid))
    }

    fn mutate(&mut self, handle: Handle, f: impl FnOnce(&mut Interest)) -> Result<(), Error> {
        match self.interests.get_mut(&handle) {
            Some(interest) => {
                f(interest);
                Ok(())
            }
            None => Err(Error::from_kind(ErrorKind::Invalid)),
        }
    }

    pub fn show_readable(&mut self, handle: Handle) -> Result<(), Error> {
        self.mutate(handle, |i| i.show(WantSet::READABLE))
    }

    pub fn show_writable(&mut self, handle: Handle) -> Result<(), Error> {
        self.mutate(handle, |i| i.show(WantSet::WRITABLE))
    }

    pub fn hide_readable(&mut self, handle: Handle) -> Result<(), Error> {
        self.mutate(handle, |i| i.hide(WantSet::READABLE))
    }

    pub fn hide_writable(&mut self, handle: Handle) -> Result<(), Error> {
        self.mutate(handle, |i| i.hide(WantSet::WRITABLE))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interest> {
        self.interests.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_twice_fails() {
        let mut set = InterestSet::new();
        let h = Handle::new(1);
        set.attach(h, Trigger::Level, Shot::OneShot).unwrap();
        let err = set.attach(h, Trigger::Level, Shot::OneShot).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn detach_then_contains_false() {
        let mut set = InterestSet::new();
        let h = Handle::new(2);
        set.attach(h, Trigger::Level, Shot::OneShot).unwrap();
        set.detach(h).unwrap();
        assert!(!set.contains(h));
    }

    #[test]
    fn show_hide_then_show_matches_show_alone() {
        let h = Handle::new(3);

        let mut a = InterestSet::new();
        a.attach(h, Trigger::Level, Shot::Persistent).unwrap();
        a.show_readable(h).unwrap();
        a.hide_readable(h).unwrap();
        a.show_readable(h).unwrap();

        let mut b = InterestSet::new();
        b.attach(h, Trigger::Level, Shot::Persistent).unwrap();
        b.show_readable(h).unwrap();

        assert_eq!(a.get(h).unwrap().want(), b.get(h).unwrap().want());
    }

    #[test]
    fn show_on_unattached_handle_fails() {
        let mut set = InterestSet::new();
        let err = set.show_readable(Handle::new(9)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn quiescent_interest_is_distinguishable_from_detached() {
        let mut set = InterestSet::new();
        let h = Handle::new(4);
        set.attach(h, Trigger::Level, Shot::OneShot).unwrap();
        assert!(set.contains(h));
        assert!(set.get(h).unwrap().is_quiescent());
    }
}
