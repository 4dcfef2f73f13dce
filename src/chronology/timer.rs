use std::time::{Duration, Instant};

/// Lifecycle state of a `Timer`. `Closed` is terminal: no operation
/// succeeds on a closed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Waiting,
    Scheduled,
    Closed,
}

/// The reason a timer callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Deadline,
    Cancelled,
    Closed,
}

/// Immutable-after-construction configuration for a timer: which events to
/// announce, one-shot vs recurring, and a caller-chosen id echoed back in
/// the context.
#[derive(Debug, Clone, Copy)]
pub struct TimerOptions {
    pub one_shot: bool,
    pub announce_deadline: bool,
    pub announce_cancelled: bool,
    pub announce_closed: bool,
    pub user_id: u64,
}

impl Default for TimerOptions {
    fn default() -> TimerOptions {
        TimerOptions {
            one_shot: true,
            announce_deadline: true,
            announce_cancelled: true,
            announce_closed: true,
            user_id: 0,
        }
    }
}

impl TimerOptions {
    pub fn recurring(user_id: u64) -> TimerOptions {
        TimerOptions {
            one_shot: false,
            ..TimerOptions::default()
        }
        .with_user_id(user_id)
    }

    pub fn with_user_id(mut self, id: u64) -> TimerOptions {
        self.user_id = id;
        self
    }

    fn wants(&self, event: TimerEvent) -> bool {
        match event {
            TimerEvent::Deadline => self.announce_deadline,
            TimerEvent::Cancelled => self.announce_cancelled,
            TimerEvent::Closed => self.announce_closed,
        }
    }

    pub(super) fn wants_event(&self, event: TimerEvent) -> bool {
        self.wants(event)
    }
}

/// Passed to a timer callback: the deadline it was scheduled for, the
/// observed now, the drift between the two, and why the callback fired.
#[derive(Debug, Clone, Copy)]
pub struct TimerContext {
    pub user_id: u64,
    pub scheduled_deadline: Instant,
    pub now: Instant,
    pub event: TimerEvent,
}

impl TimerContext {
    pub fn drift(&self) -> Duration {
        self.now.saturating_duration_since(self.scheduled_deadline)
    }
}

/// Opaque reference to a timer slot: index plus generation, so a stale
/// handle from a reused slot is rejected rather than silently operating on
/// the wrong timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct SlotRef {
    pub index: usize,
    pub generation: u64,
}

pub(super) struct TimerSlot {
    pub state: TimerState,
    pub generation: u64,
    pub options: TimerOptions,
    pub callback: Option<Box<dyn FnMut(TimerContext) + Send>>,
    pub deadline: Instant,
    pub period: Option<Duration>,
    /// `(deadline, sequence)` key currently present in the deadline index,
    /// if `state == Scheduled`.
    pub index_key: Option<(Instant, u64)>,
}
