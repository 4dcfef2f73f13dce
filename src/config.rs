//! Runtime configuration.
//!
//! Grounded on spec.md §6's external-interfaces option table; shaped as a
//! flat struct with `Default` plus `with_*` builder setters, the same shape
//! mio gives `Poll`/`Events` construction knobs even though mio itself has
//! no single config type — here the options fan out to both the reactor and
//! the thread pool, so one struct is threaded through both rather than
//! duplicated.

use crate::interest::Trigger;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    min_threads: usize,
    max_threads: usize,
    thread_load_factor: usize,
    thread_stack_size: usize,
    max_events_per_wait: usize,
    max_cycles_per_wait: usize,
    auto_attach: bool,
    auto_detach: bool,
    one_shot: bool,
    trigger: Trigger,
    max_connections: usize,
    dynamic_load_balancing: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            min_threads: 1,
            max_threads: 1,
            thread_load_factor: 1000,
            thread_stack_size: 2 * 1024 * 1024,
            max_events_per_wait: 1024,
            max_cycles_per_wait: 1,
            auto_attach: true,
            auto_detach: true,
            one_shot: false,
            trigger: Trigger::Level,
            max_connections: 60_000,
            dynamic_load_balancing: true,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    pub fn with_min_threads(mut self, n: usize) -> Config {
        self.min_threads = n.max(1);
        self
    }

    pub fn with_max_threads(mut self, n: usize) -> Config {
        self.max_threads = n.max(1);
        self
    }

    pub fn with_thread_load_factor(mut self, n: usize) -> Config {
        self.thread_load_factor = n;
        self
    }

    pub fn with_thread_stack_size(mut self, bytes: usize) -> Config {
        self.thread_stack_size = bytes;
        self
    }

    pub fn with_max_events_per_wait(mut self, n: usize) -> Config {
        self.max_events_per_wait = n.max(1);
        self
    }

    pub fn with_max_cycles_per_wait(mut self, n: usize) -> Config {
        self.max_cycles_per_wait = n.max(1);
        self
    }

    pub fn with_auto_attach(mut self, v: bool) -> Config {
        self.auto_attach = v;
        self
    }

    pub fn with_auto_detach(mut self, v: bool) -> Config {
        self.auto_detach = v;
        self
    }

    pub fn with_one_shot(mut self, v: bool) -> Config {
        self.one_shot = v;
        self
    }

    pub fn with_trigger(mut self, t: Trigger) -> Config {
        self.trigger = t;
        self
    }

    pub fn with_max_connections(mut self, n: usize) -> Config {
        self.max_connections = n;
        self
    }

    pub fn with_dynamic_load_balancing(mut self, v: bool) -> Config {
        self.dynamic_load_balancing = v;
        self
    }

    pub fn min_threads(&self) -> usize {
        self.min_threads
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn thread_load_factor(&self) -> usize {
        self.thread_load_factor
    }

    pub fn thread_stack_size(&self) -> usize {
        self.thread_stack_size
    }

    pub fn max_events_per_wait(&self) -> usize {
        self.max_events_per_wait
    }

    pub fn max_cycles_per_wait(&self) -> usize {
        self.max_cycles_per_wait
    }

    pub fn auto_attach(&self) -> bool {
        self.auto_attach
    }

    pub fn auto_detach(&self) -> bool {
        self.auto_detach
    }

    pub fn one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn dynamic_load_balancing(&self) -> bool {
        self.dynamic_load_balancing
    }
}

/// Maximum time a `run`/`poll` call blocks in the OS poller when no timer is
/// pending, so a stopped-but-still-looping reactor notices `Stopping` in
/// bounded time even without an interruptor wakeup.
pub(crate) const MAX_POLL_TIMEOUT: Duration = Duration::from_secs(1);
