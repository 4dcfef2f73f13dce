//! Thread pool and load balancer: owns N reactors and M≥N driver threads,
//! and routes new sockets/work to the right reactor.
//!
//! Grounded on spec.md §4.6. Nothing in the example pack gives a literal
//! thread-pool-plus-reactor-vector to imitate line-for-line, so this module
//! follows the corpus's general std-only concurrency idiom (the `Arc` +
//! `Mutex` + `AtomicUsize` discipline mio's own `Poll`/`Registry` split
//! uses) rather than any one file.

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::handle::Handle;
use crate::reactor::Reactor;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Index into `ThreadPool::reactors`, returned by an acquisition strategy
/// and consumed by `release`.
pub type ReactorIndex = usize;

struct Driver {
    reactor: Arc<Reactor>,
    thread: Option<JoinHandle<()>>,
}

/// Owns a vector of reactors, a vector of driver threads, a handle→reactor
/// map, and the process-wide handle reservation counter.
pub struct ThreadPool {
    drivers: Mutex<Vec<Driver>>,
    handle_map: Mutex<BTreeMap<Handle, ReactorIndex>>,
    reserved_handles: AtomicUsize,
    config: Config,
}

impl ThreadPool {
    /// Spawn the initial driver threads: one shared reactor driven by
    /// `minThreads` threads under dynamic balancing, or `minThreads`
    /// independent one-reactor-per-thread drivers under static balancing.
    pub fn new(config: Config) -> Result<ThreadPool, Error> {
        let pool = ThreadPool {
            drivers: Mutex::new(Vec::new()),
            handle_map: Mutex::new(BTreeMap::new()),
            reserved_handles: AtomicUsize::new(0),
            config,
        };

        if config.dynamic_load_balancing() {
            let reactor = Arc::new(Reactor::new(config)?);
            let mut threads = Vec::with_capacity(config.min_threads());
            for _ in 0..config.min_threads() {
                threads.push(pool.spawn_driver_thread(reactor.clone())?);
            }
            let mut drivers = pool.drivers.lock().unwrap();
            drivers.push(Driver {
                reactor: reactor.clone(),
                thread: threads.pop(),
            });
            // Extra driver threads beyond the first share the one reactor;
            // park their handles on a synthetic trailing driver entry so
            // `shutdown` still joins them. Index 0 is the only real
            // acquisition target (`least_loaded` is trivial under dynamic
            // balancing, matching spec.md §4.6).
            for t in threads {
                drivers.push(Driver {
                    reactor: reactor.clone(),
                    thread: Some(t),
                });
            }
        } else {
            let mut drivers = pool.drivers.lock().unwrap();
            for _ in 0..config.min_threads() {
                let reactor = Arc::new(Reactor::new(config)?);
                let thread = pool.spawn_driver_thread(reactor.clone())?;
                drivers.push(Driver {
                    reactor,
                    thread: Some(thread),
                });
            }
        }

        Ok(pool)
    }

    fn spawn_driver_thread(&self, reactor: Arc<Reactor>) -> Result<JoinHandle<()>, Error> {
        std::thread::Builder::new()
            .stack_size(self.config.thread_stack_size())
            .spawn(move || {
                let _ = reactor.run();
            })
            .map_err(Error::from)
    }

    pub fn thread_count(&self) -> usize {
        self.drivers.lock().unwrap().len()
    }

    pub fn reactor_count(&self) -> usize {
        if self.config.dynamic_load_balancing() {
            1
        } else {
            self.drivers.lock().unwrap().len()
        }
    }

    pub fn reactor(&self, index: ReactorIndex) -> Arc<Reactor> {
        self.drivers.lock().unwrap()[index].reactor.clone()
    }

    /// Strategy 1: route to the reactor driven by the thread at `thread_index`.
    pub fn acquire_by_thread_handle(&self, thread_index: usize, weight: usize) -> Result<ReactorIndex, Error> {
        self.acquire_by_thread_index(thread_index, weight)
    }

    /// Strategy 2: route by thread index modulo the driver-thread count.
    pub fn acquire_by_thread_index(&self, index: usize, weight: usize) -> Result<ReactorIndex, Error> {
        let drivers = self.drivers.lock().unwrap();
        if drivers.is_empty() {
            return Err(Error::from_kind(ErrorKind::Invalid));
        }
        let chosen = index % drivers.len();
        drivers[chosen].reactor.add_load(weight);
        Ok(chosen)
    }

    /// Strategy 3: scan reactors, route to the lowest-loaded one. If every
    /// reactor's load exceeds `threadLoadFactor` and the driver count is
    /// below `maxThreads`, spawn a new thread (and, under static balancing,
    /// a new reactor) before routing.
    pub fn acquire_least_loaded(&self, weight: usize) -> Result<ReactorIndex, Error> {
        if self.config.dynamic_load_balancing() {
            let drivers = self.drivers.lock().unwrap();
            drivers[0].reactor.add_load(weight);
            return Ok(0);
        }

        let mut drivers = self.drivers.lock().unwrap();
        let all_overloaded = drivers
            .iter()
            .all(|d| d.reactor.load() >= self.config.thread_load_factor());
        if all_overloaded && drivers.len() < self.config.max_threads() {
            let reactor = Arc::new(Reactor::new(self.config)?);
            let thread = self.spawn_driver_thread(reactor.clone())?;
            drivers.push(Driver {
                reactor,
                thread: Some(thread),
            });
        }

        let (chosen, _) = drivers
            .iter()
            .enumerate()
            .min_by_key(|(_, d)| d.reactor.load())
            .ok_or_else(|| Error::from_kind(ErrorKind::Invalid))?;
        drivers[chosen].reactor.add_load(weight);
        Ok(chosen)
    }

    pub fn release(&self, index: ReactorIndex, weight: usize) {
        let drivers = self.drivers.lock().unwrap();
        if let Some(d) = drivers.get(index) {
            d.reactor.sub_load(weight);
        }
    }

    /// Record that `handle` is pinned to `index`'s reactor (static
    /// balancing keeps sockets on the reactor they were first routed to for
    /// their lifetime).
    pub fn pin(&self, handle: Handle, index: ReactorIndex) {
        self.handle_map.lock().unwrap().insert(handle, index);
    }

    pub fn reactor_for(&self, handle: Handle) -> Option<Arc<Reactor>> {
        let index = *self.handle_map.lock().unwrap().get(&handle)?;
        Some(self.reactor(index))
    }

    pub fn unpin(&self, handle: Handle) {
        self.handle_map.lock().unwrap().remove(&handle);
    }

    /// Process-wide open-handle reservation, capped by `maxConnections`.
    /// Returns `false` (without reserving) if the cap would be exceeded.
    pub fn acquire_handle_reservation(&self) -> bool {
        let cap = self.config.max_connections();
        loop {
            let current = self.reserved_handles.load(Ordering::Acquire);
            if current >= cap {
                return false;
            }
            if self
                .reserved_handles
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    pub fn release_handle_reservation(&self) {
        self.reserved_handles.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn reserved_handle_count(&self) -> usize {
        self.reserved_handles.load(Ordering::Acquire)
    }

    /// Stop every reactor and join its driver thread(s).
    pub fn shutdown(&self) {
        let mut drivers = self.drivers.lock().unwrap();
        let mut seen = Vec::new();
        for d in drivers.iter() {
            if !seen.iter().any(|r: &*const Reactor| *r == Arc::as_ptr(&d.reactor)) {
                d.reactor.stop();
                seen.push(Arc::as_ptr(&d.reactor));
            }
        }
        for d in drivers.iter_mut() {
            if let Some(t) = d.thread.take() {
                let _ = t.join();
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_loaded_picks_minimum_and_release_decrements() {
        let pool = ThreadPool {
            drivers: Mutex::new(Vec::new()),
            handle_map: Mutex::new(BTreeMap::new()),
            reserved_handles: AtomicUsize::new(0),
            config: Config::new().with_dynamic_load_balancing(false).with_max_threads(3),
        };
        let mut drivers = Vec::new();
        for load in [5usize, 2, 7] {
            let reactor = Arc::new(Reactor::new(pool.config).unwrap());
            reactor.add_load(load);
            drivers.push(Driver { reactor, thread: None });
        }
        *pool.drivers.lock().unwrap() = drivers;

        let chosen = pool.acquire_least_loaded(1).unwrap();
        assert_eq!(chosen, 1);
        assert_eq!(pool.reactor(1).load(), 3);

        pool.release(1, 1);
        assert_eq!(pool.reactor(1).load(), 2);
    }

    #[test]
    fn handle_reservation_respects_cap() {
        let pool = ThreadPool {
            drivers: Mutex::new(Vec::new()),
            handle_map: Mutex::new(BTreeMap::new()),
            reserved_handles: AtomicUsize::new(0),
            config: Config::new().with_max_connections(2),
        };
        assert!(pool.acquire_handle_reservation());
        assert!(pool.acquire_handle_reservation());
        assert!(!pool.acquire_handle_reservation());
        pool.release_handle_reservation();
        assert!(pool.acquire_handle_reservation());
    }
}
