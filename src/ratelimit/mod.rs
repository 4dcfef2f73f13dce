//! Leaky-bucket rate limiting.
//!
//! Grounded on `examples/original_source/groups/ntc/ntcs/ntcs_leakybucket.h`.
//! That header declares the draining algorithm in doxygen prose (a bucket
//! drains at a fixed rate; `submit` adds units; `reserve` holds capacity
//! without draining it) but `updateState`, `wouldOverflow` and
//! `calculateTimeToSubmit` have no defining `.cpp` in the retrieval pack, so
//! their bodies here are synthesized from that prose rather than ported from
//! a concrete implementation. The sub-unit draining residue is tracked in
//! "nanounits" (1 unit == `NANOUNITS_PER_UNIT` nanounits) the same way mio's
//! `sys/unix/selector/epoll.rs` keeps a raw bit-mask rather than rounding
//! readiness down to the nearest flag: precision that a coarser type would
//! throw away on every update is carried forward instead.
//!
//! `std::time::Instant` stands in for the original's `bsls::TimeInterval`;
//! `Instant` already subtracts to a `Duration`, so there is no need for the
//! original's manual interval arithmetic.

mod limiter;

pub use limiter::RateLimiter;

use std::time::{Duration, Instant};

const NANOUNITS_PER_UNIT: u128 = 1_000_000_000;

/// A single drain-at-constant-rate bucket with a fixed capacity.
///
/// `submit` and `reserve` both count toward `capacity`; only `submit`ted
/// (and later-submitted-reserved) units actually drain over time. A
/// cancelled reservation returns its units to capacity immediately, without
/// ever having drained.
#[derive(Debug, Clone)]
pub struct LeakyBucket {
    drain_rate: u64,
    capacity: u64,
    units_in_bucket: u64,
    units_reserved: u64,
    fractional_residue_nanounits: u64,
    last_update: Instant,
    statistics_collection_start: Instant,
    submitted_units: u64,
    submitted_units_at_last_update: u64,
}

impl LeakyBucket {
    /// `drain_rate` is in units per second, `capacity` in units, matching
    /// the original's `sustainedRateLimit`/`sustainedCapacity` pair (the
    /// caller is expected to have already derived `capacity` from a rate
    /// and a time window — see `RateLimiter::new` / `capacity_for`). Both
    /// must be positive: a `LeakyBucket` has no window of its own to
    /// validate against, so this only asserts rather than returning an
    /// `Error`; callers that accept a window validate before reaching here.
    pub fn new(drain_rate: u64, capacity: u64, now: Instant) -> LeakyBucket {
        debug_assert!(drain_rate > 0, "drain_rate must be positive");
        debug_assert!(capacity > 0, "capacity must be positive");
        LeakyBucket {
            drain_rate,
            capacity,
            units_in_bucket: 0,
            units_reserved: 0,
            fractional_residue_nanounits: 0,
            last_update: now,
            statistics_collection_start: now,
            submitted_units: 0,
            submitted_units_at_last_update: 0,
        }
    }

    pub fn drain_rate(&self) -> u64 {
        self.drain_rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn last_update_time(&self) -> Instant {
        self.last_update
    }

    pub fn statistics_collection_start_time(&self) -> Instant {
        self.statistics_collection_start
    }

    pub fn units_in_bucket(&self) -> u64 {
        self.units_in_bucket
    }

    pub fn units_reserved(&self) -> u64 {
        self.units_reserved
    }

    pub fn units_in_bucket_or_reserved(&self) -> u64 {
        self.units_in_bucket.saturating_add(self.units_reserved)
    }

    /// Drain whatever `drain_rate` units should have left the bucket
    /// between `last_update` and `now`, carrying any sub-unit remainder
    /// forward so a long run of sub-second updates at a low rate still
    /// drains correctly on average.
    pub fn update_state(&mut self, now: Instant) {
        if now <= self.last_update {
            return;
        }
        let elapsed_nanos = now.duration_since(self.last_update).as_nanos();
        let total_nanounits = elapsed_nanos.saturating_mul(self.drain_rate as u128)
            + self.fractional_residue_nanounits as u128;
        let drained_units = (total_nanounits / NANOUNITS_PER_UNIT) as u64;
        self.fractional_residue_nanounits = (total_nanounits % NANOUNITS_PER_UNIT) as u64;
        self.units_in_bucket = self.units_in_bucket.saturating_sub(drained_units);
        self.last_update = now;
    }

    /// Whether one more unit, submitted right now, would push the bucket
    /// (in-flight plus reserved) past capacity.
    pub fn would_overflow(&mut self, now: Instant) -> bool {
        self.update_state(now);
        self.units_in_bucket_or_reserved() >= self.capacity
    }

    /// How long the caller would have to wait before one more unit can be
    /// submitted without overflowing. Zero if it could be submitted right
    /// now.
    pub fn calculate_time_to_submit(&mut self, now: Instant) -> Duration {
        if !self.would_overflow(now) {
            return Duration::ZERO;
        }
        if self.drain_rate == 0 {
            // A zero-rate bucket never drains; waiting would never help.
            return Duration::MAX;
        }
        let held = self.units_in_bucket_or_reserved();
        let excess_units = held + 1 - self.capacity;
        let needed_nanounits = (excess_units as u128 * NANOUNITS_PER_UNIT)
            .saturating_sub(self.fractional_residue_nanounits as u128);
        let nanos = needed_nanounits.div_ceil(self.drain_rate as u128);
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Add `units` directly to the bucket, bypassing the overflow check.
    /// Mirrors the original's `submit`: callers that care about overflow
    /// check `would_overflow`/`calculate_time_to_submit` first.
    pub fn submit(&mut self, units: u64, now: Instant) {
        self.update_state(now);
        self.units_in_bucket = self.units_in_bucket.saturating_add(units);
        self.submitted_units = self.submitted_units.saturating_add(units);
    }

    /// Hold `units` of capacity without draining them. Returns `false`
    /// (without reserving) if doing so would overflow the bucket.
    pub fn reserve(&mut self, units: u64, now: Instant) -> bool {
        self.update_state(now);
        if self.units_in_bucket_or_reserved() + units > self.capacity {
            return false;
        }
        self.units_reserved = self.units_reserved.saturating_add(units);
        true
    }

    /// Release a previous reservation without ever draining it.
    pub fn cancel_reserved(&mut self, units: u64) {
        self.units_reserved = self.units_reserved.saturating_sub(units);
    }

    /// Convert a previous reservation into drained, submitted units.
    pub fn submit_reserved(&mut self, units: u64, now: Instant) {
        self.units_reserved = self.units_reserved.saturating_sub(units);
        self.submit(units, now);
    }

    pub fn reset(&mut self, now: Instant) {
        self.units_in_bucket = 0;
        self.units_reserved = 0;
        self.fractional_residue_nanounits = 0;
        self.last_update = now;
    }

    pub fn reset_statistics(&mut self, now: Instant) {
        self.statistics_collection_start = now;
        self.submitted_units_at_last_update = self.submitted_units;
    }

    pub fn set_rate_limit(&mut self, drain_rate: u64, capacity: u64, now: Instant) {
        self.update_state(now);
        self.drain_rate = drain_rate;
        self.capacity = capacity;
    }

    /// Units submitted since the last `reset_statistics` call.
    pub fn submitted_units_since_last_reset(&self) -> u64 {
        self.submitted_units
            .saturating_sub(self.submitted_units_at_last_update)
    }
}

/// The bucket capacity implied by a drain rate (units/sec) sustained over a
/// time window: `capacity = rate * window`, per `ntcs_ratelimiter.h:117-119`
/// ("capacity `Ls = Rs * Ws`"). Returns `None` if the product overflows a
/// 64-bit unsigned integer, per the precondition `ntcs_ratelimiter.h:333-339`
/// documents. A window that doesn't divide evenly into whole units rounds
/// down, the same way `update_state` never hands out a unit it hasn't fully
/// drained.
pub fn capacity_for(rate: u64, window: Duration) -> Option<u64> {
    let total_nanounits = (rate as u128).checked_mul(window.as_nanos())?;
    u64::try_from(total_nanounits / NANOUNITS_PER_UNIT).ok()
}

/// Whether `rate` sustained over `window` produces a capacity with no
/// fractional unit lost to rounding.
pub fn supports_exactly(rate: u64, window: Duration) -> bool {
    match (rate as u128).checked_mul(window.as_nanos()) {
        Some(total_nanounits) => total_nanounits % NANOUNITS_PER_UNIT == 0,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_up_to_capacity_then_overflow() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        assert!(!bucket.would_overflow(t0));
        bucket.submit(10, t0);
        assert!(bucket.would_overflow(t0));
    }

    #[test]
    fn drains_at_configured_rate_over_time() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        bucket.submit(10, t0);
        let t1 = t0 + Duration::from_secs(1);
        bucket.update_state(t1);
        assert_eq!(bucket.units_in_bucket(), 0);
    }

    #[test]
    fn reserved_units_count_toward_capacity_but_do_not_drain() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        assert!(bucket.reserve(10, t0));
        assert!(bucket.would_overflow(t0));
        let t1 = t0 + Duration::from_secs(1);
        assert!(bucket.would_overflow(t1));
        bucket.cancel_reserved(10);
        assert!(!bucket.would_overflow(t1));
    }

    #[test]
    fn calculate_time_to_submit_is_zero_under_capacity() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        bucket.submit(5, t0);
        assert_eq!(bucket.calculate_time_to_submit(t0), Duration::ZERO);
    }

    #[test]
    fn calculate_time_to_submit_waits_for_drain_when_full() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        bucket.submit(10, t0);
        let wait = bucket.calculate_time_to_submit(t0);
        assert!(wait > Duration::ZERO && wait <= Duration::from_millis(100));
    }

    #[test]
    fn submit_reserved_drains_like_a_normal_submit() {
        let t0 = Instant::now();
        let mut bucket = LeakyBucket::new(10, 10, t0);
        assert!(bucket.reserve(5, t0));
        bucket.submit_reserved(5, t0);
        assert_eq!(bucket.units_reserved(), 0);
        assert_eq!(bucket.units_in_bucket(), 5);
        let t1 = t0 + Duration::from_secs(1);
        bucket.update_state(t1);
        assert_eq!(bucket.units_in_bucket(), 0);
    }

    #[test]
    fn capacity_for_multiplies_rate_by_window() {
        assert_eq!(capacity_for(2048, Duration::from_micros(62_500)), Some(128));
        assert_eq!(capacity_for(1024, Duration::from_millis(500)), Some(512));
    }

    #[test]
    fn capacity_for_none_on_overflow() {
        assert_eq!(capacity_for(u64::MAX, Duration::from_secs(u64::MAX)), None);
    }

    #[test]
    fn supports_exactly_rejects_fractional_capacity() {
        assert!(supports_exactly(2048, Duration::from_micros(62_500)));
        assert!(!supports_exactly(3, Duration::from_millis(300)));
    }
}
