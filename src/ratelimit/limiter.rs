//! Combined peak + sustained rate limiter.
//!
//! Grounded on `examples/original_source/groups/ntc/ntcs/ntcs_ratelimiter.h`:
//! two `LeakyBucket`s guarded by one lock (the original's
//! `bsls::SpinLock`-guarded pair, realized here as `std::sync::Mutex` the
//! way the rest of this crate's shared mutable state is guarded — see
//! `reactor::Reactor`). `wouldExceedBandwidth` is the OR of both buckets'
//! `wouldOverflow`; `calculateTimeToSubmit` is their MAX; `submit` submits to
//! both so the sustained average and the short peak burst are both charged
//! for every unit that flows through.

use super::LeakyBucket;
use crate::error::{Error, ErrorKind};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Buckets {
    sustained: LeakyBucket,
    peak: LeakyBucket,
}

/// Limits both a sustained (long-window) rate and a peak (short-window,
/// bursty) rate at once. A unit only passes if neither bucket would
/// overflow; it is charged against both on submission.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    /// `sustained_rate_limit`/`peak_rate_limit` are drain rates in units
    /// per second; each bucket's capacity is derived as `rate * window`
    /// (`ntcs_ratelimiter.h:117-119`). Fails with `Invalid` if either rate
    /// or window is zero (or the derived capacity rounds down to zero),
    /// and with `Limit` if `rate * window` overflows a 64-bit unsigned
    /// integer — both preconditions `ntcs_ratelimiter.h:333-339` documents.
    pub fn new(
        sustained_rate_limit: u64,
        sustained_rate_window: Duration,
        peak_rate_limit: u64,
        peak_rate_window: Duration,
        now: Instant,
    ) -> Result<RateLimiter, Error> {
        let sustained_capacity = validated_capacity(sustained_rate_limit, sustained_rate_window)?;
        let peak_capacity = validated_capacity(peak_rate_limit, peak_rate_window)?;
        Ok(RateLimiter {
            buckets: Mutex::new(Buckets {
                sustained: LeakyBucket::new(sustained_rate_limit, sustained_capacity, now),
                peak: LeakyBucket::new(peak_rate_limit, peak_capacity, now),
            }),
        })
    }

    pub fn would_exceed_bandwidth(&self, now: Instant) -> bool {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.would_overflow(now) || b.peak.would_overflow(now)
    }

    pub fn calculate_time_to_submit(&self, now: Instant) -> Duration {
        let mut b = self.buckets.lock().unwrap();
        b.sustained
            .calculate_time_to_submit(now)
            .max(b.peak.calculate_time_to_submit(now))
    }

    pub fn submit(&self, units: u64, now: Instant) {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.submit(units, now);
        b.peak.submit(units, now);
    }

    /// Reserve `units` of capacity in both buckets. Rolls back the
    /// sustained reservation if the peak bucket can't also hold it, so a
    /// caller never ends up holding a reservation in only one bucket.
    pub fn reserve(&self, units: u64, now: Instant) -> bool {
        let mut b = self.buckets.lock().unwrap();
        if !b.sustained.reserve(units, now) {
            return false;
        }
        if !b.peak.reserve(units, now) {
            b.sustained.cancel_reserved(units);
            return false;
        }
        true
    }

    pub fn cancel_reserved(&self, units: u64) {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.cancel_reserved(units);
        b.peak.cancel_reserved(units);
    }

    pub fn submit_reserved(&self, units: u64, now: Instant) {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.submit_reserved(units, now);
        b.peak.submit_reserved(units, now);
    }

    pub fn reset(&self, now: Instant) {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.reset(now);
        b.peak.reset(now);
    }

    pub fn reset_statistics(&self, now: Instant) {
        let mut b = self.buckets.lock().unwrap();
        b.sustained.reset_statistics(now);
        b.peak.reset_statistics(now);
    }

    /// Replace both rate limits in place, preserving whatever each bucket
    /// currently holds. Same validation as `new`.
    pub fn set_rate_limits(
        &self,
        sustained_rate_limit: u64,
        sustained_rate_window: Duration,
        peak_rate_limit: u64,
        peak_rate_window: Duration,
        now: Instant,
    ) -> Result<(), Error> {
        let sustained_capacity = validated_capacity(sustained_rate_limit, sustained_rate_window)?;
        let peak_capacity = validated_capacity(peak_rate_limit, peak_rate_window)?;
        let mut b = self.buckets.lock().unwrap();
        b.sustained.set_rate_limit(sustained_rate_limit, sustained_capacity, now);
        b.peak.set_rate_limit(peak_rate_limit, peak_capacity, now);
        Ok(())
    }

    pub fn supports_rate_limits_exactly(
        sustained_rate_limit: u64,
        sustained_rate_window: Duration,
        peak_rate_limit: u64,
        peak_rate_window: Duration,
    ) -> bool {
        super::supports_exactly(sustained_rate_limit, sustained_rate_window)
            && super::supports_exactly(peak_rate_limit, peak_rate_window)
    }
}

/// Validates a (rate, window) pair and derives the bucket capacity, per the
/// preconditions `ntcs_ratelimiter.h:333-339` documents.
fn validated_capacity(rate: u64, window: Duration) -> Result<u64, Error> {
    if rate == 0 || window.is_zero() {
        return Err(Error::from_kind(ErrorKind::Invalid));
    }
    let capacity = super::capacity_for(rate, window).ok_or_else(|| Error::from_kind(ErrorKind::Limit))?;
    if capacity == 0 {
        return Err(Error::from_kind(ErrorKind::Invalid));
    }
    Ok(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scenario E6: a sustained rate of 1000 units/sec (capacity 1000 over a
    // 1s window) and a tighter peak rate of 100 units/sec (capacity 10 over
    // a 100ms window) — the peak bucket should clamp bursts well before the
    // sustained bucket would.
    #[test]
    fn peak_limit_clamps_bursts_before_sustained_limit_does() {
        let t0 = Instant::now();
        let limiter = RateLimiter::new(
            1000,
            Duration::from_secs(1),
            100,
            Duration::from_millis(100),
            t0,
        )
        .unwrap();
        for _ in 0..10 {
            assert!(!limiter.would_exceed_bandwidth(t0));
            limiter.submit(1, t0);
        }
        assert!(limiter.would_exceed_bandwidth(t0));
        assert!(limiter.calculate_time_to_submit(t0) > Duration::ZERO);
    }

    #[test]
    fn reserve_rolls_back_sustained_if_peak_cannot_hold() {
        let t0 = Instant::now();
        let limiter =
            RateLimiter::new(1000, Duration::from_secs(1), 1, Duration::from_secs(1), t0).unwrap();
        assert!(limiter.reserve(1, t0));
        assert!(!limiter.reserve(1, t0));
        // Sustained reservation from the failed attempt must have rolled
        // back, or a later reserve sized to its whole capacity would fail.
        limiter.cancel_reserved(1);
        assert!(limiter.reserve(1, t0));
    }

    #[test]
    fn submit_reserved_charges_both_buckets() {
        let t0 = Instant::now();
        let limiter =
            RateLimiter::new(10, Duration::from_secs(1), 10, Duration::from_secs(1), t0).unwrap();
        assert!(limiter.reserve(5, t0));
        limiter.submit_reserved(5, t0);
        // Both buckets are now at capacity (5/10, draining); one more
        // reservation for the remaining capacity should still succeed.
        assert!(limiter.reserve(5, t0));
        let t1 = t0 + Duration::from_secs(1);
        assert!(!limiter.would_exceed_bandwidth(t1));
    }

    #[test]
    fn new_rejects_zero_rate_zero_window_and_overflow() {
        let t0 = Instant::now();
        assert_eq!(
            RateLimiter::new(0, Duration::from_secs(1), 10, Duration::from_secs(1), t0)
                .unwrap_err()
                .kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            RateLimiter::new(10, Duration::ZERO, 10, Duration::from_secs(1), t0)
                .unwrap_err()
                .kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            RateLimiter::new(u64::MAX, Duration::from_secs(u64::MAX), 10, Duration::from_secs(1), t0)
                .unwrap_err()
                .kind(),
            ErrorKind::Limit
        );
    }
}
