//! Circuit breaker and concurrency budget shared by every request of one client.
//!
//! Consecutive HTTP 429 responses are counted; reaching the threshold pauses
//! all callers for a cooldown and halves the allowed concurrency. The budget
//! only ever shrinks within a run.
//!
//! All state lives behind a single `Mutex + Condvar`, the same shape as a
//! counting semaphore: `preflight` is acquire, dropping the [`Permit`] is release.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::FetchError;
use crate::shutdown::ShutdownToken;

/// Longest uninterrupted wait inside a pre-flight check
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Initial number of requests allowed in flight
    pub concurrency: usize,
    /// Consecutive 429s that trip the breaker
    pub threshold: u32,
    /// How long every caller is held back after a trip
    pub pause: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            threshold: 5,
            pause: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Normal,
    Tripped,
}

#[derive(Debug)]
struct CircuitState {
    concurrency: usize,
    consecutive_429: u32,
    paused_until: Option<Instant>,
    in_flight: usize,
    trips: u32,
}

/// Point-in-time copy of the breaker state, for reporting and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub concurrency: usize,
    pub consecutive_429: u32,
    pub in_flight: usize,
    pub trips: u32,
}

pub struct CircuitBreaker {
    threshold: u32,
    pause: Duration,
    state: Mutex<CircuitState>,
    cond: Condvar,
}

/// One unit of the concurrency budget; released on drop.
pub struct Permit<'a>(&'a CircuitBreaker);

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            threshold: config.threshold.max(1),
            pause: config.pause,
            state: Mutex::new(CircuitState {
                concurrency: config.concurrency.max(1),
                consecutive_429: 0,
                paused_until: None,
                in_flight: 0,
                trips: 0,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a request may start, then take one unit of the budget.
    ///
    /// Waits out an active pause (closing the breaker lazily once it has
    /// elapsed) and waits while the in-flight count is at the current limit.
    pub fn preflight(&self, token: &ShutdownToken) -> Result<Permit<'_>, FetchError> {
        let mut state = self.lock();
        loop {
            if token.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            if let Some(until) = state.paused_until {
                let now = Instant::now();
                if now < until {
                    let wait = (until - now).min(WAIT_SLICE);
                    state = self
                        .cond
                        .wait_timeout(state, wait)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                    continue;
                }
                state.paused_until = None;
                log::info!(
                    "Circuit breaker closed, resuming with concurrency {}",
                    state.concurrency
                );
            }

            if state.in_flight < state.concurrency {
                state.in_flight += 1;
                return Ok(Permit(self));
            }

            state = self
                .cond
                .wait_timeout(state, WAIT_SLICE)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Count a 429. Returns `true` if this response tripped the breaker.
    pub fn record_rate_limited(&self) -> bool {
        let mut state = self.lock();
        state.consecutive_429 += 1;
        if state.consecutive_429 < self.threshold {
            return false;
        }

        let previous = state.concurrency;
        state.concurrency = (previous / 2).max(1);
        state.paused_until = Some(Instant::now() + self.pause);
        state.consecutive_429 = 0;
        state.trips += 1;
        log::warn!(
            "Rate limited {} times in a row. Pausing {:.0}s, concurrency {previous} -> {}",
            self.threshold,
            self.pause.as_secs_f64(),
            state.concurrency
        );
        true
    }

    pub fn record_success(&self) {
        self.lock().consecutive_429 = 0;
    }

    /// Current concurrency limit
    pub fn concurrency(&self) -> usize {
        self.lock().concurrency
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            state: if state.paused_until.is_some() {
                BreakerState::Tripped
            } else {
                BreakerState::Normal
            },
            concurrency: state.concurrency,
            consecutive_429: state.consecutive_429,
            in_flight: state.in_flight,
            trips: state.trips,
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight -= 1;
        self.0.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn breaker(concurrency: usize, pause: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            concurrency,
            threshold: 5,
            pause,
        })
    }

    #[test]
    fn trips_exactly_at_threshold() {
        let b = breaker(4, Duration::from_millis(10));
        for _ in 0..4 {
            assert!(!b.record_rate_limited());
        }
        assert_eq!(b.snapshot().trips, 0);
        assert!(b.record_rate_limited());

        let snap = b.snapshot();
        assert_eq!(snap.state, BreakerState::Tripped);
        assert_eq!(snap.trips, 1);
        assert_eq!(snap.concurrency, 2);
        assert_eq!(snap.consecutive_429, 0);
    }

    #[test]
    fn success_resets_counter() {
        let b = breaker(4, Duration::from_millis(10));
        for _ in 0..4 {
            b.record_rate_limited();
        }
        b.record_success();
        assert_eq!(b.snapshot().consecutive_429, 0);
        for _ in 0..4 {
            assert!(!b.record_rate_limited());
        }
        assert_eq!(b.snapshot().trips, 0);
        assert_eq!(b.concurrency(), 4);
    }

    #[test]
    fn concurrency_floor_is_one() {
        let b = breaker(2, Duration::ZERO);
        for _ in 0..15 {
            b.record_rate_limited();
        }
        let snap = b.snapshot();
        assert_eq!(snap.trips, 3);
        assert_eq!(snap.concurrency, 1);
    }

    #[test]
    fn preflight_waits_out_pause_then_closes() {
        let b = breaker(2, Duration::from_millis(80));
        let token = ShutdownToken::new();
        for _ in 0..5 {
            b.record_rate_limited();
        }

        let start = Instant::now();
        let permit = b.preflight(&token).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert_eq!(b.snapshot().state, BreakerState::Normal);
        drop(permit);
        assert_eq!(b.snapshot().in_flight, 0);
    }

    #[test]
    fn preflight_cancelled_during_pause() {
        let b = breaker(2, Duration::from_secs(60));
        let token = ShutdownToken::new();
        for _ in 0..5 {
            b.record_rate_limited();
        }
        let canceller = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        assert!(matches!(b.preflight(&token), Err(FetchError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn permits_bounded_by_concurrency() {
        let b = Arc::new(breaker(1, Duration::ZERO));
        let token = ShutdownToken::new();
        let permit = b.preflight(&token).unwrap();
        assert_eq!(b.snapshot().in_flight, 1);

        let b2 = b.clone();
        let token2 = token.clone();
        let handle = std::thread::spawn(move || {
            let _p = b2.preflight(&token2).unwrap();
            42
        });

        // Give thread time to block
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(b.snapshot().in_flight, 1);
        drop(permit);

        assert_eq!(handle.join().unwrap(), 42);
        assert_eq!(b.snapshot().in_flight, 0);
    }

    #[test]
    fn trip_shrinks_budget_for_new_permits() {
        let b = breaker(4, Duration::ZERO);
        let token = ShutdownToken::new();
        for _ in 0..5 {
            b.record_rate_limited();
        }
        let _p1 = b.preflight(&token).unwrap();
        let _p2 = b.preflight(&token).unwrap();
        assert_eq!(b.snapshot().in_flight, 2);
        assert_eq!(b.concurrency(), 2);
    }
}
