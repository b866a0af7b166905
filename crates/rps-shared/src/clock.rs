//! Time source used for report timestamps, freshness checks and replay
//! sweeps, so tests can pin "now".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn now_unix(&self) -> u64;

    /// The low 32 bits of the current unix time, as carried on the wire.
    fn now_wire(&self) -> u32 {
        self.now_unix() as u32
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_unix(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_unix(&self) -> u64 {
        (**self).now_unix()
    }
}

/// Signed distance `a - b` between two wire timestamps, tolerant of the
/// 32-bit wrap.
pub fn wire_delta(a: u32, b: u32) -> i64 {
    i64::from(a.wrapping_sub(b) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advances() {
        let clock = MockClock::new(1_156_727_880);
        assert_eq!(clock.now_unix(), 1_156_727_880);
        clock.advance(121);
        assert_eq!(clock.now_unix(), 1_156_728_001);
    }

    #[test]
    fn test_wire_timestamp_is_low_32_bits() {
        let clock = MockClock::new((1u64 << 32) + 5);
        assert_eq!(clock.now_wire(), 5);
    }

    #[test]
    fn test_wire_delta_across_wrap() {
        assert_eq!(wire_delta(5, u32::MAX - 4), 10);
        assert_eq!(wire_delta(u32::MAX - 4, 5), -10);
        assert_eq!(wire_delta(1000, 880), 120);
    }

    #[test]
    fn test_shared_clock_sees_updates() {
        let clock = Arc::new(MockClock::new(100));
        let shared: Arc<dyn Clock> = clock.clone();
        clock.set(200);
        assert_eq!(shared.now_unix(), 200);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_unix() > 1_577_836_800);
    }
}
