use serde::Serialize;

/// Default number of consecutive failures that opens the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// State change caused by recording an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Opened,
    Closed,
}

/// Point-in-time copy of the breaker counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BreakerStatus {
    pub open: bool,
    pub consecutive_failures: u32,
    pub threshold: u32,
}

impl Default for BreakerStatus {
    fn default() -> Self {
        Self {
            open: false,
            consecutive_failures: 0,
            threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Consecutive-failure counter guarding a remote dependency.
///
/// `open` is derived: it holds exactly while the counter is at or above the
/// threshold. Any success resets the counter to zero.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.consecutive_failures >= self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Change the threshold; the counter is kept, so the breaker may open or close.
    pub fn set_threshold(&mut self, threshold: u32) -> Transition {
        let was_open = self.is_open();
        self.threshold = threshold.max(1);
        transition(was_open, self.is_open())
    }

    pub fn record_failure(&mut self) -> Transition {
        let was_open = self.is_open();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        transition(was_open, self.is_open())
    }

    pub fn record_success(&mut self) -> Transition {
        let was_open = self.is_open();
        self.consecutive_failures = 0;
        transition(was_open, self.is_open())
    }

    pub fn status(&self) -> BreakerStatus {
        BreakerStatus {
            open: self.is_open(),
            consecutive_failures: self.consecutive_failures,
            threshold: self.threshold,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

fn transition(was_open: bool, is_open: bool) -> Transition {
    match (was_open, is_open) {
        (false, true) => Transition::Opened,
        (true, false) => Transition::Closed,
        _ => Transition::Unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_at_threshold_and_stays_open() {
        let mut breaker = CircuitBreaker::new(3);
        assert_eq!(breaker.record_failure(), Transition::Unchanged);
        assert_eq!(breaker.record_failure(), Transition::Unchanged);
        assert!(!breaker.is_open());
        assert_eq!(breaker.record_failure(), Transition::Opened);
        assert!(breaker.is_open());
        assert_eq!(breaker.record_failure(), Transition::Unchanged);
        assert!(breaker.is_open());
        assert_eq!(breaker.consecutive_failures(), 4);
    }

    #[test]
    fn single_success_resets() {
        let mut breaker = CircuitBreaker::new(3);
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.record_success(), Transition::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(!breaker.is_open());
        assert_eq!(breaker.record_success(), Transition::Unchanged);
    }

    #[test]
    fn threshold_change_reevaluates() {
        let mut breaker = CircuitBreaker::new(5);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.set_threshold(2), Transition::Opened);
        assert_eq!(breaker.set_threshold(4), Transition::Closed);
        assert_eq!(breaker.status().threshold, 4);
    }

    #[test]
    fn zero_threshold_is_clamped() {
        let breaker = CircuitBreaker::new(0);
        assert_eq!(breaker.threshold(), 1);
        assert!(!breaker.is_open());
    }
}
