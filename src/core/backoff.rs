//! Bounded exponential backoff
//!
//! The delay starts at `initial`, doubles after every attempt and is capped
//! at `max_delay`. After `max_attempts` attempts the schedule is exhausted.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max_delay: Duration,
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial,
            max_delay,
            max_attempts,
            delay: initial,
            attempts: 0,
        }
    }

    /// Record an attempt and return the delay to wait before the next one,
    /// or `None` once the attempt budget is spent.
    pub fn next(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        let delay = self.delay;
        self.delay = (self.delay * 2).min(self.max_delay);
        Some(delay)
    }

    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Sum of every delay in a full schedule
    pub fn ceiling(&self) -> Duration {
        let mut probe = Self::new(self.initial, self.max_delay, self.max_attempts);
        let mut total = Duration::ZERO;
        while let Some(delay) = probe.next() {
            total += delay;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_doubles_up_to_max() {
        let mut backoff = Backoff::new(ms(250), ms(1000), 5);
        let delays: Vec<Duration> = std::iter::from_fn(|| backoff.next()).collect();
        assert_eq!(delays, vec![ms(250), ms(500), ms(1000), ms(1000), ms(1000)]);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next(), None);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(ms(100), ms(800), 2);
        backoff.next();
        backoff.next();
        assert!(backoff.is_exhausted());
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next(), Some(ms(100)));
    }

    #[test]
    fn test_ceiling() {
        let backoff = Backoff::new(ms(250), ms(4000), 10);
        // 250 + 500 + 1000 + 2000 + 4000 * 6
        assert_eq!(backoff.ceiling(), ms(27_750));
    }

    #[test]
    fn test_zero_attempts_is_exhausted_immediately() {
        let mut backoff = Backoff::new(ms(10), ms(10), 0);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.next(), None);
    }
}
