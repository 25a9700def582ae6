#![forbid(unsafe_code)]

//! Bounded exponential backoff for bootstrapping lookups.
//!
//! Native navigation may register a screen's container some time after the
//! first render. Callers that need a view before it exists poll with
//! [`poll_until`] rather than blocking the reconciler; the reconciler itself
//! never waits.
//!
//! The delay sequence starts at `initial_delay`, grows by `multiplier`, is
//! capped at `max_delay`, and yields `max_attempts - 1` delays (one fewer than
//! attempts: no sleep after the last check).

use std::time::Duration;

use crate::config::BackoffConfig;

/// Iterator over backoff delays.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    next: Duration,
    multiplier: f64,
    max_delay: Duration,
    remaining: u32,
}

impl ExponentialBackoff {
    /// Delays described by `config`.
    #[must_use]
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            multiplier: config.multiplier.max(1.0),
            max_delay: config.max_delay,
            remaining: config.max_attempts.saturating_sub(1),
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        let grown = current.as_secs_f64() * self.multiplier;
        self.next = if grown.is_finite() && grown < self.max_delay.as_secs_f64() {
            Duration::from_secs_f64(grown)
        } else {
            self.max_delay
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

/// Run `check` until it returns `true` or the backoff is exhausted.
///
/// `sleep` is called with each delay between attempts; pass
/// `std::thread::sleep` in production and a recorder in tests. Returns
/// whether `check` ever succeeded.
pub fn poll_until(
    backoff: ExponentialBackoff,
    mut sleep: impl FnMut(Duration),
    mut check: impl FnMut() -> bool,
) -> bool {
    if check() {
        return true;
    }
    for (attempt, delay) in backoff.enumerate() {
        tracing::trace!(attempt = attempt + 1, ?delay, "backing off");
        sleep(delay);
        if check() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cfg(initial: u64, multiplier: f64, max: u64, attempts: u32) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(initial),
            multiplier,
            max_delay: Duration::from_millis(max),
            max_attempts: attempts,
        }
    }

    #[test]
    fn delays_grow_and_cap() {
        let delays: Vec<u128> = ExponentialBackoff::new(&cfg(10, 2.0, 50, 6))
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        assert_eq!(ExponentialBackoff::new(&cfg(10, 2.0, 50, 1)).count(), 0);
        assert_eq!(ExponentialBackoff::new(&cfg(10, 2.0, 50, 0)).count(), 0);
    }

    #[test]
    fn poll_stops_on_success() {
        let mut slept = Vec::new();
        let mut calls = 0;
        let ok = poll_until(
            ExponentialBackoff::new(&cfg(1, 2.0, 8, 10)),
            |d| slept.push(d),
            || {
                calls += 1;
                calls == 3
            },
        );
        assert!(ok);
        assert_eq!(calls, 3);
        assert_eq!(slept, vec![Duration::from_millis(1), Duration::from_millis(2)]);
    }

    #[test]
    fn poll_gives_up() {
        let mut calls = 0;
        let ok = poll_until(ExponentialBackoff::new(&cfg(1, 1.0, 1, 4)), |_| {}, || {
            calls += 1;
            false
        });
        assert!(!ok);
        assert_eq!(calls, 4);
    }

    proptest! {
        #[test]
        fn delays_are_monotone_and_capped(
            initial in 0u64..500,
            multiplier in 1.0f64..4.0,
            max in 0u64..2_000,
            attempts in 0u32..12,
        ) {
            let config = cfg(initial, multiplier, max, attempts);
            let delays: Vec<Duration> = ExponentialBackoff::new(&config).collect();
            prop_assert_eq!(delays.len(), attempts.saturating_sub(1) as usize);
            prop_assert!(delays.iter().all(|d| *d <= config.max_delay));
            prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
