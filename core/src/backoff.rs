//! Retry backoff schedule for failed delivery attempts.
//!
//! Both workers reschedule a failed row at `now + backoff_delay(attempts)`,
//! doubling the delay per attempt and capping the exponent so a long-failing
//! row settles at roughly 17-minute intervals until its attempts run out.

use chrono::Duration;

/// Largest exponent the schedule will use: caps the delay at `2^10` seconds.
const MAX_EXPONENT: i32 = 10;

/// Delay before the next attempt after `attempt_count` recorded attempts:
/// `2^min(attempt_count, 10)` seconds.
///
/// Attempt counts below zero are treated as zero.
#[must_use]
pub fn backoff_delay(attempt_count: i32) -> Duration {
    let exponent = attempt_count.clamp(0, MAX_EXPONENT);
    Duration::seconds(1_i64 << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::seconds(2));
        assert_eq!(backoff_delay(2), Duration::seconds(4));
        assert_eq!(backoff_delay(3), Duration::seconds(8));
        assert_eq!(backoff_delay(4), Duration::seconds(16));
    }

    #[test]
    fn caps_at_two_to_the_tenth() {
        assert_eq!(backoff_delay(10), Duration::seconds(1024));
        assert_eq!(backoff_delay(11), Duration::seconds(1024));
        assert_eq!(backoff_delay(1000), Duration::seconds(1024));
    }

    #[test]
    fn tolerates_degenerate_attempt_counts() {
        assert_eq!(backoff_delay(0), Duration::seconds(1));
        assert_eq!(backoff_delay(-3), Duration::seconds(1));
    }

    #[test]
    fn monotonically_non_decreasing() {
        let mut last = Duration::zero();
        for attempt in 0..20 {
            let delay = backoff_delay(attempt);
            assert!(delay >= last, "delay shrank at attempt {attempt}");
            last = delay;
        }
    }

    proptest! {
        #[test]
        fn delay_stays_within_schedule_bounds(attempt in any::<i32>()) {
            let delay = backoff_delay(attempt);
            prop_assert!(delay >= Duration::seconds(1));
            prop_assert!(delay <= Duration::seconds(1024));
        }
    }
}
