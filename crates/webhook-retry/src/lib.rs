//! Pure backoff/termination policy for the retry state machine.
//!
//! Nothing here touches the clock, the network, or the database: given an
//! attempt number and a config, the answer is always the same.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }
}

/// `backoff(attempt) = min(initial_delay * 2^(attempt - 1), max_delay)`.
///
/// `attempt` is 1-based: the delay returned is the one consumed *after*
/// attempt `n` before attempt `n + 1` begins.
pub fn backoff(attempt: u32, cfg: &RetryConfig) -> Duration {
    let attempt = attempt.max(1);
    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let scaled = cfg.initial_delay.as_secs_f64() * factor as f64;
    let capped = scaled.min(cfg.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped)
}

/// Whether `attempt` has reached (or passed) the configured ceiling.
pub fn is_terminal(attempt: u32, cfg: &RetryConfig) -> bool {
    attempt >= cfg.max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 5,
        }
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let c = cfg();
        assert_eq!(backoff(1, &c), Duration::from_secs(1));
        assert_eq!(backoff(2, &c), Duration::from_secs(2));
        assert_eq!(backoff(3, &c), Duration::from_secs(4));
        assert_eq!(backoff(4, &c), Duration::from_secs(8));
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let c = cfg();
        assert_eq!(backoff(10, &c), Duration::from_secs(60));
    }

    #[test]
    fn is_terminal_at_and_past_ceiling() {
        let c = cfg();
        assert!(!is_terminal(4, &c));
        assert!(is_terminal(5, &c));
        assert!(is_terminal(6, &c));
    }
}
