//! Validated configuration value types

use std::str::FromStr;
use std::time::Duration;

/// Number of concurrent sync workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadCount(usize);

impl ThreadCount {
    /// Minimum thread count
    pub const MIN: usize = 1;
    /// Maximum thread count
    pub const MAX: usize = 256;
    /// Keyword selecting one worker per CPU
    pub const AUTO: &'static str = "auto";

    /// Create a new thread count with validation
    pub fn new(count: usize) -> Result<Self, String> {
        if count < Self::MIN {
            Err(format!("Thread count {} is below minimum {}", count, Self::MIN))
        } else if count > Self::MAX {
            Err(format!("Thread count {} exceeds maximum {}", count, Self::MAX))
        } else {
            Ok(Self(count))
        }
    }

    /// Get the thread count value
    pub fn get(self) -> usize {
        self.0
    }

    /// One worker per logical CPU
    pub fn optimal() -> Self {
        Self(num_cpus::get().clamp(Self::MIN, Self::MAX))
    }
}

impl Default for ThreadCount {
    fn default() -> Self {
        Self(1)
    }
}

impl FromStr for ThreadCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::AUTO) {
            return Ok(Self::optimal());
        }
        let count: usize = s
            .parse()
            .map_err(|_| format!("'{}' is neither an integer nor '{}'", s, Self::AUTO))?;
        Self::new(count)
    }
}

/// Number of identifiers read and written together
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchSize(usize);

impl BatchSize {
    /// Minimum batch size
    pub const MIN: usize = 1;
    /// Maximum batch size
    pub const MAX: usize = 10_000;

    /// Create a new batch size with validation
    pub fn new(size: usize) -> Result<Self, String> {
        if size < Self::MIN {
            Err(format!("Batch size {} is below minimum {}", size, Self::MIN))
        } else if size > Self::MAX {
            Err(format!("Batch size {} exceeds maximum {}", size, Self::MAX))
        } else {
            Ok(Self(size))
        }
    }

    /// Get the batch size value
    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(1)
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Result<Self, String> {
        if backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".to_string());
        }
        if initial_delay > max_delay {
            return Err("Initial delay cannot be greater than max delay".to_string());
        }
        Ok(Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        })
    }

    /// Exponential backoff starting at `delay`, doubling up to 30 seconds or `delay`, whichever is larger
    pub fn exponential(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay: delay,
            max_delay: delay.max(Duration::from_secs(30)),
            backoff_multiplier: 2.0,
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self::exponential(0, Duration::ZERO)
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Calculate the delay before retry number `attempt` (zero based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(64) as i32);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", 1)]
    #[case(" 8 ", 8)]
    #[case("256", 256)]
    fn test_thread_count_parse(#[case] input: &str, #[case] expected: usize) {
        assert_eq!(input.parse::<ThreadCount>().unwrap().get(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("257")]
    #[case("-1")]
    #[case("many")]
    fn test_thread_count_rejects(#[case] input: &str) {
        assert!(input.parse::<ThreadCount>().is_err());
    }

    #[test]
    fn test_thread_count_auto() {
        let count: ThreadCount = "AUTO".parse().unwrap();
        assert!(count.get() >= ThreadCount::MIN);
        assert_eq!(count, ThreadCount::optimal());
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(BatchSize::new(0).is_err());
        assert!(BatchSize::new(BatchSize::MAX + 1).is_err());
        assert_eq!(BatchSize::new(50).unwrap().get(), 50);
        assert_eq!(BatchSize::default().get(), 1);
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_validation() {
        assert!(RetryConfig::new(1, Duration::from_secs(2), Duration::from_secs(1), 2.0).is_err());
        assert!(RetryConfig::new(1, Duration::ZERO, Duration::ZERO, 0.5).is_err());
        assert_eq!(RetryConfig::none().max_attempts(), 1);
    }
}
