use std::time::Duration;

/// Controls how long the bridge waits before re-opening the serial port
pub trait RetryStrategy: Send {
    /// Reset internal state. Called when the port opens
    fn reset(&mut self);
    /// Return the delay before the next open attempt after one failed
    fn after_failed_open(&mut self) -> Duration;
    /// Return the delay before re-opening a port that failed while in use
    fn after_link_failure(&mut self) -> Duration;
}

/// Return the default [`RetryStrategy`], doubling from 1 second up to 60 seconds
pub fn default_retry_strategy() -> Box<dyn RetryStrategy> {
    doubling_retry_strategy(Duration::from_millis(1000), Duration::from_millis(60000))
}

/// Return a [`RetryStrategy`] that doubles on each failed open up to a maximum value
pub fn doubling_retry_strategy(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
    Doubling::create(min, max)
}

struct Doubling {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Doubling {
    fn create(min: Duration, max: Duration) -> Box<dyn RetryStrategy> {
        Box::new(Doubling {
            min,
            max,
            current: min,
        })
    }
}

impl RetryStrategy for Doubling {
    fn reset(&mut self) {
        self.current = self.min;
    }

    fn after_failed_open(&mut self) -> Duration {
        let ret = self.current;
        self.current = std::cmp::min(2 * self.current, self.max);
        ret
    }

    fn after_link_failure(&mut self) -> Duration {
        self.min
    }
}
