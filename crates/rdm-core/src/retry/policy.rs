use std::time::Duration;

/// High-level classification of a failed transfer for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or low-speed timeout.
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, refused, etc.).
    Connection,
    /// Retryable server error.
    Http5xx(u16),
    /// Body shorter than announced.
    Partial,
    /// The server will not serve this request as asked; retrying cannot help.
    Rejected,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff with a retry ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed per request before giving up.
    pub max_retries: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 256,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide what to do after the `failures`-th consecutive failure (1-based).
    pub fn decide(&self, failures: u32, kind: ErrorKind) -> RetryDecision {
        if kind == ErrorKind::Rejected || failures > self.max_retries {
            return RetryDecision::NoRetry;
        }
        // base * 2^(failures-1), capped.
        let exp = 1u32 << failures.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}
