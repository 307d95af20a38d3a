//! Reconnect retry policies
//!
//! The connection driver consults the configured policy before every
//! reconnect attempt. Policies see a read-only snapshot of the retry
//! metadata; a policy may sleep to implement backoff, so the driver
//! always runs it off its own task.

use std::time::{Duration, Instant};

/// Read-only record of connection attempts
///
/// `attempts` counts failed tries within the current sequence (one
/// `open()` call or one reconnect episode) and resets when a new
/// sequence starts. `opened` stays true once any open has succeeded.
#[derive(Debug, Clone)]
pub struct RetryMetadata {
    attempts: u32,
    opened: bool,
    created: Instant,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
}

impl RetryMetadata {
    pub(crate) fn new() -> Self {
        Self {
            attempts: 0,
            opened: false,
            created: Instant::now(),
            last_failure: None,
            last_success: None,
        }
    }

    /// Start a fresh attempt sequence
    pub(crate) fn begin_sequence(&mut self) {
        self.attempts = 0;
    }

    pub(crate) fn record_failure(&mut self) {
        self.attempts += 1;
        self.last_failure = Some(Instant::now());
    }

    pub(crate) fn record_success(&mut self) {
        self.opened = true;
        self.last_success = Some(Instant::now());
    }

    /// Failed tries in the current sequence
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the connection has ever opened successfully
    pub fn opened(&self) -> bool {
        self.opened
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }
}

impl Default for RetryMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides whether the driver makes another reconnect attempt
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, metadata: &RetryMetadata) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryMetadata) -> bool + Send + Sync,
{
    fn should_retry(&self, metadata: &RetryMetadata) -> bool {
        self(metadata)
    }
}

/// Default policy: one reconnect attempt, and only for a connection
/// that had previously opened successfully
#[derive(Debug, Clone, Copy, Default)]
pub struct OneReconnectAttempt;

impl RetryPolicy for OneReconnectAttempt {
    fn should_retry(&self, metadata: &RetryMetadata) -> bool {
        metadata.opened() && metadata.attempts() == 0
    }
}

/// Bounded attempts with a fixed sleep between them
///
/// The sleep happens inside `should_retry`; the driver runs policies
/// on a blocking task so this never stalls the reader.
#[derive(Debug, Clone, Copy)]
pub struct BackoffRetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl BackoffRetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl RetryPolicy for BackoffRetryPolicy {
    fn should_retry(&self, metadata: &RetryMetadata) -> bool {
        if !metadata.opened() || metadata.attempts() >= self.max_attempts {
            return false;
        }
        if metadata.attempts() > 0 {
            std::thread::sleep(self.backoff);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_attempt_requires_previous_open() {
        let policy = OneReconnectAttempt;
        let mut metadata = RetryMetadata::new();
        // Never opened: no retry at all
        assert!(!policy.should_retry(&metadata));

        metadata.record_success();
        metadata.begin_sequence();
        assert!(policy.should_retry(&metadata));

        metadata.record_failure();
        assert!(!policy.should_retry(&metadata));
    }

    #[test]
    fn test_backoff_attempt_bound() {
        let policy = BackoffRetryPolicy::new(2, Duration::from_millis(1));
        let mut metadata = RetryMetadata::new();
        metadata.record_success();
        metadata.begin_sequence();

        assert!(policy.should_retry(&metadata));
        metadata.record_failure();
        assert!(policy.should_retry(&metadata));
        metadata.record_failure();
        assert!(!policy.should_retry(&metadata));
    }

    #[test]
    fn test_closure_policy() {
        let policy = |metadata: &RetryMetadata| metadata.attempts() < 5;
        let metadata = RetryMetadata::new();
        assert!(policy.should_retry(&metadata));
    }

    #[test]
    fn test_sequence_reset() {
        let mut metadata = RetryMetadata::new();
        metadata.record_failure();
        metadata.record_failure();
        assert_eq!(metadata.attempts(), 2);
        metadata.begin_sequence();
        assert_eq!(metadata.attempts(), 0);
        assert!(metadata.last_failure().is_some());
    }
}
