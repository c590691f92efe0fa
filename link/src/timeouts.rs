//! Timeout configuration for transport control calls.
//!
//! Push delivery itself is never timed out; only the start and stop control
//! calls issued by the subscription core are bounded.

use crate::error::{RelayLinkError, Result};
use std::future::Future;
use std::time::Duration;

/// Timeout configuration for relay-link control calls.
///
/// # Examples
///
/// ```rust
/// use relay_link::RelayLinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = RelayLinkTimeouts::default();
///
/// // Custom timeouts for slow hosts
/// let timeouts = RelayLinkTimeouts::builder()
///     .subscribe_timeout(Duration::from_secs(60))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = RelayLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLinkTimeouts {
    /// Timeout for the start control call of a (re)connection.
    /// A timed-out start counts as a failed start.
    /// Default: 10 seconds
    pub subscribe_timeout: Duration,

    /// Timeout for the best-effort stop control call issued on cleanup.
    /// Default: 5 seconds
    pub unsubscribe_timeout: Duration,
}

impl Default for RelayLinkTimeouts {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(10),
            unsubscribe_timeout: Duration::from_secs(5),
        }
    }
}

impl RelayLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> RelayLinkTimeoutsBuilder {
        RelayLinkTimeoutsBuilder::new()
    }

    /// Short timeouts suitable for in-process or localhost transports.
    pub fn fast() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(2),
            unsubscribe_timeout: Duration::from_secs(1),
        }
    }

    /// Long timeouts for high-latency or unreliable hosts.
    pub fn relaxed() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(30),
            unsubscribe_timeout: Duration::from_secs(15),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Run `fut` bounded by `limit`, unless `limit` means "no timeout".
pub(crate) async fn with_timeout<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if RelayLinkTimeouts::is_no_timeout(limit) {
        return fut.await;
    }
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RelayLinkError::TimeoutError(format!("{} timed out after {:?}", operation, limit)))?
}

/// Builder for creating custom [`RelayLinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct RelayLinkTimeoutsBuilder {
    timeouts: RelayLinkTimeouts,
}

impl RelayLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: RelayLinkTimeouts::default(),
        }
    }

    /// Set the start control call timeout.
    /// Set to 0 to wait indefinitely.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the start control call timeout in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Set the stop control call timeout.
    /// Set to 0 to wait indefinitely.
    pub fn unsubscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.unsubscribe_timeout = timeout;
        self
    }

    /// Set the stop control call timeout in seconds.
    pub fn unsubscribe_timeout_secs(self, secs: u64) -> Self {
        self.unsubscribe_timeout(Duration::from_secs(secs))
    }

    /// Build the timeout configuration.
    pub fn build(self) -> RelayLinkTimeouts {
        self.timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = RelayLinkTimeouts::default();
        assert_eq!(timeouts.subscribe_timeout, Duration::from_secs(10));
        assert_eq!(timeouts.unsubscribe_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let timeouts = RelayLinkTimeouts::builder()
            .subscribe_timeout_secs(60)
            .unsubscribe_timeout(Duration::ZERO)
            .build();

        assert_eq!(timeouts.subscribe_timeout, Duration::from_secs(60));
        assert!(RelayLinkTimeouts::is_no_timeout(timeouts.unsubscribe_timeout));
    }

    #[test]
    fn test_presets() {
        assert!(RelayLinkTimeouts::fast().subscribe_timeout <= Duration::from_secs(5));
        assert!(RelayLinkTimeouts::relaxed().subscribe_timeout >= Duration::from_secs(30));
    }

    #[test]
    fn test_is_no_timeout() {
        assert!(RelayLinkTimeouts::is_no_timeout(Duration::ZERO));
        assert!(!RelayLinkTimeouts::is_no_timeout(Duration::from_secs(1)));
        assert!(!RelayLinkTimeouts::is_no_timeout(Duration::from_secs(3600)));
    }

    #[tokio::test]
    async fn test_with_timeout_reports_operation() {
        let result: Result<()> = with_timeout(Duration::from_millis(10), "subscribe", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        match result {
            Err(RelayLinkError::TimeoutError(msg)) => assert!(msg.starts_with("subscribe timed out")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_zero_waits() {
        let result = with_timeout(Duration::ZERO, "subscribe", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
