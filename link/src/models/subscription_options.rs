use tokio_util::sync::CancellationToken;

use super::reconnect_policy::ReconnectPolicy;
use super::resume_marker::ResumeMarker;

/// Per-subscription options.
///
/// # Example
///
/// ```rust
/// use relay_link::SubscriptionOptions;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = SubscriptionOptions::new()
///     .with_resume_marker("evt-41")
///     .with_cancellation_token(token.clone())
///     .with_auto_reconnect(true)
///     .with_max_reconnects(3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    /// Start the stream after this position
    pub resume_marker: Option<ResumeMarker>,

    /// Terminates the subscription when cancelled
    pub cancellation_token: Option<CancellationToken>,

    /// Auto-reconnect settings
    pub reconnect: ReconnectPolicy,
}

impl SubscriptionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume_marker(mut self, marker: impl Into<ResumeMarker>) -> Self {
        self.resume_marker = Some(marker.into());
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect.reconnect_base_delay_ms = delay_ms;
        self
    }

    pub fn with_reconnect_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.reconnect.reconnect_max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.reconnect.max_reconnects = max_reconnects;
        self
    }
}
