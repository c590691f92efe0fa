use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Auto-reconnect behaviour of a subscription.
///
/// Reconnection is opt-in: a stream error is terminal unless
/// `auto_reconnect` is set. Delays grow exponentially from
/// `reconnect_base_delay_ms`, capped at `reconnect_max_delay_ms`, and each
/// wait is scaled by a random factor in `[0.5, 1.0]`.
///
/// # Example
///
/// ```rust
/// use relay_link::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::default()
///     .with_auto_reconnect(true)
///     .with_reconnect_base_delay_ms(500)
///     .with_max_reconnects(10);
/// assert_eq!(policy.nominal_delay(3).as_millis(), 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Re-establish the stream after a stream error
    /// Default: false
    #[serde(default)]
    pub auto_reconnect: bool,

    /// Delay before the first reconnect attempt, in milliseconds
    /// Default: 1000ms
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Upper bound for the nominal delay, in milliseconds
    /// Default: 30000ms
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Consecutive failed attempts allowed before the error becomes terminal.
    /// The counter resets after every successful reconnection.
    /// Default: 5
    #[serde(default = "default_max_reconnects")]
    pub max_reconnects: u32,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30000
}

fn default_max_reconnects() -> u32 {
    5
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnects: default_max_reconnects(),
        }
    }
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_base_delay_ms = delay_ms;
        self
    }

    pub fn with_reconnect_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.reconnect_max_delay_ms = max_delay_ms;
        self
    }

    pub fn with_max_reconnects(mut self, max_reconnects: u32) -> Self {
        self.max_reconnects = max_reconnects;
        self
    }

    /// Whether another attempt may start after `attempts_made` consecutive ones.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.auto_reconnect && attempts_made < self.max_reconnects
    }

    /// `min(base * 2^(attempt-1), max)` for a 1-based attempt number.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let ms = self
            .reconnect_base_delay_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Nominal delay scaled by a random factor in `[0.5, 1.0]`.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal_ms = self.nominal_delay(attempt).as_millis() as u64;
        if nominal_ms == 0 {
            return Duration::ZERO;
        }
        let factor: f64 = rng.random_range(0.5..=1.0);
        let jittered_ms = ((nominal_ms as f64) * factor).ceil() as u64;
        Duration::from_millis(jittered_ms.min(nominal_ms))
    }

    /// [`jittered_delay`](Self::jittered_delay) using the thread-local RNG.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.jittered_delay(attempt, &mut rand::rng())
    }
}
