use serialmod_core::FramingMode;
use serialmod_datalink::{ASCII_CHAR_TIMEOUT, SerialSettings};
use std::time::Duration;

/// Delay inserted before each retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Backoff {
    /// Retry as soon as the previous attempt failed.
    #[default]
    None,
    Fixed(Duration),
    /// `initial`, doubled on every further retry, never more than `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1 for the first retry).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                initial.checked_mul(factor).unwrap_or(max).min(max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Per-attempt response timeout.
    pub timeout: Duration,
    /// Total attempts per transaction, the first one included.
    pub max_retries: u8,
    /// Silence that ends a frame; `None` derives it from the line settings.
    pub quiet_threshold: Option<Duration>,
    pub framing: FramingMode,
    pub backoff: Backoff,
    /// Pause after a broadcast so slaves can act before the next request.
    pub turnaround_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_retries: 3,
            quiet_threshold: None,
            framing: FramingMode::Rtu,
            backoff: Backoff::None,
            turnaround_delay: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_quiet_threshold(mut self, quiet_threshold: Option<Duration>) -> Self {
        self.quiet_threshold = quiet_threshold;
        self
    }

    pub fn with_framing(mut self, framing: FramingMode) -> Self {
        self.framing = framing;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_turnaround_delay(mut self, turnaround_delay: Duration) -> Self {
        self.turnaround_delay = turnaround_delay;
        self
    }

    /// Merges per-request overrides with this config and the line settings.
    pub fn resolve(&self, options: &RequestOptions, settings: &SerialSettings) -> RetryPolicy {
        let quiet_threshold = options
            .quiet_threshold
            .or(self.quiet_threshold)
            .unwrap_or_else(|| match self.framing {
                FramingMode::Rtu => settings.silent_interval(),
                FramingMode::Ascii => ASCII_CHAR_TIMEOUT,
            });
        RetryPolicy {
            timeout: options.timeout.unwrap_or(self.timeout),
            attempts: options.max_retries.unwrap_or(self.max_retries).max(1),
            quiet_threshold,
            framing: self.framing,
            backoff: self.backoff,
            turnaround_delay: self.turnaround_delay,
        }
    }
}

/// Per-request overrides; unset fields fall back to [`ClientConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u8>,
    pub quiet_threshold: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_quiet_threshold(mut self, quiet_threshold: Duration) -> Self {
        self.quiet_threshold = Some(quiet_threshold);
        self
    }
}

/// Everything a transaction needs to know about timing and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// At least 1.
    pub attempts: u8,
    pub quiet_threshold: Duration,
    pub framing: FramingMode,
    pub backoff: Backoff,
    pub turnaround_delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::{Backoff, ClientConfig, RequestOptions};
    use serialmod_core::FramingMode;
    use serialmod_datalink::SerialSettings;
    use std::time::Duration;

    #[test]
    fn options_override_config() {
        let config = ClientConfig::default().with_timeout(Duration::from_millis(300));
        let settings = SerialSettings::new("COM1");

        let policy = config.resolve(&RequestOptions::default(), &settings);
        assert_eq!(policy.timeout, Duration::from_millis(300));
        assert_eq!(policy.attempts, 3);
        assert_eq!(policy.quiet_threshold, settings.silent_interval());

        let options = RequestOptions::default()
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(5)
            .with_quiet_threshold(Duration::from_millis(2));
        let policy = config.resolve(&options, &settings);
        assert_eq!(policy.timeout, Duration::from_millis(50));
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.quiet_threshold, Duration::from_millis(2));
    }

    #[test]
    fn zero_retries_still_makes_one_attempt() {
        let config = ClientConfig::default().with_max_retries(0);
        let policy = config.resolve(&RequestOptions::default(), &SerialSettings::new("COM1"));
        assert_eq!(policy.attempts, 1);
    }

    #[test]
    fn ascii_quiet_threshold_defaults_to_char_timeout() {
        let config = ClientConfig::default().with_framing(FramingMode::Ascii);
        let policy = config.resolve(&RequestOptions::default(), &SerialSettings::new("COM1"));
        assert_eq!(policy.quiet_threshold, Duration::from_secs(1));
    }

    #[test]
    fn backoff_delays() {
        assert_eq!(Backoff::None.delay(1), Duration::ZERO);
        let fixed = Backoff::Fixed(Duration::from_millis(20));
        assert_eq!(fixed.delay(3), Duration::from_millis(20));

        let exponential = Backoff::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        };
        assert_eq!(exponential.delay(1), Duration::from_millis(10));
        assert_eq!(exponential.delay(2), Duration::from_millis(20));
        assert_eq!(exponential.delay(3), Duration::from_millis(40));
        assert_eq!(exponential.delay(4), Duration::from_millis(50));
        assert_eq!(exponential.delay(40), Duration::from_millis(50));
    }
}
