use revelect_core::{ElectionError, ElectionResult};
use std::time::Duration;

/// How the election key and preemption rule are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElectionMode {
    /// One leader per key; the default revision may preempt other revisions
    #[default]
    Prioritized,
    /// One leader per key; first come, first served
    Unprioritized,
    /// One leader per key and revision; no preemption
    PerRevision,
}

/// Configuration for a [`LeaderElection`](crate::LeaderElection)
#[derive(Debug, Clone)]
pub struct ElectionConfig {
    /// Key selection and preemption behaviour
    pub mode: ElectionMode,

    /// Delay before the first restart after a failed cycle
    pub backoff_base: Duration,

    /// Upper bound for the restart delay
    pub backoff_max: Duration,

    /// Random extra fraction of the retry period added between acquisition attempts
    pub jitter_factor: f64,

    /// Buffer size of the election event channel
    pub event_capacity: usize,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            mode: ElectionMode::Prioritized,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(10),
            jitter_factor: 1.2,
            event_capacity: 256,
        }
    }
}

impl ElectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: ElectionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Restart delay after `failures` consecutive failed cycles.
    ///
    /// Doubles from `backoff_base` and saturates at `backoff_max`.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ElectionResult<()> {
        if self.backoff_base.is_zero() {
            return Err(ElectionError::invalid_config(
                "backoff_base must be greater than zero",
            ));
        }
        if self.backoff_max < self.backoff_base {
            return Err(ElectionError::invalid_config(format!(
                "backoff_max ({:?}) must not be less than backoff_base ({:?})",
                self.backoff_max, self.backoff_base
            )));
        }
        if !self.jitter_factor.is_finite() || self.jitter_factor < 0.0 {
            return Err(ElectionError::invalid_config(
                "jitter_factor must be a non-negative number",
            ));
        }
        if self.event_capacity == 0 {
            return Err(ElectionError::invalid_config(
                "event_capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Lease timings used by the [`LeaseCoordinator`](crate::LeaseCoordinator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTimings {
    /// How long a record stays valid after its last renewal
    pub lease_duration: Duration,

    /// How long a leader keeps retrying a failing renewal before stepping down
    pub renew_deadline: Duration,

    /// Interval between acquisition attempts and between renewals
    pub retry_period: Duration,
}

impl LeaseTimings {
    /// Derives timings from a lease TTL: renew deadline TTL/2, retry period TTL/4.
    ///
    /// A leader that cannot renew steps down well before its record expires,
    /// so no contender can take over by expiry while it still runs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use revelect_leader::LeaseTimings;
    /// use std::time::Duration;
    ///
    /// let timings = LeaseTimings::from_ttl(Duration::from_secs(1));
    /// assert_eq!(timings.renew_deadline, Duration::from_millis(500));
    /// assert_eq!(timings.retry_period, Duration::from_millis(250));
    /// ```
    pub fn from_ttl(ttl: Duration) -> Self {
        Self {
            lease_duration: ttl,
            renew_deadline: ttl / 2,
            retry_period: ttl / 4,
        }
    }

    /// Validates `lease_duration > renew_deadline > retry_period > 0`.
    pub fn validate(&self) -> ElectionResult<()> {
        if self.retry_period.is_zero() {
            return Err(ElectionError::invalid_config(
                "retry_period must be greater than zero",
            ));
        }
        if self.renew_deadline <= self.retry_period {
            return Err(ElectionError::invalid_config(format!(
                "renew_deadline ({:?}) must be greater than retry_period ({:?})",
                self.renew_deadline, self.retry_period
            )));
        }
        if self.lease_duration <= self.renew_deadline {
            return Err(ElectionError::invalid_config(format!(
                "lease_duration ({:?}) must be greater than renew_deadline ({:?})",
                self.lease_duration, self.renew_deadline
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_election_config_default() {
        let config = ElectionConfig::default();
        assert_eq!(config.mode, ElectionMode::Prioritized);
        assert_eq!(config.backoff_base, Duration::from_millis(100));
        assert_eq!(config.backoff_max, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let config = ElectionConfig::new()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(config.backoff(0), Duration::ZERO);
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_millis(500));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_election_config_validation() {
        let invalid = ElectionConfig::new().with_backoff(Duration::ZERO, Duration::from_secs(1));
        assert!(invalid.validate().is_err());

        let invalid =
            ElectionConfig::new().with_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert!(invalid.validate().is_err());

        let invalid = ElectionConfig::new().with_jitter_factor(f64::NAN);
        assert!(invalid.validate().is_err());

        let invalid = ElectionConfig::new().with_event_capacity(0);
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_timings_from_ttl() {
        let timings = LeaseTimings::from_ttl(Duration::from_secs(30));
        assert_eq!(timings.lease_duration, Duration::from_secs(30));
        assert_eq!(timings.renew_deadline, Duration::from_secs(15));
        assert_eq!(timings.retry_period, Duration::from_millis(7500));
        assert!(timings.validate().is_ok());
    }

    #[test]
    fn test_timings_validation() {
        let mut timings = LeaseTimings::from_ttl(Duration::from_secs(1));
        timings.renew_deadline = Duration::from_secs(1);
        assert!(timings.validate().is_err());

        let mut timings = LeaseTimings::from_ttl(Duration::from_secs(1));
        timings.retry_period = timings.renew_deadline;
        assert!(timings.validate().is_err());

        // Too short to divide into a non-zero retry period
        let timings = LeaseTimings::from_ttl(Duration::from_nanos(3));
        assert!(timings.validate().is_err());
    }
}
