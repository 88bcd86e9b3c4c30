//! Immutable polling and retry bounds.
//!
//! A [`RetryPolicy`] is built once through [`RetryPolicyBuilder`] and is
//! read-only afterwards, so one policy can be shared by any number of
//! concurrent poll loops.

use std::num::NonZeroU32;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// Interval used when no poll interval is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Total bound used when no timeout is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound applied to exponential backoff when none is configured.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Growth of the delay between consecutive evaluations.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backoff {
    /// Every evaluation is separated by the poll interval.
    #[default]
    Constant,
    /// The delay is multiplied by `factor` after each evaluation and capped at
    /// `max_interval`.
    Exponential {
        /// Integer growth factor applied per attempt.
        factor: u32,
        /// Largest delay ever slept between two evaluations.
        max_interval: Duration,
    },
}

/// Errors raised when a policy violates its construction invariants.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PolicyError {
    /// Raised when the poll interval is zero, which would busy-spin.
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
    /// Raised when `max_attempts` is zero.
    #[error("max attempts must be at least one")]
    ZeroAttempts,
    /// Raised when the timeout cannot fit a single poll interval.
    #[error("timeout {timeout:?} is shorter than the poll interval {interval:?}")]
    TimeoutShorterThanInterval {
        /// Configured total timeout.
        timeout: Duration,
        /// Configured poll interval.
        interval: Duration,
    },
    /// Raised when exponential backoff parameters are unusable.
    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),
}

/// Bounds for a poll or retry loop.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: Option<NonZeroU32>,
    poll_interval: Duration,
    timeout: Duration,
    backoff: Backoff,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            backoff: Backoff::Constant,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Starts a builder seeded with the default bounds.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Maximum number of evaluations, or `None` when only the timeout bounds
    /// the loop.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts.map(NonZeroU32::get)
    }

    /// Base delay between evaluations.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Total time budget for the loop.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Configured backoff strategy.
    #[must_use]
    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Whether random jitter is added on top of each delay.
    #[must_use]
    pub const fn jitter(&self) -> bool {
        self.jitter
    }

    /// Returns `true` when another evaluation may follow `attempts_made`
    /// completed ones.
    #[must_use]
    pub fn allows_attempt_after(&self, attempts_made: u32) -> bool {
        self.max_attempts
            .is_none_or(|limit| attempts_made < limit.get())
    }

    /// Delay to sleep after the `attempt`-th evaluation (1-indexed).
    ///
    /// The result is never shorter than the poll interval; jitter only ever
    /// adds up to a quarter of the base delay.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Constant => self.poll_interval,
            Backoff::Exponential {
                factor,
                max_interval,
            } => {
                let scale = factor.saturating_pow(attempt.saturating_sub(1));
                self.poll_interval.saturating_mul(scale).min(max_interval)
            }
        };

        if self.jitter {
            with_jitter(base)
        } else {
            base
        }
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    let spread = millis >> 2;
    if spread == 0 {
        return delay;
    }
    let extra = rand::rng().random_range(0..=spread);
    delay.saturating_add(Duration::from_millis(extra))
}

/// Builder for [`RetryPolicy`] that validates the invariants on
/// [`RetryPolicyBuilder::build`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    poll_interval: Option<Duration>,
    timeout: Option<Duration>,
    backoff: Backoff,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Caps the number of evaluations.
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets or clears the attempt cap.
    #[must_use]
    pub const fn max_attempts_opt(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay between evaluations.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the total time budget.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enables or disables jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Validates the bounds and produces an immutable policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when the interval is zero, the attempt cap is
    /// zero, the timeout is shorter than one interval, or the backoff factor
    /// or cap is unusable.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let poll_interval = self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);

        if poll_interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if timeout < poll_interval {
            return Err(PolicyError::TimeoutShorterThanInterval {
                timeout,
                interval: poll_interval,
            });
        }
        let max_attempts = match self.max_attempts {
            None => None,
            Some(attempts) => Some(NonZeroU32::new(attempts).ok_or(PolicyError::ZeroAttempts)?),
        };
        if let Backoff::Exponential {
            factor,
            max_interval,
        } = self.backoff
        {
            if factor == 0 {
                return Err(PolicyError::InvalidBackoff(String::from(
                    "factor must be at least one",
                )));
            }
            if max_interval < poll_interval {
                return Err(PolicyError::InvalidBackoff(format!(
                    "cap {max_interval:?} is shorter than the poll interval {poll_interval:?}"
                )));
            }
        }

        Ok(RetryPolicy {
            max_attempts,
            poll_interval,
            timeout,
            backoff: self.backoff,
            jitter: self.jitter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn default_policy_is_unbounded_constant() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), None);
        assert_eq!(policy.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert_eq!(policy.timeout(), DEFAULT_TIMEOUT);
        assert!(policy.allows_attempt_after(u32::MAX - 1));
    }

    #[rstest]
    #[case(RetryPolicy::builder().poll_interval(Duration::ZERO), PolicyError::ZeroInterval)]
    #[case(RetryPolicy::builder().max_attempts(0), PolicyError::ZeroAttempts)]
    #[case(
        RetryPolicy::builder()
            .poll_interval(Duration::from_secs(10))
            .timeout(Duration::from_secs(5)),
        PolicyError::TimeoutShorterThanInterval {
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(10),
        }
    )]
    fn builder_rejects_invalid_bounds(
        #[case] builder: RetryPolicyBuilder,
        #[case] expected: PolicyError,
    ) {
        let err = builder.build().expect_err("policy should be rejected");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn builder_rejects_backoff_cap_below_interval() {
        let err = RetryPolicy::builder()
            .poll_interval(Duration::from_secs(2))
            .backoff(Backoff::Exponential {
                factor: 2,
                max_interval: Duration::from_secs(1),
            })
            .build()
            .expect_err("cap below interval should be rejected");
        assert!(matches!(err, PolicyError::InvalidBackoff(_)), "got {err:?}");
    }

    #[rstest]
    fn timeout_equal_to_interval_is_accepted() {
        let policy = RetryPolicy::builder()
            .poll_interval(Duration::from_secs(5))
            .timeout(Duration::from_secs(5))
            .build()
            .expect("timeout equal to interval is valid");
        assert_eq!(policy.timeout(), policy.poll_interval());
    }

    #[rstest]
    fn attempt_cap_limits_follow_up_evaluations() {
        let policy = RetryPolicy::builder()
            .max_attempts(3)
            .build()
            .expect("valid policy");
        assert!(policy.allows_attempt_after(1));
        assert!(policy.allows_attempt_after(2));
        assert!(!policy.allows_attempt_after(3));
    }

    #[rstest]
    fn exponential_backoff_grows_until_capped() {
        let policy = RetryPolicy::builder()
            .poll_interval(Duration::from_millis(100))
            .backoff(Backoff::Exponential {
                factor: 2,
                max_interval: Duration::from_millis(500),
            })
            .build()
            .expect("valid policy");

        let delays: Vec<_> = (1..=5).map(|attempt| policy.delay_after(attempt)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
                Duration::from_millis(500),
            ]
        );
    }

    #[rstest]
    fn jitter_never_shortens_the_interval() {
        let policy = RetryPolicy::builder()
            .poll_interval(Duration::from_millis(400))
            .jitter(true)
            .build()
            .expect("valid policy");

        for attempt in 1..=50 {
            let delay = policy.delay_after(attempt);
            assert!(delay >= Duration::from_millis(400), "delay {delay:?}");
            assert!(delay <= Duration::from_millis(500), "delay {delay:?}");
        }
    }
}
