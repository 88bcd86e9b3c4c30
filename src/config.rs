//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `cloudjobs.toml`, and `CLOUDJOBS_*` environment
//! variables in that order of precedence.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::classify::{RetryableErrorClassifier, RetryableMessageSet};
use crate::lifecycle::Closer;
use crate::retry::{Backoff, PolicyError, RetryPolicy};

/// Application name used for configuration discovery.
pub const APP_NAME: &str = "cloudjobs";

/// Client configuration for job polling, request retries, and shutdown.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CLOUDJOBS",
    discovery(
        app_name = "cloudjobs",
        env_var = "CLOUDJOBS_CONFIG_PATH",
        config_file_name = "cloudjobs.toml",
        dotfile_name = ".cloudjobs.toml",
        project_file_name = "cloudjobs.toml"
    )
)]
pub struct ClientConfig {
    /// Base URL of the provider's job-status endpoint.
    #[ortho_config(default = "http://localhost:8080".to_owned())]
    pub endpoint: String,
    /// API token sent with every request.
    pub auth_token: Option<String>,
    /// Whether authorization failures are retried. Off when unset.
    pub retry_authorization_failures: Option<bool>,
    /// Comma-separated message fragments that mark a failure as retryable.
    pub retryable_messages: Option<String>,
    /// Delay between job status polls, in milliseconds.
    #[ortho_config(default = 1000)]
    pub poll_interval_ms: u64,
    /// Total time allowed for a job to finish, in seconds.
    #[ortho_config(default = 300)]
    pub job_timeout_secs: u64,
    /// Maximum number of status polls per job. Unbounded when unset.
    pub max_poll_attempts: Option<u32>,
    /// Growth factor between polls. Polls use a constant interval when unset.
    pub backoff_multiplier: Option<u32>,
    /// Cap on the delay between polls when backoff is enabled, in
    /// milliseconds.
    #[ortho_config(default = 30_000)]
    pub max_poll_interval_ms: u64,
    /// Whether random jitter is added to poll delays. Off when unset.
    pub poll_jitter: Option<bool>,
    /// Attempts per status request before a transient failure is surfaced.
    #[ortho_config(default = 5)]
    pub request_retries: u32,
    /// Number of jobs waited on concurrently.
    #[ortho_config(default = 8)]
    pub user_threads: u32,
    /// Time allowed for each resource to close at shutdown, in seconds.
    /// Resources are waited on indefinitely when unset.
    pub close_timeout_secs: Option<u64>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to {APP_NAME}.toml",
            self.description, self.env_var, self.toml_key
        ))
    }

    fn invalid(&self, problem: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {problem}: adjust {} or {} in {APP_NAME}.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const ENDPOINT: FieldMetadata =
    FieldMetadata::new("job endpoint", "CLOUDJOBS_ENDPOINT", "endpoint");
const POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "CLOUDJOBS_POLL_INTERVAL_MS",
    "poll_interval_ms",
);
const JOB_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "job timeout",
    "CLOUDJOBS_JOB_TIMEOUT_SECS",
    "job_timeout_secs",
);
const MAX_POLL_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "maximum poll attempts",
    "CLOUDJOBS_MAX_POLL_ATTEMPTS",
    "max_poll_attempts",
);
const BACKOFF_MULTIPLIER: FieldMetadata = FieldMetadata::new(
    "backoff multiplier",
    "CLOUDJOBS_BACKOFF_MULTIPLIER",
    "backoff_multiplier",
);
const REQUEST_RETRIES: FieldMetadata = FieldMetadata::new(
    "request retries",
    "CLOUDJOBS_REQUEST_RETRIES",
    "request_retries",
);
const USER_THREADS: FieldMetadata =
    FieldMetadata::new("worker count", "CLOUDJOBS_USER_THREADS", "user_threads");

impl ClientConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key to adjust.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the endpoint is blank and
    /// [`ConfigError::Invalid`] when a numeric bound is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ENDPOINT.missing());
        }
        if self.poll_interval_ms == 0 {
            return Err(POLL_INTERVAL.invalid("must be greater than zero"));
        }
        if self.job_timeout_secs.saturating_mul(1000) < self.poll_interval_ms {
            return Err(JOB_TIMEOUT.invalid("must cover at least one poll interval"));
        }
        if self.max_poll_attempts == Some(0) {
            return Err(MAX_POLL_ATTEMPTS.invalid("must be at least one"));
        }
        if self.backoff_multiplier == Some(0) {
            return Err(BACKOFF_MULTIPLIER.invalid("must be at least one"));
        }
        if self.request_retries == 0 {
            return Err(REQUEST_RETRIES.invalid("must be at least one"));
        }
        if self.user_threads == 0 {
            return Err(USER_THREADS.invalid("must be greater than zero"));
        }
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn backoff(&self) -> Backoff {
        self.backoff_multiplier
            .map_or(Backoff::Constant, |factor| Backoff::Exponential {
                factor,
                max_interval: Duration::from_millis(self.max_poll_interval_ms)
                    .max(self.poll_interval()),
            })
    }

    /// Builds the policy bounding each job wait.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation or policy construction fails.
    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        self.validate()?;
        Ok(RetryPolicy::builder()
            .poll_interval(self.poll_interval())
            .timeout(Duration::from_secs(self.job_timeout_secs))
            .max_attempts_opt(self.max_poll_attempts)
            .backoff(self.backoff())
            .jitter(self.jitter_enabled())
            .build()?)
    }

    /// Builds the policy bounding retries of a single status request.
    ///
    /// Request retries back off exponentially from the poll interval up to
    /// the configured cap.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation or policy construction fails.
    pub fn request_policy(&self) -> Result<RetryPolicy, ConfigError> {
        self.validate()?;
        Ok(RetryPolicy::builder()
            .poll_interval(self.poll_interval())
            .timeout(Duration::from_secs(self.job_timeout_secs))
            .max_attempts(self.request_retries)
            .backoff(Backoff::Exponential {
                factor: 2,
                max_interval: Duration::from_millis(self.max_poll_interval_ms)
                    .max(self.poll_interval()),
            })
            .jitter(self.jitter_enabled())
            .build()?)
    }

    /// Whether authorization failures are classified as transient.
    #[must_use]
    pub fn retries_authorization_failures(&self) -> bool {
        self.retry_authorization_failures.unwrap_or(false)
    }

    /// Whether poll and request delays carry random jitter.
    #[must_use]
    pub fn jitter_enabled(&self) -> bool {
        self.poll_jitter.unwrap_or(false)
    }

    /// Returns the configured retryable message fragments.
    #[must_use]
    pub fn message_set(&self) -> RetryableMessageSet {
        self.retryable_messages
            .as_deref()
            .map(RetryableMessageSet::parse)
            .unwrap_or_default()
    }

    /// Builds the error classifier.
    #[must_use]
    pub fn classifier(&self) -> RetryableErrorClassifier {
        RetryableErrorClassifier::new(self.message_set(), self.retries_authorization_failures())
    }

    /// Builds a closer honouring the per-resource close timeout.
    #[must_use]
    pub fn closer(&self) -> Closer {
        match self.close_timeout_secs {
            Some(secs) => Closer::new().with_close_timeout(Duration::from_secs(secs)),
            None => Closer::new(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces policy construction failures.
    #[error("invalid retry policy: {0}")]
    Policy(#[from] PolicyError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
