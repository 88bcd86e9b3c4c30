//! Asynchronous provider jobs.
//!
//! Cloud providers answer long-running requests with a job identifier. The
//! types here model the job as the provider reports it ([`JobRecord`]), the
//! state it maps to ([`JobState`]), and the machinery that polls it to a
//! terminal state ([`JobCompletion`]) and unwraps the outcome
//! ([`AsyncOperation`]).

mod completion;
mod http;
mod mapping;
mod operation;
mod source;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use completion::JobCompletion;
pub use http::{AUTH_TOKEN_HEADER, HttpJobSource, HttpSourceError};
pub use mapping::{
    CLOUDSTACK_RESULT_FAIL, CLOUDSTACK_RESULT_SUCCESS, CloudStackStatusMapper, GoGridStatusMapper,
    MapperKind, ProgressStatusMapper, StatusMapper, check_job,
};
pub use operation::AsyncOperation;
pub use source::{JobSource, SourceFuture};

/// Opaque provider job identifier.
///
/// Providers use either strings or integers; both are held in their decimal
/// or textual form so they compare and print uniformly.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Deserialize, Serialize)]
#[serde(from = "RawJobId", into = "String")]
pub struct JobId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawJobId {
    Number(u64),
    Text(String),
}

impl From<RawJobId> for JobId {
    fn from(raw: RawJobId) -> Self {
        match raw {
            RawJobId::Number(number) => Self(number.to_string()),
            RawJobId::Text(text) => Self(text),
        }
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(String::from(id))
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl JobId {
    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse job status.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Accepted but not started.
    Pending,
    /// Running.
    InProgress,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// The provider reported a status no mapper rule recognises.
    Unknown,
}

impl JobStatus {
    /// Whether polling stops at this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Stable uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider supplied description of a job failure.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct ErrorDetail {
    /// Provider error code, when one is reported.
    #[serde(default, alias = "errorcode", alias = "errorCode")]
    pub code: Option<i64>,
    /// Human readable error text.
    #[serde(default, alias = "errortext", alias = "errorText")]
    pub message: String,
}

impl ErrorDetail {
    /// Creates an error detail.
    #[must_use]
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Mapped job state.
///
/// Terminal states own their outcome, so a failed job can never also carry a
/// result and a succeeded job can never carry an error.
#[derive(Clone, Debug, PartialEq)]
pub enum JobState<T> {
    /// Accepted but not started.
    Pending,
    /// Running, with a completion percentage when the provider reports one.
    InProgress {
        /// Percentage complete.
        progress: Option<u8>,
    },
    /// Finished successfully. Operations without output carry `None`.
    Succeeded(Option<T>),
    /// Finished with the provider's error detail.
    Failed(ErrorDetail),
    /// Status text or code that no rule recognises.
    Unknown(String),
}

impl<T> JobState<T> {
    /// Returns the coarse status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::InProgress { .. } => JobStatus::InProgress,
            Self::Succeeded(_) => JobStatus::Succeeded,
            Self::Failed(_) => JobStatus::Failed,
            Self::Unknown(_) => JobStatus::Unknown,
        }
    }

    /// Whether polling stops at this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Provider status code or name as found on the wire.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawStatus {
    /// Numeric status, as used by CloudStack.
    Code(i64),
    /// Textual status, as used by GoGrid.
    Name(String),
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Job as returned by a provider's job-status endpoint.
///
/// Field names accept the common provider spellings. No field other than
/// the identifier is mandatory; mappers decide which combinations are
/// consistent.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord<T> {
    /// Job identifier.
    #[serde(alias = "jobid", alias = "jobId")]
    pub id: JobId,
    /// Provider status code or name.
    #[serde(alias = "jobstatus", alias = "state")]
    pub status: Option<RawStatus>,
    /// Percentage complete.
    #[serde(alias = "jobprocstatus")]
    pub progress: Option<i64>,
    /// Provider result code.
    #[serde(alias = "jobresultcode")]
    pub result_code: Option<i64>,
    /// Typed result payload.
    #[serde(alias = "jobresult")]
    pub result: Option<T>,
    /// Error detail for failed jobs.
    pub error: Option<ErrorDetail>,
    /// Command that created the job.
    #[serde(alias = "cmd")]
    pub command: Option<String>,
}

impl<T> JobRecord<T> {
    /// Creates a record carrying only an identifier.
    #[must_use]
    pub fn new(id: impl Into<JobId>) -> Self {
        Self {
            id: id.into(),
            status: None,
            progress: None,
            result_code: None,
            result: None,
            error: None,
            command: None,
        }
    }

    /// Sets a numeric status.
    #[must_use]
    pub fn with_status_code(mut self, code: i64) -> Self {
        self.status = Some(RawStatus::Code(code));
        self
    }

    /// Sets a textual status.
    #[must_use]
    pub fn with_status_name(mut self, name: impl Into<String>) -> Self {
        self.status = Some(RawStatus::Name(name.into()));
        self
    }

    /// Sets the progress percentage.
    #[must_use]
    pub fn with_progress(mut self, progress: i64) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Sets the provider result code.
    #[must_use]
    pub fn with_result_code(mut self, code: i64) -> Self {
        self.result_code = Some(code);
        self
    }

    /// Sets the result payload.
    #[must_use]
    pub fn with_result(mut self, result: T) -> Self {
        self.result = Some(result);
        self
    }

    /// Sets the error detail.
    #[must_use]
    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = Some(error);
        self
    }

    /// Sets the originating command.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Job state observed by one poll.
#[derive(Clone, Debug, PartialEq)]
pub struct JobSnapshot<T> {
    /// Job identifier.
    pub id: JobId,
    /// Mapped state.
    pub state: JobState<T>,
}

impl<T> JobSnapshot<T> {
    /// Returns the coarse status.
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Whether polling stops at this snapshot.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A provider record whose fields contradict each other.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("job {job_id} is inconsistent: {reason}")]
pub struct InconsistentJob {
    /// Job identifier.
    pub job_id: JobId,
    /// Contradiction found.
    pub reason: String,
}

impl InconsistentJob {
    /// Creates a consistency violation for `job_id`.
    #[must_use]
    pub fn new(job_id: JobId, reason: impl Into<String>) -> Self {
        Self {
            job_id,
            reason: reason.into(),
        }
    }
}

/// Errors produced while waiting for a job.
#[derive(Debug, Error)]
pub enum JobError<E>
where
    E: std::error::Error + 'static,
{
    /// Polling exhausted its bounds before the job reached a terminal state.
    #[error("job {job_id} did not finish after {attempts} polls in {elapsed:?}")]
    Timeout {
        /// Job identifier.
        job_id: JobId,
        /// Polls performed.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
    /// The job finished with an error.
    #[error("job {job_id} failed: {detail}")]
    Failed {
        /// Job identifier.
        job_id: JobId,
        /// Provider error detail.
        detail: ErrorDetail,
    },
    /// The provider reported a contradictory job.
    #[error("job {job_id} is inconsistent: {reason}")]
    Inconsistent {
        /// Job identifier.
        job_id: JobId,
        /// Contradiction found.
        reason: String,
    },
    /// The job status could not be fetched.
    #[error("failed to fetch job status: {0}")]
    Source(#[source] E),
}

impl<E> From<InconsistentJob> for JobError<E>
where
    E: std::error::Error + 'static,
{
    fn from(err: InconsistentJob) -> Self {
        Self::Inconsistent {
            job_id: err.job_id,
            reason: err.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"jobid": 42}"#, "42")]
    #[case(r#"{"id": "job-7"}"#, "job-7")]
    #[case(r#"{"jobId": "abc"}"#, "abc")]
    fn identifiers_accept_numbers_and_strings(#[case] json: &str, #[case] expected: &str) {
        let record: JobRecord<serde_json::Value> =
            serde_json::from_str(json).expect("record should decode");
        assert_eq!(record.id.as_str(), expected);
        assert!(record.status.is_none());
        assert!(record.result.is_none());
    }

    #[rstest]
    fn cloudstack_fields_decode_through_aliases() {
        let json = r#"{
            "jobid": 11,
            "jobstatus": 2,
            "jobprocstatus": 0,
            "jobresultcode": 530,
            "cmd": "deployVirtualMachine",
            "jobresult": {"stale": true},
            "error": {"errorcode": 431, "errortext": "quota exceeded"}
        }"#;
        let record: JobRecord<serde_json::Value> =
            serde_json::from_str(json).expect("record should decode");

        assert_eq!(record.status, Some(RawStatus::Code(2)));
        assert_eq!(record.result_code, Some(530));
        assert_eq!(record.command.as_deref(), Some("deployVirtualMachine"));
        assert_eq!(
            record.error,
            Some(ErrorDetail::new(Some(431), "quota exceeded"))
        );
    }

    #[rstest]
    fn gogrid_state_names_decode_as_text() {
        let record: JobRecord<serde_json::Value> =
            serde_json::from_str(r#"{"id": 3, "state": "Processing"}"#)
                .expect("record should decode");
        assert_eq!(record.status, Some(RawStatus::Name(String::from("Processing"))));
    }

    #[rstest]
    #[case(JobState::<()>::Pending, false)]
    #[case(JobState::<()>::InProgress { progress: Some(50) }, false)]
    #[case(JobState::<()>::Unknown(String::from("7")), false)]
    #[case(JobState::<()>::Succeeded(None), true)]
    #[case(JobState::<()>::Failed(ErrorDetail::new(None, "boom")), true)]
    fn only_succeeded_and_failed_are_terminal(#[case] state: JobState<()>, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[rstest]
    fn error_detail_renders_code_when_present() {
        assert_eq!(ErrorDetail::new(Some(530), "boom").to_string(), "boom (code 530)");
        assert_eq!(ErrorDetail::new(None, "boom").to_string(), "boom");
    }
}
