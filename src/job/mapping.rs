//! Provider-specific rules mapping raw job records to [`JobState`].

use super::{InconsistentJob, JobRecord, JobState, RawStatus};

/// CloudStack result code for a successful job.
pub const CLOUDSTACK_RESULT_SUCCESS: i64 = 0;

/// CloudStack result code for a failed job.
pub const CLOUDSTACK_RESULT_FAIL: i64 = 530;

/// Maps a provider record to a job state.
pub trait StatusMapper: Send + Sync {
    /// Maps `record`, rejecting contradictory combinations.
    ///
    /// # Errors
    ///
    /// Returns [`InconsistentJob`] when the record's status, result and error
    /// fields contradict each other, most notably a failed job without error
    /// detail.
    fn map<T>(&self, record: JobRecord<T>) -> Result<JobState<T>, InconsistentJob>;
}

/// Generic rule over a progress percentage and an optional error object.
///
/// An error object means FAILED whatever the progress says; progress of 100
/// or more without an error means SUCCEEDED.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProgressStatusMapper;

/// CloudStack async jobs: status `0` pending, `1` succeeded, `2` failed.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloudStackStatusMapper;

/// GoGrid jobs, reported by state name.
#[derive(Clone, Copy, Debug, Default)]
pub struct GoGridStatusMapper;

/// Runtime selection among the bundled mappers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MapperKind {
    /// [`ProgressStatusMapper`].
    #[default]
    Progress,
    /// [`CloudStackStatusMapper`].
    CloudStack,
    /// [`GoGridStatusMapper`].
    GoGrid,
}

impl StatusMapper for MapperKind {
    fn map<T>(&self, record: JobRecord<T>) -> Result<JobState<T>, InconsistentJob> {
        match self {
            Self::Progress => ProgressStatusMapper.map(record),
            Self::CloudStack => CloudStackStatusMapper.map(record),
            Self::GoGrid => GoGridStatusMapper.map(record),
        }
    }
}

fn clamp_progress(progress: Option<i64>) -> Option<u8> {
    progress.and_then(|value| u8::try_from(value.clamp(0, 100)).ok())
}

fn failed_with<T>(
    record: JobRecord<T>,
    context: &str,
) -> Result<JobState<T>, InconsistentJob> {
    match record.error {
        Some(detail) => Ok(JobState::Failed(detail)),
        None => Err(InconsistentJob::new(
            record.id,
            format!("{context} without error detail"),
        )),
    }
}

impl StatusMapper for ProgressStatusMapper {
    fn map<T>(&self, record: JobRecord<T>) -> Result<JobState<T>, InconsistentJob> {
        check_job(&record)?;
        if let Some(detail) = record.error {
            return Ok(JobState::Failed(detail));
        }
        let reports_failure = matches!(
            &record.status,
            Some(RawStatus::Name(name))
                if name.eq_ignore_ascii_case("failed") || name.eq_ignore_ascii_case("error")
        );
        if reports_failure {
            return Err(InconsistentJob::new(
                record.id,
                "failed status without error detail",
            ));
        }
        match record.progress {
            Some(progress) if progress >= 100 => Ok(JobState::Succeeded(record.result)),
            None | Some(0) => Ok(JobState::Pending),
            progress => Ok(JobState::InProgress {
                progress: clamp_progress(progress),
            }),
        }
    }
}

impl StatusMapper for CloudStackStatusMapper {
    fn map<T>(&self, record: JobRecord<T>) -> Result<JobState<T>, InconsistentJob> {
        check_job(&record)?;
        let code = match &record.status {
            Some(RawStatus::Code(code)) => *code,
            Some(RawStatus::Name(name)) => match name.trim().parse::<i64>() {
                Ok(code) => code,
                Err(_) => return Ok(JobState::Unknown(name.clone())),
            },
            None => {
                return Err(InconsistentJob::new(record.id, "missing job status"));
            }
        };
        match code {
            0 => Ok(JobState::InProgress {
                progress: clamp_progress(record.progress),
            }),
            1 if record.result_code == Some(CLOUDSTACK_RESULT_FAIL) => Err(InconsistentJob::new(
                record.id,
                "succeeded job carries the FAIL result code",
            )),
            1 if record.error.is_some() => Err(InconsistentJob::new(
                record.id,
                "succeeded job carries error detail",
            )),
            1 => Ok(JobState::Succeeded(record.result)),
            2 => failed_with(record, "failed job"),
            other => Ok(JobState::Unknown(other.to_string())),
        }
    }
}

impl StatusMapper for GoGridStatusMapper {
    fn map<T>(&self, record: JobRecord<T>) -> Result<JobState<T>, InconsistentJob> {
        check_job(&record)?;
        let name = match &record.status {
            Some(RawStatus::Name(name)) => name.trim().to_ascii_lowercase(),
            Some(RawStatus::Code(code)) => return Ok(JobState::Unknown(code.to_string())),
            None => return Err(InconsistentJob::new(record.id, "missing job state")),
        };
        match name.as_str() {
            "queued" => Ok(JobState::Pending),
            "processing" => Ok(JobState::InProgress {
                progress: clamp_progress(record.progress),
            }),
            "succeeded" | "created" => Ok(JobState::Succeeded(record.result)),
            "failed" | "canceled" => failed_with(record, "failed job"),
            _ => Ok(JobState::Unknown(name)),
        }
    }
}

/// Validates field-level invariants shared by every provider.
///
/// Status codes, result codes and progress must be non-negative. Only the
/// SUCCESS result code may accompany a result, and a job carrying the FAIL
/// result code must carry error detail.
///
/// # Errors
///
/// Returns [`InconsistentJob`] naming the first violated invariant.
pub fn check_job<T>(record: &JobRecord<T>) -> Result<(), InconsistentJob> {
    if let Some(RawStatus::Code(code @ i64::MIN..=-1)) = record.status {
        return Err(InconsistentJob::new(
            record.id.clone(),
            format!("negative status code {code}"),
        ));
    }
    if let Some(progress @ i64::MIN..=-1) = record.progress {
        return Err(InconsistentJob::new(
            record.id.clone(),
            format!("negative progress {progress}"),
        ));
    }
    match record.result_code {
        Some(code @ i64::MIN..=-1) => Err(InconsistentJob::new(
            record.id.clone(),
            format!("negative result code {code}"),
        )),
        None | Some(CLOUDSTACK_RESULT_SUCCESS) => Ok(()),
        Some(CLOUDSTACK_RESULT_FAIL) if record.error.is_none() => Err(InconsistentJob::new(
            record.id.clone(),
            "FAIL result code without error detail",
        )),
        Some(code) if record.result.is_some() => Err(InconsistentJob::new(
            record.id.clone(),
            format!("result code {code} carries a result"),
        )),
        Some(_) => Ok(()),
    }
}
