//! Job source backed by a provider's HTTP job-status endpoint.
//!
//! `GET {endpoint}/jobs/{id}` answers a single [`JobRecord`] and
//! `GET {endpoint}/jobs` answers a JSON array of them. Every request runs
//! through [`retry_operation`] so transient transport failures are retried
//! before they reach the poll loop.

use std::marker::PhantomData;

use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::{JobId, JobRecord, JobSource, SourceFuture};
use crate::classify::{ErrorTag, RetryableErrorClassifier, TransportError, is_transient_status};
use crate::retry::{OperationError, RetryPolicy, retry_operation};

/// Header carrying the API token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Errors raised by [`HttpJobSource`] requests.
#[derive(Debug, Error)]
pub enum HttpSourceError {
    /// The endpoint is not an absolute URL that can carry a path.
    #[error("invalid job endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The request could not be sent or its body could not be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The endpoint rejected the credentials.
    #[error("{url} rejected the credentials with {status}")]
    Unauthorized {
        /// Requested URL.
        url: String,
        /// Response status.
        status: StatusCode,
        /// Authorization failure seen by the classifier.
        #[source]
        source: TransportError,
    },
    /// The endpoint answered with a non-success status.
    #[error("{url} answered {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// Response status.
        status: StatusCode,
    },
    /// The body was not a valid job document.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl HttpSourceError {
    /// Returns the classification tag for this failure.
    #[must_use]
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::Status { status, .. } if is_transient_status(*status) => {
                ErrorTag::ServiceUnavailable
            }
            Self::Status { .. } => ErrorTag::Protocol,
            Self::InvalidEndpoint { .. }
            | Self::Request(_)
            | Self::Unauthorized { .. }
            | Self::Decode { .. } => ErrorTag::Other,
        }
    }
}

/// [`JobSource`] speaking JSON over HTTP.
#[derive(Clone, Debug)]
pub struct HttpJobSource<T> {
    client: reqwest::Client,
    endpoint: String,
    base: Url,
    auth_token: Option<String>,
    policy: RetryPolicy,
    classifier: RetryableErrorClassifier,
    _payload: PhantomData<fn() -> T>,
}

impl<T> HttpJobSource<T> {
    /// Creates a source for `endpoint`, retrying requests within `policy`
    /// while `classifier` deems failures transient.
    ///
    /// # Errors
    ///
    /// Returns [`HttpSourceError::InvalidEndpoint`] when `endpoint` is not an
    /// absolute URL with a path, and [`HttpSourceError::Request`] when the
    /// HTTP client cannot be initialised.
    pub fn new(
        endpoint: &str,
        policy: RetryPolicy,
        classifier: RetryableErrorClassifier,
    ) -> Result<Self, HttpSourceError> {
        let invalid = |reason: String| HttpSourceError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason,
        };
        let base = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid(String::from("URL cannot carry a path")));
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            base,
            auth_token: None,
            policy,
            classifier,
            _payload: PhantomData,
        })
    }

    /// Sends `token` with every request.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Returns the endpoint base URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Appends percent-encoded `segments` to the endpoint path.
    fn url_with(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` rejects cannot-be-a-base endpoints, so the path is mutable.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn job_url(&self, id: &JobId) -> Url {
        self.url_with(&["jobs", id.as_str()])
    }

    fn list_url(&self) -> Url {
        self.url_with(&["jobs"])
    }

    async fn get_json<R>(&self, url: &str) -> Result<R, HttpSourceError>
    where
        R: DeserializeOwned,
    {
        debug!(url, "requesting job status");
        let mut request = self.client.get(url);
        if let Some(token) = &self.auth_token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HttpSourceError::Unauthorized {
                url: url.to_owned(),
                status,
                source: TransportError::authorization(status.to_string()),
            });
        }
        if !status.is_success() {
            return Err(HttpSourceError::Status {
                url: url.to_owned(),
                status,
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| HttpSourceError::Decode {
            url: url.to_owned(),
            source,
        })
    }
}

impl<T> JobSource for HttpJobSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Payload = T;
    type Error = OperationError<HttpSourceError>;

    fn fetch_job<'a>(
        &'a self,
        id: &'a JobId,
    ) -> SourceFuture<'a, JobRecord<Self::Payload>, Self::Error> {
        Box::pin(async move {
            let url = self.job_url(id);
            let target = url.as_str();
            retry_operation(&self.policy, &self.classifier, move || {
                self.get_json::<JobRecord<T>>(target)
            })
            .await
        })
    }

    fn list_jobs(&self) -> SourceFuture<'_, Vec<JobRecord<Self::Payload>>, Self::Error> {
        Box::pin(async move {
            let url = self.list_url();
            let target = url.as_str();
            retry_operation(&self.policy, &self.classifier, move || {
                self.get_json::<Vec<JobRecord<T>>>(target)
            })
            .await
        })
    }
}
