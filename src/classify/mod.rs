//! Retry classification for transport and request failures.
//!
//! [`RetryableErrorClassifier`] walks an error's causal chain and decides
//! whether the operation that raised it may be attempted again. Rules are
//! checked across the whole chain in this order:
//!
//! 1. an authorization link is retried only when the classifier was built
//!    with `retry_authorization` enabled;
//! 2. a general protocol failure link is never retried;
//! 3. a link whose tag is a known transient type is retried;
//! 4. a link whose rendered message contains a configured fragment is
//!    retried;
//! 5. nothing else is retried.

mod chain;
mod transport;

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::Arc;

pub use chain::{
    CausalChain, ErrorDescriptor, ErrorTag, MAX_CHAIN_DEPTH, causal_chain_has_message_containing,
    is_transient_status,
};
pub use transport::{SSH_FX_FAILURE, TransportError};

/// Outcome of classifying a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    /// Safe to re-attempt the whole operation.
    Transient,
    /// Credentials were rejected and authorization retries are disabled.
    PermanentAuth,
    /// Re-attempting would fail the same way.
    Permanent,
}

impl ErrorClass {
    /// Whether the failure may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::PermanentAuth => "permanent-auth",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message fragments that mark a failure as retryable.
///
/// Matching is a case-sensitive substring test against each rendered link.
/// The set is fixed once built and cheap to clone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RetryableMessageSet {
    fragments: Arc<[String]>,
}

impl RetryableMessageSet {
    /// Builds a set from individual fragments, dropping blank entries.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collected: Vec<String> = fragments
            .into_iter()
            .map(Into::into)
            .filter(|fragment| !fragment.trim().is_empty())
            .collect();
        Self {
            fragments: collected.into(),
        }
    }

    /// Parses a comma-separated list, trimming whitespace around entries.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }

    /// Returns the configured fragments.
    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Whether the set has no fragments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Whether `rendered` contains any configured fragment.
    #[must_use]
    pub fn matches(&self, rendered: &str) -> bool {
        self.fragments
            .iter()
            .any(|fragment| rendered.contains(fragment.as_str()))
    }
}

/// Decides whether a failure is worth retrying.
///
/// Classification is a pure function of the error graph and the immutable
/// configuration, so one classifier may be shared freely across tasks.
#[derive(Clone, Debug, Default)]
pub struct RetryableErrorClassifier {
    messages: RetryableMessageSet,
    retry_authorization: bool,
}

impl RetryableErrorClassifier {
    /// Creates a classifier.
    #[must_use]
    pub const fn new(messages: RetryableMessageSet, retry_authorization: bool) -> Self {
        Self {
            messages,
            retry_authorization,
        }
    }

    /// Returns the configured message fragments.
    #[must_use]
    pub const fn messages(&self) -> &RetryableMessageSet {
        &self.messages
    }

    /// Whether authorization failures are retried.
    #[must_use]
    pub const fn retries_authorization(&self) -> bool {
        self.retry_authorization
    }

    /// Classifies `err` by walking its causal chain.
    #[must_use]
    pub fn classify(&self, err: &(dyn StdError + 'static)) -> ErrorClass {
        self.classify_chain(&CausalChain::from_error(err))
    }

    /// Classifies an already flattened chain.
    #[must_use]
    pub fn classify_chain(&self, chain: &CausalChain) -> ErrorClass {
        let links = chain.links();
        if links
            .iter()
            .any(|link| link.tag() == ErrorTag::Authorization)
        {
            return if self.retry_authorization {
                ErrorClass::Transient
            } else {
                ErrorClass::PermanentAuth
            };
        }
        if links
            .iter()
            .any(|link| link.tag() == ErrorTag::GeneralProtocolFailure)
        {
            return ErrorClass::Permanent;
        }
        if links.iter().any(|link| is_transient_tag(link.tag())) {
            return ErrorClass::Transient;
        }
        if links.iter().any(|link| self.messages.matches(link.rendered())) {
            return ErrorClass::Transient;
        }
        ErrorClass::Permanent
    }

    /// Whether the operation that raised `err` should be attempted again.
    #[must_use]
    pub fn should_retry(&self, err: &(dyn StdError + 'static)) -> bool {
        self.classify(err).is_retryable()
    }
}

const fn is_transient_tag(tag: ErrorTag) -> bool {
    match tag {
        ErrorTag::Io(kind) => !matches!(
            kind,
            io::ErrorKind::NotFound
                | io::ErrorKind::PermissionDenied
                | io::ErrorKind::InvalidInput
                | io::ErrorKind::AlreadyExists
                | io::ErrorKind::Unsupported
                | io::ErrorKind::OutOfMemory
        ),
        ErrorTag::Connect | ErrorTag::Session | ErrorTag::Channel | ErrorTag::ServiceUnavailable => {
            true
        }
        ErrorTag::Authorization
        | ErrorTag::GeneralProtocolFailure
        | ErrorTag::Protocol
        | ErrorTag::Other => false,
    }
}
