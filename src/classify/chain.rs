//! Causal chains flattened into ordered error descriptors.
//!
//! Classification never inspects concrete error types directly. Each link of
//! the chain is reduced to an [`ErrorDescriptor`] holding a type tag and the
//! rendered message, and the matching rules run over that sequence.

use std::error::Error as StdError;
use std::io;

use super::transport::{SSH_FX_FAILURE, TransportError, is_auth_failure};
use crate::job::HttpSourceError;

/// Upper bound on links walked, guarding against cyclic `source()` chains.
pub const MAX_CHAIN_DEPTH: usize = 64;

/// Lower-cased phrases that identify a socket failure in a bare message.
const IO_PHRASES: [(&str, io::ErrorKind); 7] = [
    ("connection reset", io::ErrorKind::ConnectionReset),
    ("connection refused", io::ErrorKind::ConnectionRefused),
    ("connection aborted", io::ErrorKind::ConnectionAborted),
    ("broken pipe", io::ErrorKind::BrokenPipe),
    ("timed out", io::ErrorKind::TimedOut),
    ("unexpected end of file", io::ErrorKind::UnexpectedEof),
    ("socket closed", io::ErrorKind::NotConnected),
];

/// Coarse type of one link in a causal chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorTag {
    /// Socket or stream error of the given kind.
    Io(io::ErrorKind),
    /// Connection establishment failed.
    Connect,
    /// Protocol session failure.
    Session,
    /// Channel failure on an established session.
    Channel,
    /// Credentials were rejected.
    Authorization,
    /// The remote reported an unspecified general failure.
    GeneralProtocolFailure,
    /// The remote reported a specific protocol error.
    Protocol,
    /// The remote service was temporarily unable to answer.
    ServiceUnavailable,
    /// Any error type the classifier has no rule for.
    Other,
}

/// One link of a causal chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorDescriptor {
    tag: ErrorTag,
    rendered: String,
}

impl ErrorDescriptor {
    /// Creates a descriptor from a tag and rendered message.
    #[must_use]
    pub fn new(tag: ErrorTag, rendered: impl Into<String>) -> Self {
        Self {
            tag,
            rendered: rendered.into(),
        }
    }

    /// Creates a descriptor for an error of unknown type.
    #[must_use]
    pub fn other(rendered: impl Into<String>) -> Self {
        Self::new(ErrorTag::Other, rendered)
    }

    /// Creates a descriptor for a bare message, inferring its tag from the
    /// wording transports use for the failures the classifier knows about.
    ///
    /// Unrecognised messages are tagged [`ErrorTag::Other`].
    #[must_use]
    pub fn from_message(rendered: impl Into<String>) -> Self {
        let rendered = rendered.into();
        Self::new(tag_for_message(&rendered), rendered)
    }

    /// Returns the tag.
    #[must_use]
    pub const fn tag(&self) -> ErrorTag {
        self.tag
    }

    /// Returns the rendered message.
    #[must_use]
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Describes a single error, ignoring its causes.
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        Self::new(tag_of(err), err.to_string())
    }
}

fn tag_of(err: &(dyn StdError + 'static)) -> ErrorTag {
    if let Some(transport) = err.downcast_ref::<TransportError>() {
        return transport.tag();
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return ErrorTag::Io(io_err.kind());
    }
    if let Some(http) = err.downcast_ref::<HttpSourceError>() {
        return http.tag();
    }
    if let Some(request) = err.downcast_ref::<reqwest::Error>() {
        return reqwest_tag(request);
    }
    ErrorTag::Other
}

fn tag_for_message(message: &str) -> ErrorTag {
    if is_auth_failure(message) || message.starts_with("authorization failed: ") {
        return ErrorTag::Authorization;
    }
    if message.contains("SSH_FX_FAILURE")
        || message.starts_with(&format!("sftp status {SSH_FX_FAILURE}:"))
    {
        return ErrorTag::GeneralProtocolFailure;
    }
    let lowered = message.to_ascii_lowercase();
    if let Some((_, kind)) = IO_PHRASES
        .iter()
        .find(|(phrase, _)| lowered.contains(phrase))
    {
        return ErrorTag::Io(*kind);
    }
    if message.starts_with("Session.") {
        return ErrorTag::Session;
    }
    if message.starts_with("channel failure: ") || lowered.contains("channel is not opened") {
        return ErrorTag::Channel;
    }
    if message.starts_with("failed to connect to ") {
        return ErrorTag::Connect;
    }
    ErrorTag::Other
}

fn reqwest_tag(err: &reqwest::Error) -> ErrorTag {
    if err.is_connect() {
        ErrorTag::Connect
    } else if err.is_timeout() {
        ErrorTag::Io(io::ErrorKind::TimedOut)
    } else if err.status().is_some_and(is_transient_status) {
        ErrorTag::ServiceUnavailable
    } else {
        ErrorTag::Other
    }
}

/// Whether an HTTP status indicates a temporary server-side condition.
#[must_use]
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// Returns the next link, looking inside custom `io::Error` payloads whose
/// `source()` skips the wrapped error itself.
fn next_link<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    if let Some(payload) = err
        .downcast_ref::<io::Error>()
        .and_then(io::Error::get_ref)
    {
        let inner: &(dyn StdError + 'static) = payload;
        return Some(inner);
    }
    err.source()
}

/// An error and its causes, outermost first.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CausalChain {
    links: Vec<ErrorDescriptor>,
}

impl CausalChain {
    /// Walks `err` and its causes.
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut links = Vec::new();
        let mut current = Some(err);
        while let Some(link) = current {
            if links.len() == MAX_CHAIN_DEPTH {
                break;
            }
            links.push(ErrorDescriptor::from_error(link));
            current = next_link(link);
        }
        Self { links }
    }

    /// Builds a chain from descriptors ordered outermost first.
    pub fn from_descriptors(links: impl IntoIterator<Item = ErrorDescriptor>) -> Self {
        Self {
            links: links.into_iter().take(MAX_CHAIN_DEPTH).collect(),
        }
    }

    /// Returns the links, outermost first.
    #[must_use]
    pub fn links(&self) -> &[ErrorDescriptor] {
        &self.links
    }

    /// Whether any link's rendered message contains `needle`.
    #[must_use]
    pub fn has_message_containing(&self, needle: &str) -> bool {
        self.links
            .iter()
            .any(|link| link.rendered.contains(needle))
    }
}

/// Whether any error in the causal chain of `err` renders a message
/// containing `needle`.
#[must_use]
pub fn causal_chain_has_message_containing(err: &(dyn StdError + 'static), needle: &str) -> bool {
    CausalChain::from_error(err).has_message_containing(needle)
}
