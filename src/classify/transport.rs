//! Error surface of the SSH and socket transport collaborators.
//!
//! The classifier only needs to know what kind of failure occurred and how it
//! chains to its cause; the protocol itself lives elsewhere.

use std::io;

use thiserror::Error;

use super::chain::ErrorTag;

/// SFTP status code for a general, unspecified server failure.
pub const SSH_FX_FAILURE: u32 = 4;

const AUTH_FAILURE_MESSAGES: [&str; 2] = ["Auth fail", "Auth cancel"];

/// Failures raised by transport clients.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {address}")]
    Connect {
        /// Remote address that refused or timed out.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// The protocol session failed during setup or use.
    #[error("{message}")]
    Session {
        /// Rendered session failure.
        message: String,
        /// Socket error that triggered the failure, when known.
        #[source]
        source: Option<io::Error>,
    },
    /// A channel on an established session failed.
    #[error("channel failure: {message}")]
    Channel {
        /// Rendered channel failure.
        message: String,
    },
    /// The remote rejected the supplied credentials.
    #[error("authorization failed: {message}")]
    Authorization {
        /// Rendered authorization failure.
        message: String,
    },
    /// The SFTP subsystem returned an error status.
    #[error("sftp status {code}: {message}")]
    Sftp {
        /// SFTP status code.
        code: u32,
        /// Server supplied description.
        message: String,
    },
    /// A raw socket or stream error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Builds a session failure from a rendered message.
    ///
    /// Messages reporting rejected credentials become
    /// [`TransportError::Authorization`] so they are never mistaken for a
    /// flaky handshake.
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        let rendered = message.into();
        if is_auth_failure(&rendered) {
            return Self::Authorization { message: rendered };
        }
        Self::Session {
            message: rendered,
            source: None,
        }
    }

    /// Builds a session failure caused by a socket error.
    #[must_use]
    pub fn session_with_cause(message: impl Into<String>, source: io::Error) -> Self {
        Self::Session {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Builds a channel failure.
    #[must_use]
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Builds an authorization failure.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Builds an SFTP status failure.
    #[must_use]
    pub fn sftp(code: u32, message: impl Into<String>) -> Self {
        Self::Sftp {
            code,
            message: message.into(),
        }
    }

    /// Builds a connection failure.
    #[must_use]
    pub fn connect(address: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            address: address.into(),
            source,
        }
    }

    /// Returns the classification tag for this failure.
    #[must_use]
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::Connect { .. } => ErrorTag::Connect,
            Self::Session { .. } => ErrorTag::Session,
            Self::Channel { .. } => ErrorTag::Channel,
            Self::Authorization { .. } => ErrorTag::Authorization,
            Self::Sftp { code, .. } if *code == SSH_FX_FAILURE => {
                ErrorTag::GeneralProtocolFailure
            }
            Self::Sftp { .. } => ErrorTag::Protocol,
            Self::Io(err) => ErrorTag::Io(err.kind()),
        }
    }
}

pub(super) fn is_auth_failure(message: &str) -> bool {
    AUTH_FAILURE_MESSAGES
        .iter()
        .any(|marker| message.starts_with(marker))
}
