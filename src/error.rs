//! Error taxonomy for the sync engine.
//!
//! Only construction-time and transport-level failures surface to callers.
//! Inbound protocol errors (malformed vectors, bad signatures) are dropped
//! after logging and never reach the host.

use thiserror::Error;

use crate::config::ConfigError;

/// Convenience type alias for Results using [`SyncError`].
pub type Result<T, E = SyncError> = std::result::Result<T, E>;

/// Top-level errors of the sync engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Constructor-time configuration problem.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The transport rejected an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A wire-format operation failed.
    #[error("codec error: {0}")]
    Codec(#[from] statesync_proto::CodecError),
}

/// Errors reported by a [`SyncTransport`](crate::transport::SyncTransport)
/// implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Registering the sync prefix listener failed.
    #[error("prefix registration failed: {reason}")]
    RegisterFailed {
        /// Transport-specific failure description.
        reason: String,
    },

    /// Sending a packet failed.
    #[error("send failed: {reason}")]
    SendFailed {
        /// Transport-specific failure description.
        reason: String,
    },

    /// The transport has shut down.
    #[error("transport closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::Transport(TransportError::Closed);
        assert_eq!(err.to_string(), "transport error: transport closed");

        let err = TransportError::RegisterFailed {
            reason: "no route".into(),
        };
        assert_eq!(err.to_string(), "prefix registration failed: no route");
    }

    #[test]
    fn test_error_conversion() {
        let codec = statesync_proto::CodecError::MalformedVector("broken");
        let err: SyncError = codec.into();
        assert!(matches!(err, SyncError::Codec(_)));
    }
}
