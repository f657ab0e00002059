use std::error::Error;
use std::fmt;
use std::fmt::Display;

use crate::network::codec::CodecError;
use crate::SlotIndex;

/// This enum contains all error messages this library can return. Most API functions will generally return a [`Result<(), WhackError>`].
///
/// Only construction-time misuse and I/O surface here. Conditions a remote peer or the
/// network can trigger (garbage payloads, duplicate placements, stale taps) never become
/// errors; they are reported as [`WhackEvent`]s and the session carries on.
///
/// [`Result<(), WhackError>`]: std::result::Result
/// [`WhackEvent`]: crate::WhackEvent
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum WhackError {
    /// A configuration value was rejected when building a session.
    InvalidConfig {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// A slot index from an untrusted source was outside the board.
    SlotOutOfRange {
        /// The index that was requested.
        slot: SlotIndex,
        /// Number of slots on the board.
        slot_count: usize,
    },
    /// Encoding or decoding a sync message failed.
    Codec(CodecError),
    /// The transport failed to send or receive.
    Transport {
        /// A description of the transport error.
        context: String,
    },
    /// The operation was attempted after the session ended.
    SessionEnded,
}

impl WhackError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for WhackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhackError::InvalidConfig { field, reason } => {
                write!(f, "Invalid configuration for `{}`: {}", field, reason)
            },
            WhackError::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            },
            WhackError::SlotOutOfRange { slot, slot_count } => {
                write!(
                    f,
                    "Slot {} is out of range for a board of {} slots",
                    slot, slot_count
                )
            },
            WhackError::Codec(err) => write!(f, "Codec error: {}", err),
            WhackError::Transport { context } => {
                write!(f, "Transport error: {}", context)
            },
            WhackError::SessionEnded => write!(f, "The session has already ended."),
        }
    }
}

impl Error for WhackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            WhackError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for WhackError {
    fn from(err: CodecError) -> Self {
        WhackError::Codec(err)
    }
}

impl From<std::io::Error> for WhackError {
    fn from(err: std::io::Error) -> Self {
        WhackError::Transport {
            context: err.to_string(),
        }
    }
}

/// Convenience alias used across the crate.
pub type WhackResult<T> = Result<T, WhackError>;

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::network::codec::CodecOperation;

    #[test]
    fn invalid_config_display_names_field() {
        let err = WhackError::invalid_config("slot_count", "must be at least 2");
        let text = err.to_string();
        assert!(text.contains("slot_count"));
        assert!(text.contains("must be at least 2"));
    }

    #[test]
    fn slot_out_of_range_display() {
        let err = WhackError::SlotOutOfRange {
            slot: SlotIndex::new(20),
            slot_count: 16,
        };
        assert_eq!(
            err.to_string(),
            "Slot 20 is out of range for a board of 16 slots"
        );
    }

    #[test]
    fn codec_error_is_source() {
        let err: WhackError = CodecError::decode("eof", CodecOperation::DecodeMessage).into();
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Codec error"));
    }

    #[test]
    fn io_error_becomes_transport_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let err: WhackError = io.into();
        assert!(matches!(err, WhackError::Transport { .. }));
    }
}
