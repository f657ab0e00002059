//! Binary wire format for [`SyncMessage`]s.
//!
//! Every payload is one tag byte followed by a bincode body:
//!
//! | tag | body                                                   |
//! |-----|--------------------------------------------------------|
//! | 0   | `seq`, world map bytes (length-prefixed)               |
//! | 1   | `seq`, anchor id (16 bytes), slot, pose (7 × `f32`)    |
//! | 2   | `seq`, anchor id, slot                                 |
//! | 3   | `seq`, anchor id                                       |
//! | 4   | `seq`, target total                                    |
//!
//! Integers use bincode's standard varint encoding. A body must be consumed exactly:
//! unknown tags, truncated bodies and trailing bytes are all decode errors.
//!
//! ```
//! use whack_sync::__internal::{decode_message, encode_message, Envelope};
//! use whack_sync::{AnchorPlacement, Pose, SlotIndex, SyncMessage, TargetId};
//!
//! let envelope = Envelope {
//!     seq: 3,
//!     message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
//!         TargetId::new(9),
//!         SlotIndex::new(5),
//!         Pose::default(),
//!     )),
//! };
//! let bytes = encode_message(&envelope).expect("encoding should succeed");
//! assert_eq!(bytes[0], 1);
//! assert_eq!(decode_message(&bytes).expect("decoding should succeed"), envelope);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use crate::network::messages::{AnchorPlacement, SyncMessage};
use crate::SlotIndex;

/// Largest body accepted by the decoder. World maps dominate; anchors are tiny.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_BODY_BYTES>()
}

/// What the codec was doing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding a sync message.
    EncodeMessage,
    /// Decoding a sync message.
    DecodeMessage,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeMessage => write!(f, "encoding sync message"),
            Self::DecodeMessage => write!(f, "decoding sync message"),
        }
    }
}

/// Errors from encoding or decoding a payload.
///
/// Bincode's own errors are opaque, so their text is carried as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// Encoding failed.
    EncodeError {
        /// Bincode's message.
        message: String,
        /// What was being done.
        operation: CodecOperation,
    },
    /// The body could not be decoded.
    DecodeError {
        /// Bincode's message.
        message: String,
        /// What was being done.
        operation: CodecOperation,
    },
    /// The payload had no tag byte.
    Empty,
    /// The tag byte names no known message.
    UnknownTag {
        /// The tag that was read.
        tag: u8,
    },
    /// The body decoded but bytes were left over.
    TrailingBytes {
        /// Bytes the body used.
        consumed: usize,
        /// Bytes after the tag.
        available: usize,
    },
}

impl CodecError {
    /// An [`CodecError::EncodeError`].
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// A [`CodecError::DecodeError`].
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::Empty => write!(f, "empty payload"),
            Self::UnknownTag { tag } => write!(f, "unknown message tag {tag}"),
            Self::TrailingBytes {
                consumed,
                available,
            } => write!(
                f,
                "{} trailing bytes after a {consumed}-byte body",
                available - consumed
            ),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// A message plus the sender's sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Per-sender counter, incremented on every send.
    pub seq: u64,
    /// The payload.
    pub message: SyncMessage,
}

/// Encodes `envelope` as tag byte plus body.
pub fn encode_message(envelope: &Envelope) -> CodecResult<Vec<u8>> {
    let mut buffer = vec![envelope.message.tag()];
    let seq = envelope.seq;
    match &envelope.message {
        SyncMessage::WorldReference { snapshot } => append(&(seq, snapshot), &mut buffer)?,
        SyncMessage::AnchorPlacement(placement) => append(&(seq, placement), &mut buffer)?,
        SyncMessage::AnchorRetired { anchor_id, slot } => {
            append(&(seq, anchor_id, slot), &mut buffer)?;
        },
        SyncMessage::TargetDropped { anchor_id } => append(&(seq, anchor_id), &mut buffer)?,
        SyncMessage::SessionHeader { total_targets } => {
            append(&(seq, total_targets), &mut buffer)?;
        },
    }
    Ok(buffer)
}

/// Decodes a payload produced by [`encode_message`].
pub fn decode_message(bytes: &[u8]) -> CodecResult<Envelope> {
    let (&tag, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    let (seq, message) = match tag {
        SyncMessage::TAG_WORLD_REFERENCE => {
            let (seq, snapshot): (u64, Vec<u8>) = decode_exact(body)?;
            (seq, SyncMessage::WorldReference { snapshot })
        },
        SyncMessage::TAG_ANCHOR_PLACEMENT => {
            let (seq, placement): (u64, AnchorPlacement) = decode_exact(body)?;
            (seq, SyncMessage::AnchorPlacement(placement))
        },
        SyncMessage::TAG_ANCHOR_RETIRED => {
            let (seq, anchor_id, slot): (u64, [u8; 16], SlotIndex) = decode_exact(body)?;
            (seq, SyncMessage::AnchorRetired { anchor_id, slot })
        },
        SyncMessage::TAG_TARGET_DROPPED => {
            let (seq, anchor_id): (u64, [u8; 16]) = decode_exact(body)?;
            (seq, SyncMessage::TargetDropped { anchor_id })
        },
        SyncMessage::TAG_SESSION_HEADER => {
            let (seq, total_targets): (u64, u32) = decode_exact(body)?;
            (seq, SyncMessage::SessionHeader { total_targets })
        },
        tag => return Err(CodecError::UnknownTag { tag }),
    };
    Ok(Envelope { seq, message })
}

fn append<T: Serialize>(value: &T, buffer: &mut Vec<u8>) -> CodecResult<()> {
    bincode::serde::encode_into_std_write(value, buffer, config())
        .map(|_| ())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeMessage))
}

fn decode_exact<T: DeserializeOwned>(body: &[u8]) -> CodecResult<T> {
    let (value, consumed) = bincode::serde::decode_from_slice(body, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeMessage))?;
    if consumed != body.len() {
        return Err(CodecError::TrailingBytes {
            consumed,
            available: body.len(),
        });
    }
    Ok(value)
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::slot_grid::{Pose, Position};
    use crate::TargetId;

    fn placement_envelope() -> Envelope {
        Envelope {
            seq: 1,
            message: SyncMessage::AnchorPlacement(AnchorPlacement::new(
                TargetId::from_parts(0xFEED, 2),
                SlotIndex::new(5),
                Pose::at(Position::new(-0.05, 0.01, -0.05)),
            )),
        }
    }

    #[test]
    fn placement_layout() {
        let bytes = encode_message(&placement_envelope()).unwrap();
        // tag + seq (1 varint byte) + anchor id + slot (1 varint byte) + 7 f32
        assert_eq!(bytes.len(), 1 + 1 + 16 + 1 + 7 * 4);
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[18], 5);
    }

    #[test]
    fn every_variant_decodes_to_itself() {
        let messages = [
            SyncMessage::WorldReference {
                snapshot: vec![1, 2, 3, 4, 5],
            },
            placement_envelope().message,
            SyncMessage::AnchorRetired {
                anchor_id: TargetId::new(7).to_bytes(),
                slot: SlotIndex::new(300),
            },
            SyncMessage::TargetDropped {
                anchor_id: TargetId::new(8).to_bytes(),
            },
            SyncMessage::SessionHeader { total_targets: 40 },
        ];
        for (seq, message) in messages.into_iter().enumerate() {
            let envelope = Envelope {
                seq: seq as u64 * 1000,
                message,
            };
            let bytes = encode_message(&envelope).unwrap();
            assert_eq!(decode_message(&bytes).unwrap(), envelope);
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = encode_message(&placement_envelope()).unwrap();
        let b = encode_message(&placement_envelope()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert_eq!(decode_message(&[]), Err(CodecError::Empty));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            decode_message(&[9, 0, 0]),
            Err(CodecError::UnknownTag { tag: 9 })
        );
    }

    #[test]
    fn truncated_body_is_rejected() {
        let bytes = encode_message(&placement_envelope()).unwrap();
        let result = decode_message(&bytes[..bytes.len() - 3]);
        assert!(matches!(result, Err(CodecError::DecodeError { .. })));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_message(&placement_envelope()).unwrap();
        bytes.push(0);
        assert!(matches!(
            decode_message(&bytes),
            Err(CodecError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        // tag 0, seq 0, then a varint length of u64::MAX
        let bytes = [0u8, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode_message(&bytes).is_err());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            CodecError::UnknownTag { tag: 7 }.to_string(),
            "unknown message tag 7"
        );
        let trailing = CodecError::TrailingBytes {
            consumed: 10,
            available: 12,
        };
        assert!(trailing.to_string().starts_with("2 trailing bytes"));
        let decode = CodecError::decode("eof", CodecOperation::DecodeMessage);
        assert!(decode.to_string().contains("decoding sync message"));
    }
}
