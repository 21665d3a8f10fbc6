//! Room wire protocol.
//!
//! Every payload is a JSON envelope carrying the protocol version and one
//! [`RoomMessage`]. Transports deliver payloads reliably and in order per peer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Decision, OptionId, Participant, ParticipantId};

/// Version written into every envelope
pub const PROTOCOL_VERSION: u16 = 1;

/// Messages exchanged between a host and its guests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomMessage {
    /// Full replacement of the shared decision (host to guests)
    DecisionUpdate { decision: Decision },
    /// A participant is part of the room (host to guests)
    ParticipantJoined { participant: Participant },
    /// A participant left the room (host to guests)
    ParticipantLeft { participant_id: ParticipantId },
    /// A participant's choice (guest to host, echoed by the host to everyone)
    Vote {
        participant_id: ParticipantId,
        option_id: OptionId,
    },
    /// The host is ending the session (host to guests)
    RoomClosed,
}

impl RoomMessage {
    /// Short name for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DecisionUpdate { .. } => "decision_update",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::Vote { .. } => "vote",
            Self::RoomClosed => "room_closed",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let envelope = EnvelopeRef {
            version: PROTOCOL_VERSION,
            message: self,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode a payload, refusing anything larger than `max_len` bytes.
    pub fn decode(payload: &[u8], max_len: usize) -> Result<Self, CodecError> {
        if payload.len() > max_len {
            return Err(CodecError::TooLarge {
                size: payload.len(),
                limit: max_len,
            });
        }
        let envelope: Envelope = serde_json::from_slice(payload)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(CodecError::UnsupportedVersion(envelope.version));
        }
        Ok(envelope.message)
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("malformed room message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u16,
    message: &'a RoomMessage,
}

#[derive(Deserialize)]
struct Envelope {
    version: u16,
    message: RoomMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LIMIT: usize = 64 * 1024;

    #[test]
    fn decision_update_roundtrip() {
        let decision = Decision::new("Lunch", ["Soup", "Salad"]).unwrap();
        let message = RoomMessage::DecisionUpdate { decision };
        let bytes = message.encode().unwrap();
        assert_eq!(RoomMessage::decode(&bytes, LIMIT).unwrap(), message);
    }

    #[test]
    fn wire_format_is_tagged_json() {
        let bytes = RoomMessage::RoomClosed.encode().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"version":1,"message":{"type":"room_closed"}}"#
        );

        let participant_id = ParticipantId::new();
        let option_id = OptionId::new();
        let json = format!(
            r#"{{"version":1,"message":{{"type":"vote","participant_id":"{participant_id}","option_id":"{option_id}"}}}}"#
        );
        assert_eq!(
            RoomMessage::decode(json.as_bytes(), LIMIT).unwrap(),
            RoomMessage::Vote {
                participant_id,
                option_id
            }
        );
    }

    #[test]
    fn decode_rejects_random_bytes() {
        let noise = [0x9f, 0x00, 0xff, 0x13, 0x37, 0x42, 0x7b, 0x22, 0xde, 0xad, 0xbe, 0xef];
        assert!(matches!(
            RoomMessage::decode(&noise, LIMIT),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn decode_rejects_unknown_type_and_version() {
        let unknown = br#"{"version":1,"message":{"type":"kick"}}"#;
        assert!(RoomMessage::decode(unknown, LIMIT).is_err());

        let future = br#"{"version":2,"message":{"type":"room_closed"}}"#;
        assert!(matches!(
            RoomMessage::decode(future, LIMIT),
            Err(CodecError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn decode_enforces_size_limit() {
        let bytes = RoomMessage::RoomClosed.encode().unwrap();
        assert!(matches!(
            RoomMessage::decode(&bytes, 8),
            Err(CodecError::TooLarge { limit: 8, .. })
        ));
    }
}
