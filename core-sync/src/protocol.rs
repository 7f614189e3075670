//! Wire frames exchanged between replicas and the relay.
//!
//! Every frame is a single WebSocket binary message: one tag byte followed by
//! an opaque payload produced by the document layer. Text messages and unknown
//! tags are ignored by receivers so that the protocol can grow without
//! breaking old peers.

use crate::error::{Result, SyncError};

const TAG_STATE_VECTOR: u8 = 0;
const TAG_DIFF: u8 = 1;
const TAG_UPDATE: u8 = 2;

/// One sync protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// "This is what I already have" - sent by both sides on connect.
    StateVector(Vec<u8>),
    /// Everything the peer was missing, answering a state vector.
    Diff(Vec<u8>),
    /// One incremental local change.
    Update(Vec<u8>),
}

impl SyncMessage {
    pub fn encode(&self) -> Vec<u8> {
        let (tag, payload) = match self {
            Self::StateVector(payload) => (TAG_STATE_VECTOR, payload),
            Self::Diff(payload) => (TAG_DIFF, payload),
            Self::Update(payload) => (TAG_UPDATE, payload),
        };
        let mut frame = Vec::with_capacity(1 + payload.len());
        frame.push(tag);
        frame.extend_from_slice(payload);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        let (&tag, payload) = frame
            .split_first()
            .ok_or_else(|| SyncError::Frame("empty frame".to_string()))?;
        match tag {
            TAG_STATE_VECTOR => Ok(Self::StateVector(payload.to_vec())),
            TAG_DIFF => Ok(Self::Diff(payload.to_vec())),
            TAG_UPDATE => Ok(Self::Update(payload.to_vec())),
            other => Err(SyncError::Frame(format!("unknown frame tag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip() {
        let message = SyncMessage::Update(vec![1, 2, 3]);
        let decoded = SyncMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let decoded = SyncMessage::decode(&SyncMessage::StateVector(Vec::new()).encode()).unwrap();
        assert_eq!(decoded, SyncMessage::StateVector(Vec::new()));
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        assert!(matches!(
            SyncMessage::decode(&[]),
            Err(SyncError::Frame(_))
        ));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert!(matches!(
            SyncMessage::decode(&[9, 1, 2]),
            Err(SyncError::Frame(_))
        ));
    }
}
