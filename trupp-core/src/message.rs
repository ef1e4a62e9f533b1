use serde::Deserialize;

use crate::{InvalidStatusCode, StatusCode};

/// Payload carried on both status channels: `{"status": <int>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub status: StatusCode,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed status message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    OutOfRange(#[from] InvalidStatusCode),
}

// Unknown fields are ignored so a later version tag does not break older
// receivers.
#[derive(Deserialize)]
struct WireStatus {
    status: i64,
}

impl StatusMessage {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::json!({ "status": self.status.get() })
            .to_string()
            .into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        let wire: WireStatus = serde_json::from_slice(bytes)?;
        let status = StatusCode::new(wire.status)?;
        Ok(Self { status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_single_status_field() {
        let msg = StatusMessage::new(StatusCode::new(4).unwrap());
        assert_eq!(msg.encode(), br#"{"status":4}"#.to_vec());
    }

    #[test]
    fn decodes_valid_payload() {
        let msg = StatusMessage::decode(br#"{"status": 7}"#).unwrap();
        assert_eq!(msg.status.get(), 7);
    }

    #[test]
    fn ignores_unknown_fields() {
        let msg = StatusMessage::decode(br#"{"status": 2, "version": 2}"#).unwrap();
        assert_eq!(msg.status.get(), 2);
    }

    #[test]
    fn rejects_out_of_range() {
        let err = StatusMessage::decode(br#"{"status": 15}"#).unwrap_err();
        assert!(matches!(err, MessageError::OutOfRange(InvalidStatusCode(15))));

        let err = StatusMessage::decode(br#"{"status": -1}"#).unwrap_err();
        assert!(matches!(err, MessageError::OutOfRange(_)));
    }

    #[test]
    fn rejects_malformed() {
        for payload in [&b"{}"[..], b"{\"status\": \"3\"}", b"not json", b""] {
            assert!(matches!(
                StatusMessage::decode(payload),
                Err(MessageError::Malformed(_))
            ));
        }
    }
}
