//! Prediction events published by the toxicity classifier.

use serde::Deserialize;
use thiserror::Error;

/// Failure to turn a broker payload into a [`PredictionEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("record has no payload")]
    EmptyPayload,

    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not a valid prediction: {0}")]
    Json(#[from] serde_json::Error),
}

/// One classifier verdict about a single Discord message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PredictionEvent {
    pub channel_id: u64,
    pub message_id: u64,
    pub is_toxic: bool,
}

impl PredictionEvent {
    /// Decode a UTF-8 JSON payload. Unknown fields are ignored; all three
    /// known fields must be present, with integer ids and a boolean verdict.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(payload)?;
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer_ids() {
        let event =
            PredictionEvent::decode(br#"{"channel_id": 10, "message_id": 20, "is_toxic": true}"#)
                .unwrap();
        assert_eq!(
            event,
            PredictionEvent {
                channel_id: 10,
                message_id: 20,
                is_toxic: true,
            }
        );
    }

    #[test]
    fn test_decode_large_snowflakes() {
        let event = PredictionEvent::decode(
            br#"{"channel_id": 1184531786043527178, "message_id": 1184531786043527179, "is_toxic": false}"#,
        )
        .unwrap();
        assert_eq!(event.channel_id, 1184531786043527178);
        assert_eq!(event.message_id, 1184531786043527179);
        assert!(!event.is_toxic);
    }

    #[test]
    fn test_decode_rejects_string_ids() {
        for payload in [
            r#"{"channel_id": "10", "message_id": 20, "is_toxic": true}"#,
            r#"{"channel_id": 10, "message_id": "20", "is_toxic": true}"#,
            r#"{"channel_id": "10", "message_id": "20", "is_toxic": true}"#,
        ] {
            let err = PredictionEvent::decode(payload.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::Json(_)), "{payload}: {err}");
            assert!(err.to_string().contains("invalid type"), "{payload}: {err}");
        }
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let event = PredictionEvent::decode(
            br#"{"channel_id": 1, "message_id": 2, "is_toxic": false, "score": 0.12}"#,
        )
        .unwrap();
        assert_eq!(event.message_id, 2);
    }

    #[test]
    fn test_decode_missing_fields() {
        for payload in [
            r#"{"message_id": 2, "is_toxic": true}"#,
            r#"{"channel_id": 1, "is_toxic": true}"#,
            r#"{"channel_id": 1, "message_id": 2}"#,
        ] {
            let err = PredictionEvent::decode(payload.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::Json(_)), "{payload}: {err}");
            assert!(err.to_string().contains("missing field"));
        }
    }

    #[test]
    fn test_decode_wrong_types() {
        for payload in [
            r#"{"channel_id": -1, "message_id": 2, "is_toxic": true}"#,
            r#"{"channel_id": "abc", "message_id": 2, "is_toxic": true}"#,
            r#"{"channel_id": 1, "message_id": 2, "is_toxic": "yes"}"#,
            r#"{"channel_id": 1.5, "message_id": 2, "is_toxic": true}"#,
        ] {
            assert!(PredictionEvent::decode(payload.as_bytes()).is_err(), "{payload}");
        }
    }

    #[test]
    fn test_decode_not_json() {
        let err = PredictionEvent::decode(b"channel_id=1").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = PredictionEvent::decode(&[0xff, 0xfe, 0x7b]).unwrap_err();
        assert!(matches!(err, DecodeError::Utf8(_)));
    }
}
