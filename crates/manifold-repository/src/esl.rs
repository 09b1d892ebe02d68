//! ESL encode/decode: the audit form of a transformer.
//!
//! A transformer is stored as its event type plus the JSON of its payload
//! struct. Decoding selects the payload type from the event type; an unknown
//! event type or malformed payload is a hard error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use manifold_state::EslEventRow;

use crate::transformer::{EventType, Transformer};

/// Errors raised while encoding or decoding event-log payloads.
#[derive(Debug, Error)]
pub enum EslError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("malformed {event_type} event: {reason}")]
    Malformed {
        event_type: EventType,
        reason: String,
    },

    #[error("failed to encode {event_type} event: {reason}")]
    Encode {
        event_type: EventType,
        reason: String,
    },
}

/// A transformer in its stored form, without sequence or timestamp.
///
/// This is also the format `manifoldd apply` reads from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EslEnvelope {
    pub event_type: String,
    pub event_json: String,
}

impl EslEnvelope {
    pub fn decode(&self) -> Result<Transformer, EslError> {
        decode(&self.event_type, &self.event_json)
    }
}

/// Encode a transformer into its discriminator and payload JSON.
pub fn encode(transformer: &Transformer) -> Result<(EventType, String), EslError> {
    let event_type = transformer.event_type();
    let json = transformer
        .payload_json()
        .map_err(|e| EslError::Encode {
            event_type,
            reason: e.to_string(),
        })?;
    Ok((event_type, json))
}

/// Encode a transformer into an envelope.
pub fn envelope(transformer: &Transformer) -> Result<EslEnvelope, EslError> {
    let (event_type, event_json) = encode(transformer)?;
    Ok(EslEnvelope {
        event_type: event_type.as_str().to_string(),
        event_json,
    })
}

/// Decode a payload given its stored event type string.
pub fn decode(event_type: &str, json: &str) -> Result<Transformer, EslError> {
    let event_type: EventType = event_type
        .parse()
        .map_err(|e: crate::transformer::UnknownEventType| EslError::UnknownEventType(e.0))?;
    Transformer::from_payload_json(event_type, json).map_err(|e| EslError::Malformed {
        event_type,
        reason: e.to_string(),
    })
}

/// Decode a stored event-log row.
pub fn decode_row(row: &EslEventRow) -> Result<Transformer, EslError> {
    decode(&row.event_type, &row.event_json)
}
