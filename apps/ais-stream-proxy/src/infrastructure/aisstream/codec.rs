//! Frame Codec
//!
//! Decodes upstream WebSocket frames into [`AisFrame`] values.
//!
//! AISStream sends JSON objects, sometimes as text frames and sometimes as
//! binary frames holding UTF-8 JSON. Both are accepted.

use serde_json::Value;

use super::messages::{AisFrame, Envelope, PositionReport, ShipStaticData};

/// Codec errors. A frame that fails to decode is discarded by the caller.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame is not UTF-8.
    #[error("binary frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Frame has neither a `MessageType` nor an `error` field.
    #[error("frame has no MessageType")]
    MissingMessageType,

    /// `Message` does not contain an object for the declared type.
    #[error("frame declares {0} but carries no {0} body")]
    MissingBody(String),
}

/// JSON codec for the AISStream feed.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object or the declared
    /// message body is missing.
    pub fn decode(&self, text: &str) -> Result<AisFrame, CodecError> {
        let envelope: Envelope = serde_json::from_str(text.trim())?;

        if let Some(error) = envelope.error {
            return Ok(AisFrame::Error(error));
        }

        let message_type = envelope
            .message_type
            .ok_or(CodecError::MissingMessageType)?;
        let meta = envelope.meta.unwrap_or_default();

        match message_type.as_str() {
            "PositionReport" => {
                let report: PositionReport =
                    Self::body(envelope.message, &message_type)?;
                Ok(AisFrame::PositionReport { meta, report })
            }
            "ShipStaticData" => {
                let data: ShipStaticData = Self::body(envelope.message, &message_type)?;
                Ok(AisFrame::ShipStaticData { meta, data })
            }
            _ => Ok(AisFrame::Unknown(message_type)),
        }
    }

    /// Decode a binary frame holding UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or fail [`Self::decode`].
    pub fn decode_binary(&self, bytes: &[u8]) -> Result<AisFrame, CodecError> {
        let text = std::str::from_utf8(bytes)?;
        self.decode(text)
    }

    fn body<T>(message: Option<Value>, message_type: &str) -> Result<T, CodecError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = message
            .and_then(|mut m| m.get_mut(message_type).map(Value::take))
            .filter(Value::is_object)
            .ok_or_else(|| CodecError::MissingBody(message_type.to_string()))?;

        Ok(serde_json::from_value(body)?)
    }
}
