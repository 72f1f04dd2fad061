//! JSON serialization for the `RoomChat` wire protocol.
//!
//! Outbound frames are always well-formed JSON. Inbound payloads are
//! decoded leniently with [`decode_inbound`]: anything that is not a
//! recognized frame still becomes a [`Frame::System`] notice, because the
//! server is allowed to push plain-text announcements.

use serde_json::Value;

use crate::frame::Frame;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How an inbound payload was turned into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The payload was a well-formed frame.
    Structured,
    /// The payload was JSON but not a known frame; its `text` field was kept.
    UnknownShape,
    /// The payload was not JSON (or had no usable text); kept verbatim.
    PlainText,
}

/// Result of decoding an inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// The decoded (or synthesized) frame.
    pub frame: Frame,
    /// Which decoding path produced `frame`.
    pub origin: Origin,
}

/// Encodes a [`Frame`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the frame cannot be serialized.
pub fn encode(frame: &Frame) -> Result<String, CodecError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decodes a [`Frame`] from a JSON string, strictly.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid frame.
pub fn decode(text: &str) -> Result<Frame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes an inbound payload, never failing.
///
/// 1. A valid frame is returned as-is.
/// 2. A JSON object with a string `text` field (e.g. the server's
///    `{"type":"error","text":...}`) becomes a system notice carrying that
///    text, plus `room`/`user` when they are strings.
/// 3. Anything else becomes a global system notice with the raw payload.
#[must_use]
pub fn decode_inbound(text: &str) -> Inbound {
    if let Ok(frame) = decode(text) {
        return Inbound {
            frame,
            origin: Origin::Structured,
        };
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text)
        && let Some(body) = map.get("text").and_then(Value::as_str)
    {
        let field = |name: &str| map.get(name).and_then(Value::as_str).map(str::to_owned);
        return Inbound {
            frame: Frame::System {
                text: body.to_owned(),
                room: field("room"),
                user: field("user"),
            },
            origin: Origin::UnknownShape,
        };
    }

    Inbound {
        frame: Frame::system(text),
        origin: Origin::PlainText,
    }
}
