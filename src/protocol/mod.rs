//! Wire-message codec
//!
//! Every client-to-server frame is a JSON array envelope `[tag, payload]`.
//! The `"join"` tag carries the handshake; any other tag is a client event
//! whose payload is handed verbatim to the runtime's own decoder. Decode
//! failures surface as typed [`DecodeError`] values and never escape this
//! boundary as panics.

use serde_json::Value;

use crate::error::{DecodeError, DecodeResult};

/// Envelope tag of the join handshake
pub const JOIN_TAG: &str = "join";

/// The join handshake payload
///
/// `csrf` is required; `id` and `initialProps` are optional. An explicit
/// JSON `null` counts as absent for both optional fields.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPayload {
    /// Client-chosen session identifier, used for log correlation only
    pub id: Option<String>,

    /// CSRF token to be checked by the injected validator
    pub csrf: String,

    /// Opaque initial parameters for component-mode element construction
    pub initial_props: Option<Value>,
}

/// A decoded client-to-server message
#[derive(Debug)]
pub enum WireMessage<E> {
    /// The join handshake
    Join(JoinPayload),

    /// Any other tag, decoded by the runtime's event decoder
    ClientEvent(E),
}

/// Decode a raw text frame into a [`WireMessage`].
///
/// `decode_event` is the external client-message decoder; it receives the
/// envelope tag and the payload of every non-join frame, and its failures
/// propagate as [`DecodeError`].
pub fn decode<E, D>(raw: &str, decode_event: D) -> DecodeResult<WireMessage<E>>
where
    D: FnOnce(&str, Value) -> DecodeResult<E>,
{
    let envelope: Value = serde_json::from_str(raw)?;

    let mut parts = match envelope {
        Value::Array(parts) if parts.len() == 2 => parts,
        _ => return Err(DecodeError::Envelope),
    };

    let (Some(payload), Some(tag)) = (parts.pop(), parts.pop()) else {
        return Err(DecodeError::Envelope);
    };
    let Value::String(tag) = tag else {
        return Err(DecodeError::Envelope);
    };

    if tag == JOIN_TAG {
        decode_join(payload).map(WireMessage::Join)
    } else {
        decode_event(&tag, payload).map(WireMessage::ClientEvent)
    }
}

fn decode_join(payload: Value) -> DecodeResult<JoinPayload> {
    let Value::Object(mut fields) = payload else {
        return Err(DecodeError::JoinField("payload"));
    };

    let csrf = match fields.remove("csrf") {
        Some(Value::String(token)) => token,
        _ => return Err(DecodeError::JoinField("csrf")),
    };

    let id = match fields.remove("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(_) => return Err(DecodeError::JoinField("id")),
    };

    let initial_props = fields.remove("initialProps").filter(|v| !v.is_null());

    Ok(JoinPayload {
        id,
        csrf,
        initial_props,
    })
}
