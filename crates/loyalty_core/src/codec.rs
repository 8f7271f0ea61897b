//! crates/loyalty_core/src/codec.rs
//!
//! The QR check-in payload protocol. Decoding turns whatever the operator
//! scanned or pasted into one customer identifier; encoding produces the
//! payload that the QR renderer turns into a bitmap.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discriminant identifying a JSON object as a visit payload.
pub const VISIT_MARKER_TAG: &str = "visit-marker";

/// Note attached to visits registered from a structured payload without one.
pub const DEFAULT_QR_NOTE: &str = "QR check-in";

/// Shortest raw text accepted as a literal customer identifier.
pub const MIN_OPAQUE_ID_LEN: usize = 6;

static QR_IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/customers/([A-Za-z0-9_-]+)/qr").expect("valid regex"));
static QUERY_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[?&](?:cid|customerId)=([A-Za-z0-9_-]+)").expect("valid regex")
});
static ID_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));
static OPAQUE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^[A-Za-z0-9_-]{{{MIN_OPAQUE_ID_LEN},}}$")).expect("valid regex")
});

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unrecognized check-in payload")]
    UnrecognizedPayload,
    #[error("Payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Which decoding rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    VisitMarker,
    QrImageUrl,
    QueryParam,
    OpaqueId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCheckin {
    pub customer_id: String,
    /// Only structured payloads carry the issuing business.
    pub business_id: Option<String>,
    pub note: Option<String>,
    pub source: PayloadSource,
}

/// The JSON document embedded in a customer's QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitMarker {
    pub tag: String,
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_id: Option<String>,
}

/// Produces the payload for `(customer_id, business_id)`. Byte-identical across calls.
pub fn encode(customer_id: &str, business_id: Option<&str>) -> Result<String, CodecError> {
    let marker = VisitMarker {
        tag: VISIT_MARKER_TAG.to_string(),
        customer_id: customer_id.to_string(),
        business_id: business_id.map(str::to_string),
    };
    Ok(serde_json::to_string(&marker)?)
}

/// Resolves scanned or pasted text to a customer identifier. The first matching
/// rule wins: visit payload, QR image URL, `cid`/`customerId` query parameter,
/// bare identifier.
pub fn decode(input: &str) -> Result<DecodedCheckin, CodecError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(CodecError::UnrecognizedPayload);
    }

    if let Some(decoded) = decode_marker(text)? {
        return Ok(decoded);
    }

    let by_pattern = [
        (&*QR_IMAGE_URL, PayloadSource::QrImageUrl),
        (&*QUERY_PARAM, PayloadSource::QueryParam),
    ];
    for (pattern, source) in by_pattern {
        if let Some(id) = pattern.captures(text).and_then(|c| c.get(1)) {
            return Ok(DecodedCheckin {
                customer_id: id.as_str().to_string(),
                business_id: None,
                note: None,
                source,
            });
        }
    }

    if OPAQUE_ID.is_match(text) {
        return Ok(DecodedCheckin {
            customer_id: text.to_string(),
            business_id: None,
            note: None,
            source: PayloadSource::OpaqueId,
        });
    }

    Err(CodecError::UnrecognizedPayload)
}

/// `Ok(None)` when `text` is not a visit payload at all. A tagged payload whose
/// `customerId` is missing or not a plain `[A-Za-z0-9_-]` identifier is rejected
/// outright rather than handed to the weaker rules.
fn decode_marker(text: &str) -> Result<Option<DecodedCheckin>, CodecError> {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) else {
        return Ok(None);
    };
    if object.get("tag").and_then(Value::as_str) != Some(VISIT_MARKER_TAG) {
        return Ok(None);
    }

    let customer_id = object
        .get("customerId")
        .and_then(scalar)
        .filter(|id| ID_SEGMENT.is_match(id))
        .ok_or(CodecError::UnrecognizedPayload)?;
    let note = object
        .get("note")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_QR_NOTE)
        .to_string();

    Ok(Some(DecodedCheckin {
        customer_id,
        business_id: object.get("businessId").and_then(scalar),
        note: Some(note),
        source: PayloadSource::VisitMarker,
    }))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
