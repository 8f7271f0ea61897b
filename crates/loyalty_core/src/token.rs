//! crates/loyalty_core/src/token.rs
//!
//! Reads the claims embedded in the bearer token. The signature is never
//! checked here; the claims only supply the role, the business scope and the
//! expiry.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token is not a three-part JWT")]
    Malformed,
    #[error("Token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("Token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    #[serde(default)]
    sub: Option<Value>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "business_id")]
    business_id: Option<Value>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    pub fn subject(&self) -> Option<String> {
        self.sub.as_ref().and_then(scalar_to_string)
    }

    pub fn business_id(&self) -> Option<String> {
        self.business_id.as_ref().and_then(scalar_to_string)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decodes the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}
