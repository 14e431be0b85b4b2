//! Typed JWT claims.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Registered claim names. Custom claims may never use these.
pub const RESERVED_CLAIMS: [&str; 7] = ["sub", "iss", "aud", "jti", "iat", "nbf", "exp"];

/// Claims carried by a token.
///
/// Registered claims are typed; anything else lands in `custom`. The
/// `sub` field is redacted in Debug output.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal identifier).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audiences. A single string on the wire is read as a one-element set.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_audience"
    )]
    pub aud: Vec<String>,

    /// Token ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub nbf: Option<i64>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_numeric_date"
    )]
    pub exp: Option<i64>,

    /// Caller-supplied claims.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("jti", &self.jti)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("exp", &self.exp)
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Claims {
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    #[must_use]
    pub fn token_id(&self) -> Option<&str> {
        self.jti.as_deref()
    }

    #[must_use]
    pub fn audiences(&self) -> &[String] {
        &self.aud
    }

    #[must_use]
    pub fn issued_at(&self) -> Option<i64> {
        self.iat
    }

    #[must_use]
    pub fn not_before(&self) -> Option<i64> {
        self.nbf
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        self.exp
    }

    /// Look up a custom claim.
    #[must_use]
    pub fn custom_claim(&self, name: &str) -> Option<&Value> {
        self.custom.get(name)
    }

    /// True when every audience in `required` is present in the token.
    #[must_use]
    pub fn has_audiences(&self, required: &[String]) -> bool {
        required.iter().all(|a| self.aud.contains(a))
    }
}

fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<Audience>::deserialize(deserializer)? {
        Some(Audience::One(aud)) => vec![aud],
        Some(Audience::Many(auds)) => auds,
        None => Vec::new(),
    })
}

fn deserialize_numeric_date<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(secs) = n.as_i64() {
                return Ok(Some(secs));
            }
            match n.as_f64() {
                // fractional NumericDate values are truncated to whole seconds
                #[allow(clippy::cast_possible_truncation)]
                Some(secs) if secs.is_finite() && secs.abs() < 9.0e15 => Ok(Some(secs.trunc() as i64)),
                _ => Err(serde::de::Error::custom("NumericDate out of range")),
            }
        }
        _ => Err(serde::de::Error::custom("NumericDate must be a number")),
    }
}
