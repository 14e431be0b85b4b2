//! JSON Web Key Set document types and key-id derivation.
//!
//! Key IDs are RFC 7638 thumbprints: the SHA-256 digest of the canonical
//! JSON encoding of the public key members, base64url-encoded without
//! padding. Issuer and verifier derive the same id from the same key, so no
//! out-of-band key naming is needed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::digest;
use serde::{Deserialize, Serialize};

/// Key type for Ed25519 keys.
pub const KTY_OKP: &str = "OKP";

/// Curve name for Ed25519 keys.
pub const CRV_ED25519: &str = "Ed25519";

/// A single public key as published in a JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type ("OKP" for Ed25519).
    pub kty: String,

    /// Thumbprint key ID.
    pub kid: String,

    /// Curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// Public key value (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// Algorithm the key is used with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Intended key use ("sig").
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

impl JsonWebKey {
    /// Build the published form of an Ed25519 public key.
    #[must_use]
    pub fn ed25519(public_key: &[u8]) -> Self {
        Self {
            kty: KTY_OKP.to_string(),
            kid: ed25519_thumbprint(public_key),
            crv: Some(CRV_ED25519.to_string()),
            x: Some(URL_SAFE_NO_PAD.encode(public_key)),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
        }
    }

    /// True for Ed25519 signing keys.
    #[must_use]
    pub fn is_ed25519(&self) -> bool {
        self.kty == KTY_OKP && self.crv.as_deref() == Some(CRV_ED25519)
    }
}

/// A JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys.
    pub keys: Vec<JsonWebKey>,
}

fn thumbprint(canonical: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest::digest(&digest::SHA256, canonical.as_bytes()))
}

/// RFC 7638 thumbprint of an Ed25519 public key.
#[must_use]
pub fn ed25519_thumbprint(public_key: &[u8]) -> String {
    let x = URL_SAFE_NO_PAD.encode(public_key);
    thumbprint(&format!(
        r#"{{"crv":"{CRV_ED25519}","kty":"{KTY_OKP}","x":"{x}"}}"#
    ))
}

/// RFC 7638 thumbprint of a symmetric key.
///
/// The digest identifies the secret without revealing it; the key itself is
/// never published.
#[must_use]
pub fn oct_thumbprint(secret: &[u8]) -> String {
    let k = URL_SAFE_NO_PAD.encode(secret);
    thumbprint(&format!(r#"{{"k":"{k}","kty":"oct"}}"#))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_ed25519_thumbprint_rfc8037_vector() {
        let public_key = URL_SAFE_NO_PAD
            .decode("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")
            .unwrap();

        assert_eq!(
            ed25519_thumbprint(&public_key),
            "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k"
        );
    }

    #[test]
    fn test_thumbprint_is_deterministic_and_distinct() {
        let a = ed25519_thumbprint(&[1u8; 32]);
        let b = ed25519_thumbprint(&[2u8; 32]);

        assert_eq!(a, ed25519_thumbprint(&[1u8; 32]));
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert_ne!(oct_thumbprint(b"secret-a"), oct_thumbprint(b"secret-b"));
    }

    #[test]
    fn test_ed25519_jwk_fields() {
        let jwk = JsonWebKey::ed25519(&[9u8; 32]);

        assert!(jwk.is_ed25519());
        assert_eq!(jwk.kid, ed25519_thumbprint(&[9u8; 32]));
        assert_eq!(jwk.alg.as_deref(), Some("EdDSA"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
    }

    #[test]
    fn test_jwks_serialization_uses_standard_names() {
        let set = JwkSet {
            keys: vec![JsonWebKey::ed25519(&[3u8; 32])],
        };

        let json = serde_json::to_value(&set).unwrap();
        let key = &json["keys"][0];
        assert_eq!(key["kty"], "OKP");
        assert_eq!(key["crv"], "Ed25519");
        assert_eq!(key["use"], "sig");
        assert!(key.get("key_use").is_none());
    }

    #[test]
    fn test_jwks_deserialization_tolerates_missing_optionals() {
        let json = r#"{"keys":[{"kty":"OKP","kid":"k1","crv":"Ed25519","x":"AAAA"},{"kty":"RSA","kid":"k2"}]}"#;

        let set: JwkSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.keys.len(), 2);
        assert!(set.keys[0].is_ed25519());
        assert_eq!(set.keys[1].kid, "k2");
        assert!(!set.keys[1].is_ed25519());
    }
}
