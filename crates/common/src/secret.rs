//! Secret types for protecting key material from accidental logging.
//!
//! Re-exports [`secrecy`] types. `SecretString` and `SecretBox<T>` implement
//! `Debug` with redaction, so configuration structs that derive `Debug` stay
//! safe to log.
//!
//! Use `SecretString` for HMAC signing secrets and encoded private keys read
//! from the environment. Use `SecretBox<Vec<u8>>` for decoded private key
//! bytes (PKCS#8 documents).
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     algorithm: String,
//!     key: SecretString,
//! }
//!
//! let config = SigningConfig {
//!     algorithm: "HS256".to_string(),
//!     key: SecretString::from("hmac-secret"),
//! };
//!
//! assert!(!format!("{config:?}").contains("hmac-secret"));
//! assert_eq!(config.key.expose_secret(), "hmac-secret");
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hmac-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hmac-secret"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("key-material");
        assert_eq!(secret.expose_secret(), "key-material");
    }

    #[test]
    fn test_secret_bytes_are_redacted() {
        let key: SecretBox<Vec<u8>> = SecretBox::new(Box::new(vec![0x30, 0x2e, 0x02, 0x01]));
        let debug_str = format!("{key:?}");

        assert!(debug_str.contains("REDACTED"));
        assert_eq!(key.expose_secret().len(), 4);
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct SigningKeyFile {
            algorithm: String,
            key: SecretString,
        }

        let json = r#"{"algorithm": "HS256", "key": "my-secret-value"}"#;
        let creds: SigningKeyFile = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.key.expose_secret(), "my-secret-value");

        // Verify debug doesn't expose the value
        let debug = format!("{creds:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
