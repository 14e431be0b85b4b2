//! Token issuance and verification.

pub mod claims;
pub mod issuer;
pub mod keys;
pub mod lookup;
pub mod verifier;

pub use claims::Claims;
pub use issuer::{IssuerConfig, TokenIssuer};
pub use keys::{
    KeyMaterialProvider, RemoteJwksProvider, SigningAlgorithm, SigningKey, StaticKeyProvider,
    VerificationKey, VerificationKeys,
};
pub use lookup::TokenLookup;
pub use verifier::{TokenVerifier, VerifierConfig};
