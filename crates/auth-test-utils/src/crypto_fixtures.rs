//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWKS form, and a fixed
//! HMAC secret. All fixtures are deterministic based on seed values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::jwks::{JsonWebKey, JwkSet};
use ring::signature::{Ed25519KeyPair, KeyPair};

/// Shared secret for HMAC test tokens.
pub const TEST_HMAC_SECRET: &str = "gatekeeper-test-hmac-secret-0123456789";

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    for (i, byte) in bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    bytes
}

/// Deterministic Ed25519 private key as a PKCS#8 v1 document.
///
/// The same seed always produces the same key.
pub fn test_ed25519_pkcs8(seed: u8) -> Vec<u8> {
    build_pkcs8_from_seed(&seed_bytes(seed))
}

/// [`test_ed25519_pkcs8`] base64-encoded, the form `JWT_SIGNING_KEY` takes.
pub fn test_ed25519_pkcs8_base64(seed: u8) -> String {
    STANDARD.encode(test_ed25519_pkcs8(seed))
}

/// Raw 32-byte public key for `seed`.
pub fn test_ed25519_public_key(seed: u8) -> Vec<u8> {
    let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes(seed))
        .expect("fixed seed is a valid Ed25519 seed");
    key_pair.public_key().as_ref().to_vec()
}

/// Published JWK for `seed`, with its thumbprint kid.
pub fn test_public_jwk(seed: u8) -> JsonWebKey {
    JsonWebKey::ed25519(&test_ed25519_public_key(seed))
}

/// JWKS document holding the keys for `seeds`.
pub fn test_jwk_set(seeds: &[u8]) -> JwkSet {
    JwkSet {
        keys: seeds.iter().copied().map(test_public_jwk).collect(),
    }
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production keys come from
/// `ring::rand::SystemRandom`.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { version 0, AlgorithmIdentifier { 1.3.101.112 },
    //            OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);

    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}
