//! Shared building blocks for gateway authentication and policy replication.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// JWT header inspection, size limits and temporal checks
pub mod jwt;

/// JWKS document types and thumbprint key ids
pub mod jwks;

/// Policy rule model, record codec and storage adapter trait
pub mod policy;

/// Secret types that prevent accidental logging
pub mod secret;
