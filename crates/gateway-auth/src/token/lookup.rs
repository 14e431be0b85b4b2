//! Token location parsing and extraction.
//!
//! A lookup is written `location:name[:scheme]`, for example
//! `header:Authorization:Bearer`, `query:token` or `cookie:jwt`.

use crate::errors::AuthError;
use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Default lookup: the `Authorization` header with the `Bearer` scheme.
pub const DEFAULT_TOKEN_LOOKUP: &str = "header:Authorization:Bearer";

/// Where a token is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLocation {
    Header,
    Query,
    Cookie,
}

/// A parsed lookup specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLookup {
    location: TokenLocation,
    name: String,
    scheme: Option<String>,
}

/// Error for lookup strings that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTokenLookup(pub String);

impl fmt::Display for InvalidTokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid token lookup '{}'", self.0)
    }
}

impl std::error::Error for InvalidTokenLookup {}

impl FromStr for TokenLookup {
    type Err = InvalidTokenLookup;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTokenLookup(spec.to_string());
        let mut parts = spec.trim().splitn(3, ':');

        let location = match parts.next() {
            Some("header") => TokenLocation::Header,
            Some("query") => TokenLocation::Query,
            Some("cookie") => TokenLocation::Cookie,
            _ => return Err(invalid()),
        };

        let name = parts
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(invalid)?
            .to_string();

        let scheme = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        if scheme.is_some() && location != TokenLocation::Header {
            return Err(invalid());
        }

        Ok(Self {
            location,
            name,
            scheme,
        })
    }
}

impl Default for TokenLookup {
    fn default() -> Self {
        Self {
            location: TokenLocation::Header,
            name: "Authorization".to_string(),
            scheme: Some("Bearer".to_string()),
        }
    }
}

impl fmt::Display for TokenLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match self.location {
            TokenLocation::Header => "header",
            TokenLocation::Query => "query",
            TokenLocation::Cookie => "cookie",
        };
        write!(f, "{location}:{}", self.name)?;
        if let Some(scheme) = &self.scheme {
            write!(f, ":{scheme}")?;
        }
        Ok(())
    }
}

impl TokenLookup {
    #[must_use]
    pub fn location(&self) -> TokenLocation {
        self.location
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// Extract the candidate token from a request.
    ///
    /// # Errors
    ///
    /// - `NoToken` when the configured location holds nothing
    /// - `InvalidToken` when a header is present but unreadable or carries the
    ///   wrong scheme
    pub fn extract(&self, headers: &HeaderMap, uri: &Uri) -> Result<String, AuthError> {
        match self.location {
            TokenLocation::Header => self.from_header(headers),
            TokenLocation::Query => self.from_query(uri),
            TokenLocation::Cookie => self.from_cookie(headers),
        }
    }

    fn from_header(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        let Some(value) = headers.get(self.name.as_str()) else {
            return Err(AuthError::NoToken);
        };
        let value = value.to_str().map_err(|_| {
            tracing::debug!(target: "gateway.auth.lookup", header = %self.name, "Header is not valid ASCII");
            AuthError::invalid_token()
        })?;
        if value.is_empty() {
            return Err(AuthError::NoToken);
        }

        let Some(scheme) = &self.scheme else {
            return Ok(value.to_string());
        };

        match value.split_once(' ') {
            Some((found, token)) if found == scheme && !token.is_empty() => Ok(token.to_string()),
            _ => {
                tracing::debug!(
                    target: "gateway.auth.lookup",
                    header = %self.name,
                    "Invalid auth header format"
                );
                Err(AuthError::invalid_token())
            }
        }
    }

    fn from_query(&self, uri: &Uri) -> Result<String, AuthError> {
        let Ok(Query(params)) = Query::<HashMap<String, String>>::try_from_uri(uri) else {
            tracing::debug!(target: "gateway.auth.lookup", "Query string could not be parsed");
            return Err(AuthError::NoToken);
        };

        params
            .get(&self.name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(AuthError::NoToken)
    }

    fn from_cookie(&self, headers: &HeaderMap) -> Result<String, AuthError> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.to_string())
            .filter(|v| !v.is_empty())
            .ok_or(AuthError::NoToken)
    }
}
