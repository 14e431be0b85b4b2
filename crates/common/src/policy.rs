//! Policy rule model shared by the replication client and the rule store.
//!
//! A rule is a `ptype` plus up to six positional string fields. Its section
//! (`p` permission, `g` grouping) is the first character of `ptype`.
//!
//! # Record encoding
//!
//! The persisted and wire-level record always carries six fields `v0..v5`.
//! Encoding pads absent trailing fields with `""`; decoding stops at the
//! first empty field. A rule therefore can never hold an empty field
//! followed by a non-empty one, and [`PolicyRule::new`] rejects such input
//! instead of letting it be silently truncated on the next load.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of positional fields in a rule.
pub const MAX_RULE_FIELDS: usize = 6;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by rule validation and by rule storage/replication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Rule, section or filter violates the encoding rules.
    #[error("Invalid policy rule: {0}")]
    InvalidRule(String),

    /// The replication RPC failed (transport, timeout or server status).
    #[error("Policy replication failed: {0}")]
    Replication(String),

    /// The backing rule store failed.
    #[error("Policy storage failed: {0}")]
    Storage(String),
}

// =============================================================================
// Section
// =============================================================================

/// Rule section, derived from the first character of `ptype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    /// Permission rules (`p`, `p2`, ...).
    Policy,
    /// Role-assignment rules (`g`, `g2`, ...).
    Grouping,
}

impl Section {
    /// Wire name of the section.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Section::Policy => "p",
            Section::Grouping => "g",
        }
    }

    /// Parse a section name as sent on the wire.
    ///
    /// # Errors
    ///
    /// `InvalidRule` for anything other than `p` or `g`.
    pub fn parse(sec: &str) -> Result<Self, PolicyError> {
        match sec {
            "p" => Ok(Section::Policy),
            "g" => Ok(Section::Grouping),
            other => Err(PolicyError::InvalidRule(format!(
                "unknown section '{other}'"
            ))),
        }
    }

    /// Derive the section of a `ptype`.
    ///
    /// # Errors
    ///
    /// `InvalidRule` when `ptype` is empty or starts with neither `p` nor `g`.
    pub fn of_ptype(ptype: &str) -> Result<Self, PolicyError> {
        match ptype.chars().next() {
            Some('p') => Ok(Section::Policy),
            Some('g') => Ok(Section::Grouping),
            Some(_) => Err(PolicyError::InvalidRule(format!(
                "ptype '{ptype}' names no known section"
            ))),
            None => Err(PolicyError::InvalidRule("ptype is empty".to_string())),
        }
    }

    /// Check that an explicitly supplied section agrees with `ptype`.
    ///
    /// # Errors
    ///
    /// `InvalidRule` on disagreement.
    pub fn ensure_matches(self, ptype: &str) -> Result<(), PolicyError> {
        let derived = Section::of_ptype(ptype)?;
        if derived == self {
            Ok(())
        } else {
            Err(PolicyError::InvalidRule(format!(
                "section '{}' does not match ptype '{ptype}'",
                self.as_str()
            )))
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PolicyRule
// =============================================================================

/// A validated policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PolicyRule {
    ptype: String,
    fields: Vec<String>,
}

impl PolicyRule {
    /// Build a rule, trimming trailing empty fields.
    ///
    /// # Errors
    ///
    /// `InvalidRule` when `ptype` has no known section, the rule has no
    /// fields, more than [`MAX_RULE_FIELDS`] fields, or an empty field
    /// followed by a non-empty one.
    pub fn new<P, I, S>(ptype: P, fields: I) -> Result<Self, PolicyError>
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ptype = ptype.into();
        Section::of_ptype(&ptype)?;

        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        while fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }

        if fields.is_empty() {
            return Err(PolicyError::InvalidRule(format!(
                "rule of ptype '{ptype}' has no fields"
            )));
        }
        if fields.len() > MAX_RULE_FIELDS {
            return Err(PolicyError::InvalidRule(format!(
                "rule has {} fields, at most {MAX_RULE_FIELDS} allowed",
                fields.len()
            )));
        }
        if let Some(position) = fields.iter().position(String::is_empty) {
            return Err(PolicyError::InvalidRule(format!(
                "field v{position} is empty but a later field is set"
            )));
        }

        Ok(Self { ptype, fields })
    }

    /// Rule kind, e.g. `p` or `g`.
    #[must_use]
    pub fn ptype(&self) -> &str {
        &self.ptype
    }

    /// Positional fields, never empty and never containing an empty string.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Section derived from `ptype`.
    #[must_use]
    pub fn section(&self) -> Section {
        // ptype was validated in new()
        if self.ptype.starts_with('g') {
            Section::Grouping
        } else {
            Section::Policy
        }
    }

    /// Encode into the fixed-width record form.
    #[must_use]
    pub fn to_record(&self) -> PolicyRecord {
        let mut values = self.fields.iter().cloned();
        let mut next = || values.next().unwrap_or_default();
        PolicyRecord {
            ptype: self.ptype.clone(),
            v0: next(),
            v1: next(),
            v2: next(),
            v3: next(),
            v4: next(),
            v5: next(),
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.ptype, self.fields.join(", "))
    }
}

// =============================================================================
// PolicyRecord
// =============================================================================

/// Fixed-width persisted form of a rule: `ptype, v0..v5`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub ptype: String,
    #[serde(default)]
    pub v0: String,
    #[serde(default)]
    pub v1: String,
    #[serde(default)]
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
}

impl PolicyRecord {
    /// Fields in positional order.
    #[must_use]
    pub fn values(&self) -> [&str; MAX_RULE_FIELDS] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    /// Decode into a rule. Fields after the first empty one are dropped.
    ///
    /// # Errors
    ///
    /// `InvalidRule` when `ptype` is invalid or `v0` is empty.
    pub fn to_rule(&self) -> Result<PolicyRule, PolicyError> {
        let values = self.values();
        let kept: Vec<&str> = values.iter().copied().take_while(|v| !v.is_empty()).collect();

        if values.iter().skip(kept.len()).any(|v| !v.is_empty()) {
            tracing::warn!(
                target: "common.policy",
                ptype = %self.ptype,
                kept = kept.len(),
                "Stored rule has a gap, trailing fields dropped"
            );
        }

        PolicyRule::new(self.ptype.clone(), kept)
    }
}

// =============================================================================
// RuleFilter
// =============================================================================

/// Positional filter used by `RemoveFilteredPolicy`.
///
/// Matches rules of `ptype` whose fields starting at `field_index` equal
/// `field_values` in order. Empty values and fields past the end of
/// `field_values` match anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFilter {
    ptype: String,
    field_index: usize,
    field_values: Vec<String>,
}

impl RuleFilter {
    /// Build a filter.
    ///
    /// # Errors
    ///
    /// `InvalidRule` when `ptype` is invalid or the filter reaches past `v5`.
    pub fn new<P, I, S>(ptype: P, field_index: usize, field_values: I) -> Result<Self, PolicyError>
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ptype = ptype.into();
        Section::of_ptype(&ptype)?;

        let field_values: Vec<String> = field_values.into_iter().map(Into::into).collect();
        if field_index >= MAX_RULE_FIELDS
            || field_index.saturating_add(field_values.len()) > MAX_RULE_FIELDS
        {
            return Err(PolicyError::InvalidRule(format!(
                "filter at index {field_index} with {} values exceeds {MAX_RULE_FIELDS} fields",
                field_values.len()
            )));
        }

        Ok(Self {
            ptype,
            field_index,
            field_values,
        })
    }

    #[must_use]
    pub fn ptype(&self) -> &str {
        &self.ptype
    }

    #[must_use]
    pub fn field_index(&self) -> usize {
        self.field_index
    }

    #[must_use]
    pub fn field_values(&self) -> &[String] {
        &self.field_values
    }

    /// Constrained `(position, value)` pairs, wildcards excluded.
    pub fn constraints(&self) -> impl Iterator<Item = (usize, &str)> + '_ {
        self.field_values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_empty())
            .map(|(i, v)| (self.field_index + i, v.as_str()))
    }

    /// Whether a stored record is selected by this filter.
    #[must_use]
    pub fn matches(&self, record: &PolicyRecord) -> bool {
        if record.ptype != self.ptype {
            return false;
        }
        let values = record.values();
        self.constraints()
            .all(|(position, expected)| values.get(position).copied() == Some(expected))
    }
}

// =============================================================================
// PolicyAdapter
// =============================================================================

/// Storage-independent access to the authoritative rule set.
///
/// Implemented by the replication client embedded in gateways and by the
/// stores behind the replication server.
#[async_trait]
pub trait PolicyAdapter: Send + Sync {
    /// Read every rule.
    async fn load_policy(&self) -> Result<Vec<PolicyRule>, PolicyError>;

    /// Replace every rule. Concurrent loads see the old or the new set.
    async fn save_policy(&self, rules: &[PolicyRule]) -> Result<(), PolicyError>;

    /// Insert one rule.
    async fn add_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError>;

    /// Delete one rule equal to `rule`.
    async fn remove_policy(&self, sec: Section, rule: &PolicyRule) -> Result<(), PolicyError>;

    /// Delete every rule selected by `filter`.
    async fn remove_filtered_policy(
        &self,
        sec: Section,
        filter: &RuleFilter,
    ) -> Result<(), PolicyError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn record(ptype: &str, values: &[&str]) -> PolicyRecord {
        let mut padded = values.iter().map(ToString::to_string).chain(std::iter::repeat(String::new()));
        let mut next = || padded.next().unwrap();
        PolicyRecord {
            ptype: ptype.to_string(),
            v0: next(),
            v1: next(),
            v2: next(),
            v3: next(),
            v4: next(),
            v5: next(),
        }
    }

    // -------------------------------------------------------------------------
    // Section
    // -------------------------------------------------------------------------

    #[test]
    fn test_section_from_ptype() {
        assert_eq!(Section::of_ptype("p").unwrap(), Section::Policy);
        assert_eq!(Section::of_ptype("p2").unwrap(), Section::Policy);
        assert_eq!(Section::of_ptype("g").unwrap(), Section::Grouping);
        assert_eq!(Section::of_ptype("g2").unwrap(), Section::Grouping);
        assert!(Section::of_ptype("x").is_err());
        assert!(Section::of_ptype("").is_err());
    }

    #[test]
    fn test_section_parse_and_ensure() {
        assert_eq!(Section::parse("g").unwrap(), Section::Grouping);
        assert!(Section::parse("policy").is_err());
        assert!(Section::Policy.ensure_matches("p").is_ok());
        assert!(Section::Policy.ensure_matches("g").is_err());
    }

    // -------------------------------------------------------------------------
    // Encode / decode
    // -------------------------------------------------------------------------

    #[test]
    fn test_three_field_rule_round_trips_with_empty_padding() {
        let rule = PolicyRule::new("p", ["alice", "doc1", "read"]).unwrap();
        let record = rule.to_record();

        assert_eq!(record.values(), ["alice", "doc1", "read", "", "", ""]);
        assert_eq!(record.to_rule().unwrap(), rule);
        assert_eq!(rule.fields(), ["alice", "doc1", "read"]);
    }

    #[test]
    fn test_gap_in_fields_is_rejected_on_write() {
        let err = PolicyRule::new("p", ["a", "", "b"]).unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
    }

    #[test]
    fn test_trailing_empty_fields_are_trimmed() {
        let rule = PolicyRule::new("p", ["alice", "doc1", "read", "", ""]).unwrap();
        assert_eq!(rule.fields().len(), 3);
    }

    #[test]
    fn test_arity_is_bounded() {
        assert!(PolicyRule::new("p", ["1", "2", "3", "4", "5", "6"]).is_ok());
        assert!(PolicyRule::new("p", ["1", "2", "3", "4", "5", "6", "7"]).is_err());
        assert!(PolicyRule::new("p", Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_decode_stops_at_first_empty_field() {
        let stored = record("p", &["alice", "", "read"]);
        let rule = stored.to_rule().unwrap();

        assert_eq!(rule.fields(), ["alice"]);
    }

    #[test]
    fn test_decode_rejects_record_without_fields() {
        assert!(record("p", &[]).to_rule().is_err());
        assert!(record("", &["alice"]).to_rule().is_err());
    }

    #[test]
    fn test_rule_section_and_display() {
        let rule = PolicyRule::new("g", ["alice", "admin"]).unwrap();
        assert_eq!(rule.section(), Section::Grouping);
        assert_eq!(rule.to_string(), "g, alice, admin");
    }

    #[test]
    fn test_record_deserializes_with_missing_fields() {
        let stored: PolicyRecord =
            serde_json::from_str(r#"{"ptype":"p","v0":"anonymous","v1":"/v1/health","v2":"GET"}"#)
                .unwrap();
        assert_eq!(stored.v3, "");
        assert_eq!(stored.to_rule().unwrap().fields().len(), 3);
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    #[test]
    fn test_filter_on_second_field_ignores_first() {
        let filter = RuleFilter::new("p", 1, ["doc1"]).unwrap();

        assert!(filter.matches(&record("p", &["alice", "doc1", "read"])));
        assert!(filter.matches(&record("p", &["bob", "doc1", "write"])));
        assert!(!filter.matches(&record("p", &["alice", "doc2", "read"])));
        assert!(!filter.matches(&record("p2", &["alice", "doc1", "read"])));
    }

    #[test]
    fn test_filter_empty_value_is_wildcard() {
        let filter = RuleFilter::new("p", 0, ["", "doc1", "read"]).unwrap();

        assert!(filter.matches(&record("p", &["alice", "doc1", "read"])));
        assert!(filter.matches(&record("p", &["bob", "doc1", "read"])));
        assert!(!filter.matches(&record("p", &["bob", "doc1", "write"])));
    }

    #[test]
    fn test_filter_without_values_matches_whole_ptype() {
        let filter = RuleFilter::new("g", 0, Vec::<String>::new()).unwrap();

        assert!(filter.matches(&record("g", &["alice", "admin"])));
        assert!(!filter.matches(&record("p", &["alice", "doc1", "read"])));
    }

    #[test]
    fn test_filter_bounds() {
        assert!(RuleFilter::new("p", 5, ["x"]).is_ok());
        assert!(RuleFilter::new("p", 5, ["x", "y"]).is_err());
        assert!(RuleFilter::new("p", 6, Vec::<String>::new()).is_err());
        assert!(RuleFilter::new("", 0, ["x"]).is_err());
    }

    #[test]
    fn test_filter_constraints_skip_wildcards() {
        let filter = RuleFilter::new("p", 1, ["doc1", "", "x"]).unwrap();
        let constraints: Vec<(usize, &str)> = filter.constraints().collect();

        assert_eq!(constraints, vec![(1, "doc1"), (3, "x")]);
    }
}
