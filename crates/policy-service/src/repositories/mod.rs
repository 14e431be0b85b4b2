//! Repository layer for the policy service.
//!
//! All database queries use parameterized statements.

pub mod policy_rules;

pub use policy_rules::PolicyRulesRepository;
