//! Wire types and generated gRPC glue for policy replication.
//!
//! The service `gatekeeper.policy.PolicyReplication` lets every gateway load
//! the authoritative rule set and forward explicit rule mutations to the
//! store that owns it.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)] // Generated code has various doc formatting

// Re-export prost traits for convenience
pub use prost::Message;

pub mod policy {
    //! Policy replication messages and service

    use common::policy::{PolicyError, PolicyRule, RuleFilter, Section};

    /// No payload.
    #[derive(Clone, Copy, PartialEq, ::prost::Message)]
    pub struct Empty {}

    /// One rule: its ptype and up to six positional fields.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Policy {
        #[prost(string, tag = "1")]
        pub ptype: ::prost::alloc::string::String,
        #[prost(string, repeated, tag = "2")]
        pub rule: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    /// A full rule set.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Policies {
        #[prost(message, repeated, tag = "1")]
        pub policies: ::prost::alloc::vec::Vec<Policy>,
    }

    /// Input of AddPolicy and RemovePolicy.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PolicyRequest {
        #[prost(string, tag = "1")]
        pub sec: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub ptype: ::prost::alloc::string::String,
        #[prost(string, repeated, tag = "3")]
        pub rule: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    /// Input of RemoveFilteredPolicy.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FilteredPolicyRequest {
        #[prost(string, tag = "1")]
        pub sec: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub ptype: ::prost::alloc::string::String,
        #[prost(uint32, tag = "3")]
        pub field_index: u32,
        #[prost(string, repeated, tag = "4")]
        pub field_values: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    }

    impl From<&PolicyRule> for Policy {
        fn from(rule: &PolicyRule) -> Self {
            Self {
                ptype: rule.ptype().to_string(),
                rule: rule.fields().to_vec(),
            }
        }
    }

    impl TryFrom<Policy> for PolicyRule {
        type Error = PolicyError;

        fn try_from(policy: Policy) -> Result<Self, Self::Error> {
            PolicyRule::new(policy.ptype, policy.rule)
        }
    }

    impl Policies {
        /// Encode a rule set.
        pub fn from_rules(rules: &[PolicyRule]) -> Self {
            Self {
                policies: rules.iter().map(Policy::from).collect(),
            }
        }

        /// Decode and validate every rule.
        pub fn into_rules(self) -> Result<Vec<PolicyRule>, PolicyError> {
            self.policies.into_iter().map(PolicyRule::try_from).collect()
        }
    }

    impl PolicyRequest {
        pub fn new(sec: Section, rule: &PolicyRule) -> Self {
            Self {
                sec: sec.as_str().to_string(),
                ptype: rule.ptype().to_string(),
                rule: rule.fields().to_vec(),
            }
        }

        /// Validate into a section and rule that agree with each other.
        pub fn into_parts(self) -> Result<(Section, PolicyRule), PolicyError> {
            let sec = Section::parse(&self.sec)?;
            sec.ensure_matches(&self.ptype)?;
            let rule = PolicyRule::new(self.ptype, self.rule)?;
            Ok((sec, rule))
        }
    }

    impl FilteredPolicyRequest {
        pub fn new(sec: Section, filter: &RuleFilter) -> Self {
            Self {
                sec: sec.as_str().to_string(),
                ptype: filter.ptype().to_string(),
                // field_index is bounded by MAX_RULE_FIELDS
                field_index: u32::try_from(filter.field_index()).unwrap_or(u32::MAX),
                field_values: filter.field_values().to_vec(),
            }
        }

        /// Validate into a section and filter that agree with each other.
        pub fn into_parts(self) -> Result<(Section, RuleFilter), PolicyError> {
            let sec = Section::parse(&self.sec)?;
            sec.ensure_matches(&self.ptype)?;
            let field_index = usize::try_from(self.field_index).map_err(|_| {
                PolicyError::InvalidRule(format!("field index {} out of range", self.field_index))
            })?;
            let filter = RuleFilter::new(self.ptype, field_index, self.field_values)?;
            Ok((sec, filter))
        }
    }

    include!(concat!(env!("OUT_DIR"), "/gatekeeper.policy.PolicyReplication.rs"));

    #[cfg(test)]
    #[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
    mod tests {
        use super::*;
        use prost::Message;

        #[test]
        fn test_policy_wire_round_trip() {
            let rule = PolicyRule::new("p", ["alice", "/v1/content/:id", "GET"]).unwrap();
            let bytes = Policy::from(&rule).encode_to_vec();

            let decoded = Policy::decode(bytes.as_slice()).unwrap();
            assert_eq!(PolicyRule::try_from(decoded).unwrap(), rule);
        }

        #[test]
        fn test_policies_reject_gap_on_decode() {
            let policies = Policies {
                policies: vec![Policy {
                    ptype: "p".to_string(),
                    rule: vec!["a".to_string(), String::new(), "b".to_string()],
                }],
            };

            assert!(matches!(
                policies.into_rules(),
                Err(PolicyError::InvalidRule(_))
            ));
        }

        #[test]
        fn test_policy_request_section_must_match_ptype() {
            let request = PolicyRequest {
                sec: "g".to_string(),
                ptype: "p".to_string(),
                rule: vec!["alice".to_string(), "doc1".to_string(), "read".to_string()],
            };

            assert!(request.into_parts().is_err());
        }

        #[test]
        fn test_policy_request_round_trip() {
            let rule = PolicyRule::new("g", ["alice", "admin"]).unwrap();
            let (sec, parsed) = PolicyRequest::new(Section::Grouping, &rule)
                .into_parts()
                .unwrap();

            assert_eq!(sec, Section::Grouping);
            assert_eq!(parsed, rule);
        }

        #[test]
        fn test_filtered_request_round_trip() {
            let filter = RuleFilter::new("p", 1, ["doc1"]).unwrap();
            let request = FilteredPolicyRequest::new(Section::Policy, &filter);
            assert_eq!(request.field_index, 1);

            let (sec, parsed) = request.into_parts().unwrap();
            assert_eq!(sec, Section::Policy);
            assert_eq!(parsed, filter);
        }

        #[test]
        fn test_filtered_request_out_of_range_index() {
            let request = FilteredPolicyRequest {
                sec: "p".to_string(),
                ptype: "p".to_string(),
                field_index: 7,
                field_values: vec![],
            };

            assert!(request.into_parts().is_err());
        }
    }
}
