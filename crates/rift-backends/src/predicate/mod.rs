//! Matching primitives shared by the HTTP and gRPC rule engines.
//!
//! A [`Matcher`] is a literal value, a regex pattern, a wildcard, an
//! alternative set, a nested mapping or an arbitrary predicate. A
//! [`MappingValidator`] checks a whole key/value mapping (query parameters,
//! headers, decoded message fields) against a set of `key matcher -> value
//! matcher` entries, either exactly or tolerating extra keys.
//!
//! # Module Structure
//!
//! - `matcher` - single-value matchers and their serde configuration form
//! - `mapping` - mapping validation and the [`MatchFailure`] report

mod mapping;
mod matcher;

pub use mapping::{EntryConfig, KeyMatcher, MappingConfig, MappingValidator, MatchFailure};
pub use matcher::{Matcher, MatcherConfig};
