//! Mapping validation.
//!
//! Resolution order follows the usual schema-validator rules: for every actual
//! key the entries are tried by key class (literal keys first, then callables,
//! patterns, wildcards), optional entries after required ones of the same
//! class. The first entry whose key matcher accepts the key owns it, and its
//! value matcher decides; a rejected value fails the whole mapping. Every
//! required entry must own at least one key. Keys owned by no entry fail
//! unless extra keys are ignored.

use super::matcher::{Matcher, MatcherConfig};
use crate::error::BackendError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Structural mismatch report.
///
/// Messages are ordered outermost first, e.g.
/// `Key 'q' error:` followed by `"ya" does not match "vk"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFailure {
    messages: Vec<String>,
}

impl MatchFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    fn prepend(mut self, message: impl Into<String>) -> Self {
        self.messages.insert(0, message.into());
        self
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl fmt::Display for MatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join("\n"))
    }
}

impl std::error::Error for MatchFailure {}

/// Key side of a mapping entry.
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    pub matcher: Matcher,
    /// Optional keys don't have to be present in the actual mapping.
    pub optional: bool,
}

impl KeyMatcher {
    /// An optional key ranks right after required keys of the same class.
    fn sort_class(&self) -> u8 {
        self.matcher.priority() * 2 + u8::from(self.optional)
    }
}

impl fmt::Display for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "Optional({})", self.matcher)
        } else {
            write!(f, "{}", self.matcher)
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    key: KeyMatcher,
    value: Matcher,
}

/// Validator for a string-keyed mapping.
#[derive(Debug, Clone, Default)]
pub struct MappingValidator {
    entries: Vec<Entry>,
    case_insensitive_keys: bool,
}

impl MappingValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required entry.
    pub fn entry(mut self, key: impl Into<Matcher>, value: impl Into<Matcher>) -> Self {
        self.entries.push(Entry {
            key: KeyMatcher {
                matcher: key.into(),
                optional: false,
            },
            value: value.into(),
        });
        self
    }

    /// Add an entry whose key may be absent.
    pub fn optional(mut self, key: impl Into<Matcher>, value: impl Into<Matcher>) -> Self {
        self.entries.push(Entry {
            key: KeyMatcher {
                matcher: key.into(),
                optional: true,
            },
            value: value.into(),
        });
        self
    }

    /// Compare keys ignoring ASCII case (HTTP header names).
    pub fn case_insensitive_keys(mut self) -> Self {
        self.case_insensitive_keys = true;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_valid(&self, actual: &Map<String, Value>, ignore_extra_keys: bool) -> bool {
        self.validate(actual, ignore_extra_keys).is_ok()
    }

    pub fn validate(
        &self,
        actual: &Map<String, Value>,
        ignore_extra_keys: bool,
    ) -> Result<(), MatchFailure> {
        self.validate_keys(actual, ignore_extra_keys, self.case_insensitive_keys)
    }

    /// [`MappingValidator::is_valid`] with key case ignored whatever the validator was built with.
    pub fn is_valid_ignoring_key_case(
        &self,
        actual: &Map<String, Value>,
        ignore_extra_keys: bool,
    ) -> bool {
        self.validate_keys(actual, ignore_extra_keys, true).is_ok()
    }

    fn validate_keys(
        &self,
        actual: &Map<String, Value>,
        ignore_extra_keys: bool,
        case_insensitive: bool,
    ) -> Result<(), MatchFailure> {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| self.entries[i].key.sort_class());

        let mut covered = vec![false; self.entries.len()];
        let mut wrong_keys = Vec::new();

        for (key, value) in actual {
            let owner = order.iter().copied().find(|&i| {
                self.entries[i]
                    .key
                    .matcher
                    .accepts_key(key, case_insensitive)
            });
            match owner {
                Some(i) => {
                    self.entries[i]
                        .value
                        .check(value, ignore_extra_keys)
                        .map_err(|failure| failure.prepend(format!("Key '{key}' error:")))?;
                    covered[i] = true;
                }
                None => wrong_keys.push(key.as_str()),
            }
        }

        let missing: Vec<String> = self
            .entries
            .iter()
            .zip(&covered)
            .filter(|(entry, covered)| !entry.key.optional && !**covered)
            .map(|(entry, _)| match &entry.key.matcher {
                Matcher::Literal(Value::String(key)) => format!("'{key}'"),
                other => format!("{other}"),
            })
            .collect();
        if !missing.is_empty() {
            let noun = if missing.len() == 1 { "key" } else { "keys" };
            return Err(MatchFailure::new(format!(
                "Missing {noun}: {}",
                missing.join(", ")
            )));
        }

        if !ignore_extra_keys && !wrong_keys.is_empty() {
            let quoted: Vec<String> = wrong_keys.iter().map(|k| format!("'{k}'")).collect();
            let noun = if quoted.len() == 1 { "key" } else { "keys" };
            return Err(MatchFailure::new(format!(
                "Wrong {noun} {} in {}",
                quoted.join(", "),
                Value::Object(actual.clone())
            )));
        }

        Ok(())
    }
}

impl fmt::Display for MappingValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}: {}", e.key, e.value))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

impl<K, V> FromIterator<(K, V)> for MappingValidator
where
    K: Into<Matcher>,
    V: Into<Matcher>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(MappingValidator::new(), |validator, (k, v)| validator.entry(k, v))
    }
}

/// Declarative entry of a [`MappingConfig`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EntryConfig {
    pub key: MatcherConfig,
    pub value: MatcherConfig,
    #[serde(default)]
    pub optional: bool,
}

/// Declarative form of a [`MappingValidator`]: either a list of entries or a
/// plain map whose keys are literal key matchers.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MappingConfig {
    Entries(Vec<EntryConfig>),
    Literal(BTreeMap<String, MatcherConfig>),
}

impl MappingConfig {
    pub fn compile(&self) -> Result<MappingValidator, BackendError> {
        let mut validator = MappingValidator::new();
        match self {
            MappingConfig::Entries(entries) => {
                for entry in entries {
                    let key = entry.key.compile()?;
                    let value = entry.value.compile()?;
                    validator = if entry.optional {
                        validator.optional(key, value)
                    } else {
                        validator.entry(key, value)
                    };
                }
            }
            MappingConfig::Literal(map) => {
                for (key, value) in map {
                    validator = validator.entry(key.as_str(), value.compile()?);
                }
            }
        }
        Ok(validator)
    }
}
