//! Single-value matchers.

use super::mapping::{MappingValidator, MatchFailure};
use crate::error::BackendError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&Value) -> bool + Send + Sync;

/// Matcher for a single value (or mapping key).
#[derive(Clone)]
pub enum Matcher {
    /// Exact equality with a JSON value.
    Literal(Value),
    /// Regex search over a string value (unanchored unless the pattern says otherwise).
    Pattern(Regex),
    /// Wildcard: accepts any value. Used as the "any key" matcher.
    Any,
    /// Accepts the value if any of the alternatives accepts it.
    OneOf(Vec<Matcher>),
    /// Nested mapping validated recursively.
    Mapping(MappingValidator),
    /// Custom check.
    Predicate {
        name: String,
        check: Arc<PredicateFn>,
    },
}

impl Matcher {
    pub fn literal(value: impl Into<Value>) -> Self {
        Matcher::Literal(value.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Matcher::Pattern(Regex::new(pattern)?))
    }

    pub fn any() -> Self {
        Matcher::Any
    }

    pub fn one_of<I, M>(alternatives: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<Matcher>,
    {
        Matcher::OneOf(alternatives.into_iter().map(Into::into).collect())
    }

    pub fn predicate<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Ordering class used when several key matchers could accept the same key.
    /// Lower classes are tried first: literals, callables, patterns, wildcards, mappings.
    pub(crate) fn priority(&self) -> u8 {
        match self {
            Matcher::Literal(_) => 0,
            Matcher::Predicate { .. } => 1,
            Matcher::Pattern(_) | Matcher::OneOf(_) => 2,
            Matcher::Any => 3,
            Matcher::Mapping(_) => 4,
        }
    }

    pub fn is_match(&self, value: &Value) -> bool {
        self.check(value, false).is_ok()
    }

    /// Check a value, returning a descriptive failure on mismatch.
    ///
    /// `ignore_extra_keys` only matters for nested mappings.
    pub fn check(&self, value: &Value, ignore_extra_keys: bool) -> Result<(), MatchFailure> {
        match self {
            Matcher::Literal(expected) => {
                if expected == value {
                    Ok(())
                } else {
                    Err(MatchFailure::new(format!(
                        "{value} does not match {expected}"
                    )))
                }
            }
            Matcher::Pattern(regex) => match value {
                Value::String(s) if regex.is_match(s) => Ok(()),
                Value::String(s) => Err(MatchFailure::new(format!(
                    "Regex('{}') does not match '{s}'",
                    regex.as_str()
                ))),
                other => Err(MatchFailure::new(format!("{other} is not a string"))),
            },
            Matcher::Any => Ok(()),
            Matcher::OneOf(alternatives) => {
                if alternatives
                    .iter()
                    .any(|m| m.check(value, ignore_extra_keys).is_ok())
                {
                    Ok(())
                } else {
                    Err(MatchFailure::new(format!("{self} did not validate {value}")))
                }
            }
            Matcher::Mapping(validator) => match value {
                Value::Object(map) => validator.validate(map, ignore_extra_keys),
                other => Err(MatchFailure::new(format!("{other} should be a mapping"))),
            },
            Matcher::Predicate { name, check } => {
                if check(value) {
                    Ok(())
                } else {
                    Err(MatchFailure::new(format!(
                        "{name}({value}) should evaluate to true"
                    )))
                }
            }
        }
    }

    /// Key matching. With `case_insensitive`, literal string keys compare
    /// ignoring ASCII case and other matchers see the lowercased key.
    pub(crate) fn accepts_key(&self, key: &str, case_insensitive: bool) -> bool {
        if !case_insensitive {
            return self.is_match(&Value::String(key.to_string()));
        }
        match self {
            Matcher::Literal(Value::String(expected)) => expected.eq_ignore_ascii_case(key),
            Matcher::OneOf(alternatives) => {
                alternatives.iter().any(|m| m.accepts_key(key, true))
            }
            other => other.is_match(&Value::String(key.to_ascii_lowercase())),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Literal(value) => write!(f, "{value}"),
            Matcher::Pattern(regex) => write!(f, "Regex('{}')", regex.as_str()),
            Matcher::Any => write!(f, "Any"),
            Matcher::OneOf(alternatives) => {
                let parts: Vec<String> = alternatives.iter().map(ToString::to_string).collect();
                write!(f, "OneOf({})", parts.join(", "))
            }
            Matcher::Mapping(validator) => write!(f, "{validator}"),
            Matcher::Predicate { name, .. } => write!(f, "Predicate({name})"),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matcher({self})")
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Matcher::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Matcher::Literal(Value::String(value))
    }
}

impl From<i64> for Matcher {
    fn from(value: i64) -> Self {
        Matcher::Literal(Value::from(value))
    }
}

impl From<bool> for Matcher {
    fn from(value: bool) -> Self {
        Matcher::Literal(Value::Bool(value))
    }
}

impl From<Value> for Matcher {
    fn from(value: Value) -> Self {
        Matcher::Literal(value)
    }
}

impl From<Regex> for Matcher {
    fn from(regex: Regex) -> Self {
        Matcher::Pattern(regex)
    }
}

impl From<MappingValidator> for Matcher {
    fn from(validator: MappingValidator) -> Self {
        Matcher::Mapping(validator)
    }
}

/// Declarative (YAML/JSON) form of a [`Matcher`].
///
/// `{pattern: "..."}`, `{any: true}` and `{one_of: [...]}` select the special
/// matchers; any other value is a literal.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MatcherConfig {
    Pattern { pattern: String },
    Any { any: bool },
    OneOf { one_of: Vec<MatcherConfig> },
    Literal(Value),
}

impl MatcherConfig {
    pub fn compile(&self) -> Result<Matcher, BackendError> {
        match self {
            MatcherConfig::Pattern { pattern } => Ok(Matcher::pattern(pattern)?),
            MatcherConfig::Any { any: true } => Ok(Matcher::Any),
            MatcherConfig::Any { any: false } => Err(BackendError::Config(
                "`any: false` is not a valid matcher".to_string(),
            )),
            MatcherConfig::OneOf { one_of } => {
                let compiled: Result<Vec<_>, _> = one_of.iter().map(|m| m.compile()).collect();
                Ok(Matcher::OneOf(compiled?))
            }
            MatcherConfig::Literal(value) => Ok(Matcher::Literal(value.clone())),
        }
    }
}
