//! Assertion helpers for test suites.

use crate::logs::LogRecord;
use crate::predicate::{MappingValidator, MatchFailure, Matcher};
use serde_json::{Map, Value};

/// Access log lines are tab separated `KEY:value` fields.
pub const ACCESS_LOG_FIELD_SEPARATOR: &str = "\t";
pub const ACCESS_LOG_KV_SEPARATOR: &str = ":";

/// Check `actual` against `expected`. With `ignore_extra_keys` only the
/// expected keys are checked; otherwise the key sets must match too.
pub fn check_equal_dicts(
    actual: &Map<String, Value>,
    expected: &MappingValidator,
    ignore_extra_keys: bool,
) -> Result<(), MatchFailure> {
    expected.validate(actual, ignore_extra_keys)
}

/// Panicking form of [`check_equal_dicts`]; the panic message is the mismatch report.
#[track_caller]
pub fn assert_equal_dicts(
    actual: &Map<String, Value>,
    expected: &MappingValidator,
    ignore_extra_keys: bool,
) {
    if let Err(failure) = check_equal_dicts(actual, expected, ignore_extra_keys) {
        panic!("{failure}");
    }
}

/// Split a delimited log line such as `QID:3b7e\tMETHOD:GET` into a mapping.
///
/// Each field is split on the first `kv_separator`; a field without one is an error.
pub fn parse_log_message(
    message: &str,
    field_separator: &str,
    kv_separator: &str,
) -> Result<Map<String, Value>, MatchFailure> {
    message
        .split(field_separator)
        .map(|field| {
            field
                .split_once(kv_separator)
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .ok_or_else(|| {
                    MatchFailure::new(format!(
                        "Log field '{field}' has no '{kv_separator}' separator"
                    ))
                })
        })
        .collect()
}

pub fn check_equal_log_message(
    record: &LogRecord,
    field_separator: &str,
    kv_separator: &str,
    expected: &MappingValidator,
    ignore_extra_keys: bool,
) -> Result<(), MatchFailure> {
    let fields = parse_log_message(&record.message, field_separator, kv_separator)?;
    check_equal_dicts(&fields, expected, ignore_extra_keys)
}

#[track_caller]
pub fn assert_equal_log_message(
    record: &LogRecord,
    field_separator: &str,
    kv_separator: &str,
    expected: &MappingValidator,
    ignore_extra_keys: bool,
) {
    if let Err(failure) = check_equal_log_message(
        record,
        field_separator,
        kv_separator,
        expected,
        ignore_extra_keys,
    ) {
        panic!("{failure}");
    }
}

fn any_string() -> Matcher {
    Matcher::predicate("is_string", Value::is_string)
}

/// `QID` with any string value; the field every extra log line carries.
pub fn extra_log_fields() -> MappingValidator {
    MappingValidator::new().entry("QID", any_string())
}

/// The access log key set, each with any string value.
pub fn access_log_fields() -> MappingValidator {
    ["QID", "METHOD", "REMOTE", "REQUEST_TIME", "STATUS", "URL", "USER_AGENT"]
        .into_iter()
        .fold(MappingValidator::new(), |validator, key| {
            validator.entry(key, any_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing::Level;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_equal_dicts() {
        let actual = object(json!({"qid": "abc", "api_version": "1.0", "extra": 1}));
        let expected = MappingValidator::new()
            .entry("qid", Matcher::pattern(".*").unwrap())
            .entry("api_version", "1.0");

        assert!(check_equal_dicts(&actual, &expected, true).is_ok());
        let failure = check_equal_dicts(&actual, &expected, false).unwrap_err();
        assert!(failure.to_string().starts_with("Wrong key 'extra' in"));
    }

    #[test]
    #[should_panic(expected = "Key 'api_version' error:")]
    fn test_assert_equal_dicts_panics_with_report() {
        let actual = object(json!({"api_version": "2.0"}));
        assert_equal_dicts(&actual, &MappingValidator::new().entry("api_version", "1.0"), false);
    }

    #[test]
    fn test_parse_log_message() {
        let fields = parse_log_message("QID:abc\tURL:http://localhost:80/\tSTATUS:200", "\t", ":")
            .unwrap();
        assert_eq!(
            Value::Object(fields),
            json!({"QID": "abc", "URL": "http://localhost:80/", "STATUS": "200"})
        );

        let failure = parse_log_message("QID:abc, broken", ", ", ":").unwrap_err();
        assert_eq!(failure.to_string(), "Log field 'broken' has no ':' separator");
    }

    #[test]
    fn test_access_log_message() {
        let record = LogRecord::new(
            Level::INFO,
            "access",
            "QID:1\tMETHOD:GET\tREMOTE:127.0.0.1\tREQUEST_TIME:0.001\tSTATUS:200\tURL:/search\tUSER_AGENT:curl",
        );

        assert_equal_log_message(
            &record,
            ACCESS_LOG_FIELD_SEPARATOR,
            ACCESS_LOG_KV_SEPARATOR,
            &access_log_fields(),
            false,
        );
        assert_equal_log_message(&record, "\t", ":", &extra_log_fields(), true);

        let strict = MappingValidator::new().entry("STATUS", "404");
        let failure = check_equal_log_message(&record, "\t", ":", &strict, true).unwrap_err();
        assert_eq!(failure.messages()[0], "Key 'STATUS' error:");
    }

    #[test]
    fn test_missing_access_log_field() {
        let record = LogRecord::new(Level::INFO, "access", "QID:1\tMETHOD:GET");
        let failure =
            check_equal_log_message(&record, "\t", ":", &access_log_fields(), false).unwrap_err();
        assert!(failure.to_string().starts_with("Missing keys:"));
    }
}
