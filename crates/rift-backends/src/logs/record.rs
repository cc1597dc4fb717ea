use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::Level;

/// A single captured log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: Level,
    /// Logger name (the `tracing` target).
    pub target: String,
    pub message: String,
    /// Structured fields other than `message`, rendered as strings.
    pub fields: BTreeMap<String, String>,
}

impl LogRecord {
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parse a line written by `tracing-subscriber`'s JSON formatter.
    ///
    /// Returns `None` for anything that is not a JSON object with a level.
    pub fn from_json_line(line: &str) -> Option<Self> {
        let Value::Object(mut event) = serde_json::from_str::<Value>(line.trim()).ok()? else {
            return None;
        };
        let level = parse_level(event.get("level")?.as_str()?)?;
        let target = event
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut record = LogRecord::new(level, target, "");
        if let Some(Value::Object(fields)) = event.remove("fields") {
            for (name, value) in fields {
                let rendered = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                if name == "message" {
                    record.message = rendered;
                } else {
                    record.fields.insert(name, rendered);
                }
            }
        }
        Some(record)
    }
}

/// Level names as produced by `tracing` formatters, plus the `WARNING` spelling.
pub(crate) fn parse_level(name: &str) -> Option<Level> {
    if name.eq_ignore_ascii_case("warning") {
        return Some(Level::WARN);
    }
    Level::from_str(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_line() {
        let line = r#"{"timestamp":"2024-01-01T00:00:00Z","level":"INFO","fields":{"message":"Start serving on 127.0.0.1:8080","port":8080},"target":"rift_backends::http"}"#;
        let record = LogRecord::from_json_line(line).unwrap();

        assert_eq!(record.level, Level::INFO);
        assert_eq!(record.target, "rift_backends::http");
        assert_eq!(record.message, "Start serving on 127.0.0.1:8080");
        assert_eq!(record.fields.get("port").map(String::as_str), Some("8080"));
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert!(LogRecord::from_json_line("Start serving on 127.0.0.1:8080").is_none());
        assert!(LogRecord::from_json_line(r#"{"fields":{}}"#).is_none());
    }

    #[test]
    fn test_parse_level_names() {
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("ERROR"), Some(Level::ERROR));
        assert_eq!(parse_level("loud"), None);
    }
}
