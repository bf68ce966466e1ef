///
/// Binding error types.
///
/// Engine failures come back in two shapes: `cozo_open_db` returns a bare
/// message, every other entry point returns an envelope with `ok: false`.
/// The first becomes `Error::Open`, the second `Error::Query` carrying the
/// whole envelope. JSON failures on our side of the boundary are kept apart
/// from both.
///

use std::ffi::NulError;
use thiserror::Error;

use cozo_ffi::LoadError;

use crate::config::ConfigError;
use crate::payload::Map;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Open(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode response of {op}: {source}")]
    Decode {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Argument contains an interior NUL byte: {0}")]
    Nul(#[from] NulError),

    #[error("Engine returned no response from {op}")]
    NullResponse { op: &'static str },

    #[error("Response of {op} has no `{field}` object")]
    MissingField {
        op: &'static str,
        field: &'static str,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// The engine envelope, when this is a query failure.
    pub fn as_query(&self) -> Option<&QueryError> {
        match self {
            Error::Query(q) => Some(q),
            _ => None,
        }
    }
}

const UNKNOWN_ERROR: &str = "Unknown error";

/// A failed engine envelope.
///
/// Keeps every field the engine sent (`display`, `message`, `code`,
/// `causes`, ...) so callers can dig past the headline.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    data: Map,
}

impl QueryError {
    pub fn new(data: Map) -> Self {
        Self { data }
    }

    /// Human-readable headline: `display`, else `message`, else
    /// "Unknown error". Empty and non-string values are skipped.
    pub fn message(&self) -> &str {
        self.str_field("display")
            .or_else(|| self.str_field("message"))
            .unwrap_or(UNKNOWN_ERROR)
    }

    /// Engine diagnostic code such as `eval::stored_relation_not_found`.
    pub fn code(&self) -> Option<&str> {
        self.str_field("code")
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map {
        &self.data
    }

    pub fn into_data(self) -> Map {
        self.data
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for QueryError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_error(value: serde_json::Value) -> QueryError {
        match value {
            serde_json::Value::Object(map) => QueryError::new(map),
            _ => panic!("test envelope must be an object"),
        }
    }

    #[test]
    fn test_message_prefers_display() {
        let err = query_error(json!({
            "ok": false,
            "display": "eval::stored_relation_not_found\n  x Cannot find relation s",
            "message": "Cannot find relation s",
        }));
        assert!(err.message().starts_with("eval::stored_relation_not_found"));
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn test_message_falls_back_to_message() {
        let err = query_error(json!({"ok": false, "display": "", "message": "arity mismatch"}));
        assert_eq!(err.message(), "arity mismatch");

        let err = query_error(json!({"ok": false, "display": 17, "message": "not a string"}));
        assert_eq!(err.message(), "not a string");
    }

    #[test]
    fn test_message_unknown_sentinel() {
        let err = query_error(json!({"ok": false}));
        assert_eq!(err.message(), "Unknown error");
        assert_eq!(err.to_string(), "Unknown error");
    }

    #[test]
    fn test_diagnostic_fields_survive() {
        let err = query_error(json!({
            "ok": false,
            "message": "bad",
            "code": "parser::pest",
            "span": [3, 9],
        }));
        assert_eq!(err.code(), Some("parser::pest"));
        assert_eq!(err.get("span"), Some(&json!([3, 9])));
        assert_eq!(err.clone().into_data().len(), 4);
    }

    #[test]
    fn test_error_display_messages() {
        let err = Error::Open("Unknown engine: wat".to_string());
        assert_eq!(err.to_string(), "Unknown engine: wat");

        let err = Error::from(query_error(json!({"ok": false, "message": "oops"})));
        assert_eq!(err.to_string(), "oops");
        assert!(err.as_query().is_some());

        let err = Error::NullResponse { op: "backup" };
        assert!(err.to_string().contains("backup"));
        assert!(err.as_query().is_none());

        let err = Error::MissingField {
            op: "export_relations",
            field: "data",
        };
        assert!(err.to_string().contains("`data`"));

        let source = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = Error::Decode {
            op: "run_query",
            source,
        };
        assert!(err.to_string().starts_with("Failed to decode response of run_query"));
    }
}
