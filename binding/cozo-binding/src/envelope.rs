///
/// Response envelopes.
///
/// Every entry point except open/close answers with a JSON object carrying
/// an `ok` flag. Query results add `headers`, `rows` and `took`; failures
/// add `display`/`message` and whatever diagnostics the engine attaches.
///

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, QueryError, Result};
use crate::payload::Map;

/// Typed view of a `cozo_run_query` response.
///
/// `ok` is false and `took` is -1 when the engine left them out, which is
/// what a failure envelope decodes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRows {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default = "unknown_took")]
    pub took: f64,
    #[serde(default)]
    pub ok: bool,
}

fn unknown_took() -> f64 {
    -1.0
}

impl Default for NamedRows {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            rows: Vec::new(),
            took: unknown_took(),
            ok: false,
        }
    }
}

impl NamedRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in `headers`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Rows as objects keyed by header.
    pub fn into_maps(self) -> Vec<Map> {
        let headers = self.headers;
        self.rows
            .into_iter()
            .map(|row| headers.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// Outcome of a query run without error-style control flow.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub rows: NamedRows,
    pub error: Option<QueryError>,
}

impl QueryResponse {
    pub fn is_ok(&self) -> bool {
        self.rows.ok
    }

    pub fn into_result(self) -> Result<NamedRows> {
        match self.error {
            Some(err) => Err(Error::Query(err)),
            None => Ok(self.rows),
        }
    }
}

pub(crate) fn decode_query(op: &'static str, bytes: &[u8]) -> Result<QueryResponse> {
    let rows: NamedRows =
        serde_json::from_slice(bytes).map_err(|source| Error::Decode { op, source })?;
    if rows.ok {
        return Ok(QueryResponse { rows, error: None });
    }
    let raw: Map = serde_json::from_slice(bytes).map_err(|source| Error::Decode { op, source })?;
    Ok(QueryResponse {
        rows,
        error: Some(QueryError::new(raw)),
    })
}

/// Decode a status envelope; a missing or non-boolean `ok` counts as failure.
pub(crate) fn decode_status(op: &'static str, bytes: &[u8]) -> Result<Map> {
    let res: Map = serde_json::from_slice(bytes).map_err(|source| Error::Decode { op, source })?;
    let ok = res.get("ok").and_then(Value::as_bool).unwrap_or(false);
    if ok {
        Ok(res)
    } else {
        Err(Error::Query(QueryError::new(res)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_successful_query() {
        let body = br#"{"ok":true,"headers":["a","b","c"],"rows":[[1,2,3]],"took":0.0012}"#;
        let res = decode_query("run_query", body).unwrap();
        assert!(res.is_ok());
        assert!(res.error.is_none());

        let rows = res.into_result().unwrap();
        assert_eq!(rows.headers, vec!["a", "b", "c"]);
        assert_eq!(rows.rows, vec![vec![json!(1), json!(2), json!(3)]]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.column("c"), Some(2));
        assert_eq!(rows.column("z"), None);
    }

    #[test]
    fn test_decode_failed_query_keeps_envelope() {
        let body = br#"{"ok":false,"message":"Cannot find requested stored relation 's'","code":"query::relation_not_found"}"#;
        let res = decode_query("run_query", body).unwrap();
        assert!(!res.is_ok());
        assert_eq!(res.rows.took, -1.0);
        assert!(res.rows.is_empty());

        let err = res.error.clone().expect("error envelope");
        assert_eq!(err.code(), Some("query::relation_not_found"));
        assert_eq!(err.get("ok"), Some(&json!(false)));

        match res.into_result() {
            Err(Error::Query(q)) => assert!(q.message().contains("stored relation 's'")),
            other => panic!("Expected query error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed_is_not_a_query_error() {
        let err = decode_query("run_query", b"not json").unwrap_err();
        assert!(matches!(err, Error::Decode { op: "run_query", .. }));

        let err = decode_status("backup", b"{\"ok\":tru").unwrap_err();
        assert!(matches!(err, Error::Decode { op: "backup", .. }));
    }

    #[test]
    fn test_decode_status() {
        let map = decode_status("restore", br#"{"ok":true}"#).unwrap();
        assert_eq!(map.get("ok"), Some(&json!(true)));

        let err = decode_status("restore", br#"{"ok":false,"display":"no such file"}"#).unwrap_err();
        assert_eq!(err.to_string(), "no such file");

        let err = decode_status("restore", br#"{"ok":"yes"}"#).unwrap_err();
        assert_eq!(err.to_string(), "Unknown error");

        let err = decode_status("restore", br#"{}"#).unwrap_err();
        assert!(err.as_query().is_some());
    }

    #[test]
    fn test_into_maps() {
        let rows = NamedRows {
            headers: vec!["name".to_string(), "age".to_string()],
            rows: vec![vec![json!("ann"), json!(31)], vec![json!("bo"), json!(null)]],
            took: 0.0,
            ok: true,
        };
        let maps = rows.into_maps();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].get("name"), Some(&json!("ann")));
        assert_eq!(maps[1].get("age"), Some(&json!(null)));
    }

    #[test]
    fn test_default_named_rows() {
        let rows = NamedRows::default();
        assert!(!rows.ok);
        assert_eq!(rows.took, -1.0);
    }
}
