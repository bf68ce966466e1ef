///
/// # Binding Configuration
///
/// Parses `cozo.toml`, which says where the engine library lives and which
/// database to open.
///
/// ## Example cozo.toml
///
/// ```toml
/// [library]
/// path = "/usr/local/lib/libcozo_c.so"
///
/// [database]
/// engine = "sqlite"
/// path = "data/app.db"
///
/// [database.options]
/// # forwarded verbatim to cozo_open_db as JSON
/// ```
///
/// Every section is optional. Without `[library] path` the library is taken
/// from `COZO_C_LIB`; without `[database]` an in-memory database is opened.
///

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cozo_ffi::library::LIBRARY_ENV_VAR;

use crate::db::Db;
use crate::engine::Engine;
use crate::payload::{Map, StorageEngine};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config not found at {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read config at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid config: {0}")]
    Invalid(String),

}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BindingConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LibraryConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub engine: StorageEngine,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub options: Option<toml::Table>,
}

impl BindingConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Library path from the file, falling back to `COZO_C_LIB`.
    pub fn library_path(&self) -> Option<PathBuf> {
        self.library.path.clone().or_else(|| {
            std::env::var_os(LIBRARY_ENV_VAR)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
        })
    }

    /// `[database.options]` converted to the JSON object sent on open.
    ///
    /// TOML datetimes have no JSON counterpart; they are sent as their
    /// RFC 3339 text.
    pub fn open_options(&self) -> Result<Option<Map>, ConfigError> {
        let Some(table) = &self.database.options else {
            return Ok(None);
        };
        let map = table
            .iter()
            .map(|(key, value)| Ok((key.clone(), toml_to_json(value)?)))
            .collect::<Result<Map, ConfigError>>()?;
        Ok(Some(map))
    }

    /// Open the configured database on `engine`.
    pub fn open(&self, engine: &Engine) -> crate::Result<Db> {
        let options = self.open_options()?;
        engine.open(self.database.engine.clone(), &self.database.path, options.as_ref())
    }
}

fn toml_to_json(value: &toml::Value) -> Result<serde_json::Value, ConfigError> {
    use serde_json::Value;

    Ok(match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| ConfigError::Invalid(format!("option value {f} is not a finite number")))?,
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .iter()
                .map(toml_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .iter()
                .map(|(key, value)| Ok((key.clone(), toml_to_json(value)?)))
                .collect::<Result<Map, ConfigError>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_config_defaults_to_memory() {
        let config = BindingConfig::from_toml_str("").unwrap();
        assert_eq!(config, BindingConfig::default());
        assert_eq!(config.database.engine, StorageEngine::Mem);
        assert_eq!(config.database.path, "");
        assert!(config.open_options().unwrap().is_none());
    }

    #[test]
    fn test_full_config() {
        let config = BindingConfig::from_toml_str(
            r#"
[library]
path = "/usr/local/lib/libcozo_c.so"

[database]
engine = "tikv"
path = ""

[database.options]
pd_endpoints = ["127.0.0.1:2379"]
optimistic = true
"#,
        )
        .expect("Failed to parse config");

        assert_eq!(
            config.library_path(),
            Some(PathBuf::from("/usr/local/lib/libcozo_c.so"))
        );
        assert_eq!(config.database.engine, StorageEngine::TiKv);

        let options = config.open_options().unwrap().expect("options present");
        assert_eq!(options.get("pd_endpoints"), Some(&json!(["127.0.0.1:2379"])));
        assert_eq!(options.get("optimistic"), Some(&json!(true)));
    }

    #[test]
    fn test_unnamed_engine_is_kept() {
        let config = BindingConfig::from_toml_str("[database]\nengine = \"newrocksdb\"\n").unwrap();
        assert_eq!(
            config.database.engine,
            StorageEngine::Other("newrocksdb".to_string())
        );
    }

    #[test]
    fn test_engine_must_be_a_string() {
        let err = BindingConfig::from_toml_str("[database]\nengine = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_datetime_options_are_sent_as_text() {
        let config = BindingConfig::from_toml_str(
            r#"
[database.options]
since = 1979-05-27T07:32:00Z
nested = { day = 1979-05-27, ratio = 0.5 }
"#,
        )
        .expect("Failed to parse config");

        let options = config.open_options().unwrap().expect("options present");
        assert_eq!(options.get("since"), Some(&json!("1979-05-27T07:32:00Z")));
        assert_eq!(
            options.get("nested"),
            Some(&json!({"day": "1979-05-27", "ratio": 0.5}))
        );
        assert!(!serde_json::Value::Object(options)
            .to_string()
            .contains("$__toml_private_datetime"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = dir.path().join("cozo.toml");
        std::fs::write(&path, "[database]\nengine = \"sqlite\"\npath = \"app.db\"\n").unwrap();

        let config = BindingConfig::load(&path).expect("Failed to load config");
        assert_eq!(config.database.engine, StorageEngine::Sqlite);
        assert_eq!(config.database.path, "app.db");

        let err = BindingConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().contains("Config not found"));
    }
}
