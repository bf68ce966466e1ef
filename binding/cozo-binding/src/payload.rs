///
/// Outgoing payloads.
///
/// Options, query parameters and multi-field requests all cross the
/// boundary as JSON text in an owned `CString`. Absent options/parameters
/// are sent as `{}`.
///

use std::ffi::CString;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Open, order-insensitive JSON object used for options, parameters,
/// relation payloads and error envelopes.
pub type Map = serde_json::Map<String, serde_json::Value>;

/// Storage backends understood by `cozo_open_db`.
///
/// Which of them are actually available depends on the features the engine
/// library was built with; an unsupported kind fails at open time. Kinds
/// without a named variant (newer engine builds add some) travel as
/// `Other` and are passed to the engine unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageEngine {
    #[default]
    Mem,
    Sqlite,
    RocksDb,
    Sled,
    TiKv,
    Other(String),
}

impl StorageEngine {
    pub fn as_str(&self) -> &str {
        match self {
            StorageEngine::Mem => "mem",
            StorageEngine::Sqlite => "sqlite",
            StorageEngine::RocksDb => "rocksdb",
            StorageEngine::Sled => "sled",
            StorageEngine::TiKv => "tikv",
            StorageEngine::Other(kind) => kind,
        }
    }

    fn named(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "mem" | "memory" => Some(StorageEngine::Mem),
            "sqlite" => Some(StorageEngine::Sqlite),
            "rocksdb" => Some(StorageEngine::RocksDb),
            "sled" => Some(StorageEngine::Sled),
            "tikv" => Some(StorageEngine::TiKv),
            _ => None,
        }
    }
}

impl fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageEngine {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = s.trim();
        if kind.is_empty() {
            return Err("storage engine name is empty".to_string());
        }
        Ok(Self::named(kind).unwrap_or_else(|| StorageEngine::Other(kind.to_string())))
    }
}

impl From<String> for StorageEngine {
    fn from(kind: String) -> Self {
        Self::named(&kind).unwrap_or(StorageEngine::Other(kind))
    }
}

impl From<StorageEngine> for String {
    fn from(engine: StorageEngine) -> Self {
        match engine {
            StorageEngine::Other(kind) => kind,
            named => named.as_str().to_string(),
        }
    }
}

/// Whether a script may write.
///
/// Maps onto the `immutable` argument of `cozo_run_query`; the engine
/// rejects mutations in an immutable run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptMutability {
    #[default]
    Mutable,
    Immutable,
}

impl ScriptMutability {
    pub fn is_immutable(self) -> bool {
        self == ScriptMutability::Immutable
    }
}

#[derive(Serialize)]
pub(crate) struct ExportRequest<'a, S: AsRef<str>> {
    #[serde(serialize_with = "serialize_names")]
    pub relations: &'a [S],
}

#[derive(Serialize)]
pub(crate) struct BackupImportRequest<'a, S: AsRef<str>> {
    pub path: &'a str,
    #[serde(serialize_with = "serialize_names")]
    pub relations: &'a [S],
}

fn serialize_names<S, T>(names: &&[T], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: AsRef<str>,
{
    serializer.collect_seq(names.iter().map(|n| n.as_ref()))
}

/// Serialize `value` to JSON and move it into a C string.
pub(crate) fn encode<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<CString> {
    let json = serde_json::to_string(value).map_err(|source| Error::Encode { what, source })?;
    Ok(CString::new(json)?)
}

/// `{}` when no map was supplied.
pub(crate) fn encode_optional_map(what: &'static str, value: Option<&Map>) -> Result<CString> {
    match value {
        Some(map) => encode(what, map),
        None => Ok(CString::from(c"{}")),
    }
}

pub(crate) fn c_text(text: &str) -> Result<CString> {
    Ok(CString::new(text)?)
}
