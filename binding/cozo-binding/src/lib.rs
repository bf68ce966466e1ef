///
/// # cozo-binding — Safe Rust API over the Cozo C library
///
/// The query engine, storage and transactions all live in libcozo_c. This
/// crate encodes arguments as JSON, calls the engine through `cozo-ffi`,
/// releases every engine-allocated response, and decodes the `ok`-tagged
/// envelopes into `NamedRows`, `Map` or a typed `Error`.
///
/// ## Library Usage
///
/// ```rust,ignore
/// use cozo_binding::Engine;
///
/// let engine = unsafe { Engine::from_env()? };
/// let db = engine.open_in_memory()?;
/// db.run("?[a, b, c] <- [[1, 2, 3]] :create s {a, b, c}", None)?;
/// let rows = db.run_immutable("?[a, b, c] := *s[a, b, c]", None)?;
/// assert_eq!(rows.headers, ["a", "b", "c"]);
/// db.backup("s.db")?;
/// db.close();
/// ```
///
/// ## Errors
///
/// - `Error::Open`: the engine refused to open the database
/// - `Error::Query`: an envelope came back with `ok: false`
/// - `Error::Encode` / `Error::Decode`: JSON failed on our side
///

pub mod config;
pub mod db;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod payload;

pub use config::{BindingConfig, ConfigError};
pub use db::Db;
pub use engine::Engine;
pub use envelope::{NamedRows, QueryResponse};
pub use error::{Error, QueryError, Result};
pub use payload::{Map, ScriptMutability, StorageEngine};

pub use cozo_ffi::library::LIBRARY_ENV_VAR;
pub use cozo_ffi::{ABI_VERSION, EntryPoints, LoadError};
