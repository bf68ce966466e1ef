///
/// Open database handle.
///
/// A `Db` wraps the engine's integer id. It is closed exactly once: by
/// `close`, which consumes it, or on drop. Every operation follows the same
/// path: encode → call → take ownership of the response buffer → copy it
/// out (which frees it) → decode the envelope → branch on `ok`.
///
/// Thread safety of concurrent calls on one id is the engine's contract;
/// the binding adds no locking.
///

use cozo_ffi::ForeignStr;

use crate::engine::Engine;
use crate::envelope::{NamedRows, QueryResponse, decode_query, decode_status};
use crate::error::{Error, Result};
use crate::payload::{
    BackupImportRequest, ExportRequest, Map, ScriptMutability, c_text, encode, encode_optional_map,
};

#[derive(Debug)]
pub struct Db {
    engine: Engine,
    id: i32,
    open: bool,
}

impl Db {
    pub(crate) fn new(engine: Engine, id: i32) -> Self {
        Self {
            engine,
            id,
            open: true,
        }
    }

    /// Engine-side id of this database.
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run a script that may write.
    pub fn run(&self, script: &str, params: Option<&Map>) -> Result<NamedRows> {
        self.run_script(script, params, ScriptMutability::Mutable)
    }

    /// Run a read-only script; the engine rejects mutations.
    pub fn run_immutable(&self, script: &str, params: Option<&Map>) -> Result<NamedRows> {
        self.run_script(script, params, ScriptMutability::Immutable)
    }

    pub fn run_script(
        &self,
        script: &str,
        params: Option<&Map>,
        mutability: ScriptMutability,
    ) -> Result<NamedRows> {
        self.try_run_script(script, params, mutability)?.into_result()
    }

    /// Run a script and return a failed envelope as data instead of `Err`.
    ///
    /// `Err` is still returned for failures on this side of the boundary
    /// (encoding, decoding, null response).
    pub fn try_run_script(
        &self,
        script: &str,
        params: Option<&Map>,
        mutability: ScriptMutability,
    ) -> Result<QueryResponse> {
        const OP: &str = "run_query";
        let c_params = encode_optional_map("query parameters", params)?;
        let c_script = c_text(script)?;

        tracing::debug!(
            db = self.id,
            immutable = mutability.is_immutable(),
            script_len = script.len(),
            "running script"
        );
        let res = self.engine.native().run_query(
            self.id,
            &c_script,
            &c_params,
            mutability.is_immutable(),
        );
        let bytes = take_response(OP, res)?;
        let response = decode_query(OP, &bytes)?;
        if let Some(err) = &response.error {
            tracing::debug!(db = self.id, error = %err, "script failed");
        }
        Ok(response)
    }

    /// Import rows into existing stored relations.
    ///
    /// `payload` maps relation names to `{"headers": [...], "rows": [...]}`,
    /// the same shape `export_relations` produces.
    pub fn import_relations(&self, payload: &Map) -> Result<()> {
        const OP: &str = "import_relations";
        let c_payload = encode("import payload", payload)?;
        self.status_call(OP, |db| db.engine.native().import_relations(db.id, &c_payload))?;
        Ok(())
    }

    /// Export stored relations; returns the envelope's `data` object.
    pub fn export_relations<S: AsRef<str>>(&self, relations: &[S]) -> Result<Map> {
        const OP: &str = "export_relations";
        let c_payload = encode("export request", &ExportRequest { relations })?;
        let mut res =
            self.status_call(OP, |db| db.engine.native().export_relations(db.id, &c_payload))?;
        match res.remove("data") {
            Some(serde_json::Value::Object(data)) => Ok(data),
            _ => Err(Error::MissingField { op: OP, field: "data" }),
        }
    }

    /// Write a backup of the whole database to `path`.
    pub fn backup(&self, path: &str) -> Result<()> {
        const OP: &str = "backup";
        let c_path = c_text(path)?;
        self.status_call(OP, |db| db.engine.native().backup(db.id, &c_path))?;
        Ok(())
    }

    /// Restore a backup into this (empty) database.
    pub fn restore(&self, path: &str) -> Result<()> {
        const OP: &str = "restore";
        let c_path = c_text(path)?;
        self.status_call(OP, |db| db.engine.native().restore(db.id, &c_path))?;
        Ok(())
    }

    /// Copy selected relations out of a backup file into this database.
    pub fn import_from_backup<S: AsRef<str>>(&self, path: &str, relations: &[S]) -> Result<()> {
        const OP: &str = "import_from_backup";
        let c_payload = encode("backup import request", &BackupImportRequest { path, relations })?;
        self.status_call(OP, |db| db.engine.native().import_from_backup(db.id, &c_payload))?;
        Ok(())
    }

    /// Close the database. Returns the engine's report of whether the id
    /// was live.
    pub fn close(mut self) -> bool {
        self.release("database closed")
    }

    /// Calls `cozo_close_db` the first time only.
    fn release(&mut self, event: &'static str) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;
        let closed = self.engine.native().close_db(self.id);
        tracing::debug!(db = self.id, closed, "{}", event);
        closed
    }

    fn status_call<F>(&self, op: &'static str, call: F) -> Result<Map>
    where
        F: FnOnce(&Self) -> Option<ForeignStr>,
    {
        tracing::debug!(db = self.id, op, "calling engine");
        let bytes = take_response(op, call(self))?;
        decode_status(op, &bytes)
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        self.release("database dropped");
    }
}

/// Copy the response out of the engine buffer; the buffer is freed before
/// this returns, whatever happens next.
fn take_response(op: &'static str, res: Option<ForeignStr>) -> Result<Vec<u8>> {
    let buf = res.ok_or(Error::NullResponse { op })?;
    tracing::trace!(op, len = buf.len(), "engine response");
    Ok(buf.into_bytes())
}
