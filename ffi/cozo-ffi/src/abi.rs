///
/// Entry-point signatures of libcozo_c.
///
/// Mirrors `cozo_c.h` of the engine release named by `ABI_VERSION`:
///
/// ```c
/// char *cozo_open_db(const char *engine, const char *path, const char *options, int32_t *db_id);
/// bool  cozo_close_db(int32_t id);
/// char *cozo_run_query(int32_t db_id, const char *script, const char *params, bool immutable);
/// char *cozo_import_relations(int32_t db_id, const char *json_payload);
/// char *cozo_export_relations(int32_t db_id, const char *json_payload);
/// char *cozo_backup(int32_t db_id, const char *out_path);
/// char *cozo_restore(int32_t db_id, const char *in_path);
/// char *cozo_import_from_backup(int32_t db_id, const char *json_payload);
/// void  cozo_free_str(char *s);
/// ```
///
/// Every returned `char *` is owned by the caller until handed back to
/// `cozo_free_str`. `cozo_open_db` returns null on success.
///

use std::ffi::c_char;

/// Engine release whose header these signatures were taken from.
pub const ABI_VERSION: &str = "0.7";

pub type OpenDbFn = unsafe extern "C" fn(
    engine: *const c_char,
    path: *const c_char,
    options: *const c_char,
    db_id: *mut i32,
) -> *mut c_char;

pub type CloseDbFn = unsafe extern "C" fn(db_id: i32) -> bool;

pub type RunQueryFn = unsafe extern "C" fn(
    db_id: i32,
    script: *const c_char,
    params: *const c_char,
    immutable: bool,
) -> *mut c_char;

/// Shared shape of the import, export, backup, restore and
/// import-from-backup entry points.
pub type PayloadFn = unsafe extern "C" fn(db_id: i32, payload: *const c_char) -> *mut c_char;

pub type FreeStrFn = unsafe extern "C" fn(s: *mut c_char);

pub const SYM_OPEN_DB: &[u8] = b"cozo_open_db\0";
pub const SYM_CLOSE_DB: &[u8] = b"cozo_close_db\0";
pub const SYM_RUN_QUERY: &[u8] = b"cozo_run_query\0";
pub const SYM_IMPORT_RELATIONS: &[u8] = b"cozo_import_relations\0";
pub const SYM_EXPORT_RELATIONS: &[u8] = b"cozo_export_relations\0";
pub const SYM_BACKUP: &[u8] = b"cozo_backup\0";
pub const SYM_RESTORE: &[u8] = b"cozo_restore\0";
pub const SYM_IMPORT_FROM_BACKUP: &[u8] = b"cozo_import_from_backup\0";
pub const SYM_FREE_STR: &[u8] = b"cozo_free_str\0";

/// One function pointer per engine symbol.
///
/// The table is plain data; whoever builds it vouches that each pointer
/// honors the contract above (see `NativeLibrary::from_entry_points`).
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub open_db: OpenDbFn,
    pub close_db: CloseDbFn,
    pub run_query: RunQueryFn,
    pub import_relations: PayloadFn,
    pub export_relations: PayloadFn,
    pub backup: PayloadFn,
    pub restore: PayloadFn,
    pub import_from_backup: PayloadFn,
    pub free_str: FreeStrFn,
}

impl std::fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoints")
            .field("open_db", &(self.open_db as *const ()))
            .field("run_query", &(self.run_query as *const ()))
            .field("free_str", &(self.free_str as *const ()))
            .finish_non_exhaustive()
    }
}

/// Symbol name without the trailing NUL, for diagnostics.
pub fn symbol_name(sym: &[u8]) -> &str {
    let trimmed = sym.strip_suffix(b"\0").unwrap_or(sym);
    std::str::from_utf8(trimmed).unwrap_or("<non-utf8 symbol>")
}
