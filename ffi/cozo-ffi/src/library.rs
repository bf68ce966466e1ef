///
/// Resolved engine library.
///
/// `NativeLibrary` pairs an `EntryPoints` table with whatever keeps those
/// pointers valid (the `libloading::Library` for dynamic loads, nothing for
/// a static link). Its call methods take `&CStr` arguments and wrap each
/// returned pointer in a `ForeignStr` before doing anything else, so no raw
/// engine buffer escapes this module.
///

use std::ffi::CStr;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::abi::*;
use crate::buffer::ForeignStr;
use crate::error::LoadError;

/// Environment variable naming the shared library to load.
pub const LIBRARY_ENV_VAR: &str = "COZO_C_LIB";

pub struct NativeLibrary {
    entry_points: EntryPoints,
    origin: Option<PathBuf>,
    _library: Option<Library>,
}

impl NativeLibrary {
    /// Load libcozo_c from `path` and resolve every entry point.
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialisers, and the resolved symbols are
    /// trusted to have the signatures in `abi`. `path` must name a build of
    /// libcozo_c compatible with `ABI_VERSION`.
    pub unsafe fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let library = unsafe { Library::new(path) }.map_err(|e| LoadError::Library {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let entry_points = unsafe {
            EntryPoints {
                open_db: resolve(&library, path, SYM_OPEN_DB)?,
                close_db: resolve(&library, path, SYM_CLOSE_DB)?,
                run_query: resolve(&library, path, SYM_RUN_QUERY)?,
                import_relations: resolve(&library, path, SYM_IMPORT_RELATIONS)?,
                export_relations: resolve(&library, path, SYM_EXPORT_RELATIONS)?,
                backup: resolve(&library, path, SYM_BACKUP)?,
                restore: resolve(&library, path, SYM_RESTORE)?,
                import_from_backup: resolve(&library, path, SYM_IMPORT_FROM_BACKUP)?,
                free_str: resolve(&library, path, SYM_FREE_STR)?,
            }
        };

        tracing::debug!(path = %path.display(), abi = ABI_VERSION, "loaded engine library");
        Ok(Self {
            entry_points,
            origin: Some(path.to_path_buf()),
            _library: Some(library),
        })
    }

    /// Load the library named by `COZO_C_LIB`.
    ///
    /// # Safety
    ///
    /// Same contract as `load`.
    pub unsafe fn from_env() -> Result<Self, LoadError> {
        match std::env::var_os(LIBRARY_ENV_VAR) {
            Some(path) if !path.is_empty() => unsafe { Self::load(PathBuf::from(path)) },
            _ => Err(LoadError::NotConfigured { var: LIBRARY_ENV_VAR }),
        }
    }

    /// Use the entry points linked into this binary with `-lcozo_c`.
    #[cfg(feature = "linked")]
    pub fn linked() -> Self {
        Self {
            entry_points: linked::entry_points(),
            origin: None,
            _library: None,
        }
    }

    /// Build from a hand-assembled table.
    ///
    /// # Safety
    ///
    /// Every pointer in `entry_points` must honor the contract documented in
    /// `abi`, and strings returned by the table must be releasable through
    /// its own `free_str`.
    pub unsafe fn from_entry_points(entry_points: EntryPoints) -> Self {
        Self {
            entry_points,
            origin: None,
            _library: None,
        }
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry_points
    }

    /// Path the library was loaded from, if it was loaded dynamically.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Open a database. `Ok` carries the new id; `Err` carries the engine's
    /// error string.
    pub fn open_db(&self, engine: &CStr, path: &CStr, options: &CStr) -> Result<i32, ForeignStr> {
        let mut db_id: i32 = 0;
        let err = unsafe {
            (self.entry_points.open_db)(engine.as_ptr(), path.as_ptr(), options.as_ptr(), &mut db_id)
        };
        match self.wrap(err) {
            None => Ok(db_id),
            Some(message) => Err(message),
        }
    }

    pub fn close_db(&self, db_id: i32) -> bool {
        unsafe { (self.entry_points.close_db)(db_id) }
    }

    pub fn run_query(
        &self,
        db_id: i32,
        script: &CStr,
        params: &CStr,
        immutable: bool,
    ) -> Option<ForeignStr> {
        let res = unsafe {
            (self.entry_points.run_query)(db_id, script.as_ptr(), params.as_ptr(), immutable)
        };
        self.wrap(res)
    }

    pub fn import_relations(&self, db_id: i32, payload: &CStr) -> Option<ForeignStr> {
        self.call_payload(self.entry_points.import_relations, db_id, payload)
    }

    pub fn export_relations(&self, db_id: i32, payload: &CStr) -> Option<ForeignStr> {
        self.call_payload(self.entry_points.export_relations, db_id, payload)
    }

    pub fn backup(&self, db_id: i32, out_path: &CStr) -> Option<ForeignStr> {
        self.call_payload(self.entry_points.backup, db_id, out_path)
    }

    pub fn restore(&self, db_id: i32, in_path: &CStr) -> Option<ForeignStr> {
        self.call_payload(self.entry_points.restore, db_id, in_path)
    }

    pub fn import_from_backup(&self, db_id: i32, payload: &CStr) -> Option<ForeignStr> {
        self.call_payload(self.entry_points.import_from_backup, db_id, payload)
    }

    fn call_payload(&self, f: PayloadFn, db_id: i32, payload: &CStr) -> Option<ForeignStr> {
        let res = unsafe { f(db_id, payload.as_ptr()) };
        self.wrap(res)
    }

    fn wrap(&self, ptr: *mut std::ffi::c_char) -> Option<ForeignStr> {
        unsafe { ForeignStr::from_raw(ptr, self.entry_points.free_str) }
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("origin", &self.origin)
            .field("entry_points", &self.entry_points)
            .finish()
    }
}

unsafe fn resolve<T: Copy>(library: &Library, path: &Path, sym: &[u8]) -> Result<T, LoadError> {
    let symbol = unsafe { library.get::<T>(sym) }.map_err(|e| LoadError::Symbol {
        path: path.to_path_buf(),
        symbol: symbol_name(sym).to_string(),
        reason: e.to_string(),
    })?;
    Ok(*symbol)
}

#[cfg(feature = "linked")]
mod linked {
    use std::ffi::c_char;

    use crate::abi::EntryPoints;

    #[link(name = "cozo_c")]
    unsafe extern "C" {
        fn cozo_open_db(
            engine: *const c_char,
            path: *const c_char,
            options: *const c_char,
            db_id: *mut i32,
        ) -> *mut c_char;
        fn cozo_close_db(db_id: i32) -> bool;
        fn cozo_run_query(
            db_id: i32,
            script: *const c_char,
            params: *const c_char,
            immutable: bool,
        ) -> *mut c_char;
        fn cozo_import_relations(db_id: i32, payload: *const c_char) -> *mut c_char;
        fn cozo_export_relations(db_id: i32, payload: *const c_char) -> *mut c_char;
        fn cozo_backup(db_id: i32, out_path: *const c_char) -> *mut c_char;
        fn cozo_restore(db_id: i32, in_path: *const c_char) -> *mut c_char;
        fn cozo_import_from_backup(db_id: i32, payload: *const c_char) -> *mut c_char;
        fn cozo_free_str(s: *mut c_char);
    }

    pub(super) fn entry_points() -> EntryPoints {
        EntryPoints {
            open_db: cozo_open_db,
            close_db: cozo_close_db,
            run_query: cozo_run_query,
            import_relations: cozo_import_relations,
            export_relations: cozo_export_relations,
            backup: cozo_backup,
            restore: cozo_restore,
            import_from_backup: cozo_import_from_backup,
            free_str: cozo_free_str,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::ffi::{CString, c_char};

    thread_local! {
        static FREED: Cell<usize> = const { Cell::new(0) };
        static LAST_IMMUTABLE: Cell<Option<bool>> = const { Cell::new(None) };
    }

    fn engine_string(text: &str) -> *mut c_char {
        CString::new(text).unwrap().into_raw()
    }

    unsafe extern "C" fn open_db(
        _engine: *const c_char,
        path: *const c_char,
        _options: *const c_char,
        db_id: *mut i32,
    ) -> *mut c_char {
        let path = unsafe { CStr::from_ptr(path) };
        if path.to_bytes() == b"bad" {
            return engine_string("cannot open 'bad'");
        }
        unsafe { *db_id = 42 };
        std::ptr::null_mut()
    }

    unsafe extern "C" fn close_db(db_id: i32) -> bool {
        db_id == 42
    }

    unsafe extern "C" fn run_query(
        db_id: i32,
        _script: *const c_char,
        _params: *const c_char,
        immutable: bool,
    ) -> *mut c_char {
        LAST_IMMUTABLE.with(|c| c.set(Some(immutable)));
        engine_string(&format!(r#"{{"ok":true,"db":{}}}"#, db_id))
    }

    unsafe extern "C" fn echo(_db_id: i32, payload: *const c_char) -> *mut c_char {
        let payload = unsafe { CStr::from_ptr(payload) };
        engine_string(&payload.to_string_lossy())
    }

    unsafe extern "C" fn null_payload(_db_id: i32, _payload: *const c_char) -> *mut c_char {
        std::ptr::null_mut()
    }

    unsafe extern "C" fn free_str(s: *mut c_char) {
        FREED.with(|n| n.set(n.get() + 1));
        drop(unsafe { CString::from_raw(s) });
    }

    fn library() -> NativeLibrary {
        unsafe {
            NativeLibrary::from_entry_points(EntryPoints {
                open_db,
                close_db,
                run_query,
                import_relations: echo,
                export_relations: echo,
                backup: echo,
                restore: null_payload,
                import_from_backup: echo,
                free_str,
            })
        }
    }

    fn freed() -> usize {
        FREED.with(|n| n.get())
    }

    #[test]
    fn test_open_success_and_failure() {
        let lib = library();
        let before = freed();

        let id = lib.open_db(c"mem", c"", c"{}").expect("open should succeed");
        assert_eq!(id, 42);
        assert_eq!(freed(), before);

        let err = lib.open_db(c"mem", c"bad", c"{}").expect_err("open should fail");
        assert_eq!(err.into_string_lossy(), "cannot open 'bad'");
        assert_eq!(freed(), before + 1);
    }

    #[test]
    fn test_close_reports_engine_result() {
        let lib = library();
        assert!(lib.close_db(42));
        assert!(!lib.close_db(7));
    }

    #[test]
    fn test_run_query_forwards_immutable_flag() {
        let lib = library();
        let before = freed();

        let res = lib.run_query(42, c"?[a] <- [[1]]", c"{}", true).unwrap();
        assert_eq!(res.to_bytes(), br#"{"ok":true,"db":42}"#);
        assert_eq!(LAST_IMMUTABLE.with(|c| c.get()), Some(true));
        drop(res);

        let _ = lib.run_query(42, c"?[a] <- [[1]]", c"{}", false);
        assert_eq!(LAST_IMMUTABLE.with(|c| c.get()), Some(false));
        assert_eq!(freed(), before + 2);
    }

    #[test]
    fn test_payload_calls_route_to_their_entry_point() {
        let lib = library();
        let before = freed();

        let out = lib.backup(1, c"/tmp/out.db").unwrap().into_bytes();
        assert_eq!(out, b"/tmp/out.db");
        assert!(lib.restore(1, c"/tmp/out.db").is_none());
        assert_eq!(freed(), before + 1);
    }

    #[test]
    fn test_from_env_reports_missing_variable() {
        if std::env::var_os(LIBRARY_ENV_VAR).is_some() {
            return;
        }
        let err = unsafe { NativeLibrary::from_env() }.expect_err("no library configured");
        assert!(matches!(err, LoadError::NotConfigured { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = unsafe { NativeLibrary::load("/nonexistent/libcozo_c.so") }
            .expect_err("load should fail");
        match err {
            LoadError::Library { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libcozo_c.so"))
            }
            other => panic!("Expected Library error, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_table_has_no_origin() {
        assert!(library().origin().is_none());
    }
}
