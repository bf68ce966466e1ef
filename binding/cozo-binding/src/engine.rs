///
/// Loaded engine library.
///
/// `Engine` is a cheap, cloneable handle on a resolved `NativeLibrary`.
/// Every `Db` opened through it keeps the library alive, so symbols stay
/// mapped until the last handle is closed.
///

use std::path::Path;
use std::sync::Arc;

use cozo_ffi::{EntryPoints, NativeLibrary};

use crate::db::Db;
use crate::error::{Error, Result};
use crate::payload::{Map, StorageEngine, c_text, encode_optional_map};

#[derive(Debug, Clone)]
pub struct Engine {
    native: Arc<NativeLibrary>,
}

impl Engine {
    /// Load libcozo_c from a shared library file.
    ///
    /// # Safety
    ///
    /// See `NativeLibrary::load`: the file must be a libcozo_c build that
    /// matches `cozo_ffi::ABI_VERSION`.
    pub unsafe fn load(path: impl AsRef<Path>) -> Result<Self> {
        let native = unsafe { NativeLibrary::load(path) }?;
        Ok(Self::from_native(native))
    }

    /// Load the library named by `COZO_C_LIB`.
    ///
    /// # Safety
    ///
    /// Same contract as `load`.
    pub unsafe fn from_env() -> Result<Self> {
        let native = unsafe { NativeLibrary::from_env() }?;
        Ok(Self::from_native(native))
    }

    /// Engine linked into this binary (`linked` feature).
    #[cfg(feature = "linked")]
    pub fn linked() -> Self {
        Self::from_native(NativeLibrary::linked())
    }

    /// Wrap a hand-assembled entry-point table.
    ///
    /// # Safety
    ///
    /// See `NativeLibrary::from_entry_points`.
    pub unsafe fn from_entry_points(entry_points: EntryPoints) -> Self {
        Self::from_native(unsafe { NativeLibrary::from_entry_points(entry_points) })
    }

    fn from_native(native: NativeLibrary) -> Self {
        Self {
            native: Arc::new(native),
        }
    }

    pub fn native(&self) -> &NativeLibrary {
        &self.native
    }

    /// Open a database.
    ///
    /// `options` is sent as a JSON object (`{}` when `None`). A failure
    /// reported by the engine comes back as `Error::Open` with its message.
    pub fn open(&self, engine: StorageEngine, path: &str, options: Option<&Map>) -> Result<Db> {
        let c_engine = c_text(engine.as_str())?;
        let c_path = c_text(path)?;
        let c_options = encode_optional_map("open options", options)?;

        tracing::debug!(engine = %engine, path, "opening database");
        match self.native.open_db(&c_engine, &c_path, &c_options) {
            Ok(id) => {
                tracing::debug!(db = id, "database opened");
                Ok(Db::new(self.clone(), id))
            }
            Err(message) => {
                let message = message.into_string_lossy();
                tracing::debug!(engine = %engine, error = %message, "open failed");
                Err(Error::Open(message))
            }
        }
    }

    pub fn open_in_memory(&self) -> Result<Db> {
        self.open(StorageEngine::Mem, "", None)
    }
}
