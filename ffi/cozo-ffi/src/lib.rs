///
/// cozo-ffi - Raw C ABI of the Cozo engine library
///
/// This crate is the only place in the workspace that touches raw pointers:
///
/// - `abi` declares the entry-point signatures of `cozo_c.h` and the
///   `EntryPoints` table holding one function pointer per symbol
/// - `library` resolves that table from a shared library (libloading) or
///   from the statically linked archive (`linked` feature)
/// - `buffer` owns engine-allocated strings and returns them to the engine
///   through `cozo_free_str` exactly once, on drop
///
/// Everything above this layer works with `&CStr` arguments and `ForeignStr`
/// results; JSON encoding lives in `cozo-binding`.
///

pub mod abi;
pub mod buffer;
pub mod error;
pub mod library;

pub use abi::*;
pub use buffer::ForeignStr;
pub use error::LoadError;
pub use library::NativeLibrary;
