///
/// Shared helpers for the binding integration tests.
///
/// The engine itself is `cozo-test-engine`; this module only wraps its
/// entry points in an `Engine`.
///

pub use cozo_test_engine::*;

use cozo_binding::Engine;

pub fn engine() -> Engine {
    unsafe { Engine::from_entry_points(entry_points()) }
}
