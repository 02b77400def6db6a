//! licsync-schemas
//!
//! License record and the small set of types shared by the store, the
//! reconciler and the HTTP surface.
//!
//! Pure data. No IO, no async.

mod license;
mod telemetry;

pub use license::*;
pub use telemetry::*;
