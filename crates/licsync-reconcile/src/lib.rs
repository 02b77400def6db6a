//! licsync-reconcile
//!
//! Monitoring reconciliation: merges host/version telemetry from several
//! optional origins into the authoritative license records.
//!
//! Rules:
//! - Origins are drained one at a time, in priority order. Later origins win
//!   on conflicting fields.
//! - Only fields present in a document are written. Absent fields are never
//!   cleared.
//! - Nothing below the run level is fatal: an unreachable origin, an
//!   unusable document, an unknown identity or a rejected write is tallied
//!   and the run moves on. Only a store that is entirely gone ends a run
//!   early.
//!
//! No scheduling here; the daemon owns the clock.

mod engine;
pub mod memory;
pub mod normalizer;
pub mod source;
pub mod store;
mod types;

pub use engine::{reconcile_document, Reconciler};
pub use memory::{HoldHandle, MemoryLicenseStore, MemorySource};
pub use normalizer::{normalize, CanonicalView, Unusable};
pub use source::{DocumentCursor, RawDocument, SourceError, TelemetrySource};
pub use store::{LicenseStore, StoreError};
pub use types::*;
