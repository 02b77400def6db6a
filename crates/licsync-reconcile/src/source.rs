//! Telemetry origin boundary.
//!
//! This module defines **only** the raw document type, the error type and
//! the source/cursor traits. Concrete origins live elsewhere
//! (`memory.rs`, `licsync-db`).

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};

use licsync_schemas::OriginStyle;

/// Untyped key/value bag exactly as the origin stored it.
pub type RawDocument = Map<String, Value>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The scope or collection does not exist. Expected for optional origins.
    Unreachable(String),
    /// Any other transport or decode failure.
    Io(String),
}

impl SourceError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, SourceError::Unreachable(_))
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unreachable(msg) => write!(f, "origin unreachable: {msg}"),
            SourceError::Io(msg) => write!(f, "origin io error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One telemetry origin.
///
/// Object safe so the engine can hold an ordered `Vec<Box<dyn TelemetrySource>>`.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// `scope.collection`; appears in logs and per-source counters.
    fn label(&self) -> &str;

    /// Alias profile for documents from this origin.
    fn style(&self) -> OriginStyle;

    /// Start a single forward pass over the origin.
    async fn open(&self) -> Result<Box<dyn DocumentCursor>, SourceError>;
}

/// Lazy, forward-only iteration over one origin.
#[async_trait]
pub trait DocumentCursor: Send {
    /// `Ok(None)` once the origin is exhausted.
    async fn next_document(&mut self) -> Result<Option<RawDocument>, SourceError>;
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for std::sync::Arc<T> {
    fn label(&self) -> &str {
        (**self).label()
    }

    fn style(&self) -> OriginStyle {
        (**self).style()
    }

    async fn open(&self) -> Result<Box<dyn DocumentCursor>, SourceError> {
        (**self).open().await
    }
}
