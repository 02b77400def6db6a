//! License record store contract.

use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use licsync_schemas::{
    IdentityKey, License, LicenseUpdate, NewLicense, TelemetryUpdate, UpdateResult,
    ValidationError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached at all (pool closed, connection refused).
    /// The reconciler ends the run on this one.
    Unavailable(String),
    /// A single statement failed.
    Query(String),
    /// Unique license key / instance id already taken.
    Conflict(String),
    /// Request rejected by validation.
    Invalid(ValidationError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Query(msg) => write!(f, "store query failed: {msg}"),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::Invalid(e) => write!(f, "invalid request: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<ValidationError> for StoreError {
    fn from(e: ValidationError) -> Self {
        StoreError::Invalid(e)
    }
}

/// Keyed license store.
///
/// The reconciler only needs [`find_one`](LicenseStore::find_one) and
/// [`update_fields`](LicenseStore::update_fields); the rest backs the
/// administrative HTTP surface.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    async fn find_one(&self, key: &IdentityKey) -> Result<Option<License>, StoreError>;

    /// Write only the fields present in `update`. Must be a single atomic
    /// patch of one record.
    async fn update_fields(
        &self,
        record_id: Uuid,
        update: &TelemetryUpdate,
    ) -> Result<UpdateResult, StoreError>;

    async fn insert(&self, new: NewLicense) -> Result<License, StoreError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<License>, StoreError>;

    async fn update_by_key(
        &self,
        license_key: &str,
        patch: &LicenseUpdate,
    ) -> Result<Option<License>, StoreError>;

    async fn delete_by_key(&self, license_key: &str) -> Result<bool, StoreError>;

    async fn find_by_key(&self, license_key: &str) -> Result<Option<License>, StoreError> {
        self.find_one(&IdentityKey::LicenseKey(license_key.to_string()))
            .await
    }
}
