//! Request and response types for licsync-daemon HTTP endpoints.
//!
//! These types are `Serialize + Deserialize` so they can be JSON-encoded
//! by Axum and decoded by tests. No business logic lives here.

use serde::{Deserialize, Serialize};

use licsync_reconcile::DocumentOutcome;
use licsync_schemas::{CheckReason, License};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable code, e.g. "not_found" | "conflict" |
    /// "invalid_request" | "already_running" | "store_unavailable".
    pub code: String,
}

// ---------------------------------------------------------------------------
// /backend_api/check-license
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckLicenseRequest {
    pub license_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckLicenseResponse {
    pub valid: bool,
    pub reason: Option<CheckReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

// ---------------------------------------------------------------------------
// /backend_api/delete-license
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLicenseResponse {
    pub deleted: bool,
    pub license_key: String,
}

// ---------------------------------------------------------------------------
// /backend_api/check-license/usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReportResponse {
    pub outcome: DocumentOutcome,
}
