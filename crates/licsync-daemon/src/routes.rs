//! Axum router and all HTTP handlers for licsync-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Tests compose the bare router directly.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info};

use licsync_reconcile::{reconcile_document, OutcomeKind, StoreError};
use licsync_schemas::{check_license, LicenseUpdate, NewLicense, OriginStyle};

use crate::{
    api_types::{
        CheckLicenseRequest, CheckLicenseResponse, DeleteLicenseResponse, ErrorResponse,
        HealthResponse, UsageReportResponse,
    },
    scheduler::TriggerOutcome,
    state::AppState,
};

/// Source label stamped on outcomes of direct usage reports.
pub const USAGE_REPORT_SOURCE: &str = "usage-report";

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let backend = Router::new()
        .route("/generate-license", post(generate_license))
        .route("/all-licenses", get(all_licenses))
        .route("/update-license/:license_key", put(update_license))
        .route("/delete-license/:license_key", delete(delete_license))
        .route("/check-license", post(check_license_post))
        .route("/check-license/usage", post(usage_report))
        .route("/check-license/:license_key", get(check_license_get))
        .route("/sync-monitoring-now", post(sync_monitoring_now));

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .nest("/backend_api", backend)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error helpers
// ---------------------------------------------------------------------------

fn error_response(status: StatusCode, code: &str, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

fn store_error_response(e: StoreError) -> Response {
    match e {
        StoreError::Conflict(msg) => error_response(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Invalid(v) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_request", v.to_string())
        }
        StoreError::Unavailable(msg) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_unavailable", msg)
        }
        StoreError::Query(msg) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

fn bad_json(rej: JsonRejection) -> Response {
    error_response(StatusCode::BAD_REQUEST, "invalid_request", rej.body_text())
}

fn not_found(license_key: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "not_found",
        format!("no license with key {license_key}"),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(st.status_snapshot().await))
}

// ---------------------------------------------------------------------------
// License CRUD
// ---------------------------------------------------------------------------

pub(crate) async fn generate_license(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<NewLicense>, JsonRejection>,
) -> Response {
    let Json(new) = match payload {
        Ok(p) => p,
        Err(rej) => return bad_json(rej),
    };

    match st.store.insert(new).await {
        Ok(license) => {
            info!(license_key = %license.license_key, "license generated");
            (StatusCode::CREATED, Json(license)).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

pub(crate) async fn all_licenses(State(st): State<Arc<AppState>>) -> Response {
    match st.store.list().await {
        Ok(list) => (StatusCode::OK, Json(list)).into_response(),
        Err(e) => store_error_response(e),
    }
}

pub(crate) async fn update_license(
    State(st): State<Arc<AppState>>,
    Path(license_key): Path<String>,
    payload: Result<Json<LicenseUpdate>, JsonRejection>,
) -> Response {
    let Json(patch) = match payload {
        Ok(p) => p,
        Err(rej) => return bad_json(rej),
    };

    match st.store.update_by_key(&license_key, &patch).await {
        Ok(Some(license)) => {
            info!(license_key = %license_key, "license updated");
            (StatusCode::OK, Json(license)).into_response()
        }
        Ok(None) => not_found(&license_key),
        Err(e) => store_error_response(e),
    }
}

pub(crate) async fn delete_license(
    State(st): State<Arc<AppState>>,
    Path(license_key): Path<String>,
) -> Response {
    match st.store.delete_by_key(&license_key).await {
        Ok(true) => {
            info!(license_key = %license_key, "license deleted");
            (
                StatusCode::OK,
                Json(DeleteLicenseResponse {
                    deleted: true,
                    license_key,
                }),
            )
                .into_response()
        }
        Ok(false) => not_found(&license_key),
        Err(e) => store_error_response(e),
    }
}

// ---------------------------------------------------------------------------
// License check
// ---------------------------------------------------------------------------

async fn check_by_key(st: &AppState, license_key: &str) -> Response {
    match st.store.find_by_key(license_key).await {
        Ok(found) => {
            let check = check_license(found.as_ref(), Utc::now());
            (
                StatusCode::OK,
                Json(CheckLicenseResponse {
                    valid: check.valid,
                    reason: check.reason,
                    license: found,
                }),
            )
                .into_response()
        }
        Err(e) => store_error_response(e),
    }
}

pub(crate) async fn check_license_get(
    State(st): State<Arc<AppState>>,
    Path(license_key): Path<String>,
) -> Response {
    check_by_key(&st, &license_key).await
}

pub(crate) async fn check_license_post(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<CheckLicenseRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => check_by_key(&st, &req.license_key).await,
        Err(rej) => bad_json(rej),
    }
}

// ---------------------------------------------------------------------------
// POST /backend_api/check-license/usage
// ---------------------------------------------------------------------------

/// A client pushing its own usage. Goes through exactly the merge path a
/// monitoring document takes, as a one-document source.
pub(crate) async fn usage_report(
    State(st): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let doc = match payload {
        Ok(Json(Value::Object(doc))) => doc,
        Ok(Json(_)) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "usage report must be a JSON object",
            )
        }
        Err(rej) => return bad_json(rej),
    };

    let outcome = reconcile_document(
        st.store.as_ref(),
        USAGE_REPORT_SOURCE,
        OriginStyle::Nms,
        &doc,
        Utc::now(),
    )
    .await;

    match outcome.kind {
        OutcomeKind::Updated | OutcomeKind::MatchedNoChange => {
            (StatusCode::OK, Json(UsageReportResponse { outcome })).into_response()
        }
        OutcomeKind::NotFound => {
            let who = outcome
                .identity
                .map(|k| k.to_string())
                .unwrap_or_default();
            error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no license matches {who}"),
            )
        }
        OutcomeKind::Skipped => error_response(
            StatusCode::BAD_REQUEST,
            "unusable_report",
            outcome.error.unwrap_or_default(),
        ),
        OutcomeKind::StoreError => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            outcome.error.unwrap_or_default(),
        ),
        OutcomeKind::StoreUnavailable => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_unavailable",
            outcome.error.unwrap_or_default(),
        ),
    }
}

// ---------------------------------------------------------------------------
// POST /backend_api/sync-monitoring-now
// ---------------------------------------------------------------------------

/// The run executes on its own task: a client that disconnects drops only
/// the wait for the report, never the run.
pub(crate) async fn sync_monitoring_now(State(st): State<Arc<AppState>>) -> Response {
    info!("manual monitoring sync requested");
    let sched = Arc::clone(&st.scheduler);
    match tokio::spawn(async move { sched.trigger().await }).await {
        Ok(TriggerOutcome::Completed(report)) => (StatusCode::OK, Json(report)).into_response(),
        Ok(TriggerOutcome::AlreadyRunning) => error_response(
            StatusCode::CONFLICT,
            "already_running",
            "a monitoring sync is already in progress",
        ),
        Err(e) => {
            error!(error = %e, "manual monitoring sync task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "sync_failed",
                format!("sync task failed: {e}"),
            )
        }
    }
}
