//! Field normalization for raw telemetry documents.
//!
//! Every alias the origins have ever used lives here as an ordered fallback
//! list. The engine never looks at raw field names.
//!
//! It does **not**:
//! - touch the store
//! - stamp the sync time (the engine adds it to the update set)

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use licsync_schemas::{IdentityKey, OriginStyle, TelemetryUpdate};

use crate::source::RawDocument;

// ---------------------------------------------------------------------------
// Alias tables (first non-empty wins)
// ---------------------------------------------------------------------------

pub const INSTANCE_ID_ALIASES: &[&str] = &["instanceId", "instanceID", "instance_id"];
pub const LICENSE_KEY_ALIASES: &[&str] = &["licenseKey", "license_key"];
pub const TOTAL_HOSTS_FIELD: &str = "totalHosts";
pub const NMS_VERSION_ALIASES: &[&str] = &["NMSVersion"];
pub const ZABBIX_VERSION_ALIASES: &[&str] = &["zabbixVersion"];
/// Consulted for `zabbixVersion` only on zabbix-style and generic origins.
pub const ZABBIX_VERSION_FALLBACK: &[&str] = &["version"];
pub const VERSION_ALIASES: &[&str] = &["version"];

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Alias-resolved subset of a raw document.
///
/// `None` fields were absent (or unusable) in the source and must not be
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalView {
    pub identity: IdentityKey,
    pub total_hosts: Option<i64>,
    pub nms_version: Option<String>,
    pub zabbix_version: Option<String>,
    pub version: Option<String>,
}

impl CanonicalView {
    pub fn telemetry_field_count(&self) -> usize {
        [
            self.total_hosts.is_some(),
            self.nms_version.is_some(),
            self.zabbix_version.is_some(),
            self.version.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Update set for the store: the view's fields plus the run's sync time.
    pub fn to_update(&self, now: DateTime<Utc>) -> TelemetryUpdate {
        TelemetryUpdate {
            total_hosts: self.total_hosts,
            nms_version: self.nms_version.clone(),
            zabbix_version: self.zabbix_version.clone(),
            version: self.version.clone(),
            last_monitoring_sync_at: now,
        }
    }
}

/// Why a document was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unusable {
    /// Neither an instance id nor a license key under any known alias.
    NoIdentity,
    /// Identity present but no telemetry field survived extraction.
    NoTelemetry,
}

impl fmt::Display for Unusable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unusable::NoIdentity => write!(f, "document carries no instance id or license key"),
            Unusable::NoTelemetry => write!(f, "document carries no telemetry fields"),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Produce the canonical view of `doc`, or say why it cannot be used.
pub fn normalize(doc: &RawDocument, style: OriginStyle) -> Result<CanonicalView, Unusable> {
    let identity = resolve_identity(doc).ok_or(Unusable::NoIdentity)?;

    let zabbix_version = first_version(doc, ZABBIX_VERSION_ALIASES).or_else(|| {
        if style.zabbix_falls_back_to_version() {
            first_version(doc, ZABBIX_VERSION_FALLBACK)
        } else {
            None
        }
    });

    let view = CanonicalView {
        identity,
        total_hosts: doc.get(TOTAL_HOSTS_FIELD).and_then(host_count),
        nms_version: first_version(doc, NMS_VERSION_ALIASES),
        zabbix_version,
        version: first_version(doc, VERSION_ALIASES),
    };

    if view.telemetry_field_count() == 0 {
        return Err(Unusable::NoTelemetry);
    }
    Ok(view)
}

/// Instance id takes precedence over license key.
pub fn resolve_identity(doc: &RawDocument) -> Option<IdentityKey> {
    if let Some(id) = first_non_empty(doc, INSTANCE_ID_ALIASES) {
        return Some(IdentityKey::InstanceId(id));
    }
    first_non_empty(doc, LICENSE_KEY_ALIASES).map(IdentityKey::LicenseKey)
}

fn first_non_empty(doc: &RawDocument, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|name| match doc.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    })
}

/// Like [`first_non_empty`], but a numeric version (`6.0` in some zabbix
/// exports) is kept in its JSON text form instead of dropped.
fn first_version(doc: &RawDocument, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|name| match doc.get(*name) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Numbers only. Strings, bools and nulls are dropped rather than coerced.
/// Negative and fractional values cannot be a host count and are dropped too.
fn host_count(v: &Value) -> Option<i64> {
    let Value::Number(n) = v else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return (i >= 0).then_some(i);
    }
    if n.as_u64().is_some() {
        // Larger than i64::MAX.
        return None;
    }
    let f = n.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
