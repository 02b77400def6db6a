use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::telemetry::TelemetryUpdate;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Monitored application a license is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Application {
    #[serde(rename = "NMS")]
    Nms,
    #[serde(rename = "grafana")]
    Grafana,
    #[serde(rename = "VAPT")]
    Vapt,
}

impl Application {
    pub fn as_str(&self) -> &'static str {
        match self {
            Application::Nms => "NMS",
            Application::Grafana => "grafana",
            Application::Vapt => "VAPT",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "NMS" => Ok(Application::Nms),
            "grafana" => Ok(Application::Grafana),
            "VAPT" => Ok(Application::Vapt),
            other => Err(ValidationError::UnknownVariant {
                field: "application",
                raw: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    #[default]
    Active,
    Inactive,
    Expired,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "active" => Ok(LicenseStatus::Active),
            "inactive" => Ok(LicenseStatus::Inactive),
            "expired" => Ok(LicenseStatus::Expired),
            other => Err(ValidationError::UnknownVariant {
                field: "status",
                raw: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    #[default]
    Trial,
    Paid,
    Perpetual,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseType::Trial => "trial",
            LicenseType::Paid => "paid",
            LicenseType::Perpetual => "perpetual",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "trial" => Ok(LicenseType::Trial),
            "paid" => Ok(LicenseType::Paid),
            "perpetual" => Ok(LicenseType::Perpetual),
            other => Err(ValidationError::UnknownVariant {
                field: "licenseType",
                raw: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string field was missing or blank.
    Missing { field: &'static str },
    /// `email` does not look like `local@domain.tld`.
    InvalidEmail { raw: String },
    /// A stored enum column held a value outside the known set.
    UnknownVariant { field: &'static str, raw: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Missing { field } => write!(f, "field '{field}' is required"),
            ValidationError::InvalidEmail { raw } => {
                write!(f, "'{raw}' is not a valid email address")
            }
            ValidationError::UnknownVariant { field, raw } => {
                write!(f, "field '{field}' has unknown value '{raw}'")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// License record
// ---------------------------------------------------------------------------

/// The authoritative license record.
///
/// Administrative fields are owned by the CRUD surface. The telemetry block
/// (`total_hosts` .. `last_monitoring_sync_at`) is only ever written through
/// [`License::apply_telemetry`] or its SQL equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    pub id: Uuid,
    pub license_key: String,
    pub instance_id: String,
    pub client_id: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub identiqa_name: Option<String>,
    pub identiqa_email: Option<String>,
    pub email: String,
    pub license_type: LicenseType,
    pub status: LicenseStatus,
    pub expiry_date: DateTime<Utc>,
    pub application: Application,

    pub total_hosts: i64,
    #[serde(rename = "NMSVersion")]
    pub nms_version: Option<String>,
    pub zabbix_version: Option<String>,
    pub version: Option<String>,
    pub last_monitoring_sync_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl License {
    /// Build a fresh record from a validated create request.
    ///
    /// Missing identities are generated: the license key as an upper-case
    /// hyphenated v4 UUID, the instance id as a lower-case one.
    pub fn from_new(new: NewLicense, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            license_key: new
                .license_key
                .unwrap_or_else(|| Uuid::new_v4().to_string().to_uppercase()),
            instance_id: new
                .instance_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            client_id: new.client_id,
            client_name: new.client_name,
            client_email: new.client_email,
            identiqa_name: new.identiqa_name,
            identiqa_email: new.identiqa_email,
            email: new.email,
            license_type: new.license_type,
            status: new.status,
            expiry_date: new.expiry_date,
            application: new.application,
            total_hosts: 0,
            nms_version: None,
            zabbix_version: None,
            version: None,
            last_monitoring_sync_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Partial telemetry merge. Only `Some` fields (plus the sync timestamp)
    /// are written; everything else on the record is left as is.
    ///
    /// Returns `true` when at least one telemetry value changed. `updated_at`
    /// is bumped only in that case.
    pub fn apply_telemetry(&mut self, update: &TelemetryUpdate, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if let Some(hosts) = update.total_hosts {
            changed |= set_if_different(&mut self.total_hosts, hosts);
        }
        if let Some(v) = &update.nms_version {
            changed |= set_if_different(&mut self.nms_version, Some(v.clone()));
        }
        if let Some(v) = &update.zabbix_version {
            changed |= set_if_different(&mut self.zabbix_version, Some(v.clone()));
        }
        if let Some(v) = &update.version {
            changed |= set_if_different(&mut self.version, Some(v.clone()));
        }
        // Always written, never counted as a change.
        self.last_monitoring_sync_at = Some(update.last_monitoring_sync_at);

        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Apply an administrative patch. Identity fields are never touched.
    pub fn apply_update(&mut self, patch: &LicenseUpdate, now: DateTime<Utc>) {
        if let Some(v) = &patch.client_id {
            self.client_id = v.clone();
        }
        if let Some(v) = &patch.client_name {
            self.client_name = Some(v.clone());
        }
        if let Some(v) = &patch.client_email {
            self.client_email = Some(v.clone());
        }
        if let Some(v) = &patch.identiqa_name {
            self.identiqa_name = Some(v.clone());
        }
        if let Some(v) = &patch.identiqa_email {
            self.identiqa_email = Some(v.clone());
        }
        if let Some(v) = &patch.email {
            self.email = v.clone();
        }
        if let Some(v) = patch.license_type {
            self.license_type = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
        if let Some(v) = patch.expiry_date {
            self.expiry_date = v;
        }
        if let Some(v) = patch.application {
            self.application = v;
        }
        self.updated_at = now;
    }
}

fn set_if_different<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

// ---------------------------------------------------------------------------
// Create / update requests
// ---------------------------------------------------------------------------

/// Create request for a license. Identities are optional and generated when
/// absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLicense {
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    pub client_id: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub identiqa_name: Option<String>,
    #[serde(default)]
    pub identiqa_email: Option<String>,
    pub email: String,
    #[serde(default)]
    pub license_type: LicenseType,
    #[serde(default)]
    pub status: LicenseStatus,
    pub expiry_date: DateTime<Utc>,
    pub application: Application,
}

impl NewLicense {
    /// Validate and normalize: trims identities, drops blank optional
    /// identities so they get generated, lower-cases `email`.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.license_key = non_blank(self.license_key);
        self.instance_id = non_blank(self.instance_id);

        if self.client_id.trim().is_empty() {
            return Err(ValidationError::Missing { field: "clientId" });
        }
        self.email = normalize_email(&self.email)?;
        Ok(self)
    }
}

/// Administrative patch. Every field is optional; identity fields are not
/// part of the patch and cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseUpdate {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub identiqa_name: Option<String>,
    #[serde(default)]
    pub identiqa_email: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub license_type: Option<LicenseType>,
    #[serde(default)]
    pub status: Option<LicenseStatus>,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub application: Option<Application>,
}

impl LicenseUpdate {
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(c) = &self.client_id {
            if c.trim().is_empty() {
                return Err(ValidationError::Missing { field: "clientId" });
            }
        }
        if let Some(e) = &self.email {
            self.email = Some(normalize_email(e)?);
        }
        Ok(self)
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Lower-case and check the `something@something.something` shape.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Missing { field: "email" });
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => match domain.rsplit_once('.') {
            Some((host, tld)) => !local.is_empty() && !host.is_empty() && !tld.is_empty(),
            None => false,
        },
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidEmail {
            raw: raw.to_string(),
        });
    }
    Ok(email)
}

// ---------------------------------------------------------------------------
// License check
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckReason {
    NotFound,
    Inactive,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseCheck {
    pub valid: bool,
    pub reason: Option<CheckReason>,
}

/// A license is valid when it is `active` and its expiry lies in the future.
pub fn check_license(license: Option<&License>, now: DateTime<Utc>) -> LicenseCheck {
    let reason = match license {
        None => Some(CheckReason::NotFound),
        Some(l) => match l.status {
            LicenseStatus::Inactive => Some(CheckReason::Inactive),
            LicenseStatus::Expired => Some(CheckReason::Expired),
            LicenseStatus::Active if l.expiry_date <= now => Some(CheckReason::Expired),
            LicenseStatus::Active => None,
        },
    };
    LicenseCheck {
        valid: reason.is_none(),
        reason,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
