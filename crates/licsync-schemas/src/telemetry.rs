use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alias profile a telemetry origin declares.
///
/// `Nms` origins report `zabbixVersion` only under that exact name; `Zabbix`
/// and `Generic` origins also accept a bare `version` as the zabbix version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginStyle {
    Nms,
    Zabbix,
    Generic,
}

impl OriginStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginStyle::Nms => "nms",
            OriginStyle::Zabbix => "zabbix",
            OriginStyle::Generic => "generic",
        }
    }

    /// Whether `version` stands in for a missing `zabbixVersion`.
    pub fn zabbix_falls_back_to_version(&self) -> bool {
        !matches!(self, OriginStyle::Nms)
    }
}

/// Which identity a lookup resolves by.
///
/// Either one is sufficient to resolve exactly one license record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "camelCase")]
pub enum IdentityKey {
    InstanceId(String),
    LicenseKey(String),
}

impl IdentityKey {
    /// Record field this key is matched against.
    pub fn field(&self) -> &'static str {
        match self {
            IdentityKey::InstanceId(_) => "instanceId",
            IdentityKey::LicenseKey(_) => "licenseKey",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            IdentityKey::InstanceId(v) | IdentityKey::LicenseKey(v) => v,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.value())
    }
}

/// Partial telemetry patch handed to the store.
///
/// `None` means "leave the stored value alone", never "clear it". The sync
/// timestamp is always written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_hosts: Option<i64>,
    #[serde(rename = "NMSVersion", skip_serializing_if = "Option::is_none")]
    pub nms_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zabbix_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub last_monitoring_sync_at: DateTime<Utc>,
}

impl TelemetryUpdate {
    /// Names of the record fields this patch writes, in a stable order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(5);
        if self.total_hosts.is_some() {
            out.push("totalHosts");
        }
        if self.nms_version.is_some() {
            out.push("NMSVersion");
        }
        if self.zabbix_version.is_some() {
            out.push("zabbixVersion");
        }
        if self.version.is_some() {
            out.push("version");
        }
        out.push("lastMonitoringSyncAt");
        out
    }

    /// Most specific version string carried, for log lines.
    pub fn display_version(&self) -> Option<&str> {
        self.zabbix_version
            .as_deref()
            .or(self.nms_version.as_deref())
            .or(self.version.as_deref())
    }
}

/// Result of a partial update against one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    /// A record with the given id existed.
    pub matched: bool,
    /// At least one stored value differed from the written value.
    pub changed: bool,
}

impl UpdateResult {
    pub fn not_matched() -> Self {
        Self {
            matched: false,
            changed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_always_include_sync_timestamp() {
        let u = TelemetryUpdate {
            total_hosts: None,
            nms_version: None,
            zabbix_version: Some("6.0".to_string()),
            version: None,
            last_monitoring_sync_at: Utc::now(),
        };
        assert_eq!(u.field_names(), vec!["zabbixVersion", "lastMonitoringSyncAt"]);
        assert_eq!(u.display_version(), Some("6.0"));
    }

    #[test]
    fn identity_key_display() {
        let k = IdentityKey::LicenseKey("K9".to_string());
        assert_eq!(k.to_string(), "licenseKey=K9");
        assert_eq!(k.field(), "licenseKey");
    }

    #[test]
    fn absent_fields_are_not_serialized() {
        let u = TelemetryUpdate {
            total_hosts: Some(3),
            nms_version: None,
            zabbix_version: None,
            version: None,
            last_monitoring_sync_at: Utc::now(),
        };
        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["totalHosts"], 3);
        assert!(v.get("NMSVersion").is_none());
        assert!(v.get("version").is_none());
    }
}
