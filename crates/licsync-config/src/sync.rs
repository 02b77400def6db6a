//! Typed view over the merged config JSON.
//!
//! Every key has a default, so an empty layer set yields the stock
//! deployment: sync every 5 minutes over the five known origins.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use licsync_schemas::OriginStyle;

use crate::{LoadedConfig, ENV_DAEMON_ADDR, ENV_SYNC_INTERVAL_SECS};

pub const DEFAULT_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_BATCH_SIZE: u32 = 500;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_URL_ENV: &str = "LICSYNC_DATABASE_URL";

/// Scope name for collections living in the license database itself.
pub const MAIN_SCOPE: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub sync: SyncSettings,
    pub daemon: DaemonSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub interval_secs: u64,
    pub run_on_start: bool,
    /// Rows fetched per round trip when draining a table-backed origin.
    pub batch_size: u32,
    /// Origins in priority order. Later entries win on conflicting fields.
    pub sources: Vec<SourceSpec>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            run_on_start: true,
            batch_size: DEFAULT_BATCH_SIZE,
            sources: default_sources(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// One telemetry origin: `(scope, collection)` plus its alias profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub scope: String,
    pub collection: String,
    pub style: OriginStyle,
}

impl SourceSpec {
    pub fn new(scope: &str, collection: &str, style: OriginStyle) -> Self {
        Self {
            scope: scope.to_string(),
            collection: collection.to_string(),
            style,
        }
    }

    /// `scope.collection`, used in logs and per-source counters.
    pub fn label(&self) -> String {
        format!("{}.{}", self.scope, self.collection)
    }
}

/// The deployment's historical origin order: primary NMS monitoring, then
/// the zabbix monitoring database, then fallback collections in the main
/// database.
pub fn default_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new("NMS_monitoring", "NMS_info", OriginStyle::Nms),
        SourceSpec::new("zabbix_monitoring", "zabbix_info", OriginStyle::Zabbix),
        SourceSpec::new(MAIN_SCOPE, "zabbix_info", OriginStyle::Generic),
        SourceSpec::new(MAIN_SCOPE, "monitoring_info", OriginStyle::Generic),
        SourceSpec::new(MAIN_SCOPE, "license_info", OriginStyle::Generic),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub bind_addr: String,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl DaemonSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid daemon.bind_addr '{}'", self.bind_addr))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// NAME of the env var holding the connection URL.
    pub url_env: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: DEFAULT_DATABASE_URL_ENV.to_string(),
        }
    }
}

impl SyncConfig {
    /// Decode and validate the typed view from a merged config document.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: SyncConfig = serde_json::from_value(config_json.clone())
            .context("config does not match the licsync schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        Self::from_config_json(&loaded.config_json)
    }

    /// Apply `LICSYNC_SYNC_INTERVAL_SECS` / `LICSYNC_DAEMON_ADDR` if set.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(
            std::env::var(ENV_SYNC_INTERVAL_SECS).ok(),
            std::env::var(ENV_DAEMON_ADDR).ok(),
        )
    }

    pub fn with_overrides(
        mut self,
        interval_secs: Option<String>,
        bind_addr: Option<String>,
    ) -> Result<Self> {
        if let Some(raw) = interval_secs.filter(|s| !s.trim().is_empty()) {
            self.sync.interval_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SYNC_INTERVAL_SECS} must be an integer, got '{raw}'"))?;
        }
        if let Some(addr) = bind_addr.filter(|s| !s.trim().is_empty()) {
            self.daemon.bind_addr = addr.trim().to_string();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.interval_secs == 0 {
            bail!("CONFIG_INVALID sync.interval_secs must be > 0");
        }
        if self.sync.batch_size == 0 {
            bail!("CONFIG_INVALID sync.batch_size must be > 0");
        }
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }

        let mut seen = BTreeSet::new();
        for (i, src) in self.sync.sources.iter().enumerate() {
            if src.scope.trim().is_empty() || src.collection.trim().is_empty() {
                bail!("CONFIG_INVALID sync.sources[{i}]: scope and collection are required");
            }
            if !seen.insert(src.label()) {
                bail!(
                    "CONFIG_INVALID sync.sources[{i}]: duplicate origin {}",
                    src.label()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;

    #[test]
    fn empty_config_yields_stock_deployment() {
        let cfg = SyncConfig::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg.sync.interval(), Duration::from_secs(300));
        assert!(cfg.sync.run_on_start);
        assert_eq!(cfg.sync.sources.len(), 5);
        assert_eq!(cfg.sync.sources[0].label(), "NMS_monitoring.NMS_info");
        assert_eq!(cfg.sync.sources[1].style, OriginStyle::Zabbix);
        assert_eq!(cfg.database.url_env, "LICSYNC_DATABASE_URL");
    }

    #[test]
    fn yaml_sources_replace_defaults_in_order() {
        let yaml = r#"
sync:
  interval_secs: 30
  sources:
    - { scope: telemetry, collection: hosts, style: generic }
    - { scope: NMS_monitoring, collection: NMS_info, style: nms }
"#;
        let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
        let cfg = SyncConfig::from_loaded(&loaded).unwrap();
        assert_eq!(cfg.sync.interval_secs, 30);
        let labels: Vec<String> = cfg.sync.sources.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["telemetry.hosts", "NMS_monitoring.NMS_info"]);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = SyncConfig::from_config_json(&serde_json::json!({
            "sync": { "interval_secs": 0 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
    }

    #[test]
    fn duplicate_origin_is_rejected() {
        let err = SyncConfig::from_config_json(&serde_json::json!({
            "sync": { "sources": [
                { "scope": "a", "collection": "b", "style": "nms" },
                { "scope": "a", "collection": "b", "style": "generic" }
            ]}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate origin a.b"));
    }

    #[test]
    fn overrides_apply_and_revalidate() {
        let cfg = SyncConfig::default()
            .with_overrides(Some("15".to_string()), Some("127.0.0.1:9000".to_string()))
            .unwrap();
        assert_eq!(cfg.sync.interval_secs, 15);
        assert_eq!(cfg.daemon.socket_addr().unwrap().port(), 9000);

        assert!(SyncConfig::default()
            .with_overrides(Some("soon".to_string()), None)
            .is_err());
        assert!(SyncConfig::default()
            .with_overrides(Some("0".to_string()), None)
            .is_err());
    }
}
