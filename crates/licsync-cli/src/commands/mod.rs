//! Command handler modules for licsync-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod sync;

use anyhow::Result;

use licsync_config::{LoadedConfig, SyncConfig};
use licsync_db::PgPool;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Explicit `--config` paths win; otherwise fall back to `LICSYNC_CONFIG`.
pub fn config_paths_or_env(explicit: Vec<String>) -> Vec<String> {
    if explicit.is_empty() {
        licsync_config::config_paths_from_env()
    } else {
        explicit
    }
}

pub fn load_config(paths: &[String]) -> Result<(LoadedConfig, SyncConfig)> {
    licsync_config::load_sync_config(paths)
}

/// Connect using the database env var the config names.
pub async fn connect(cfg: &SyncConfig) -> Result<PgPool> {
    let secrets = licsync_config::resolve_secrets(cfg);
    licsync_db::connect_with(&secrets).await
}
