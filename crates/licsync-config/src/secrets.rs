//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `database.url_env`).
//! - Binaries call [`resolve_secrets`] once at startup and pass the result
//!   into constructors; `std::env::var` for secrets is not scattered around.
//! - `Debug` redacts values. Errors reference the env var NAME, never the
//!   value.

use anyhow::{bail, Result};

use crate::sync::SyncConfig;

/// All runtime-resolved secrets for one process.
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Name of the env var the database URL was read from.
    pub database_url_env: String,
    /// Postgres connection URL. `None` if the named env var was absent or blank.
    pub database_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url_env", &self.database_url_env)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

impl ResolvedSecrets {
    /// The database URL, or an error naming the env var that should hold it.
    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) => Ok(url),
            None => bail!(
                "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
                self.database_url_env
            ),
        }
    }
}

/// Resolve secrets named by `cfg` from the process environment.
pub fn resolve_secrets(cfg: &SyncConfig) -> ResolvedSecrets {
    resolve_secrets_with(cfg, |name| std::env::var(name).ok())
}

/// Same as [`resolve_secrets`] with an injectable lookup.
pub fn resolve_secrets_with<F>(cfg: &SyncConfig, lookup: F) -> ResolvedSecrets
where
    F: Fn(&str) -> Option<String>,
{
    let name = cfg.database.url_env.trim().to_string();
    let database_url = lookup(&name).filter(|v| !v.trim().is_empty());
    ResolvedSecrets {
        database_url_env: name,
        database_url,
    }
}
