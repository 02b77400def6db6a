use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;

use licsync_config::{ResolvedSecrets, SyncSettings};
use licsync_reconcile::{SourceError, StoreError, TelemetrySource};

mod licenses;
mod telemetry;

pub use licenses::PgLicenseStore;
pub use telemetry::PgTelemetrySource;

pub use sqlx::PgPool;

pub const ENV_DB_URL: &str = "LICSYNC_DATABASE_URL";

/// Connect to Postgres at `url`.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect to Postgres using LICSYNC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Connect using the URL resolved from the config-named env var.
pub async fn connect_with(secrets: &ResolvedSecrets) -> Result<PgPool> {
    connect(secrets.require_database_url()?).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='licenses'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_licenses_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_licenses_table: bool,
}

/// One table-backed source per configured origin, in configured order.
pub fn sources_from_settings(pool: &PgPool, settings: &SyncSettings) -> Vec<Box<dyn TelemetrySource>> {
    settings
        .sources
        .iter()
        .map(|spec| {
            Box::new(PgTelemetrySource::new(
                pool.clone(),
                &spec.scope,
                &spec.collection,
                spec.style,
                settings.batch_size,
            )) as Box<dyn TelemetrySource>
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
const SQLSTATE_UNDEFINED_TABLE: &str = "42P01";
const SQLSTATE_INVALID_SCHEMA: &str = "3F000";

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Connection-level failures: nothing else will work either.
fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

pub(crate) fn store_error(op: &str, err: sqlx::Error) -> StoreError {
    if is_connection_error(&err) {
        return StoreError::Unavailable(format!("{op}: {err}"));
    }
    match sqlstate(&err).as_deref() {
        Some(SQLSTATE_UNIQUE_VIOLATION) => {
            StoreError::Conflict("licenseKey or instanceId already exists".to_string())
        }
        _ => StoreError::Query(format!("{op}: {err}")),
    }
}

pub(crate) fn source_error(label: &str, err: sqlx::Error) -> SourceError {
    match sqlstate(&err).as_deref() {
        Some(SQLSTATE_UNDEFINED_TABLE) | Some(SQLSTATE_INVALID_SCHEMA) => {
            SourceError::Unreachable(format!("{label}: {err}"))
        }
        _ => SourceError::Io(format!("{label}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_unavailable() {
        assert!(store_error("find_one", sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(store_error("find_one", sqlx::Error::PoolClosed).is_unavailable());
    }

    #[test]
    fn missing_row_is_a_query_error() {
        assert!(matches!(
            store_error("find_one", sqlx::Error::RowNotFound),
            StoreError::Query(_)
        ));
    }

    #[test]
    fn non_database_source_errors_are_io() {
        assert!(matches!(
            source_error("public.zabbix_info", sqlx::Error::PoolTimedOut),
            SourceError::Io(_)
        ));
    }
}
