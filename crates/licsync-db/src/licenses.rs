use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use licsync_reconcile::{LicenseStore, StoreError};
use licsync_schemas::{
    Application, IdentityKey, License, LicenseStatus, LicenseType, LicenseUpdate, NewLicense,
    TelemetryUpdate, UpdateResult,
};

use crate::store_error;

const LICENSE_COLUMNS: &str = r#"
    id, license_key, instance_id, client_id, client_name, client_email,
    identiqa_name, identiqa_email, email, license_type, status, expiry_date,
    application, total_hosts, nms_version, zabbix_version, version,
    last_monitoring_sync_at, created_at, updated_at
"#;

/// `licenses` table behind the [`LicenseStore`] contract.
#[derive(Debug, Clone)]
pub struct PgLicenseStore {
    pool: PgPool,
}

impl PgLicenseStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn license_from_row(row: &PgRow) -> Result<License, StoreError> {
    let decode = |e: sqlx::Error| store_error("decode license row", e);
    let invalid = |e: licsync_schemas::ValidationError| {
        StoreError::Query(format!("decode license row: {e}"))
    };

    Ok(License {
        id: row.try_get("id").map_err(decode)?,
        license_key: row.try_get("license_key").map_err(decode)?,
        instance_id: row.try_get("instance_id").map_err(decode)?,
        client_id: row.try_get("client_id").map_err(decode)?,
        client_name: row.try_get("client_name").map_err(decode)?,
        client_email: row.try_get("client_email").map_err(decode)?,
        identiqa_name: row.try_get("identiqa_name").map_err(decode)?,
        identiqa_email: row.try_get("identiqa_email").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        license_type: LicenseType::parse(&row.try_get::<String, _>("license_type").map_err(decode)?)
            .map_err(invalid)?,
        status: LicenseStatus::parse(&row.try_get::<String, _>("status").map_err(decode)?)
            .map_err(invalid)?,
        expiry_date: row.try_get("expiry_date").map_err(decode)?,
        application: Application::parse(&row.try_get::<String, _>("application").map_err(decode)?)
            .map_err(invalid)?,
        total_hosts: row.try_get("total_hosts").map_err(decode)?,
        nms_version: row.try_get("nms_version").map_err(decode)?,
        zabbix_version: row.try_get("zabbix_version").map_err(decode)?,
        version: row.try_get("version").map_err(decode)?,
        last_monitoring_sync_at: row.try_get("last_monitoring_sync_at").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[async_trait]
impl LicenseStore for PgLicenseStore {
    async fn find_one(&self, key: &IdentityKey) -> Result<Option<License>, StoreError> {
        let column = match key {
            IdentityKey::InstanceId(_) => "instance_id",
            IdentityKey::LicenseKey(_) => "license_key",
        };
        let sql = format!("select {LICENSE_COLUMNS} from licenses where {column} = $1");

        let row = sqlx::query(&sql)
            .bind(key.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("find_one", e))?;

        row.as_ref().map(license_from_row).transpose()
    }

    /// Single statement: the row is locked, compared and patched at once.
    /// `coalesce` keeps every column the update does not carry.
    async fn update_fields(
        &self,
        record_id: Uuid,
        update: &TelemetryUpdate,
    ) -> Result<UpdateResult, StoreError> {
        let row = sqlx::query(
            r#"
            with prev as (
                select
                    id,
                    ($2::bigint is not null and $2 is distinct from total_hosts)
                    or ($3::text is not null and $3 is distinct from nms_version)
                    or ($4::text is not null and $4 is distinct from zabbix_version)
                    or ($5::text is not null and $5 is distinct from version)
                    as changed
                from licenses
                where id = $1
                for update
            )
            update licenses l set
                total_hosts = coalesce($2, l.total_hosts),
                nms_version = coalesce($3, l.nms_version),
                zabbix_version = coalesce($4, l.zabbix_version),
                version = coalesce($5, l.version),
                last_monitoring_sync_at = $6,
                updated_at = case when prev.changed then now() else l.updated_at end
            from prev
            where l.id = prev.id
            returning prev.changed
            "#,
        )
        .bind(record_id)
        .bind(update.total_hosts)
        .bind(update.nms_version.as_deref())
        .bind(update.zabbix_version.as_deref())
        .bind(update.version.as_deref())
        .bind(update.last_monitoring_sync_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("update_fields", e))?;

        match row {
            None => Ok(UpdateResult::not_matched()),
            Some(r) => Ok(UpdateResult {
                matched: true,
                changed: r
                    .try_get::<bool, _>("changed")
                    .map_err(|e| store_error("update_fields", e))?,
            }),
        }
    }

    async fn insert(&self, new: NewLicense) -> Result<License, StoreError> {
        let license = License::from_new(new.validated()?, Utc::now());

        let sql = format!(
            r#"
            insert into licenses (
              id, license_key, instance_id, client_id, client_name, client_email,
              identiqa_name, identiqa_email, email, license_type, status,
              expiry_date, application, created_at, updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14
            )
            returning {LICENSE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(license.id)
            .bind(&license.license_key)
            .bind(&license.instance_id)
            .bind(&license.client_id)
            .bind(&license.client_name)
            .bind(&license.client_email)
            .bind(&license.identiqa_name)
            .bind(&license.identiqa_email)
            .bind(&license.email)
            .bind(license.license_type.as_str())
            .bind(license.status.as_str())
            .bind(license.expiry_date)
            .bind(license.application.as_str())
            .bind(license.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("insert", e))?;

        license_from_row(&row)
    }

    async fn list(&self) -> Result<Vec<License>, StoreError> {
        let sql = format!("select {LICENSE_COLUMNS} from licenses order by created_at desc");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("list", e))?;

        rows.iter().map(license_from_row).collect()
    }

    async fn update_by_key(
        &self,
        license_key: &str,
        patch: &LicenseUpdate,
    ) -> Result<Option<License>, StoreError> {
        let patch = patch.clone().validated()?;

        let sql = format!(
            r#"
            update licenses set
                client_id = coalesce($2, client_id),
                client_name = coalesce($3, client_name),
                client_email = coalesce($4, client_email),
                identiqa_name = coalesce($5, identiqa_name),
                identiqa_email = coalesce($6, identiqa_email),
                email = coalesce($7, email),
                license_type = coalesce($8, license_type),
                status = coalesce($9, status),
                expiry_date = coalesce($10, expiry_date),
                application = coalesce($11, application),
                updated_at = now()
            where license_key = $1
            returning {LICENSE_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(license_key)
            .bind(&patch.client_id)
            .bind(&patch.client_name)
            .bind(&patch.client_email)
            .bind(&patch.identiqa_name)
            .bind(&patch.identiqa_email)
            .bind(&patch.email)
            .bind(patch.license_type.map(|t| t.as_str()))
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.expiry_date)
            .bind(patch.application.map(|a| a.as_str()))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_error("update_by_key", e))?;

        row.as_ref().map(license_from_row).transpose()
    }

    async fn delete_by_key(&self, license_key: &str) -> Result<bool, StoreError> {
        let res = sqlx::query("delete from licenses where license_key = $1")
            .bind(license_key)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("delete_by_key", e))?;
        Ok(res.rows_affected() > 0)
    }
}
