//! Table-backed telemetry origins.
//!
//! An origin is `(schema, table)`; the table carries a `bigserial id` and a
//! `doc jsonb` column holding whatever the monitoring system wrote. Rows are
//! paged by id so only one page is held at a time.

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use tracing::debug;

use licsync_reconcile::{DocumentCursor, RawDocument, SourceError, TelemetrySource};
use licsync_schemas::OriginStyle;

use crate::source_error;

#[derive(Debug, Clone)]
pub struct PgTelemetrySource {
    pool: PgPool,
    label: String,
    page_sql: String,
    style: OriginStyle,
    batch_size: i64,
}

impl PgTelemetrySource {
    pub fn new(
        pool: PgPool,
        scope: &str,
        collection: &str,
        style: OriginStyle,
        batch_size: u32,
    ) -> Self {
        let page_sql = format!(
            "select id, doc from {}.{} where id > $1 order by id limit $2",
            quote_ident(scope),
            quote_ident(collection)
        );
        Self {
            pool,
            label: format!("{scope}.{collection}"),
            page_sql,
            style,
            batch_size: i64::from(batch_size.max(1)),
        }
    }
}

/// Postgres identifier quoting: wrap in `"` and double any embedded `"`.
fn quote_ident(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\"\""))
}

#[async_trait]
impl TelemetrySource for PgTelemetrySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn style(&self) -> OriginStyle {
        self.style
    }

    /// Fetches the first page, so a missing schema or table surfaces here as
    /// [`SourceError::Unreachable`].
    async fn open(&self) -> Result<Box<dyn DocumentCursor>, SourceError> {
        let mut cursor = PgDocumentCursor {
            source: self.clone(),
            last_id: 0,
            page: VecDeque::new(),
            exhausted: false,
        };
        cursor.fetch_page().await?;
        Ok(Box::new(cursor))
    }
}

struct PgDocumentCursor {
    source: PgTelemetrySource,
    last_id: i64,
    page: VecDeque<RawDocument>,
    exhausted: bool,
}

impl PgDocumentCursor {
    async fn fetch_page(&mut self) -> Result<(), SourceError> {
        let rows = sqlx::query(&self.source.page_sql)
            .bind(self.last_id)
            .bind(self.source.batch_size)
            .fetch_all(&self.source.pool)
            .await
            .map_err(|e| source_error(&self.source.label, e))?;

        if (rows.len() as i64) < self.source.batch_size {
            self.exhausted = true;
        }

        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| source_error(&self.source.label, e))?;
            let doc: Value = row
                .try_get("doc")
                .map_err(|e| source_error(&self.source.label, e))?;
            self.last_id = id;

            // Non-object documents still count as processed; they normalize
            // to "no identity".
            let doc = match doc {
                Value::Object(m) => m,
                other => {
                    debug!(origin = %self.source.label, id, kind = ?other, "non-object telemetry document");
                    RawDocument::new()
                }
            };
            self.page.push_back(doc);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentCursor for PgDocumentCursor {
    async fn next_document(&mut self) -> Result<Option<RawDocument>, SourceError> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.page.pop_front())
    }
}
