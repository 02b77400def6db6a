use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use licsync_schemas::OriginStyle;

use crate::normalizer::{normalize, resolve_identity};
use crate::source::{RawDocument, TelemetrySource};
use crate::store::{LicenseStore, StoreError};
use crate::{DocumentOutcome, OutcomeKind, RunReport, SourceReport, SourceStatus};

/// Drives one reconciliation pass over an ordered list of origins.
///
/// Sources are drained sequentially in the order given; a later source's
/// values overwrite an earlier one's for the same record within a run.
pub struct Reconciler {
    store: Arc<dyn LicenseStore>,
    sources: Vec<Box<dyn TelemetrySource>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn LicenseStore>, sources: Vec<Box<dyn TelemetrySource>>) -> Self {
        Self { store, sources }
    }

    pub fn store(&self) -> &Arc<dyn LicenseStore> {
        &self.store
    }

    pub fn source_labels(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.label()).collect()
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// One complete pass. `now` is stamped as `lastMonitoringSyncAt` on every
    /// matched record.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        let mut report = RunReport::empty(now);

        'sources: for source in &self.sources {
            let label = source.label();
            let style = source.style();
            let mut sr = SourceReport::new(label, style);

            let mut cursor = match source.open().await {
                Ok(c) => c,
                Err(e) if e.is_unreachable() => {
                    debug!(origin = label, error = %e, "origin unreachable, skipping");
                    sr.status = SourceStatus::Unreachable {
                        reason: e.to_string(),
                    };
                    report.push_source(sr);
                    continue;
                }
                Err(e) => {
                    warn!(origin = label, error = %e, "origin failed to open");
                    sr.status = SourceStatus::Failed {
                        error: e.to_string(),
                    };
                    report.push_source(sr);
                    continue;
                }
            };

            loop {
                let doc = match cursor.next_document().await {
                    Ok(Some(doc)) => doc,
                    Ok(None) => break,
                    Err(e) if e.is_unreachable() => {
                        debug!(origin = label, error = %e, "origin vanished mid-drain");
                        sr.status = SourceStatus::Unreachable {
                            reason: e.to_string(),
                        };
                        break;
                    }
                    Err(e) => {
                        warn!(origin = label, error = %e, "origin read failed, moving on");
                        sr.status = SourceStatus::Failed {
                            error: e.to_string(),
                        };
                        break;
                    }
                };

                let outcome =
                    reconcile_document(self.store.as_ref(), label, style, &doc, now).await;
                sr.record(outcome.kind);

                if outcome.kind == OutcomeKind::StoreUnavailable {
                    let reason = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "store unavailable".to_string());
                    sr.status = SourceStatus::Failed {
                        error: reason.clone(),
                    };
                    report.outcomes.push(outcome);
                    report.push_source(sr);
                    report.aborted = Some(reason);
                    break 'sources;
                }
                report.outcomes.push(outcome);
            }

            if sr.updated > 0 {
                info!(
                    origin = label,
                    processed = sr.processed,
                    updated = sr.updated,
                    "merged monitoring telemetry"
                );
            }
            report.push_source(sr);
        }

        report.finished_at = Utc::now();

        if let Some(reason) = &report.aborted {
            warn!(
                processed = report.processed,
                updated = report.updated,
                reason = %reason,
                "sync aborted: license store unavailable"
            );
        } else if report.processed == 0 {
            info!("no monitoring documents found");
        } else {
            info!(
                processed = report.processed,
                updated = report.updated,
                unchanged = report.unchanged,
                skipped = report.skipped,
                not_found = report.not_found,
                store_errors = report.store_errors,
                "sync completed"
            );
        }

        report
    }
}

/// Push one raw document through normalize → resolve → patch → classify.
///
/// Never fails: every error is folded into the returned outcome. Unusable
/// documents never reach the store.
pub async fn reconcile_document(
    store: &dyn LicenseStore,
    source: &str,
    style: OriginStyle,
    doc: &RawDocument,
    now: DateTime<Utc>,
) -> DocumentOutcome {
    let view = match normalize(doc, style) {
        Ok(v) => v,
        Err(why) => {
            debug!(origin = source, reason = %why, "skipping unusable document");
            return DocumentOutcome::new(source, resolve_identity(doc), OutcomeKind::Skipped)
                .with_error(why.to_string());
        }
    };
    let identity = view.identity.clone();

    let record = match store.find_one(&identity).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            info!(origin = source, identity = %identity, "no license matches monitoring identity");
            return DocumentOutcome::new(source, Some(identity), OutcomeKind::NotFound);
        }
        Err(e) => return store_failure(source, identity, e),
    };

    let update = view.to_update(now);
    let fields: Vec<String> = update
        .field_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    match store.update_fields(record.id, &update).await {
        Ok(r) if !r.matched => {
            // Deleted between lookup and patch.
            info!(origin = source, identity = %identity, "license vanished before update");
            DocumentOutcome::new(source, Some(identity), OutcomeKind::NotFound)
        }
        Ok(r) if r.changed => {
            info!(
                origin = source,
                license_key = %record.license_key,
                total_hosts = ?update.total_hosts,
                version = ?update.display_version(),
                "license telemetry updated"
            );
            DocumentOutcome::new(source, Some(identity), OutcomeKind::Updated).with_fields(fields)
        }
        Ok(_) => DocumentOutcome::new(source, Some(identity), OutcomeKind::MatchedNoChange)
            .with_fields(fields),
        Err(e) => store_failure(source, identity, e),
    }
}

fn store_failure(
    source: &str,
    identity: licsync_schemas::IdentityKey,
    e: StoreError,
) -> DocumentOutcome {
    let kind = if e.is_unavailable() {
        OutcomeKind::StoreUnavailable
    } else {
        OutcomeKind::StoreError
    };
    warn!(origin = source, identity = %identity, error = %e, "license store rejected document");
    DocumentOutcome::new(source, Some(identity), kind).with_error(e.to_string())
}
