//! End-to-end merges against the in-memory store.
//!
//! GREEN when:
//! - a matching document patches exactly the fields it carries and stamps
//!   the run start time,
//! - an unknown identity leaves the store untouched,
//! - restating the same values is reported as matched-no-change,
//! - instanceId wins over licenseKey when a document carries both.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use licsync_reconcile::*;
use licsync_schemas::{
    Application, IdentityKey, License, LicenseStatus, LicenseType, NewLicense, OriginStyle,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn license(key: &str, instance: &str) -> License {
    License::from_new(
        NewLicense {
            license_key: Some(key.to_string()),
            instance_id: Some(instance.to_string()),
            client_id: "client".to_string(),
            client_name: None,
            client_email: None,
            identiqa_name: None,
            identiqa_email: None,
            email: "ops@example.com".to_string(),
            license_type: LicenseType::Trial,
            status: LicenseStatus::Active,
            expiry_date: t0() + Duration::days(365),
            application: Application::Nms,
        },
        t0() - Duration::days(1),
    )
}

fn doc(v: Value) -> RawDocument {
    v.as_object().cloned().unwrap()
}

fn reconciler(store: Arc<MemoryLicenseStore>, docs: Vec<RawDocument>) -> Reconciler {
    let src = MemorySource::new("zabbix_monitoring.zabbix_info", OriginStyle::Zabbix, docs);
    Reconciler::new(store, vec![Box::new(src)])
}

#[tokio::test]
async fn matching_document_updates_record() {
    let store = Arc::new(MemoryLicenseStore::with_records(vec![license("K1", "X1")]));
    let r = reconciler(
        store.clone(),
        vec![doc(json!({ "instanceID": "X1", "totalHosts": 42, "zabbixVersion": "6.0" }))],
    );

    let report = r.run_at(t0()).await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.updated, 1);
    assert!(report.aborted.is_none());
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].kind, OutcomeKind::Updated);
    assert_eq!(
        report.outcomes[0].fields,
        vec!["totalHosts", "zabbixVersion", "lastMonitoringSyncAt"]
    );

    let rec = store
        .get(&IdentityKey::InstanceId("X1".to_string()))
        .await
        .unwrap();
    assert_eq!(rec.total_hosts, 42);
    assert_eq!(rec.zabbix_version.as_deref(), Some("6.0"));
    assert_eq!(rec.last_monitoring_sync_at, Some(t0()));
    assert_eq!(rec.version, None);
    assert_eq!(rec.nms_version, None);
}

#[tokio::test]
async fn unknown_license_key_is_not_found_and_mutates_nothing() {
    let store = Arc::new(MemoryLicenseStore::with_records(vec![license("K1", "X1")]));
    let before = store.snapshot().await;
    let r = reconciler(
        store.clone(),
        vec![doc(json!({ "license_key": "K9", "totalHosts": 5 }))],
    );

    let report = r.run_at(t0()).await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.not_found, 1);
    assert_eq!(report.outcomes[0].kind, OutcomeKind::NotFound);
    assert_eq!(
        report.outcomes[0].identity,
        Some(IdentityKey::LicenseKey("K9".to_string()))
    );
    assert_eq!(store.update_calls(), 0);
    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn same_view_twice_is_updated_then_unchanged() {
    let store = Arc::new(MemoryLicenseStore::with_records(vec![license("K1", "X1")]));
    let r = reconciler(
        store.clone(),
        vec![doc(json!({ "instanceId": "X1", "totalHosts": 7, "version": "2.1" }))],
    );

    let first = r.run_at(t0()).await;
    assert_eq!(first.outcomes[0].kind, OutcomeKind::Updated);

    let second_run = t0() + Duration::minutes(5);
    let second = r.run_at(second_run).await;
    assert_eq!(second.outcomes[0].kind, OutcomeKind::MatchedNoChange);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 1);

    // The sync stamp still moves on a matched-no-change document.
    let rec = store
        .get(&IdentityKey::InstanceId("X1".to_string()))
        .await
        .unwrap();
    assert_eq!(rec.last_monitoring_sync_at, Some(second_run));
}

#[tokio::test]
async fn total_hosts_only_view_leaves_versions_alone() {
    let mut seeded = license("K1", "X1");
    seeded.nms_version = Some("nms-3".to_string());
    seeded.zabbix_version = Some("5.4".to_string());
    seeded.version = Some("v9".to_string());
    let store = Arc::new(MemoryLicenseStore::with_records(vec![seeded]));

    let r = reconciler(
        store.clone(),
        vec![doc(json!({ "instanceId": "X1", "totalHosts": 11 }))],
    );
    let report = r.run_at(t0()).await;
    assert_eq!(report.updated, 1);

    let rec = store
        .get(&IdentityKey::InstanceId("X1".to_string()))
        .await
        .unwrap();
    assert_eq!(rec.total_hosts, 11);
    assert_eq!(rec.nms_version.as_deref(), Some("nms-3"));
    assert_eq!(rec.zabbix_version.as_deref(), Some("5.4"));
    assert_eq!(rec.version.as_deref(), Some("v9"));
}

#[tokio::test]
async fn instance_id_takes_precedence_over_license_key() {
    // K1 belongs to X1, but the document's instanceId points at X2.
    let store = Arc::new(MemoryLicenseStore::with_records(vec![
        license("K1", "X1"),
        license("K2", "X2"),
    ]));
    let r = reconciler(
        store.clone(),
        vec![doc(json!({ "licenseKey": "K1", "instanceId": "X2", "totalHosts": 3 }))],
    );

    let report = r.run_at(t0()).await;
    assert_eq!(
        report.outcomes[0].identity,
        Some(IdentityKey::InstanceId("X2".to_string()))
    );

    let x1 = store
        .get(&IdentityKey::InstanceId("X1".to_string()))
        .await
        .unwrap();
    let x2 = store
        .get(&IdentityKey::InstanceId("X2".to_string()))
        .await
        .unwrap();
    assert_eq!(x1.total_hosts, 0);
    assert_eq!(x2.total_hosts, 3);
}

#[tokio::test]
async fn nms_origin_does_not_treat_version_as_zabbix_version() {
    let store = Arc::new(MemoryLicenseStore::with_records(vec![license("K1", "X1")]));
    let src = MemorySource::new(
        "NMS_monitoring.NMS_info",
        OriginStyle::Nms,
        vec![doc(json!({ "instanceId": "X1", "NMSVersion": "4.2", "version": "4.2.1" }))],
    );
    let r = Reconciler::new(store.clone(), vec![Box::new(src)]);
    r.run_at(t0()).await;

    let rec = store
        .get(&IdentityKey::InstanceId("X1".to_string()))
        .await
        .unwrap();
    assert_eq!(rec.nms_version.as_deref(), Some("4.2"));
    assert_eq!(rec.version.as_deref(), Some("4.2.1"));
    assert_eq!(rec.zabbix_version, None);
}
