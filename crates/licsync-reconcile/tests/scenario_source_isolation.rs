//! Source fault isolation and ordering.
//!
//! GREEN when:
//! - an unreachable origin neither fails the run nor hides later origins,
//! - an origin that errors mid-drain keeps what it yielded and the next
//!   origin still runs,
//! - a later origin's value wins for the same record,
//! - unusable documents never reach the store.

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
            license_type: LicenseType::Paid,
            status: LicenseStatus::Active,
            expiry_date: t0() + Duration::days(30),
            application: Application::Vapt,
        },
        t0() - Duration::days(1),
    )
}

fn doc(v: Value) -> RawDocument {
    v.as_object().cloned().unwrap()
}

fn seeded_store() -> Arc<MemoryLicenseStore> {
    Arc::new(MemoryLicenseStore::with_records(vec![
        license("K1", "I1"),
        license("K2", "I2"),
        license("K3", "I3"),
    ]))
}

#[tokio::test]
async fn unreachable_origin_does_not_hide_the_next_one() {
    let store = seeded_store();
    let a = MemorySource::unreachable("NMS_monitoring.NMS_info", OriginStyle::Nms);
    let b = MemorySource::new(
        "zabbix_monitoring.zabbix_info",
        OriginStyle::Zabbix,
        vec![
            doc(json!({ "instanceId": "I1", "totalHosts": 1 })),
            doc(json!({ "instanceId": "I2", "totalHosts": 2 })),
            doc(json!({ "instanceId": "I3", "totalHosts": 3 })),
        ],
    );
    let r = Reconciler::new(store.clone(), vec![Box::new(a), Box::new(b)]);

    let report = r.run_at(t0()).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.processed, 3);
    assert_eq!(report.updated, 3);

    let a_report = report.source("NMS_monitoring.NMS_info").unwrap();
    assert!(matches!(a_report.status, SourceStatus::Unreachable { .. }));
    assert_eq!(a_report.processed, 0);

    let b_report = report.source("zabbix_monitoring.zabbix_info").unwrap();
    assert_eq!(b_report.status, SourceStatus::Drained);
    assert_eq!(b_report.processed, 3);
    assert_eq!(b_report.updated, 3);

    let by_source = report.updated_by_source();
    assert_eq!(by_source["NMS_monitoring.NMS_info"], 0);
    assert_eq!(by_source["zabbix_monitoring.zabbix_info"], 3);
}

#[tokio::test]
async fn failing_origins_are_contained() {
    let store = seeded_store();
    let broken = MemorySource::failing("public.license_info", OriginStyle::Generic);
    let flaky = MemorySource::new(
        "public.zabbix_info",
        OriginStyle::Generic,
        vec![
            doc(json!({ "instanceId": "I1", "version": "a" })),
            doc(json!({ "instanceId": "I2", "version": "b" })),
        ],
    )
    .fail_after(1);
    let healthy = MemorySource::new(
        "public.monitoring_info",
        OriginStyle::Generic,
        vec![doc(json!({ "instanceId": "I3", "version": "c" }))],
    );
    let r = Reconciler::new(
        store.clone(),
        vec![Box::new(broken), Box::new(flaky), Box::new(healthy)],
    );

    let report = r.run_at(t0()).await;

    assert!(report.aborted.is_none());
    assert_eq!(report.processed, 2);
    assert_eq!(report.updated, 2);
    assert!(matches!(
        report.source("public.license_info").unwrap().status,
        SourceStatus::Failed { .. }
    ));
    let flaky_report = report.source("public.zabbix_info").unwrap();
    assert!(matches!(flaky_report.status, SourceStatus::Failed { .. }));
    assert_eq!(flaky_report.processed, 1);
    assert_eq!(
        report.source("public.monitoring_info").unwrap().status,
        SourceStatus::Drained
    );

    let i2 = store
        .get(&IdentityKey::InstanceId("I2".to_string()))
        .await
        .unwrap();
    assert_eq!(i2.version, None);
}

#[tokio::test]
async fn later_origin_wins_on_conflicting_fields() {
    let store = seeded_store();
    let first = MemorySource::new(
        "zabbix_monitoring.zabbix_info",
        OriginStyle::Zabbix,
        vec![doc(json!({ "instanceId": "I1", "version": "6.0", "totalHosts": 10 }))],
    );
    let second = MemorySource::new(
        "public.monitoring_info",
        OriginStyle::Generic,
        vec![doc(json!({ "licenseKey": "K1", "version": "6.4" }))],
    );
    let r = Reconciler::new(store.clone(), vec![Box::new(first), Box::new(second)]);

    let report = r.run_at(t0()).await;
    assert_eq!(report.updated, 2);

    let rec = store
        .get(&IdentityKey::InstanceId("I1".to_string()))
        .await
        .unwrap();
    assert_eq!(rec.version.as_deref(), Some("6.4"));
    assert_eq!(rec.zabbix_version.as_deref(), Some("6.4"));
    // Not carried by the later document, so the earlier value stands.
    assert_eq!(rec.total_hosts, 10);
}

#[tokio::test]
async fn unusable_documents_never_touch_the_store() {
    let store = seeded_store();
    let src = MemorySource::new(
        "public.license_info",
        OriginStyle::Generic,
        vec![
            doc(json!({})),
            doc(json!({ "hostname": "box-1", "uptime": 12 })),
            doc(json!({ "instanceId": "I1" })),
            doc(json!({ "instanceId": "I1", "totalHosts": "lots" })),
        ],
    );
    let r = Reconciler::new(store.clone(), vec![Box::new(src)]);

    let report = r.run_at(t0()).await;

    assert_eq!(report.processed, 4);
    assert_eq!(report.skipped, 4);
    assert_eq!(report.updated, 0);
    assert_eq!(store.store_calls(), 0);
    assert_eq!(report.outcomes_of(OutcomeKind::Skipped).count(), 4);
}

#[tokio::test]
async fn empty_run_reports_zero_counters() {
    let store = seeded_store();
    let r = Reconciler::new(
        store.clone(),
        vec![Box::new(MemorySource::new(
            "public.zabbix_info",
            OriginStyle::Generic,
            Vec::new(),
        ))],
    );
    let report = r.run_at(t0()).await;
    assert_eq!(report.processed, 0);
    assert_eq!(report.sources.len(), 1);
    assert!(report.finished_at >= report.started_at);
}
