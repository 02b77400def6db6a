//! Store loss is the only run-terminating failure.
//!
//! GREEN when:
//! - a store that goes away ends the run with `aborted` set,
//! - counters cover what was processed before the loss,
//! - sources after the failing one are never opened,
//! - the next run on a recovered store proceeds normally.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use licsync_reconcile::*;
use licsync_schemas::{
    Application, License, LicenseStatus, LicenseType, NewLicense, OriginStyle,
};

fn license(key: &str, instance: &str) -> License {
    let now = Utc::now();
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
            license_type: LicenseType::Perpetual,
            status: LicenseStatus::Active,
            expiry_date: now + Duration::days(30),
            application: Application::Nms,
        },
        now,
    )
}

#[tokio::test]
async fn unavailable_store_aborts_and_recovers() {
    let store = Arc::new(MemoryLicenseStore::with_records(vec![license("K1", "I1")]));
    store.set_available(false);

    let first = Arc::new(MemorySource::new(
        "NMS_monitoring.NMS_info",
        OriginStyle::Nms,
        vec![
            json!({ "instanceId": "I1", "totalHosts": 4 })
                .as_object()
                .cloned()
                .unwrap(),
        ],
    ));
    let second = Arc::new(MemorySource::new(
        "public.zabbix_info",
        OriginStyle::Generic,
        Vec::new(),
    ));

    let r = Reconciler::new(
        store.clone(),
        vec![
            Box::new(first.clone()) as Box<dyn TelemetrySource>,
            Box::new(second.clone()),
        ],
    );

    let report = r.run().await;
    assert!(report.is_aborted());
    assert_eq!(report.processed, 1);
    assert_eq!(report.store_errors, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(report.sources.len(), 1);
    assert_eq!(second.opens(), 0);
    assert_eq!(report.outcomes[0].kind, OutcomeKind::StoreUnavailable);

    store.set_available(true);
    let report = r.run().await;
    assert!(!report.is_aborted());
    assert_eq!(report.updated, 1);
    assert_eq!(second.opens(), 1);
}
