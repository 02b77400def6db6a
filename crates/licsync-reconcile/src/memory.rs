//! In-process store and source.
//!
//! `MemoryLicenseStore` backs the daemon when no database is configured and
//! every test that does not need Postgres. `MemorySource` stands in for an
//! origin collection, including the ways real origins go wrong.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use licsync_schemas::{
    IdentityKey, License, LicenseUpdate, NewLicense, OriginStyle, TelemetryUpdate, UpdateResult,
};

use crate::source::{DocumentCursor, RawDocument, SourceError, TelemetrySource};
use crate::store::{LicenseStore, StoreError};

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MemoryLicenseStore {
    records: RwLock<Vec<License>>,
    available: AtomicBool,
    /// Telemetry patches for these records fail with [`StoreError::Query`].
    failing_updates: RwLock<Vec<IdentityKey>>,
    find_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl Default for MemoryLicenseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLicenseStore {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    pub fn with_records(records: Vec<License>) -> Self {
        Self {
            records: RwLock::new(records),
            available: AtomicBool::new(true),
            failing_updates: RwLock::new(Vec::new()),
            find_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
        }
    }

    /// While `false`, every call fails with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every telemetry patch of the record behind `key` fail as a
    /// single rejected statement. The rest of the store keeps working.
    pub async fn fail_updates_for(&self, key: IdentityKey) {
        self.failing_updates.write().await.push(key);
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Reconciler-facing calls (lookups plus telemetry patches).
    pub fn store_calls(&self) -> usize {
        self.find_calls() + self.update_calls()
    }

    pub async fn snapshot(&self) -> Vec<License> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, key: &IdentityKey) -> Option<License> {
        self.records
            .read()
            .await
            .iter()
            .find(|l| matches_key(l, key))
            .cloned()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }
}

fn matches_key(l: &License, key: &IdentityKey) -> bool {
    match key {
        IdentityKey::InstanceId(v) => l.instance_id == *v,
        IdentityKey::LicenseKey(v) => l.license_key == *v,
    }
}

#[async_trait]
impl LicenseStore for MemoryLicenseStore {
    async fn find_one(&self, key: &IdentityKey) -> Result<Option<License>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        Ok(self.get(key).await)
    }

    async fn update_fields(
        &self,
        record_id: Uuid,
        update: &TelemetryUpdate,
    ) -> Result<UpdateResult, StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let mut records = self.records.write().await;
        let Some(rec) = records.iter_mut().find(|l| l.id == record_id) else {
            return Ok(UpdateResult::not_matched());
        };
        if self
            .failing_updates
            .read()
            .await
            .iter()
            .any(|key| matches_key(rec, key))
        {
            return Err(StoreError::Query(format!(
                "update of license {} rejected",
                rec.license_key
            )));
        }
        let changed = rec.apply_telemetry(update, Utc::now());
        Ok(UpdateResult {
            matched: true,
            changed,
        })
    }

    async fn insert(&self, new: NewLicense) -> Result<License, StoreError> {
        self.ensure_available()?;
        let new = new.validated()?;

        let mut records = self.records.write().await;
        if let Some(key) = &new.license_key {
            if records.iter().any(|l| &l.license_key == key) {
                return Err(StoreError::Conflict(format!("licenseKey {key} already exists")));
            }
        }
        if let Some(id) = &new.instance_id {
            if records.iter().any(|l| &l.instance_id == id) {
                return Err(StoreError::Conflict(format!("instanceId {id} already exists")));
            }
        }

        let license = License::from_new(new, Utc::now());
        records.push(license.clone());
        Ok(license)
    }

    async fn list(&self) -> Result<Vec<License>, StoreError> {
        self.ensure_available()?;
        let mut out = self.records.read().await.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_by_key(
        &self,
        license_key: &str,
        patch: &LicenseUpdate,
    ) -> Result<Option<License>, StoreError> {
        self.ensure_available()?;
        let patch = patch.clone().validated()?;

        let mut records = self.records.write().await;
        let Some(rec) = records.iter_mut().find(|l| l.license_key == license_key) else {
            return Ok(None);
        };
        rec.apply_update(&patch, Utc::now());
        Ok(Some(rec.clone()))
    }

    async fn delete_by_key(&self, license_key: &str) -> Result<bool, StoreError> {
        self.ensure_available()?;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|l| l.license_key != license_key);
        Ok(records.len() != before)
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Behaviour {
    Yield,
    Unreachable,
    FailOpen,
    /// Yield this many documents, then an I/O error.
    FailAfter(usize),
}

/// Fixed list of documents posing as one origin collection.
#[derive(Debug)]
pub struct MemorySource {
    label: String,
    style: OriginStyle,
    docs: Vec<RawDocument>,
    behaviour: Behaviour,
    hold: Option<HoldHandle>,
    opens: AtomicUsize,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, style: OriginStyle, docs: Vec<RawDocument>) -> Self {
        Self {
            label: label.into(),
            style,
            docs,
            behaviour: Behaviour::Yield,
            hold: None,
            opens: AtomicUsize::new(0),
        }
    }

    /// An origin whose scope or collection does not exist.
    pub fn unreachable(label: impl Into<String>, style: OriginStyle) -> Self {
        let mut s = Self::new(label, style, Vec::new());
        s.behaviour = Behaviour::Unreachable;
        s
    }

    /// An origin that exists but errors on open.
    pub fn failing(label: impl Into<String>, style: OriginStyle) -> Self {
        let mut s = Self::new(label, style, Vec::new());
        s.behaviour = Behaviour::FailOpen;
        s
    }

    /// Yields the first `n` documents, then fails.
    pub fn fail_after(mut self, n: usize) -> Self {
        self.behaviour = Behaviour::FailAfter(n);
        self
    }

    /// Every `open` blocks until the returned handle releases it.
    pub fn held(mut self) -> (Self, HoldHandle) {
        let handle = HoldHandle::default();
        self.hold = Some(handle.clone());
        (self, handle)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

/// Pauses a [`MemorySource`] inside `open` so a run can be caught in flight.
#[derive(Debug, Clone, Default)]
pub struct HoldHandle {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl HoldHandle {
    /// Resolves once a run has reached the held source.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one held `open` proceed.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl TelemetrySource for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn style(&self) -> OriginStyle {
        self.style
    }

    async fn open(&self) -> Result<Box<dyn DocumentCursor>, SourceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(hold) = &self.hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }

        let fail_after = match self.behaviour {
            Behaviour::Unreachable => {
                return Err(SourceError::Unreachable(format!(
                    "{} does not exist",
                    self.label
                )))
            }
            Behaviour::FailOpen => {
                return Err(SourceError::Io(format!("{} refused the query", self.label)))
            }
            Behaviour::FailAfter(n) => Some(n),
            Behaviour::Yield => None,
        };

        Ok(Box::new(MemoryCursor {
            label: self.label.clone(),
            docs: self.docs.iter().cloned().collect(),
            remaining_before_failure: fail_after,
        }))
    }
}

struct MemoryCursor {
    label: String,
    docs: VecDeque<RawDocument>,
    remaining_before_failure: Option<usize>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn next_document(&mut self) -> Result<Option<RawDocument>, SourceError> {
        if let Some(n) = self.remaining_before_failure.as_mut() {
            if *n == 0 {
                return Err(SourceError::Io(format!("{} connection reset", self.label)));
            }
            *n -= 1;
        }
        Ok(self.docs.pop_front())
    }
}
