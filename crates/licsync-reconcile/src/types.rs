use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use licsync_schemas::{IdentityKey, OriginStyle};

/// Classification of one document's trip through the merge path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    /// Record found and at least one telemetry value differed.
    Updated,
    /// Record found, patch applied, every value was already current.
    MatchedNoChange,
    /// Identity resolved but no record carries it.
    NotFound,
    /// No identity or no telemetry; the store was never called.
    Skipped,
    /// The store rejected this document's read or write.
    StoreError,
    /// The store is gone. Ends the run.
    StoreUnavailable,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Updated => "updated",
            OutcomeKind::MatchedNoChange => "matched-no-change",
            OutcomeKind::NotFound => "not-found",
            OutcomeKind::Skipped => "skipped",
            OutcomeKind::StoreError => "store-error",
            OutcomeKind::StoreUnavailable => "store-unavailable",
        }
    }
}

/// Result of reconciling a single raw document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Label of the origin the document came from.
    pub source: String,
    /// `None` only when the document carried no identity at all.
    pub identity: Option<IdentityKey>,
    pub kind: OutcomeKind,
    /// Record fields the patch wrote (empty unless matched).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentOutcome {
    pub fn new(source: impl Into<String>, identity: Option<IdentityKey>, kind: OutcomeKind) -> Self {
        Self {
            source: source.into(),
            identity,
            kind,
            fields: Vec::new(),
            error: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// How a source's drain ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Iterated to the end.
    Drained,
    /// Scope or collection absent. Expected for optional origins.
    Unreachable { reason: String },
    /// Stopped early on an I/O error (or the run was aborted mid-source).
    Failed { error: String },
}

/// Per-source counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub style: OriginStyle,
    pub status: SourceStatus,
    pub processed: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub store_errors: u64,
}

impl SourceReport {
    pub fn new(source: impl Into<String>, style: OriginStyle) -> Self {
        Self {
            source: source.into(),
            style,
            status: SourceStatus::Drained,
            processed: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            not_found: 0,
            store_errors: 0,
        }
    }

    pub fn record(&mut self, kind: OutcomeKind) {
        self.processed += 1;
        match kind {
            OutcomeKind::Updated => self.updated += 1,
            OutcomeKind::MatchedNoChange => self.unchanged += 1,
            OutcomeKind::NotFound => self.not_found += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::StoreError | OutcomeKind::StoreUnavailable => self.store_errors += 1,
        }
    }
}

/// Aggregate result of one reconciliation run.
///
/// A run always produces a report. `aborted` is set only when the store
/// became entirely unreachable; counters then cover the work done so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub store_errors: u64,
    pub sources: Vec<SourceReport>,
    pub outcomes: Vec<DocumentOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            processed: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            not_found: 0,
            store_errors: 0,
            sources: Vec::new(),
            outcomes: Vec::new(),
            aborted: None,
        }
    }

    /// Fold a finished source into the totals.
    pub fn push_source(&mut self, src: SourceReport) {
        self.processed += src.processed;
        self.updated += src.updated;
        self.unchanged += src.unchanged;
        self.skipped += src.skipped;
        self.not_found += src.not_found;
        self.store_errors += src.store_errors;
        self.sources.push(src);
    }

    pub fn source(&self, label: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == label)
    }

    /// source label -> records updated from it. Sources with zero updates are
    /// included so callers can tell "ran, found nothing" from "never ran".
    pub fn updated_by_source(&self) -> BTreeMap<String, u64> {
        self.sources
            .iter()
            .map(|s| (s.source.clone(), s.updated))
            .collect()
    }

    pub fn outcomes_of(&self, kind: OutcomeKind) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}
