//! Append-only audit trail and its query filter.

use super::record::{ExecutionRecord, OutcomeKind};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use uuid::Uuid;

/// Ordered, append-only list of execution records.
///
/// The trail assigns sequence numbers as records are appended, so sequence
/// order is the order in which the engine committed decisions. Readers get
/// clones; nothing already appended can be changed or removed.
#[derive(Debug, Default)]
pub struct AuditTrail {
    inner: RwLock<TrailInner>,
}

#[derive(Debug, Default)]
struct TrailInner {
    records: Vec<ExecutionRecord>,
    last_sequence: u64,
}

impl AuditTrail {
    /// Create an empty trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `record` with the next sequence number and append it.
    pub(crate) fn append(&self, mut record: ExecutionRecord) -> ExecutionRecord {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        record.sequence = inner.last_sequence;
        inner.records.push(record.clone());
        record
    }

    /// Append a batch under one lock, so the batch gets consecutive
    /// sequence numbers.
    pub(crate) fn extend(&self, records: Vec<ExecutionRecord>) -> Vec<ExecutionRecord> {
        let mut inner = self.inner.write();
        records
            .into_iter()
            .map(|mut record| {
                inner.last_sequence += 1;
                record.sequence = inner.last_sequence;
                inner.records.push(record.clone());
                record
            })
            .collect()
    }

    /// Records matching `filter`, in sequence order.
    pub fn list(&self, filter: &ExecutionFilter) -> Vec<ExecutionRecord> {
        let inner = self.inner.read();
        let matching = inner.records.iter().filter(|r| filter.matches(r)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Every record, in sequence order.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.inner.read().records.clone()
    }

    /// The record with id `id`, if any.
    pub fn get(&self, id: Uuid) -> Option<ExecutionRecord> {
        self.inner.read().records.iter().find(|r| r.id == id).cloned()
    }

    /// The most recently appended record. After an `execute` call with
    /// nested transitions, this is the top-level record.
    pub fn last(&self) -> Option<ExecutionRecord> {
        self.inner.read().records.last().cloned()
    }

    /// Number of records, nested ones included.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Time between the earliest and latest attempt start in the trail.
    ///
    /// Returns `None` for an empty trail.
    pub fn duration(&self) -> Option<Duration> {
        let inner = self.inner.read();
        let first = inner.records.iter().map(|r| r.timestamp).min()?;
        let last = inner.records.iter().map(|r| r.timestamp).max()?;
        last.signed_duration_since(first).to_std().ok()
    }
}

/// Selection criteria for [`AuditTrail::list`].
///
/// All set criteria must match. `limit` keeps the first matches in sequence
/// order.
///
/// # Example
///
/// ```rust
/// use warrant::audit::{ExecutionFilter, OutcomeKind};
///
/// let filter = ExecutionFilter::new()
///     .transition("transfer")
///     .outcome(OutcomeKind::Rejected)
///     .top_level()
///     .limit(10);
/// # let _ = filter;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionFilter {
    transition: Option<String>,
    outcome: Option<OutcomeKind>,
    rejected_by: Option<String>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    parent: Option<ParentFilter>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParentFilter {
    TopLevel,
    ChildOf(Uuid),
}

impl ExecutionFilter {
    /// Matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only attempts of the transition called `name`.
    pub fn transition(mut self, name: impl Into<String>) -> Self {
        self.transition = Some(name.into());
        self
    }

    /// Only attempts that ended as `kind`.
    pub fn outcome(mut self, kind: OutcomeKind) -> Self {
        self.outcome = Some(kind);
        self
    }

    /// Only rejections by the guard reported as `guard`.
    pub fn rejected_by(mut self, guard: impl Into<String>) -> Self {
        self.rejected_by = Some(guard.into());
        self
    }

    /// Attempts started at or after `at`.
    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    /// Attempts started strictly before `at`.
    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    /// Only attempts made directly by callers of `execute`.
    pub fn top_level(mut self) -> Self {
        self.parent = Some(ParentFilter::TopLevel);
        self
    }

    /// Only attempts made from inside the mutation recorded as `id`.
    pub fn children_of(mut self, id: Uuid) -> Self {
        self.parent = Some(ParentFilter::ChildOf(id));
        self
    }

    /// Keep at most `limit` records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` meets every set criterion. `limit` is not applied.
    pub fn matches(&self, record: &ExecutionRecord) -> bool {
        self.transition
            .as_deref()
            .is_none_or(|name| record.transition == name)
            && self.outcome.is_none_or(|kind| record.kind() == kind)
            && self
                .rejected_by
                .as_deref()
                .is_none_or(|guard| record.rejected_by() == Some(guard))
            && self.since.is_none_or(|at| record.timestamp >= at)
            && self.until.is_none_or(|at| record.timestamp < at)
            && self.parent.is_none_or(|parent| match parent {
                ParentFilter::TopLevel => record.parent.is_none(),
                ParentFilter::ChildOf(id) => record.parent == Some(id),
            })
    }
}
