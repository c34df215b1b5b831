// ─────────────────────────────────────────────────────────────────────
// Pocket Finder — Append-Only Trials Log
// ─────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use parking_lot::RwLock;

use pocket_types::{TrialPhase, TrialRecord};

use crate::aggregator::Aggregate;

/// Every dt the finder evaluated, in evaluation order.
///
/// Records are `Arc`ed and never mutated after `append`, so readers on
/// other threads can hold them while the search keeps writing.
#[derive(Debug, Default)]
pub struct TrialLog {
    records: RwLock<Vec<Arc<TrialRecord>>>,
}

impl TrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze `aggregate` into the next record and return it.
    pub fn append(&self, aggregate: Aggregate, phase: TrialPhase) -> Arc<TrialRecord> {
        let mut records = self.records.write();
        let record = Arc::new(aggregate.into_trial(records.len(), phase));
        records.push(Arc::clone(&record));
        record
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<TrialRecord>> {
        self.records.read().get(index).cloned()
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Vec<Arc<TrialRecord>> {
        self.records.read().clone()
    }

    /// Pull-based cursor starting at `from`. Sees records appended after it
    /// was created.
    pub fn cursor(&self, from: usize) -> TrialCursor<'_> {
        TrialCursor { log: self, next: from }
    }
}

pub struct TrialCursor<'a> {
    log: &'a TrialLog,
    next: usize,
}

impl Iterator for TrialCursor<'_> {
    type Item = Arc<TrialRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.log.get(self.next)?;
        self.next += 1;
        Some(record)
    }
}
