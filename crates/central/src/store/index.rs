use std::collections::HashMap;

use chrono::{DateTime, Utc};
use contracts::MeasurementId;

use crate::record::{InsertOutcome, RecordFilter, RecordSummary, StoredRecord};

/// Records in acceptance order, indexed by id
#[derive(Debug, Default)]
pub(crate) struct RecordIndex {
    records: Vec<StoredRecord>,
    by_id: HashMap<MeasurementId, usize>,
}

impl RecordIndex {
    pub fn contains(&self, id: &MeasurementId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn insert(&mut self, record: StoredRecord) -> InsertOutcome {
        let id = record.measurement.id;
        if self.by_id.contains_key(&id) {
            return InsertOutcome::AlreadyPresent;
        }
        self.by_id.insert(id, self.records.len());
        self.records.push(record);
        InsertOutcome::Inserted
    }

    pub fn get(&self, id: &MeasurementId) -> Option<StoredRecord> {
        self.by_id.get(id).map(|&idx| self.records[idx].clone())
    }

    pub fn list(&self, filter: &RecordFilter) -> Vec<StoredRecord> {
        self.records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .skip(filter.offset)
            .take(filter.effective_limit())
            .cloned()
            .collect()
    }

    pub fn summary(&self, since: DateTime<Utc>) -> RecordSummary {
        RecordSummary::from_records(&self.records, since)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
