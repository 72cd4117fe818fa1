// 🗂️ Student Store - the collaborator boundary
//
// The reconciliation pass only ever needs two things from the directory:
// a full snapshot, and an all-or-nothing batch write.

use crate::reconciliation::RecordCorrection;
use crate::students::StudentRecord;
use anyhow::{bail, Result};
use chrono::Utc;
use std::collections::HashMap;

/// StudentStore - Core trait (minimal, required)
///
/// Implementations: [`crate::db::SqliteStore`] for a local database,
/// [`MemoryStore`] for tests and dry runs.
pub trait StudentStore {
    /// Snapshot read of every student, no filtering
    fn fetch_all_students(&self) -> Result<Vec<StudentRecord>>;

    /// Apply every correction or none of them
    fn apply_corrections(&mut self, corrections: &[RecordCorrection]) -> Result<()>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<StudentRecord>,
    index: HashMap<String, usize>,
}

impl MemoryStore {
    /// Fails on a repeated id: each correction must land on exactly one record
    pub fn new(records: Vec<StudentRecord>) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), i).is_some() {
                bail!("duplicate student id {:?}", record.id);
            }
        }
        Ok(MemoryStore { records, index })
    }

    pub fn get(&self, id: &str) -> Option<&StudentRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl StudentStore for MemoryStore {
    fn fetch_all_students(&self) -> Result<Vec<StudentRecord>> {
        Ok(self.records.clone())
    }

    fn apply_corrections(&mut self, corrections: &[RecordCorrection]) -> Result<()> {
        // Validate the whole batch before touching anything
        for correction in corrections {
            if !self.index.contains_key(&correction.record_id) {
                bail!("unknown student id {:?}", correction.record_id);
            }
        }

        let now = Utc::now();
        for correction in corrections {
            let i = self.index[&correction.record_id];
            let record = &mut self.records[i];
            correction.changes.apply_to(record);
            record.updated_at = Some(now);
        }

        Ok(())
    }
}
