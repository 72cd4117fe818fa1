// ⚖️ Reconciliation Engine - Keep derived fields in line with roll numbers
//
// For every student with a roll number:
//   classify(roll_number) → (course, entrance_year, pass_out_year)
//   stage only the fields that are derivable AND differ from what is stored
//
// Nothing is ever cleared: a field we cannot re-derive is left as stored.
// The pass reads one snapshot, computes the full diff, and hands it to the
// store as a single atomic batch.

use crate::classifier::{ParsedIdentifier, RollClassifier};
use crate::store::StudentStore;
use crate::students::StudentRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

// ============================================================================
// FIELD CHANGES
// ============================================================================

/// Corrections for one record. `None` means "leave as stored".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrance_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_out_year: Option<i32>,
}

impl FieldChanges {
    /// Diff a parse result against stored values
    pub fn between(parsed: &ParsedIdentifier, record: &StudentRecord) -> Self {
        FieldChanges {
            course: parsed
                .course
                .as_ref()
                .filter(|derived| record.course.as_ref() != Some(*derived))
                .cloned(),
            entrance_year: parsed
                .entrance_year
                .filter(|derived| record.entrance_year != Some(*derived)),
            pass_out_year: parsed
                .pass_out_year
                .filter(|derived| record.pass_out_year != Some(*derived)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.course.is_none() && self.entrance_year.is_none() && self.pass_out_year.is_none()
    }

    /// Number of fields this change touches
    pub fn len(&self) -> usize {
        [
            self.course.is_some(),
            self.entrance_year.is_some(),
            self.pass_out_year.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Apply in place; untouched fields keep their stored value
    pub fn apply_to(&self, record: &mut StudentRecord) {
        if let Some(course) = &self.course {
            record.course = Some(course.clone());
        }
        if let Some(year) = self.entrance_year {
            record.entrance_year = Some(year);
        }
        if let Some(year) = self.pass_out_year {
            record.pass_out_year = Some(year);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCorrection {
    pub record_id: String,
    pub roll_number: String,
    pub changes: FieldChanges,
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Staged corrections, in snapshot order
    pub corrections: Vec<RecordCorrection>,

    pub scanned: usize,
    pub skipped_missing_roll: usize,
    pub unclassified: usize,
    pub consistent: usize,

    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Records touched by this diff
    pub fn touched(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.corrections.iter().map(|c| c.changes.len()).sum()
    }

    /// SHA-256 over the correction set. Equal diffs → equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for correction in &self.corrections {
            let changes = &correction.changes;
            hasher.update(format!(
                "{}|{}|{}|{}\n",
                correction.record_id,
                changes.course.as_deref().unwrap_or(""),
                changes.entrance_year.map(|y| y.to_string()).unwrap_or_default(),
                changes.pass_out_year.map(|y| y.to_string()).unwrap_or_default(),
            ));
        }
        format!("{:x}", hasher.finalize())
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation: {} scanned, {} to correct ({} fields), {} consistent, {} unclassified, {} without roll number",
            self.scanned,
            self.touched(),
            self.field_count(),
            self.consistent,
            self.unclassified,
            self.skipped_missing_roll,
        )
    }
}

// ============================================================================
// SYNC
// ============================================================================

/// Failure of a whole sync run. Nothing is committed in either case.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to read student snapshot")]
    Fetch(#[source] anyhow::Error),

    #[error("failed to apply {records} correction(s); no changes were committed")]
    Apply {
        records: usize,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub report: ReconciliationReport,

    /// True only when a non-empty batch committed
    pub applied: bool,
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    classifier: RollClassifier,
}

impl ReconciliationEngine {
    pub fn new(classifier: RollClassifier) -> Self {
        ReconciliationEngine { classifier }
    }

    pub fn classifier(&self) -> &RollClassifier {
        &self.classifier
    }

    /// Stage corrections for a single record, if any
    pub fn stage(&self, record: &StudentRecord) -> Option<RecordCorrection> {
        let roll_number = record.roll_number()?;
        let parsed = self.classifier.classify(roll_number);
        let changes = FieldChanges::between(&parsed, record);

        if changes.is_empty() {
            return None;
        }

        Some(RecordCorrection {
            record_id: record.id.clone(),
            roll_number: roll_number.to_string(),
            changes,
        })
    }

    /// Compute the correction set for a snapshot. Pure: no store access.
    pub fn reconcile(&self, records: &[StudentRecord]) -> ReconciliationReport {
        let mut corrections = Vec::new();
        let mut skipped_missing_roll = 0;
        let mut unclassified = 0;
        let mut consistent = 0;

        for record in records {
            let Some(roll_number) = record.roll_number() else {
                skipped_missing_roll += 1;
                continue;
            };

            let parsed = self.classifier.classify(roll_number);
            if !parsed.is_classified() {
                debug!(record_id = %record.id, roll_number, "roll number not classifiable");
                unclassified += 1;
                continue;
            }

            let changes = FieldChanges::between(&parsed, record);
            if changes.is_empty() {
                consistent += 1;
                continue;
            }

            debug!(record_id = %record.id, roll_number, ?changes, "staging correction");
            corrections.push(RecordCorrection {
                record_id: record.id.clone(),
                roll_number: roll_number.to_string(),
                changes,
            });
        }

        ReconciliationReport {
            corrections,
            scanned: records.len(),
            skipped_missing_roll,
            unclassified,
            consistent,
            reconciled_at: Utc::now(),
        }
    }

    /// Snapshot → diff → one atomic batch write.
    ///
    /// With `dry_run` the diff is computed and returned but never submitted.
    pub fn sync<S: StudentStore + ?Sized>(
        &self,
        store: &mut S,
        dry_run: bool,
    ) -> Result<SyncOutcome, SyncError> {
        let records = store.fetch_all_students().map_err(SyncError::Fetch)?;
        let report = self.reconcile(&records);
        info!("{}", report.summary());

        if report.is_clean() || dry_run {
            return Ok(SyncOutcome {
                report,
                applied: false,
            });
        }

        if let Err(source) = store.apply_corrections(&report.corrections) {
            warn!(records = report.touched(), error = %source, "correction batch rejected");
            return Err(SyncError::Apply {
                records: report.touched(),
                source,
            });
        }

        info!(
            records = report.touched(),
            fingerprint = %report.fingerprint(),
            "correction batch committed"
        );

        Ok(SyncOutcome {
            report,
            applied: true,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
