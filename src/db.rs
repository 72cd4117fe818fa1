use crate::directory::{check_role_change, check_status_change, DirectoryError};
use crate::reconciliation::RecordCorrection;
use crate::store::StudentStore;
use crate::students::{Role, Status, StudentRecord};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// CSV import row. Empty cells read as `None`.
#[derive(Debug, Deserialize)]
struct StudentRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roll_number: Option<String>,
    #[serde(default)]
    course: Option<String>,
    #[serde(default)]
    entrance_year: Option<i32>,
    #[serde(default)]
    pass_out_year: Option<i32>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<StudentRow> for StudentRecord {
    fn from(row: StudentRow) -> Self {
        StudentRecord {
            // Stable identity: keep the document id, mint one if absent
            id: row
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: row.name.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            roll_number: row.roll_number,
            course: row.course,
            entrance_year: row.entrance_year,
            pass_out_year: row.pass_out_year,
            role: row.role.as_deref().map(Role::from_stored).unwrap_or_default(),
            status: row.status.as_deref().map(Status::from_stored).unwrap_or_default(),
            updated_at: None,
        }
    }
}

/// Event for audit trail: every committed change is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Students Table (document id is the primary key)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            id TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            email TEXT NOT NULL DEFAULT '',
            roll_number TEXT,
            course TEXT,
            entrance_year INTEGER,
            pass_out_year INTEGER,
            role TEXT NOT NULL DEFAULT 'guest',
            status TEXT NOT NULL DEFAULT 'active',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_roll ON students(roll_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_course ON students(course)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<StudentRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {:?}", csv_path))?;

    let mut students = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let row: StudentRow =
            result.with_context(|| format!("Failed to deserialize student on row {}", line + 2))?;
        students.push(row.into());
    }

    Ok(students)
}

/// Insert students; rows whose id already exists are skipped as duplicates
pub fn insert_students(conn: &Connection, students: &[StudentRecord]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for student in students {
        let result = conn.execute(
            "INSERT INTO students (
                id, name, email, roll_number, course, entrance_year, pass_out_year,
                role, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                student.id,
                student.name,
                student.email,
                student.roll_number,
                student.course,
                student.entrance_year,
                student.pass_out_year,
                student.role.as_str(),
                student.status.as_str(),
                student.updated_at.map(|dt| dt.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => {
                inserted += 1;

                let event = Event::new(
                    "student_imported",
                    "student",
                    &student.id,
                    serde_json::json!({
                        "roll_number": student.roll_number,
                        "course": student.course,
                    }),
                    "csv_importer",
                );
                insert_event(conn, &event)?;
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                debug!(id = %student.id, "skipping duplicate student");
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "student import finished");

    Ok(inserted)
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

const STUDENT_COLUMNS: &str = "id, name, email, roll_number, course, entrance_year, pass_out_year,
                role, status, updated_at";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    let role: String = row.get(7)?;
    let status: String = row.get(8)?;
    let updated_at: Option<String> = row.get(9)?;

    Ok(StudentRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        roll_number: row.get(3)?,
        course: row.get(4)?,
        entrance_year: row.get(5)?,
        pass_out_year: row.get(6)?,
        role: Role::from_stored(&role),
        status: Status::from_stored(&status),
        updated_at: updated_at
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

pub fn get_all_students(conn: &Connection) -> Result<Vec<StudentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY id",
        STUDENT_COLUMNS
    ))?;

    let students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(students)
}

pub fn get_student(conn: &Connection, id: &str) -> Result<Option<StudentRecord>> {
    let student = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?1", STUDENT_COLUMNS),
            [id],
            student_from_row,
        )
        .optional()?;

    Ok(student)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Local SQLite directory. One connection, one writer.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn import(&mut self, students: &[StudentRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let inserted = insert_students(&tx, students)?;
        tx.commit()?;
        Ok(inserted)
    }

    pub fn get(&self, id: &str) -> Result<Option<StudentRecord>> {
        get_student(&self.conn, id)
    }

    pub fn count(&self) -> Result<i64> {
        verify_count(&self.conn)
    }

    /// Audit trail for one student, newest first
    pub fn events_for(&self, id: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, "student", id)
    }

    /// Change a student's role. Setting the current role is a no-op.
    pub fn set_role(&mut self, id: &str, role: Role, actor: &str) -> Result<StudentRecord> {
        let mut student = self
            .get(id)?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        check_role_change(&student, role)?;

        if student.role == role {
            return Ok(student);
        }

        let previous = student.role;
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE students SET role = ?1, updated_at = ?2 WHERE id = ?3",
            params![role.as_str(), now.to_rfc3339(), id],
        )?;
        insert_event(
            &tx,
            &Event::new(
                "role_changed",
                "student",
                id,
                serde_json::json!({ "from": previous, "to": role }),
                actor,
            ),
        )?;
        tx.commit()?;

        info!(id, from = %previous, to = %role, "role updated");
        student.role = role;
        student.updated_at = Some(now);
        Ok(student)
    }

    /// Block, unblock, or remove a student. Setting the current status is a no-op.
    pub fn set_status(&mut self, id: &str, status: Status, actor: &str) -> Result<StudentRecord> {
        let mut student = self
            .get(id)?
            .ok_or_else(|| DirectoryError::NotFound(id.to_string()))?;
        check_status_change(&student, status)?;

        if student.status == status {
            return Ok(student);
        }

        let previous = student.status;
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE students SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), id],
        )?;
        insert_event(
            &tx,
            &Event::new(
                "status_changed",
                "student",
                id,
                serde_json::json!({ "from": previous, "to": status }),
                actor,
            ),
        )?;
        tx.commit()?;

        info!(id, from = %previous, to = %status, "status updated");
        student.status = status;
        student.updated_at = Some(now);
        Ok(student)
    }
}

impl StudentStore for SqliteStore {
    fn fetch_all_students(&self) -> Result<Vec<StudentRecord>> {
        get_all_students(&self.conn).context("Failed to read students")
    }

    /// One transaction for the whole batch; any failure rolls everything back
    fn apply_corrections(&mut self, corrections: &[RecordCorrection]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        for correction in corrections {
            let changes = &correction.changes;
            let updated = tx.execute(
                "UPDATE students
                 SET course = COALESCE(?1, course),
                     entrance_year = COALESCE(?2, entrance_year),
                     pass_out_year = COALESCE(?3, pass_out_year),
                     updated_at = ?4
                 WHERE id = ?5",
                params![
                    changes.course,
                    changes.entrance_year,
                    changes.pass_out_year,
                    now,
                    correction.record_id,
                ],
            )?;

            if updated != 1 {
                // Dropping `tx` rolls back everything staged so far
                bail!("unknown student id {:?}", correction.record_id);
            }

            insert_event(
                &tx,
                &Event::new(
                    "derived_fields_corrected",
                    "student",
                    &correction.record_id,
                    serde_json::json!({
                        "roll_number": correction.roll_number,
                        "changes": changes,
                    }),
                    "reconciliation",
                ),
            )?;
        }

        tx.commit().context("Failed to commit correction batch")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::{FieldChanges, ReconciliationEngine};
    use std::io::Write;

    fn seeded_store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store
            .import(&[
                StudentRecord::new("s1", "Asha Verma", Some("BCA2326077"))
                    .with_derived(Some("MBA"), Some(2022), None),
                StudentRecord::new("s2", "Ravi Kumar", Some("MCOM2125045"))
                    .with_derived(Some("MCOM"), Some(2021), Some(2025)),
                StudentRecord::new("s3", "Meera Nair", None),
                StudentRecord::new("a1", "Office Admin", None).with_role(Role::Admin),
            ])
            .unwrap();
        store
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let mut store = seeded_store();
        let again = store
            .import(&[StudentRecord::new("s1", "Someone Else", Some("MBA2224001"))])
            .unwrap();

        assert_eq!(again, 0);
        assert_eq!(store.count().unwrap(), 4);
        assert_eq!(store.get("s1").unwrap().unwrap().name, "Asha Verma");
    }

    #[test]
    fn test_round_trip_fields() {
        let store = seeded_store();
        let s1 = store.get("s1").unwrap().unwrap();

        assert_eq!(s1.roll_number.as_deref(), Some("BCA2326077"));
        assert_eq!(s1.course.as_deref(), Some("MBA"));
        assert_eq!(s1.entrance_year, Some(2022));
        assert_eq!(s1.pass_out_year, None);
        assert_eq!(s1.role, Role::Student);
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_sync_against_sqlite() {
        let mut store = seeded_store();
        let engine = ReconciliationEngine::default();

        let outcome = engine.sync(&mut store, false).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.report.touched(), 1);

        let s1 = store.get("s1").unwrap().unwrap();
        assert_eq!(s1.course.as_deref(), Some("BCA"));
        assert_eq!(s1.entrance_year, Some(2023));
        assert_eq!(s1.pass_out_year, Some(2026));
        assert!(s1.updated_at.is_some());

        let events = store.events_for("s1").unwrap();
        assert_eq!(events[0].event_type, "derived_fields_corrected");
        assert_eq!(events[0].actor, "reconciliation");

        let second = engine.sync(&mut store, false).unwrap();
        assert!(second.report.is_clean());
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut store = seeded_store();
        let batch = vec![
            RecordCorrection {
                record_id: "s1".to_string(),
                roll_number: "BCA2326077".to_string(),
                changes: FieldChanges {
                    course: Some("BCA".to_string()),
                    ..FieldChanges::default()
                },
            },
            RecordCorrection {
                record_id: "ghost".to_string(),
                roll_number: "MBA2224001".to_string(),
                changes: FieldChanges {
                    course: Some("MBA".to_string()),
                    ..FieldChanges::default()
                },
            },
        ];

        assert!(store.apply_corrections(&batch).is_err());

        let s1 = store.get("s1").unwrap().unwrap();
        assert_eq!(s1.course.as_deref(), Some("MBA"));
        assert!(store
            .events_for("s1")
            .unwrap()
            .iter()
            .all(|e| e.event_type != "derived_fields_corrected"));
    }

    #[test]
    fn test_set_status_and_role() {
        let mut store = seeded_store();

        let s3 = store.set_status("s3", Status::Blocked, "test_admin").unwrap();
        assert_eq!(s3.status, Status::Blocked);
        assert_eq!(store.get("s3").unwrap().unwrap().status, Status::Blocked);

        let s3 = store.set_role("s3", Role::Admin, "test_admin").unwrap();
        assert_eq!(s3.role, Role::Admin);

        let events = store.events_for("s3").unwrap();
        assert!(events.iter().any(|e| e.event_type == "status_changed"));
        assert!(events.iter().any(|e| e.event_type == "role_changed"));
    }

    #[test]
    fn test_admin_cannot_be_blocked() {
        let mut store = seeded_store();

        let err = store.set_status("a1", Status::Blocked, "test_admin").unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DirectoryError>(),
            Some(DirectoryError::AdminProtected { .. })
        ));
        assert_eq!(store.get("a1").unwrap().unwrap().status, Status::Active);
    }

    #[test]
    fn test_unknown_student() {
        let mut store = seeded_store();
        let err = store.set_role("ghost", Role::Admin, "test_admin").unwrap_err();

        assert_eq!(
            err.downcast_ref::<DirectoryError>(),
            Some(&DirectoryError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "id,name,email,roll_number,course,entrance_year,pass_out_year,role,status"
        )
        .unwrap();
        writeln!(file, "s1,Asha Verma,asha@campus.edu,BCA2326077,,,,student,active").unwrap();
        writeln!(file, ",New Student,,MBA2224001,MBA,2022,2024,,").unwrap();

        let students = load_csv(file.path()).unwrap();

        assert_eq!(students.len(), 2);
        assert_eq!(students[0].id, "s1");
        assert_eq!(students[0].course, None);
        assert_eq!(students[1].id.len(), 36);
        assert_eq!(students[1].entrance_year, Some(2022));
        assert_eq!(students[1].role, Role::Guest);
        assert_eq!(students[1].status, Status::Active);
    }
}
