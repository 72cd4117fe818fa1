// Roll Sync - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod classifier;
pub mod config;
pub mod courses;
pub mod db;
pub mod directory;
pub mod logging;
pub mod reconciliation;
pub mod rules;
pub mod store;
pub mod students;

// Re-export commonly used types
pub use classifier::{ParsedIdentifier, RollClassifier};
pub use config::AppConfig;
pub use courses::{Course, CourseCatalog};
pub use db::{
    Event, SqliteStore,
    load_csv, setup_database, insert_students, get_all_students, get_student,
    verify_count, insert_event, get_events_for_entity,
};
pub use directory::{Audience, DirectoryError, DirectorySummary, StudentFilter};
pub use reconciliation::{
    FieldChanges, RecordCorrection, ReconciliationEngine, ReconciliationReport,
    SyncError, SyncOutcome,
};
pub use rules::{PrefixRule, PrefixTable};
pub use store::{MemoryStore, StudentStore};
pub use students::{Role, Status, StudentRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
