// End-to-end: CSV import → sync → reopen database

use std::io::Write;

use roll_sync::{
    load_csv, AppConfig, Audience, ReconciliationEngine, SqliteStore, StudentFilter, StudentStore,
};

const ROSTER: &str = "\
id,name,email,roll_number,course,entrance_year,pass_out_year,role,status
s1,Asha Verma,asha@campus.edu,BCA2326077,MBA,2022,,student,active
s2,Ravi Kumar,ravi@campus.edu,mcom2125045,MCOM,2021,2025,student,active
s3,Meera Nair,meera@campus.edu,BAMC2024010,,,,student,blocked
s4,Guest User,guest@campus.edu,XYZ1234567,BBA,2019,2022,guest,active
s5,No Roll,noroll@campus.edu,,,,,student,active
";

fn write_roster(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("roster.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(ROSTER.as_bytes()).unwrap();
    path
}

#[test]
fn import_sync_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("students.db");
    let roster = load_csv(&write_roster(&dir)).unwrap();

    {
        let mut store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store.import(&roster).unwrap(), 5);

        let outcome = ReconciliationEngine::default().sync(&mut store, false).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.report.touched(), 2);
        assert_eq!(outcome.report.consistent, 1);
        assert_eq!(outcome.report.unclassified, 1);
        assert_eq!(outcome.report.skipped_missing_roll, 1);
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let s3 = store.get("s3").unwrap().unwrap();
    assert_eq!(s3.course.as_deref(), Some("BAMASS"));
    assert_eq!(s3.entrance_year, Some(2020));
    assert_eq!(s3.pass_out_year, Some(2024));

    // Unclassifiable roll number keeps whatever was stored
    let s4 = store.get("s4").unwrap().unwrap();
    assert_eq!(s4.course.as_deref(), Some("BBA"));
    assert_eq!(s4.entrance_year, Some(2019));

    let bca = StudentFilter {
        course: Some("BCA".to_string()),
        ..Default::default()
    };
    assert_eq!(bca.apply(&store.fetch_all_students().unwrap()).len(), 1);
}

#[test]
fn dry_run_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("students.db");
    let roster = load_csv(&write_roster(&dir)).unwrap();

    let mut store = SqliteStore::open(&db_path).unwrap();
    store.import(&roster).unwrap();

    let engine = ReconciliationEngine::default();
    let dry = engine.sync(&mut store, true).unwrap();
    assert!(!dry.applied);

    let real = engine.sync(&mut store, false).unwrap();
    assert_eq!(dry.report.fingerprint(), real.report.fingerprint());
}

#[test]
fn custom_rule_file_drives_sync() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.json");
    std::fs::write(&rules_path, r#"[{"prefix": "BCA", "course": "BCA-NEW"}]"#).unwrap();

    let config = AppConfig {
        database: dir.path().join("students.db"),
        prefix_rules: Some(rules_path),
        courses: None,
    };

    let mut store = SqliteStore::open(&config.database).unwrap();
    store.import(&load_csv(&write_roster(&dir)).unwrap()).unwrap();

    let engine = ReconciliationEngine::new(config.classifier().unwrap());
    let outcome = engine.sync(&mut store, false).unwrap();

    assert_eq!(outcome.report.touched(), 1);
    assert_eq!(store.get("s1").unwrap().unwrap().course.as_deref(), Some("BCA-NEW"));
    assert_eq!(store.get("s3").unwrap().unwrap().course, None);
}

#[test]
fn audience_and_audit_trail_after_sync() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = SqliteStore::open(&dir.path().join("students.db")).unwrap();
    store.import(&load_csv(&write_roster(&dir)).unwrap()).unwrap();
    ReconciliationEngine::default().sync(&mut store, false).unwrap();

    let students = store.fetch_all_students().unwrap();
    let everyone: Vec<&str> = Audience::All
        .resolve(&students)
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    // s3 is blocked, s4 is a guest
    assert_eq!(everyone, vec!["s1", "s2", "s5"]);

    let bca_2023 = Audience::from_parts(vec!["BCA".into()], vec![2023], vec![]);
    let recipients = bca_2023.resolve(&students);
    assert_eq!(recipients.len(), 1);
    assert_eq!(recipients[0].id, "s1");

    let events = store.events_for("s1").unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, "derived_fields_corrected");
    assert_eq!(events[1].event_type, "student_imported");
    assert_eq!(store.count().unwrap(), 5);
}
