// Roll Sync CLI - classify roll numbers and keep the student directory consistent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use roll_sync::logging::init_tracing;
use roll_sync::{
    load_csv, AppConfig, Audience, DirectoryError, DirectorySummary, ReconciliationEngine, Role,
    SqliteStore, Status, StudentFilter, StudentStore,
};

#[derive(Parser)]
#[command(name = "roll-sync")]
#[command(about = "Roll-number classification and student directory reconciliation")]
#[command(version)]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides config and ROLL_SYNC_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse roll numbers into course, entrance year and pass-out year
    Classify {
        #[arg(required = true)]
        roll_numbers: Vec<String>,
    },

    /// Import students from CSV (existing ids are skipped)
    Import { csv: PathBuf },

    /// Recompute derived fields and write corrections as one batch
    Sync {
        /// Show the diff without writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// List students
    Students {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long)]
        status: Option<Status>,
    },

    /// Headline counts
    Stats,

    /// Active students an announcement would reach
    Audience {
        /// Repeatable; none means every course
        #[arg(long = "course")]
        courses: Vec<String>,
        #[arg(long = "entrance-year")]
        entrance_years: Vec<i32>,
        #[arg(long = "pass-out-year")]
        pass_out_years: Vec<i32>,
    },

    /// Audit trail for one student, newest first
    Events { id: String },

    /// Change a student's role
    SetRole { id: String, role: Role },

    /// Block, unblock or remove a student
    SetStatus { id: String, status: Status },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database = db;
    }

    match cli.command {
        Commands::Classify { roll_numbers } => run_classify(&config, &roll_numbers),
        Commands::Import { csv } => run_import(&config, &csv),
        Commands::Sync { dry_run } => run_sync(&config, dry_run),
        Commands::Students { search, course, status } => {
            run_students(&config, StudentFilter { search, course, status })
        }
        Commands::Stats => run_stats(&config),
        Commands::Audience {
            courses,
            entrance_years,
            pass_out_years,
        } => run_audience(
            &config,
            Audience::from_parts(courses, entrance_years, pass_out_years),
        ),
        Commands::Events { id } => run_events(&config, &id),
        Commands::SetRole { id, role } => {
            let mut store = open_store(&config)?;
            let student = store.set_role(&id, role, "cli")?;
            println!("✓ {} is now {}", student.id, student.role);
            Ok(())
        }
        Commands::SetStatus { id, status } => {
            let mut store = open_store(&config)?;
            let student = store.set_status(&id, status, "cli")?;
            println!("✓ {} is now {}", student.id, student.status);
            Ok(())
        }
    }
}

fn open_store(config: &AppConfig) -> Result<SqliteStore> {
    info!(database = ?config.database, "opening student database");
    SqliteStore::open(&config.database)
}

fn run_classify(config: &AppConfig, roll_numbers: &[String]) -> Result<()> {
    let classifier = config.classifier()?;
    let catalog = config.course_catalog()?;

    for roll in roll_numbers {
        let parsed = classifier.classify(roll);
        match (&parsed.course, parsed.entrance_year, parsed.pass_out_year) {
            (Some(course), Some(entrance), Some(pass_out)) => println!(
                "{:<14} {:<8} {:<32} {}–{}",
                roll.trim(),
                course,
                catalog.display_name(course),
                entrance,
                pass_out
            ),
            _ => println!("{:<14} (unrecognized)", roll.trim()),
        }
    }

    Ok(())
}

fn run_import(config: &AppConfig, csv: &Path) -> Result<()> {
    let students = load_csv(csv)?;
    println!("📂 Loaded {} students from {:?}", students.len(), csv);

    let mut store = open_store(config)?;
    let inserted = store.import(&students)?;

    println!("✓ Inserted: {}", inserted);
    println!("✓ Skipped duplicates: {}", students.len() - inserted);
    println!("✓ Database contains {} students", store.count()?);
    Ok(())
}

fn run_sync(config: &AppConfig, dry_run: bool) -> Result<()> {
    let engine = ReconciliationEngine::new(config.classifier()?);
    let mut store = open_store(config)?;

    let outcome = engine
        .sync(&mut store, dry_run)
        .context("Sync failed; nothing was written, re-run when the store is reachable")?;
    let report = &outcome.report;

    for correction in &report.corrections {
        let changes = &correction.changes;
        let mut fields = Vec::new();
        if let Some(course) = &changes.course {
            fields.push(format!("course={}", course));
        }
        if let Some(year) = changes.entrance_year {
            fields.push(format!("entrance_year={}", year));
        }
        if let Some(year) = changes.pass_out_year {
            fields.push(format!("pass_out_year={}", year));
        }
        println!("  {} ({}): {}", correction.record_id, correction.roll_number, fields.join(", "));
    }

    println!("{}", report.summary());
    if outcome.applied {
        println!("✅ Updated {} students", report.touched());
    } else if dry_run && !report.is_clean() {
        println!("🔍 Dry run: {} students would be updated", report.touched());
    } else {
        println!("✅ All students already in sync");
    }

    Ok(())
}

fn run_students(config: &AppConfig, filter: StudentFilter) -> Result<()> {
    let catalog = config.course_catalog()?;
    let store = open_store(config)?;
    let students = store.fetch_all_students()?;

    let matches = filter.apply(&students);
    for student in &matches {
        println!(
            "{:<38} {:<24} {:<12} {:<30} {:<10} {:<8} {}",
            student.id,
            student.name,
            student.roll_number.as_deref().unwrap_or("—"),
            student.course.as_deref().map(|c| catalog.display_name(c)).unwrap_or("—"),
            student.batch_label().unwrap_or_else(|| "—".to_string()),
            student.role.as_str(),
            student.status.as_str(),
        );
    }
    println!("{} of {} students", matches.len(), students.len());

    Ok(())
}

fn run_stats(config: &AppConfig) -> Result<()> {
    let catalog = config.course_catalog()?;
    let store = open_store(config)?;
    let summary = DirectorySummary::from_records(&store.fetch_all_students()?);

    println!("Students: {}", summary.total);
    println!("  active:  {}", summary.active);
    println!("  blocked: {}", summary.blocked);
    println!("  removed: {}", summary.removed);
    println!("By course:");
    for (course, count) in &summary.by_course {
        println!("  {:<32} {}", catalog.display_name(course), count);
    }

    Ok(())
}

fn run_audience(config: &AppConfig, audience: Audience) -> Result<()> {
    let store = open_store(config)?;
    let students = store.fetch_all_students()?;

    let recipients = audience.resolve(&students);
    for student in &recipients {
        println!(
            "{:<38} {:<24} {:<8} {}",
            student.id,
            student.name,
            student.course.as_deref().unwrap_or("—"),
            student.batch_label().unwrap_or_else(|| "—".to_string()),
        );
    }
    println!("🎯 {} recipients", recipients.len());

    Ok(())
}

fn run_events(config: &AppConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;
    if store.get(id)?.is_none() {
        return Err(DirectoryError::NotFound(id.to_string()).into());
    }

    let events = store.events_for(id)?;
    for event in &events {
        println!(
            "{}  {:<26} {:<8} {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.actor,
            event.data,
        );
    }
    println!("{} events", events.len());

    Ok(())
}
