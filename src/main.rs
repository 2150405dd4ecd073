use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gym_access::{
    import_branches, import_instructors, init_logging, load_branches_csv, load_instructors_csv,
    ClassCategory, GymAccess, Session, StoreArgs,
};

#[derive(Parser, Debug)]
#[command(name = "gym-access", version, about = "Gym dashboard data administration")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Role token for this invocation (student, professor, admin)
    #[arg(long, env = "GYM_ROLE", global = true)]
    role: Option<String>,

    /// Acting user id; a known user's stored role wins over --role
    #[arg(long, env = "GYM_USER", global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed branches and instructors from CSV files.
    Import {
        #[arg(long)]
        branches: Option<PathBuf>,
        #[arg(long)]
        instructors: Option<PathBuf>,
    },
    /// List branches with staff and class counts.
    Branches {
        /// Also show the classes held on this day (e.g. "Segunda")
        #[arg(long)]
        day: Option<String>,
    },
    /// List instructors visible to the session.
    Instructors,
    /// Report branch references that no longer resolve.
    Audit,
    /// Rewrite legacy branch-name references to branch ids.
    Migrate,
    /// List terms acceptance records.
    Terms,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let access = cli.store.open_access()?;
    let session = access.session_for(cli.role.as_deref(), cli.user.as_deref())?;
    tracing::debug!(role = %session.role, "session resolved");

    match cli.command {
        Commands::Import { branches, instructors } => run_import(&access, &session, branches, instructors),
        Commands::Branches { day } => list_branches(&access, &session, day.as_deref()),
        Commands::Instructors => list_instructors(&access, &session),
        Commands::Audit => run_audit(&access, &session),
        Commands::Migrate => {
            let updated = access.migrate_legacy_references(&session)?;
            println!("✅ Migration complete: {} records now reference branches by id", updated);
            Ok(())
        }
        Commands::Terms => list_terms(&access, &session),
    }
}

fn run_import(
    access: &GymAccess,
    session: &Session,
    branches: Option<PathBuf>,
    instructors: Option<PathBuf>,
) -> Result<()> {
    if branches.is_none() && instructors.is_none() {
        eprintln!("❌ Nothing to import: pass --branches and/or --instructors");
        std::process::exit(1);
    }

    // Branches first so instructor affiliations can resolve
    if let Some(path) = branches {
        println!("📂 Loading branches from {:?}...", path);
        let rows = load_branches_csv(&path)?;
        let summary = import_branches(access, session, rows)?;
        println!("✓ Inserted: {} branches", summary.inserted);
        println!("✓ Skipped duplicates: {}", summary.skipped);
    }

    if let Some(path) = instructors {
        println!("📂 Loading instructors from {:?}...", path);
        let rows = load_instructors_csv(&path)?;
        let summary = import_instructors(access, session, rows)?;
        println!("✓ Inserted: {} instructors", summary.inserted);
        println!("✓ Skipped duplicates: {}", summary.skipped);
    }

    Ok(())
}

fn list_branches(access: &GymAccess, session: &Session, day: Option<&str>) -> Result<()> {
    let branches = access.list_branches(session)?;
    println!("🏠 {} branches", branches.len());

    for branch in branches {
        println!("  {}  {}", branch.id, branch.name);
        if !branch.address.is_empty() {
            println!("      {} · {} · {}", branch.address, branch.phone, branch.hours);
        }
        let staff = branch.staff();
        if !staff.is_empty() {
            println!("      staff: {}", staff.join(", "));
        }
        if !branch.schedule.is_empty() {
            println!(
                "      classes: {} adult, {} kids",
                branch.classes_for(ClassCategory::Adult).len(),
                branch.classes_for(ClassCategory::Kids).len()
            );
        }
        if let Some(day) = day {
            for class in branch.classes_on(day) {
                println!("      {} {} - {} ({})", class.day, class.time, class.name, class.instructor);
            }
        }
    }

    Ok(())
}

fn list_instructors(access: &GymAccess, session: &Session) -> Result<()> {
    let profiles = access.list_instructor_profiles(session)?;
    println!("🥋 {} instructors", profiles.len());

    for profile in profiles {
        println!(
            "  {}  {} - {} [{}]",
            profile.instructor.id,
            profile.instructor.name,
            profile.belt_label,
            profile.affiliation_names.join(", ")
        );
    }

    Ok(())
}

fn run_audit(access: &GymAccess, session: &Session) -> Result<()> {
    let dangling = access.audit_references(session)?;

    if dangling.is_empty() {
        println!("✅ All branch references resolve");
        return Ok(());
    }

    println!("⚠️  {} dangling branch references:", dangling.len());
    for reference in dangling {
        println!("  {}", reference);
    }
    Ok(())
}

fn list_terms(access: &GymAccess, session: &Session) -> Result<()> {
    let records = access.list_terms(session)?;
    println!("📜 {} terms acceptances", records.len());

    for record in records {
        let status = if record.verify_digest() { "ok" } else { "DIGEST MISMATCH" };
        println!(
            "  {}  {} for {} @ {} ({}) [{}]",
            record.accepted_at.to_rfc3339(),
            record.parent_name,
            record.child_name,
            record.branch_name,
            record.branch_id,
            status
        );
    }

    Ok(())
}
