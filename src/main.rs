use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use attendance_ledger::attendance::engine::{BatchReport, LedgerEngine};
use attendance_ledger::attendance::event::{time_range_label, Marking};
use attendance_ledger::config::Config;
use attendance_ledger::data;

#[derive(Parser)]
#[command(name = "attendance")]
#[command(version)]
#[command(about = "Per-student class attendance ledgers")]
struct Cli {
    /// Configuration file (defaults to ./attendance.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the ledger files
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that no ledger file is open in another program
    Preflight,
    /// List students, optionally filtered by a name fragment
    List { query: Option<String> },
    /// Create empty ledgers for new students
    Add {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Mark one class session for the listed students
    Mark {
        /// Class date, DD-MM-YYYY
        #[arg(long)]
        date: String,
        /// Full class timing label, e.g. "10:00 to 11:00"
        #[arg(long, conflicts_with_all = ["start", "end"])]
        timing: Option<String>,
        /// Class start time, HH:MM
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Class end time, HH:MM
        #[arg(long, requires = "start")]
        end: Option<String>,
        #[arg(long)]
        status: String,
        /// Reason for statuses that take one, e.g. the holiday name
        #[arg(long)]
        reason: Option<String>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Apply events from a CSV file with columns student,date,class timing,comment
    Import { file: PathBuf },
    /// Rewrite a ledger's header in canonical form
    Normalize { name: String },
    /// Print a ledger as CSV
    Export { name: String },
}

fn timing_label(timing: Option<String>, start: Option<String>, end: Option<String>) -> Result<String> {
    match (timing, start, end) {
        (Some(timing), _, _) if !timing.trim().is_empty() => Ok(timing),
        (_, Some(start), Some(end)) if !start.trim().is_empty() && !end.trim().is_empty() => {
            Ok(time_range_label(&start, &end))
        },
        _ => bail!("class timing not chosen: pass --timing or both --start and --end"),
    }
}

fn report(batch: &BatchReport) -> Result<()> {
    for (student, outcome) in batch.marked() {
        match outcome.class_no() {
            Some(class_no) => println!("{}: class {}", student, class_no),
            None => println!("{}: marked", student),
        }
    }

    if batch.is_complete() {
        println!("Marked attendance for all listed students.");
        return Ok(());
    }

    for failure in batch.failures() {
        eprintln!("{}: {}", failure.student(), failure.error());
    }

    let files = batch.files_to_close();
    if !files.is_empty() {
        eprintln!(
            "Please close the following files:\n\n{}\n\nAttendance was marked for the rest. Try again after closing the file(s).",
            files.join("\n")
        );
    }

    bail!("{} student(s) could not be marked", batch.failures().len())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.dir {
        config.storage_dir = dir;
    }
    let engine = LedgerEngine::from_config(&config)?;

    match cli.command {
        Commands::Preflight => {
            engine.preflight()?;
            println!("No ledger files are open.");
        },
        Commands::List { query } => {
            for name in engine.directory().matching(query.as_deref().unwrap_or(""))? {
                println!("{}", name);
            }
        },
        Commands::Add { names } => {
            engine.preflight()?;
            for name in names {
                let file = engine.directory().ensure(&name)?;
                if !file.created {
                    println!("{} already has a ledger", file.name);
                }
            }
        },
        Commands::Mark {
            date,
            timing,
            start,
            end,
            status,
            reason,
            names,
        } => {
            let time_range = timing_label(timing, start, end)?;
            let status = engine.vocabulary().compose(&status, reason.as_deref()).with_context(|| {
                format!("expected one of: {}", engine.vocabulary().labels().join(", "))
            })?;

            engine.preflight()?;
            report(&engine.record_batch(&names, &Marking::new(&date, &time_range, &status)))?;
        },
        Commands::Import { file } => {
            let reader = File::open(&file).with_context(|| format!("failed to open {}", file.display()))?;

            engine.preflight()?;
            report(&engine.import_events(reader))?;
        },
        Commands::Normalize { name } => {
            engine.preflight()?;
            engine.normalize(&name)?;
        },
        Commands::Export { name } => {
            let ledger = engine.load(&name)?;
            data::export_csv(&ledger, std::io::stdout())?;
        },
    }

    Ok(())
}
