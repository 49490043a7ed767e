use std::fs;

use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::directory::Directory;
use super::engine::*;
use super::event::{AttendanceEvent, Marking};
use super::ledger::*;
use super::status::StatusVocabulary;
use super::LedgerError;
use crate::data;

const TIMING: &str = "10:00 to 11:00";

fn engine() -> Result<(TempDir, LedgerEngine)> {
    let dir = tempfile::tempdir()?;
    let directory = Directory::open(dir.path().join("students"))?;
    Ok((dir, LedgerEngine::new(directory, StatusVocabulary::default(), CLASS_NO)))
}

fn row_text(ledger: &Ledger, row: usize) -> Vec<String> {
    CANONICAL_COLUMNS
        .iter()
        .map(|column| ledger.value(row, column).to_string())
        .collect()
}

fn lock(engine: &LedgerEngine, name: &str) -> Result<()> {
    fs::write(engine.directory().root().join(format!("~${}.xlsx", name)), b"")?;
    Ok(())
}

fn students(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[test]
fn test_first_event_creates_ledger() -> Result<()> {
    let (_dir, engine) = engine()?;

    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;
    assert_eq!(outcome, Outcome::Inserted { class_no: Some(1) });

    let ledger = engine.load("Asha")?;
    let header: Vec<String> = ledger.header().iter().map(|c| c.to_string()).collect();
    assert_eq!(header, CANONICAL_COLUMNS);
    assert_eq!(ledger.len(), 1);
    assert_eq!(row_text(&ledger, 0), vec!["1", "01-01-2024", "Monday", TIMING, "Present"]);
    assert_eq!(engine.directory().list_students()?, vec!["Asha"]);

    Ok(())
}

#[test]
fn test_same_session_updates_instead_of_appending() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;

    let outcome = engine.record_event(&AttendanceEvent::new(
        "Asha",
        "01-01-2024",
        TIMING,
        "Holiday Leave: Diwali",
    ))?;
    assert_eq!(outcome, Outcome::Updated { class_no: None });

    let ledger = engine.load("Asha")?;
    assert_eq!(ledger.len(), 1);
    assert_eq!(row_text(&ledger, 0), vec!["", "01-01-2024", "Monday", TIMING, "Holiday Leave: Diwali"]);

    Ok(())
}

#[test]
fn test_numbering_restarts_when_only_number_is_retracted() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Holiday Leave: Diwali"))?;

    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "02-01-2024", TIMING, "Absent"))?;

    // The written walkthrough for this sequence expects 2, but the backward
    // scan finds no number once the only numbered row is retracted, so
    // numbering restarts at 1. Class numbers stay increasing from 1.
    assert_eq!(outcome, Outcome::Inserted { class_no: Some(1) });
    assert_eq!(engine.load("Asha")?.len(), 2);

    Ok(())
}

#[test]
fn test_numbering_continues_from_last_counted_row() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", "12:00 to 13:00", "Exam Leave"))?;

    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "02-01-2024", TIMING, "Absent"))?;
    assert_eq!(outcome, Outcome::Inserted { class_no: Some(2) });

    let ledger = engine.load("Asha")?;
    assert_eq!(ledger.len(), 3);
    assert_eq!(row_text(&ledger, 1), vec!["", "01-01-2024", "Monday", "12:00 to 13:00", "Exam Leave"]);
    assert_eq!(row_text(&ledger, 2), vec!["2", "02-01-2024", "Tuesday", TIMING, "Absent"]);

    Ok(())
}

#[test]
fn test_unparseable_date_is_stored_verbatim() -> Result<()> {
    let (_dir, engine) = engine()?;

    engine.record_event(&AttendanceEvent::new("Asha", "not-a-date", TIMING, "Present"))?;

    let ledger = engine.load("Asha")?;
    assert_eq!(row_text(&ledger, 0), vec!["1", "not-a-date", "", TIMING, "Present"]);

    Ok(())
}

#[test]
fn test_alternate_date_separators_share_a_session() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "05-02-2024", TIMING, "Present"))?;

    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "05/02/2024", TIMING, "Absent"))?;

    assert_eq!(outcome, Outcome::Updated { class_no: Some(1) });
    assert_eq!(engine.load("Asha")?.len(), 1);

    Ok(())
}

#[test]
fn test_counted_update_keeps_existing_number() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;

    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Absent"))?;

    assert_eq!(outcome, Outcome::Updated { class_no: Some(1) });
    assert_eq!(engine.next_class_number("Asha")?, 2);

    Ok(())
}

#[test]
fn test_not_counted_to_counted_update_assigns_no_number() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Free Class"))?;

    // Updates never hand out a number, even for a counted status.
    let outcome = engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;

    assert_eq!(outcome, Outcome::Updated { class_no: None });
    let ledger = engine.load("Asha")?;
    assert_eq!(row_text(&ledger, 0), vec!["", "01-01-2024", "Monday", TIMING, "Present"]);

    Ok(())
}

#[test]
fn test_existing_ledger_is_normalized_and_extra_columns_kept() -> Result<()> {
    let (_dir, engine) = engine()?;
    let path = engine.directory().path_for("Ravi")?;
    let ledger = Ledger::from_grid(vec![
        vec![
            Cell::text("Comment"),
            Cell::text(" DATE "),
            Cell::text("Fees Paid"),
            Cell::text("Class No."),
            Cell::text("Class Timing"),
            Cell::text("Day"),
        ],
        vec![
            Cell::text("Present"),
            Cell::text("01-01-2024"),
            Cell::text("yes"),
            Cell::Number(5.0),
            Cell::text(TIMING),
            Cell::text("Monday"),
        ],
    ]);
    data::save_ledger(&path, &ledger, &[])?;

    let outcome = engine.record_event(&AttendanceEvent::new("Ravi", "02-01-2024", TIMING, "Present"))?;
    assert_eq!(outcome, Outcome::Inserted { class_no: Some(6) });

    let ledger = engine.load("Ravi")?;
    let header: Vec<String> = ledger.header().iter().map(|c| c.to_string()).collect();
    assert_eq!(header, vec!["comment", "date", "fees paid", "class no.", "class timing", "day"]);
    assert_eq!(ledger.value(0, "fees paid").to_string(), "yes");
    assert_eq!(
        ledger.rows()[1],
        vec![
            Cell::text("Present"),
            Cell::text("02-01-2024"),
            Cell::Empty,
            Cell::Number(6.0),
            Cell::text(TIMING),
            Cell::text("Tuesday"),
        ]
    );

    Ok(())
}

#[test]
fn test_missing_counter_column_is_a_schema_error() -> Result<()> {
    let (_dir, engine) = engine()?;
    let path = engine.directory().path_for("Ravi")?;
    let ledger = Ledger::from_grid(vec![vec![
        Cell::text("date"),
        Cell::text("class timing"),
        Cell::text("comment"),
    ]]);
    data::save_ledger(&path, &ledger, &[])?;

    match engine.record_event(&AttendanceEvent::new("Ravi", "01-01-2024", TIMING, "Present")) {
        Err(LedgerError::Schema { student, column }) => {
            assert_eq!(student, "Ravi");
            assert_eq!(column, CLASS_NO);
        },
        other => bail!("expected a schema error, got {:?}", other),
    }

    // Not-counted events need no class number.
    engine.record_event(&AttendanceEvent::new("Ravi", "02-01-2024", TIMING, "Exam Leave"))?;
    assert_eq!(engine.load("Ravi")?.len(), 1);

    Ok(())
}

#[test]
fn test_missing_key_columns_are_added_before_marking() -> Result<()> {
    let (_dir, engine) = engine()?;
    let path = engine.directory().path_for("Zoya")?;
    let ledger = Ledger::from_grid(vec![vec![Cell::text("Class No."), Cell::text("Date"), Cell::text("Comment")]]);
    data::save_ledger(&path, &ledger, &[])?;

    let event = AttendanceEvent::new("Zoya", "01-01-2024", TIMING, "Present");
    assert_eq!(engine.record_event(&event)?, Outcome::Inserted { class_no: Some(1) });
    assert_eq!(engine.record_event(&event)?, Outcome::Updated { class_no: Some(1) });

    let ledger = engine.load("Zoya")?;
    let header: Vec<String> = ledger.header().iter().map(|c| c.to_string()).collect();
    assert_eq!(header, vec!["class no.", "date", "comment", "day", "class timing"]);
    assert_eq!(ledger.len(), 1);
    assert_eq!(row_text(&ledger, 0), vec!["1", "01-01-2024", "Monday", TIMING, "Present"]);

    Ok(())
}

#[test]
fn test_load_unknown_student() -> Result<()> {
    let (_dir, engine) = engine()?;

    match engine.load("Nobody") {
        Err(LedgerError::UnknownStudent(name)) => assert_eq!(name, "Nobody"),
        other => bail!("expected an unknown student error, got {:?}", other),
    }
    assert!(!engine.directory().contains("Nobody"));

    Ok(())
}

#[test]
fn test_normalize_is_idempotent_on_disk() -> Result<()> {
    let (_dir, engine) = engine()?;
    let path = engine.directory().path_for("Meera")?;
    let ledger = Ledger::from_grid(vec![vec![
        Cell::text(" Class No."),
        Cell::text("Date "),
        Cell::text("DAY"),
        Cell::text("class timing"),
        Cell::text("Comment"),
    ]]);
    data::save_ledger(&path, &ledger, &[])?;

    engine.normalize("Meera")?;
    let once = engine.load("Meera")?;
    engine.normalize("Meera")?;
    let twice = engine.load("Meera")?;

    assert_eq!(once.header(), twice.header());
    assert_eq!(once, Ledger::new());

    Ok(())
}

#[test]
fn test_locked_ledger_is_a_write_conflict() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;
    lock(&engine, "Asha")?;

    let result = engine.record_event(&AttendanceEvent::new("Asha", "02-01-2024", TIMING, "Present"));

    assert!(matches!(result, Err(LedgerError::WriteConflict { ref student, .. }) if student == "Asha"));
    assert_eq!(engine.load("Asha")?.len(), 1);

    Ok(())
}

#[test]
fn test_batch_isolates_failures() -> Result<()> {
    let (_dir, engine) = engine()?;
    for name in ["Asha", "Ravi", "Meera"] {
        engine.directory().ensure(name)?;
    }
    lock(&engine, "Ravi")?;

    let report = engine.record_batch(
        &students(&["Asha", "Ravi", "Meera"]),
        &Marking::new("01-01-2024", TIMING, "Present"),
    );

    assert!(!report.is_complete());
    let marked: Vec<&str> = report.marked().iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(marked, vec!["Asha", "Meera"]);
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].student(), "Ravi");
    assert_eq!(report.files_to_close(), vec!["Ravi.xlsx"]);

    assert_eq!(engine.load("Asha")?.len(), 1);
    assert_eq!(engine.load("Meera")?.len(), 1);
    assert_eq!(engine.load("Ravi")?.len(), 0);

    Ok(())
}

#[test]
fn test_batch_reports_unreadable_ledgers_without_close_hint() -> Result<()> {
    let (_dir, engine) = engine()?;
    fs::write(engine.directory().path_for("Bad")?, b"not a workbook")?;

    let report = engine.record_batch(
        &students(&["Bad", "Asha"]),
        &Marking::new("01-01-2024", TIMING, "Absent"),
    );

    assert_eq!(report.marked().len(), 1);
    assert!(matches!(report.failures()[0].error(), LedgerError::Unreadable { .. }));
    assert!(report.files_to_close().is_empty());

    Ok(())
}

#[test]
fn test_batch_rejects_invalid_names() -> Result<()> {
    let (_dir, engine) = engine()?;

    let report = engine.record_batch(&students(&["", "Asha"]), &Marking::new("01-01-2024", TIMING, "Present"));

    assert_eq!(report.marked().len(), 1);
    assert!(matches!(report.failures()[0].error(), LedgerError::InvalidName(_)));

    Ok(())
}

#[test]
fn test_preflight() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.directory().ensure("Asha")?;
    engine.directory().ensure("Ravi")?;
    engine.preflight()?;

    lock(&engine, "Ravi")?;
    match engine.preflight() {
        Err(LedgerError::PreflightBlocked(files)) => assert_eq!(files, vec!["Ravi.xlsx"]),
        other => bail!("expected preflight to be blocked, got {:?}", other),
    }

    Ok(())
}

#[test]
fn test_import_events() -> Result<()> {
    let (_dir, engine) = engine()?;
    let input = "\
student,date,class timing,comment
Asha,01-01-2024,10:00 to 11:00,Present
Ravi,01-01-2024,10:00 to 11:00,Absent
Asha,02-01-2024,10:00 to 11:00,Present
Asha,01-01-2024,10:00 to 11:00,Class Not Counted
";

    let report = engine.import_events(input.as_bytes());

    assert!(report.is_complete());
    assert_eq!(report.marked().len(), 4);

    let asha = engine.load("Asha")?;
    assert_eq!(asha.len(), 2);
    assert_eq!(row_text(&asha, 0), vec!["", "01-01-2024", "Monday", TIMING, "Class Not Counted"]);
    assert_eq!(row_text(&asha, 1), vec!["2", "02-01-2024", "Tuesday", TIMING, "Present"]);
    assert_eq!(engine.directory().list_students()?, vec!["Asha", "Ravi"]);

    Ok(())
}

#[test]
fn test_ledger_files_are_replaced_whole() -> Result<()> {
    let (_dir, engine) = engine()?;
    engine.record_event(&AttendanceEvent::new("Asha", "01-01-2024", TIMING, "Present"))?;
    engine.record_event(&AttendanceEvent::new("Asha", "02-01-2024", TIMING, "Present"))?;

    // Temporary files never outlive a save.
    let entries: Vec<String> = fs::read_dir(engine.directory().root())?
        .map(|entry| -> Result<String> { Ok(entry?.file_name().to_string_lossy().into_owned()) })
        .collect::<Result<_>>()?;
    assert_eq!(entries, vec!["Asha.xlsx"]);
    assert!(engine.directory().contains("Asha"));

    Ok(())
}
