use std::io::Read;
use std::path::Path;

use getset::Getters;
use log::{debug, error, info};

use super::directory::{Directory, StudentFile};
use super::event::{AttendanceEvent, Marking, SessionDate};
use super::ledger::{Cell, Ledger, CANONICAL_COLUMNS, CLASS_NO, CLASS_TIMING, COMMENT, DATE, DAY};
use super::lock;
use super::status::{Category, StatusVocabulary};
use super::LedgerError;
use crate::config::Config;
use crate::data::{self, LEDGER_EXTENSION};

/// What `record_event` did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Inserted { class_no: Option<i64> },
    /// The session already had a row; its comment was overwritten.
    Updated { class_no: Option<i64> },
}

impl Outcome {
    pub fn class_no(&self) -> Option<i64> {
        match self {
            Outcome::Inserted { class_no } | Outcome::Updated { class_no } => *class_no,
        }
    }
}

#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct Failure {
    student: String,
    error: LedgerError,
}

/// Result of applying events to several students, one ledger at a time.
#[derive(Debug, Default, Getters)]
#[getset(get = "pub")]
pub struct BatchReport {
    marked: Vec<(String, Outcome)>,
    failures: Vec<Failure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Ledger files that were held open by another program and need to be
    /// closed before retrying.
    pub fn files_to_close(&self) -> Vec<String> {
        self.failures
            .iter()
            .filter(|failure| failure.error.is_write_conflict())
            .map(|failure| format!("{}.{}", failure.student, LEDGER_EXTENSION))
            .collect()
    }

    fn push(&mut self, student: &str, result: Result<Outcome, LedgerError>) {
        let student = student.trim().to_string();
        match result {
            Ok(outcome) => self.marked.push((student, outcome)),
            Err(err) => {
                error!("failed to mark {}, err={}", student, err);
                self.failures.push(Failure { student, error: err });
            },
        }
    }
}

/// Applies attendance events to per-student ledger files.
///
/// Every operation is a full read-modify-write of one file; nothing is kept
/// in memory between events. The only protection against concurrent edits
/// is the check for files held open by other programs.
pub struct LedgerEngine {
    directory: Directory,
    vocabulary: StatusVocabulary,
    counter_column: String,
}

impl LedgerEngine {
    pub fn new(directory: Directory, vocabulary: StatusVocabulary, counter_column: &str) -> LedgerEngine {
        LedgerEngine {
            directory,
            vocabulary,
            counter_column: counter_column.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Result<LedgerEngine, LedgerError> {
        Ok(LedgerEngine::new(
            Directory::open(&config.storage_dir)?,
            config.vocabulary(),
            &config.counter_column,
        ))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn vocabulary(&self) -> &StatusVocabulary {
        &self.vocabulary
    }

    /// Refuses to start if any ledger is already held open elsewhere.
    pub fn preflight(&self) -> Result<(), LedgerError> {
        let locked = lock::scan_for_locked_files(self.directory.root())?;
        if locked.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::PreflightBlocked(locked))
        }
    }

    /// Read-only view of a student's ledger.
    pub fn load(&self, name: &str) -> Result<Ledger, LedgerError> {
        let path = self.directory.path_for(name)?;
        if !path.is_file() {
            return Err(LedgerError::UnknownStudent(name.trim().to_string()));
        }
        read(name.trim(), &path)
    }

    /// Rewrites the header of a student's ledger in canonical form.
    pub fn normalize(&self, name: &str) -> Result<(), LedgerError> {
        let file = self.directory.ensure(name)?;
        self.check_unlocked(&file)?;

        let mut ledger = read(&file.name, &file.path)?;
        ledger.normalize();
        self.save(&file, &ledger)
    }

    pub fn next_class_number(&self, name: &str) -> Result<i64, LedgerError> {
        let mut ledger = self.load(name)?;
        ledger.normalize();
        self.class_number(name.trim(), &ledger)
    }

    /// Records one event, inserting a row for a new `(date, class timing)`
    /// session or updating the comment of the existing one.
    ///
    /// Counted statuses take the next class number on insert. A not-counted
    /// status clears the class number, also on update. A counted status
    /// arriving as an update keeps whatever number the row already has.
    pub fn record_event(&self, event: &AttendanceEvent) -> Result<Outcome, LedgerError> {
        let file = self.directory.ensure(&event.student_name)?;
        self.check_unlocked(&file)?;

        let mut ledger = read(&file.name, &file.path)?;
        let normalized = ledger.normalize();
        let key_columns: Vec<&str> = CANONICAL_COLUMNS
            .iter()
            .copied()
            .filter(|column| *column != CLASS_NO && *column != self.counter_column)
            .collect();
        if ledger.add_missing_columns(&key_columns) || normalized {
            self.save(&file, &ledger)?;
        }

        let session = SessionDate::parse(&event.date);
        let status = event.status.trim();
        let category = self.vocabulary.classify(status);

        let outcome = match ledger.find_session(&session.date, &event.time_range) {
            Some(row) => {
                debug!("{}: updating row {} for {} {}", file.name, row, session.date, event.time_range);
                if let Some(col) = ledger.column(COMMENT) {
                    ledger.set(row, col, Cell::text(status));
                }
                if category == Category::NotCounted {
                    if let Some(col) = ledger.column(&self.counter_column) {
                        ledger.set(row, col, Cell::Empty);
                    }
                }
                Outcome::Updated {
                    class_no: ledger.value(row, &self.counter_column).as_class_number(),
                }
            },
            None => {
                let class_no = match category {
                    Category::Counted => Some(self.class_number(&file.name, &ledger)?),
                    Category::NotCounted => None,
                };
                debug!("{}: appending {} {} as class {:?}", file.name, session.date, event.time_range, class_no);
                ledger.append(&[
                    (self.counter_column.as_str(), class_no.map_or(Cell::Empty, |n| Cell::Number(n as f64))),
                    (DATE, Cell::text(session.date.as_str())),
                    (DAY, Cell::text(session.day.as_str())),
                    (CLASS_TIMING, Cell::text(event.time_range.as_str())),
                    (COMMENT, Cell::text(status)),
                ]);
                Outcome::Inserted { class_no }
            },
        };

        self.save(&file, &ledger)?;
        info!("marked {} as {} on {} {}", file.name, status, session.date, event.time_range);

        Ok(outcome)
    }

    /// Marks the same session for every listed student, in order. A failure
    /// for one student never stops the others and nothing is rolled back.
    pub fn record_batch(&self, students: &[String], marking: &Marking) -> BatchReport {
        let mut report = BatchReport::default();
        for student in students {
            report.push(student, self.record_event(&marking.event_for(student)));
        }
        report
    }

    /// Applies every event from a CSV import in file order.
    pub fn import_events<R: Read>(&self, reader: R) -> BatchReport {
        let mut report = BatchReport::default();
        for event in data::read_events(reader) {
            let result = self.record_event(&event);
            report.push(&event.student_name, result);
        }
        report
    }

    fn class_number(&self, student: &str, ledger: &Ledger) -> Result<i64, LedgerError> {
        ledger
            .next_class_number(&self.counter_column)
            .map_err(|missing| LedgerError::Schema {
                student: student.to_string(),
                column: missing.0,
            })
    }

    fn check_unlocked(&self, file: &StudentFile) -> Result<(), LedgerError> {
        match lock::is_held(&file.path) {
            Ok(false) => Ok(()),
            Ok(true) => Err(LedgerError::WriteConflict {
                student: file.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "file is open in another program",
                ),
            }),
            Err(source) => Err(LedgerError::WriteConflict {
                student: file.name.clone(),
                source,
            }),
        }
    }

    fn save(&self, file: &StudentFile, ledger: &Ledger) -> Result<(), LedgerError> {
        self.check_unlocked(file)?;

        let categories = self.vocabulary.row_categories(ledger);
        data::save_ledger(&file.path, ledger, &categories).map_err(|err| LedgerError::from_save(&file.name, err))
    }
}

fn read(student: &str, path: &Path) -> Result<Ledger, LedgerError> {
    data::load_ledger(path).map_err(|source| LedgerError::Unreadable {
        student: student.to_string(),
        source,
    })
}
