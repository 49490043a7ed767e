use std::io;

use thiserror::Error;

pub mod directory;
pub mod engine;
pub mod event;
pub mod ledger;
pub mod lock;
pub mod status;

#[cfg(test)]
mod engine_tests;

use crate::data::LedgerDataError;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid student name {0:?}")]
    InvalidName(String),
    #[error("ledger for {student} has no '{column}' column")]
    Schema { student: String, column: String },
    #[error("ledger for {student} is unreadable: {source}")]
    Unreadable {
        student: String,
        #[source]
        source: LedgerDataError,
    },
    #[error("no ledger for {0}")]
    UnknownStudent(String),
    #[error("ledger for {student} could not be written: {source}")]
    Unwritable {
        student: String,
        #[source]
        source: LedgerDataError,
    },
    #[error("ledger for {student} could not be saved: {source}")]
    WriteConflict {
        student: String,
        #[source]
        source: io::Error,
    },
    #[error("ledger files are open in another program: {}", .0.join(", "))]
    PreflightBlocked(Vec<String>),
    #[error("storage directory error: {0}")]
    Storage(#[from] io::Error),
}

impl LedgerError {
    /// The student whose ledger the error belongs to, if any.
    pub fn student(&self) -> Option<&str> {
        match self {
            LedgerError::Schema { student, .. }
            | LedgerError::Unreadable { student, .. }
            | LedgerError::Unwritable { student, .. }
            | LedgerError::WriteConflict { student, .. } => Some(student),
            LedgerError::InvalidName(name) | LedgerError::UnknownStudent(name) => Some(name),
            LedgerError::PreflightBlocked(_) | LedgerError::Storage(_) => None,
        }
    }

    /// Classifies a failed save: I/O errors mean the file could not be
    /// replaced, anything else means the workbook could not be built.
    pub(crate) fn from_save(student: &str, err: LedgerDataError) -> LedgerError {
        match err {
            LedgerDataError::Io(source) => LedgerError::WriteConflict {
                student: student.to_string(),
                source,
            },
            source => LedgerError::Unwritable {
                student: student.to_string(),
                source,
            },
        }
    }

    pub fn is_write_conflict(&self) -> bool {
        matches!(self, LedgerError::WriteConflict { .. })
    }
}
