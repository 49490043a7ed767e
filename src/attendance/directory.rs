use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::ledger::Ledger;
use super::lock::is_lock_marker;
use super::LedgerError;
use crate::data::{self, LEDGER_EXTENSION};

/// A student's ledger file.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentFile {
    pub name: String,
    pub path: PathBuf,
    pub created: bool,
}

/// The storage directory holding one ledger file per student. Students are
/// identified by file presence alone.
#[derive(Debug, Clone)]
pub struct Directory {
    root: PathBuf,
}

impl Directory {
    /// Opens the storage directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Directory, LedgerError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Directory { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the ledger for `name`. Names are trimmed and must be usable
    /// as a file name on their own.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, LedgerError> {
        let name = validate_name(name)?;
        Ok(self.root.join(format!("{}.{}", name, LEDGER_EXTENSION)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.path_for(name).is_ok_and(|path| path.is_file())
    }

    /// Names of every student with a ledger, sorted case-sensitively.
    pub fn list_students(&self) -> Result<Vec<String>, LedgerError> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            if is_lock_marker(file_name) || file_name.starts_with('.') || !entry.file_type()?.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(LEDGER_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Students whose name contains `query`, ignoring case. An empty query
    /// matches everyone.
    pub fn matching(&self, query: &str) -> Result<Vec<String>, LedgerError> {
        let query = query.trim().to_lowercase();
        let names = self.list_students()?;

        if query.is_empty() {
            return Ok(names);
        }

        Ok(names
            .into_iter()
            .filter(|name| name.to_lowercase().contains(&query))
            .collect())
    }

    /// Returns the ledger file for `name`, creating an empty one with the
    /// canonical header if none exists. Existing files are left untouched.
    pub fn ensure(&self, name: &str) -> Result<StudentFile, LedgerError> {
        let name = validate_name(name)?.to_string();
        let path = self.path_for(&name)?;

        if path.exists() {
            return Ok(StudentFile { name, path, created: false });
        }

        data::save_ledger(&path, &Ledger::new(), &[]).map_err(|err| LedgerError::from_save(&name, err))?;
        info!("created ledger for {}", name);

        Ok(StudentFile { name, path, created: true })
    }
}

fn validate_name(name: &str) -> Result<&str, LedgerError> {
    let trimmed = name.trim();
    let invalid = trimmed.is_empty()
        || trimmed.starts_with(['.', '~'])
        || trimmed.contains(['/', '\\'])
        || trimmed.chars().any(char::is_control);

    if invalid {
        Err(LedgerError::InvalidName(name.to_string()))
    } else {
        Ok(trimmed)
    }
}
