//! Detection of ledger files held open by another program.
//!
//! Spreadsheet software either holds the file exclusively (opening it for
//! writing fails) or drops a marker file beside it. Both count as held.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;

use log::debug;

use crate::data::LEDGER_EXTENSION;

pub fn is_lock_marker(file_name: &str) -> bool {
    file_name.starts_with("~$") || (file_name.starts_with(".~lock.") && file_name.ends_with('#'))
}

fn has_marker(path: &Path) -> bool {
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name().and_then(|f| f.to_str())) else {
        return false;
    };

    dir.join(format!("~${}", file_name)).exists() || dir.join(format!(".~lock.{}#", file_name)).exists()
}

/// Whether another program holds `path` open. A missing file is not held.
pub fn is_held(path: &Path) -> io::Result<bool> {
    if has_marker(path) {
        debug!("lock marker found for {}", path.display());
        return Ok(true);
    }

    match OpenOptions::new().append(true).open(path) {
        Ok(_) => Ok(false),
        Err(err) if err.kind() == ErrorKind::PermissionDenied => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// File names of the ledgers in `dir` that are held open, sorted.
pub fn scan_for_locked_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut locked = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };

        let is_ledger = Path::new(&file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(LEDGER_EXTENSION));
        if !is_ledger || is_lock_marker(&file_name) || !entry.file_type()?.is_file() {
            continue;
        }

        if is_held(&entry.path())? {
            locked.push(file_name);
        }
    }

    locked.sort();
    Ok(locked)
}
