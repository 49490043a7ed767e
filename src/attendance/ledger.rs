use std::fmt;

use log::debug;
use thiserror::Error;

pub const CLASS_NO: &str = "class no.";
pub const DATE: &str = "date";
pub const DAY: &str = "day";
pub const CLASS_TIMING: &str = "class timing";
pub const COMMENT: &str = "comment";

pub const CANONICAL_COLUMNS: [&str; 5] = [CLASS_NO, DATE, DAY, CLASS_TIMING, COMMENT];

static EMPTY: Cell = Cell::Empty;

#[derive(Debug, PartialEq, Error)]
#[error("missing '{0}' column")]
pub struct MissingColumn(pub String);

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Cell {
        let value = value.into();
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Class number held by the cell, if any.
    ///
    /// Whole floats count (spreadsheets store every number as a float), as
    /// does text that parses as an integer once trimmed. Only values in
    /// `1..i64::MAX` are class numbers, so the next one always fits.
    pub fn as_class_number(&self) -> Option<i64> {
        let n = match self {
            Cell::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n < i64::MAX as f64 => *n as i64,
            Cell::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (1..i64::MAX).contains(&n).then_some(n)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One student's attendance table: a header row followed by data rows in
/// the order they were appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    header: Vec<Cell>,
    rows: Vec<Vec<Cell>>,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new()
    }
}

impl Ledger {
    /// An empty ledger carrying the canonical header.
    pub fn new() -> Ledger {
        Ledger {
            header: CANONICAL_COLUMNS.iter().map(|c| Cell::text(*c)).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a ledger from a raw grid whose first row is the header.
    /// A grid without any cells gets the canonical header.
    pub fn from_grid(mut grid: Vec<Vec<Cell>>) -> Ledger {
        if grid.iter().all(|row| row.iter().all(Cell::is_empty)) {
            return Ledger::new();
        }

        let rows = grid.split_off(1);
        let header = grid.pop().unwrap_or_default();

        Ledger { header, rows }
    }

    pub fn header(&self) -> &[Cell] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|cell| cell.to_string() == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .unwrap_or(&EMPTY)
    }

    /// Value of the named column in a row, or `Empty` if either is missing.
    pub fn value(&self, row: usize, column: &str) -> &Cell {
        match self.column(column) {
            Some(col) => self.cell(row, col),
            None => &EMPTY,
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, Cell::Empty);
            }
            cells[col] = value;
        }
    }

    /// Drops trailing absent header cells and rewrites the rest as trimmed,
    /// lower-cased text. Returns whether the header changed.
    ///
    /// A whitespace-only cell counts as absent at the tail so a second pass
    /// never strips what the first one produced.
    pub fn normalize(&mut self) -> bool {
        let keep = self
            .header
            .iter()
            .rposition(|cell| !cell.to_string().trim().is_empty())
            .map_or(0, |last| last + 1);

        let normalized: Vec<Cell> = self.header[..keep]
            .iter()
            .map(|cell| Cell::text(cell.to_string().trim().to_lowercase()))
            .collect();

        if normalized == self.header {
            return false;
        }

        debug!("normalized header to {:?}", normalized);
        self.header = normalized;
        true
    }

    /// Appends each of `columns` missing from the header, in order. Returns
    /// whether any column was added.
    pub fn add_missing_columns(&mut self, columns: &[&str]) -> bool {
        let missing: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|name| self.column(name).is_none())
            .collect();

        for name in &missing {
            debug!("adding missing '{}' column", name);
            self.header.push(Cell::text(*name));
        }

        !missing.is_empty()
    }

    /// Next class number to hand out.
    ///
    /// Rows are scanned from the most recent one upward and the first
    /// integer found wins; blank and non-numeric cells are skipped. This
    /// relies on the ledger being append-ordered: a date backfilled after
    /// newer rows still continues from the most recent number, not from
    /// the column maximum.
    pub fn next_class_number(&self, counter_column: &str) -> Result<i64, MissingColumn> {
        let col = self
            .column(counter_column)
            .ok_or_else(|| MissingColumn(counter_column.to_string()))?;

        let last = (0..self.rows.len())
            .rev()
            .find_map(|row| self.cell(row, col).as_class_number());

        Ok(last.map_or(1, |n| n + 1))
    }

    /// Row holding the session identified by `(date, class timing)`.
    pub fn find_session(&self, date: &str, timing: &str) -> Option<usize> {
        let date_col = self.column(DATE)?;
        let timing_col = self.column(CLASS_TIMING)?;

        (0..self.rows.len()).find(|&row| {
            self.cell(row, date_col).to_string() == date
                && self.cell(row, timing_col).to_string() == timing
        })
    }

    /// Appends a row, placing each value under the header column of the
    /// same name. Values without a matching column are dropped and columns
    /// without a value stay empty.
    pub fn append(&mut self, values: &[(&str, Cell)]) -> usize {
        let mut row = vec![Cell::Empty; self.header.len()];
        for (name, value) in values {
            match self.column(name) {
                Some(col) => row[col] = value.clone(),
                None => debug!("no '{}' column, dropping value {:?}", name, value),
            }
        }

        self.rows.push(row);
        self.rows.len() - 1
    }
}
