use std::io::{Read, Write};
use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};
use log::{debug, warn};
use rust_xlsxwriter::{Color, Format, Workbook};
use serde::Deserialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::attendance::event::AttendanceEvent;
use crate::attendance::ledger::{Cell, Ledger, COMMENT};
use crate::attendance::status::Category;

pub const LEDGER_EXTENSION: &str = "xlsx";

const SHEET_NAME: &str = "Sheet1";
const HEADER_FILL: u32 = 0xD9D9D9;
const COUNTED_FILL: u32 = 0xC6EFCE;
const NOT_COUNTED_FILL: u32 = 0xFFEB9C;

#[derive(Debug, Error)]
pub enum LedgerDataError {
    #[error("failed to read workbook: {0}")]
    Read(#[from] calamine::XlsxError),
    #[error("workbook has no worksheet")]
    NoWorksheet,
    #[error("failed to build workbook: {0}")]
    Build(#[from] rust_xlsxwriter::XlsxError),
    #[error("ledger is too large for a worksheet")]
    TooLarge,
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
pub struct EventRecord {
    pub student: String,
    pub date: String,
    #[serde(rename = "class timing")]
    pub time_range: String,
    pub comment: String,
}

impl From<EventRecord> for AttendanceEvent {
    fn from(record: EventRecord) -> Self {
        AttendanceEvent {
            student_name: record.student,
            date: record.date,
            time_range: record.time_range,
            status: record.comment,
        }
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::text(s.as_str()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::text(s.as_str()),
        Data::Error(err) => Cell::text(format!("{:?}", err)),
        #[allow(unreachable_patterns)]
        _ => Cell::Empty,
    }
}

/// Reads the first worksheet of a ledger workbook.
pub fn load_ledger(path: &Path) -> Result<Ledger, LedgerDataError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(LedgerDataError::NoWorksheet)??;

    // The range starts at the first used cell, not at A1.
    let (first_row, first_col) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Vec<Cell>> = vec![Vec::new(); first_row as usize];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; first_col as usize];
        cells.extend(row.iter().map(to_cell));
        grid.push(cells);
    }

    debug!("loaded {} rows from {}", grid.len(), path.display());
    Ok(Ledger::from_grid(grid))
}

struct Styles {
    header: Format,
    counted: Format,
    not_counted: Format,
    not_counted_comment: Format,
}

impl Styles {
    fn new() -> Styles {
        let not_counted = Format::new().set_background_color(Color::RGB(NOT_COUNTED_FILL));
        Styles {
            header: Format::new().set_bold().set_background_color(Color::RGB(HEADER_FILL)),
            counted: Format::new().set_background_color(Color::RGB(COUNTED_FILL)),
            not_counted_comment: not_counted.clone().set_bold(),
            not_counted,
        }
    }
}

/// Writes `ledger` to `path`, styling each data row by its category.
///
/// The workbook is written to a temporary file beside `path` first and then
/// moved over it, so a failed save leaves the previous ledger in place.
pub fn save_ledger(path: &Path, ledger: &Ledger, categories: &[Option<Category>]) -> Result<(), LedgerDataError> {
    let styles = Styles::new();
    let empty = Cell::Empty;
    let comment_col = ledger.column(COMMENT);

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, cell) in ledger.header().iter().enumerate() {
        let col = u16::try_from(col).map_err(|_| LedgerDataError::TooLarge)?;
        worksheet.write_string_with_format(0, col, cell.to_string(), &styles.header)?;
        worksheet.set_column_width(col, 14)?;
    }

    for (index, cells) in ledger.rows().iter().enumerate() {
        let row = u32::try_from(index + 1).map_err(|_| LedgerDataError::TooLarge)?;
        let category = categories.get(index).copied().flatten();
        let width = cells.len().max(ledger.header().len());

        for col in 0..width {
            let format = match category {
                Some(Category::Counted) => Some(&styles.counted),
                Some(Category::NotCounted) if Some(col) == comment_col => Some(&styles.not_counted_comment),
                Some(Category::NotCounted) => Some(&styles.not_counted),
                None => None,
            };
            let cell = cells.get(col).unwrap_or(&empty);
            let col = u16::try_from(col).map_err(|_| LedgerDataError::TooLarge)?;

            match (cell, format) {
                (Cell::Text(s), Some(format)) if !s.is_empty() => {
                    worksheet.write_string_with_format(row, col, s.as_str(), format)?;
                },
                (Cell::Text(s), None) if !s.is_empty() => {
                    worksheet.write_string(row, col, s.as_str())?;
                },
                (Cell::Number(n), Some(format)) => {
                    worksheet.write_number_with_format(row, col, *n, format)?;
                },
                (Cell::Number(n), None) => {
                    worksheet.write_number(row, col, *n)?;
                },
                (Cell::Bool(b), Some(format)) => {
                    worksheet.write_boolean_with_format(row, col, *b, format)?;
                },
                (Cell::Bool(b), None) => {
                    worksheet.write_boolean(row, col, *b)?;
                },
                (_, Some(format)) => {
                    worksheet.write_blank(row, col, format)?;
                },
                (_, None) => {},
            }
        }
    }

    let buffer = workbook.save_to_buffer()?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(&buffer)?;
    file.persist(path).map_err(|err| err.error)?;

    debug!("saved {} rows to {}", ledger.len(), path.display());
    Ok(())
}

/// Reads attendance events from CSV with the columns
/// `student,date,class timing,comment`. Malformed records are skipped.
pub fn read_events<R: Read>(reader: R) -> Vec<AttendanceEvent> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let mut events = Vec::new();
    for record in csv_reader.deserialize::<EventRecord>() {
        match record {
            Ok(record) => events.push(record.into()),
            Err(err) => warn!("failed to deserialize event record, err={}", err),
        }
    }

    events
}

/// Writes the ledger as CSV: the header row, then every data row padded to
/// the header width.
pub fn export_csv<W: Write>(ledger: &Ledger, writer: W) -> Result<(), LedgerDataError> {
    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    csv_writer.write_record(ledger.header().iter().map(|cell| cell.to_string()))?;
    for cells in ledger.rows() {
        let width = cells.len().max(ledger.header().len());
        let record = (0..width).map(|col| cells.get(col).map(|c| c.to_string()).unwrap_or_default());
        csv_writer.write_record(record)?;
    }

    csv_writer.flush()?;

    Ok(())
}
