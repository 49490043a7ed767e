use chrono::NaiveDate;
use log::warn;

pub const DATE_FORMAT: &str = "%d-%m-%Y";

// Accepted on input, always re-rendered with `DATE_FORMAT`.
const INPUT_DATE_FORMATS: [&str; 3] = [DATE_FORMAT, "%d/%m/%Y", "%d.%m.%Y"];

/// One student's attendance for one class session.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceEvent {
    pub student_name: String,
    pub date: String,
    pub time_range: String,
    pub status: String,
}

impl AttendanceEvent {
    pub fn new(student_name: &str, date: &str, time_range: &str, status: &str) -> AttendanceEvent {
        AttendanceEvent {
            student_name: student_name.to_string(),
            date: date.to_string(),
            time_range: time_range.to_string(),
            status: status.to_string(),
        }
    }
}

/// A session marked for a whole list of students at once.
#[derive(Debug, Clone, PartialEq)]
pub struct Marking {
    pub date: String,
    pub time_range: String,
    pub status: String,
}

impl Marking {
    pub fn new(date: &str, time_range: &str, status: &str) -> Marking {
        Marking {
            date: date.to_string(),
            time_range: time_range.to_string(),
            status: status.to_string(),
        }
    }

    pub fn event_for(&self, student_name: &str) -> AttendanceEvent {
        AttendanceEvent::new(student_name, &self.date, &self.time_range, &self.status)
    }
}

/// Date and weekday as stored in a ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDate {
    pub date: String,
    /// Empty when the date could not be parsed.
    pub day: String,
}

impl SessionDate {
    /// Parses `DD-MM-YYYY` (also with `/` or `.` separators).
    ///
    /// Unparseable text is kept verbatim with an empty weekday so free-text
    /// dates stay representable.
    pub fn parse(text: &str) -> SessionDate {
        let parsed = INPUT_DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(text.trim(), format).ok());

        match parsed {
            Some(date) => SessionDate {
                date: date.format(DATE_FORMAT).to_string(),
                day: date.format("%A").to_string(),
            },
            None => {
                warn!("date '{}' is not DD-MM-YYYY, storing it as given", text);
                SessionDate {
                    date: text.to_string(),
                    day: String::new(),
                }
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.day.is_empty()
    }
}

/// Label for a class running from `start` to `end`, e.g. "09:00 to 10:00".
pub fn time_range_label(start: &str, end: &str) -> String {
    format!("{} to {}", start.trim(), end.trim())
}
