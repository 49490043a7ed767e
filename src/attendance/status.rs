use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ledger::{Ledger, COMMENT};

const UNSPECIFIED_REASON: &str = "Unspecified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Consumes the next class number.
    Counted,
    /// Excluded from the class sequence; never carries a class number.
    NotCounted,
}

#[derive(Debug, PartialEq, Error)]
#[error("unknown status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub label: String,
    pub counted: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Whether the label takes a `"<label>: <reason>"` suffix.
    #[serde(default)]
    pub reason: bool,
}

impl StatusEntry {
    pub fn new(label: &str, counted: bool) -> StatusEntry {
        StatusEntry {
            label: label.to_string(),
            counted,
            aliases: Vec::new(),
            reason: false,
        }
    }

    pub fn alias(mut self, alias: &str) -> StatusEntry {
        self.aliases.push(alias.to_string());
        self
    }

    pub fn with_reason(mut self) -> StatusEntry {
        self.reason = true;
        self
    }

    fn category(&self) -> Category {
        if self.counted {
            Category::Counted
        } else {
            Category::NotCounted
        }
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.label.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    fn matches(&self, status: &str) -> bool {
        self.names().any(|name| {
            status == name
                || (self.reason
                    && status
                        .strip_prefix(name)
                        .is_some_and(|rest| rest.starts_with(':')))
        })
    }
}

/// The fixed set of statuses a comment may carry, each mapped to a
/// counted/not-counted category.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusVocabulary {
    entries: Vec<StatusEntry>,
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        StatusVocabulary::new(default_entries())
    }
}

pub fn default_entries() -> Vec<StatusEntry> {
    vec![
        StatusEntry::new("Present", true).alias("Attended"),
        StatusEntry::new("Absent", true),
        StatusEntry::new("Class Not Counted", false),
        StatusEntry::new("Exam Leave", false),
        StatusEntry::new("Holiday Leave", false).with_reason(),
        StatusEntry::new("Free Class", false),
    ]
}

impl StatusVocabulary {
    pub fn new(entries: Vec<StatusEntry>) -> StatusVocabulary {
        StatusVocabulary { entries }
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    pub fn lookup(&self, status: &str) -> Option<Category> {
        let status = status.trim();
        self.entries
            .iter()
            .find(|e| e.matches(status))
            .map(StatusEntry::category)
    }

    /// Category of an incoming status. Anything outside the vocabulary is
    /// treated as not counted.
    pub fn classify(&self, status: &str) -> Category {
        self.lookup(status).unwrap_or_else(|| {
            warn!("status '{}' is not in the vocabulary, treating it as not counted", status);
            Category::NotCounted
        })
    }

    /// Comment text for `label`, attaching the reason for labels that take
    /// one. A blank reason becomes "Unspecified".
    pub fn compose(&self, label: &str, reason: Option<&str>) -> Result<String, UnknownStatus> {
        let label = label.trim();
        let entry = self
            .entries
            .iter()
            .find(|e| e.names().any(|name| name == label))
            .ok_or_else(|| UnknownStatus(label.to_string()))?;

        if !entry.reason {
            return Ok(label.to_string());
        }

        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(UNSPECIFIED_REASON);

        Ok(format!("{}: {}", label, reason))
    }

    /// Presentation category of every data row, derived from its comment.
    /// Rows without a comment get none.
    pub fn row_categories(&self, ledger: &Ledger) -> Vec<Option<Category>> {
        (0..ledger.len())
            .map(|row| {
                let comment = ledger.value(row, COMMENT);
                if comment.is_empty() {
                    None
                } else {
                    Some(self.lookup(&comment.to_string()).unwrap_or(Category::NotCounted))
                }
            })
            .collect()
    }
}
