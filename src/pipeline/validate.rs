//! Pre-load data quality checks on the raw catalog.
//!
//! Any issue found here stops the run before a single lookup or write happens.
use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;

use super::ingest::{EXPECTED_COLUMNS, TitleBatch};

/// `date_added` layout, e.g. `March 31, 2017`.
pub const DATE_ADDED_FORMAT: &str = "%B %d, %Y";

pub const TITLE_TYPE_MOVIE: &str = "Movie";
pub const TITLE_TYPE_TV_SHOW: &str = "TV Show";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    UnexpectedColumns { found: Vec<String> },
    MissingShowId { row: usize },
    MissingType { show_id: String },
    DuplicateShowId { show_id: String },
    InvalidDateAdded { show_id: String, value: String },
    UnknownType { show_id: String, value: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedColumns { found } => {
                write!(f, "unexpected columns: [{}]", found.join(","))
            }
            Self::MissingShowId { row } => write!(f, "row {row} has no show_id"),
            Self::MissingType { show_id } => write!(f, "show_id {show_id} has no type"),
            Self::DuplicateShowId { show_id } => write!(f, "duplicate show_id {show_id}"),
            Self::InvalidDateAdded { show_id, value } => {
                write!(f, "show_id {show_id} has unparseable date_added {value:?}")
            }
            Self::UnknownType { show_id, value } => {
                write!(f, "show_id {show_id} has unknown type {value:?}")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Runs every input check and collects all issues rather than stopping at the first.
#[must_use]
pub fn validate_titles(batch: &TitleBatch) -> ValidationReport {
    let mut issues = Vec::new();

    if batch.headers.iter().map(String::as_str).ne(EXPECTED_COLUMNS) {
        issues.push(ValidationIssue::UnexpectedColumns {
            found: batch.headers.clone(),
        });
    }

    let mut seen = HashSet::with_capacity(batch.records.len());
    for (row, record) in batch.records.iter().enumerate() {
        let Some(show_id) = record.show_id.as_deref() else {
            issues.push(ValidationIssue::MissingShowId { row: row + 1 });
            continue;
        };

        if !seen.insert(show_id) {
            issues.push(ValidationIssue::DuplicateShowId {
                show_id: show_id.to_string(),
            });
        }

        match record.kind.as_deref() {
            None => issues.push(ValidationIssue::MissingType {
                show_id: show_id.to_string(),
            }),
            Some(TITLE_TYPE_MOVIE | TITLE_TYPE_TV_SHOW) => {}
            Some(other) => issues.push(ValidationIssue::UnknownType {
                show_id: show_id.to_string(),
                value: other.to_string(),
            }),
        }

        if let Some(raw) = record
            .date_added
            .as_deref()
            .filter(|raw| parse_date_added(raw).is_none())
        {
            issues.push(ValidationIssue::InvalidDateAdded {
                show_id: show_id.to_string(),
                value: raw.to_string(),
            });
        }
    }

    ValidationReport { issues }
}

/// Parses `date_added`, tolerating surrounding whitespace.
#[must_use]
pub fn parse_date_added(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_ADDED_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::TitleRecord;

    fn record(show_id: &str, kind: &str, date_added: Option<&str>) -> TitleRecord {
        TitleRecord {
            show_id: Some(show_id.to_string()),
            kind: Some(kind.to_string()),
            date_added: date_added.map(ToString::to_string),
            ..TitleRecord::default()
        }
    }

    #[test]
    fn clean_batch_passes() {
        let batch = TitleBatch::with_expected_headers(vec![
            record("s1", "Movie", Some("September 25, 2021")),
            record("s2", "TV Show", Some(" March 31, 2017 ")),
            record("s3", "Movie", None),
        ]);

        let report = validate_titles(&batch);

        assert!(report.is_valid(), "unexpected issues: {report}");
    }

    #[test]
    fn reports_every_issue_kind() {
        let mut batch = TitleBatch::with_expected_headers(vec![
            record("s1", "Movie", Some("2021-09-25")),
            record("s1", "Movie", None),
            record("s2", "Podcast", None),
            TitleRecord {
                show_id: Some("s3".to_string()),
                ..TitleRecord::default()
            },
            TitleRecord::default(),
        ]);
        batch.headers.swap(0, 1);

        let report = validate_titles(&batch);

        assert!(!report.is_valid());
        assert!(matches!(
            report.issues[0],
            ValidationIssue::UnexpectedColumns { .. }
        ));
        assert!(report.issues.contains(&ValidationIssue::InvalidDateAdded {
            show_id: "s1".to_string(),
            value: "2021-09-25".to_string(),
        }));
        assert!(report.issues.contains(&ValidationIssue::DuplicateShowId {
            show_id: "s1".to_string(),
        }));
        assert!(report.issues.contains(&ValidationIssue::UnknownType {
            show_id: "s2".to_string(),
            value: "Podcast".to_string(),
        }));
        assert!(report.issues.contains(&ValidationIssue::MissingType {
            show_id: "s3".to_string(),
        }));
        assert!(report
            .issues
            .contains(&ValidationIssue::MissingShowId { row: 5 }));
    }

    #[test]
    fn parse_date_added_trims_whitespace() {
        assert_eq!(
            parse_date_added("  August 4, 2017"),
            NaiveDate::from_ymd_opt(2017, 8, 4)
        );
        assert_eq!(parse_date_added("04/08/2017"), None);
    }
}
