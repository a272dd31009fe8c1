//! Cast-list explosion and distinct-name extraction.
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;

use super::ingest::TitleRecord;

/// One (title, cast member) pair. `cast_member` is `None` for a title without cast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CastRecord {
    pub record_id: String,
    pub cast_member: Option<String>,
}

impl CastRecord {
    pub fn new(record_id: impl Into<String>, cast_member: Option<&str>) -> Self {
        Self {
            record_id: record_id.into(),
            cast_member: cast_member.map(ToString::to_string),
        }
    }
}

/// What a title with an empty or missing cast list contributes to `cast_members`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyCastPolicy {
    /// One row with a null cast member, so every title stays represented.
    #[default]
    Placeholder,
    /// No rows at all.
    Skip,
}

impl FromStr for EmptyCastPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "skip" => Ok(Self::Skip),
            other => Err(format!(
                "unknown empty cast policy {other:?} (expected placeholder or skip)"
            )),
        }
    }
}

impl fmt::Display for EmptyCastPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => f.write_str("placeholder"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// Splits each title's comma-separated cast into one [`CastRecord`] per name.
///
/// Names are trimmed and empty segments dropped. Input order is preserved,
/// both across titles and within one cast list.
#[must_use]
pub fn explode_cast(titles: &[TitleRecord], policy: EmptyCastPolicy) -> Vec<CastRecord> {
    let mut records = Vec::with_capacity(titles.len() * 4);

    for title in titles {
        let before = records.len();
        if let Some(cast) = title.cast.as_deref() {
            records.extend(
                cast.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| CastRecord::new(title.show_id(), Some(name))),
            );
        }

        if records.len() == before && policy == EmptyCastPolicy::Placeholder {
            records.push(CastRecord::new(title.show_id(), None));
        }
    }

    records
}

/// Distinct non-empty cast names in first-seen order.
///
/// Names are compared after trimming and are otherwise case- and
/// whitespace-sensitive. The stable order makes batching reproducible.
#[must_use]
pub fn distinct_names(records: &[CastRecord]) -> Vec<String> {
    let names: IndexSet<&str> = records
        .iter()
        .filter_map(|record| record.cast_member.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    names.into_iter().map(ToString::to_string).collect()
}
