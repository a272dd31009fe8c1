use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Column order the catalog export is expected to carry.
pub const EXPECTED_COLUMNS: [&str; 12] = [
    "show_id",
    "type",
    "title",
    "director",
    "cast",
    "country",
    "date_added",
    "release_year",
    "rating",
    "duration",
    "listed_in",
    "description",
];

/// One row of the catalog export. Empty cells deserialize to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TitleRecord {
    pub show_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub title: Option<String>,
    pub director: Option<String>,
    pub cast: Option<String>,
    pub country: Option<String>,
    pub date_added: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_year: Option<i32>,
    pub rating: Option<String>,
    pub duration: Option<String>,
    pub listed_in: Option<String>,
    pub description: Option<String>,
}

impl TitleRecord {
    /// `show_id` or an empty string; validation guarantees presence before transforms run.
    #[must_use]
    pub fn show_id(&self) -> &str {
        self.show_id.as_deref().unwrap_or_default()
    }
}

/// Header row plus records, as read from a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleBatch {
    pub headers: Vec<String>,
    pub records: Vec<TitleRecord>,
}

impl TitleBatch {
    /// Builds a batch carrying the expected header; used by in-memory sources.
    #[must_use]
    pub fn with_expected_headers(records: Vec<TitleRecord>) -> Self {
        Self {
            headers: EXPECTED_COLUMNS.iter().map(ToString::to_string).collect(),
            records,
        }
    }
}

#[async_trait]
pub trait TitleSource: Send + Sync {
    async fn load(&self) -> Result<TitleBatch>;
}

/// Reads the catalog from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvTitleSource {
    path: PathBuf,
}

impl CsvTitleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TitleSource for CsvTitleSource {
    async fn load(&self) -> Result<TitleBatch> {
        let path = self.path.clone();
        info!(path = %path.display(), "reading title catalog");

        let batch = tokio::task::spawn_blocking(move || read_csv(&path))
            .await
            .context("csv reader task panicked")??;

        info!(
            records = batch.records.len(),
            columns = batch.headers.len(),
            "title catalog loaded"
        );
        Ok(batch)
    }
}

fn read_csv(path: &Path) -> Result<TitleBatch> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::None)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    read_titles(reader)
}

/// Deserializes every row of `reader`.
///
/// A row whose field count differs from the header aborts the read with its
/// line number, even when `reader` was built as flexible.
pub(crate) fn read_titles<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<TitleBatch> {
    let header_record = reader
        .headers()
        .context("failed to read csv header")?
        .clone();
    let headers = header_record
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(error) => {
                let line = error.position().map_or(0, csv::Position::line);
                return Err(anyhow::Error::new(error)
                    .context(format!("malformed csv row at line {line}")));
            }
        };
        let line = row.position().map_or(0, csv::Position::line);

        if row.len() != header_record.len() {
            anyhow::bail!(
                "malformed csv row at line {line}: {} fields, header has {}",
                row.len(),
                header_record.len()
            );
        }

        let record: TitleRecord = row
            .deserialize(Some(&header_record))
            .with_context(|| format!("malformed csv row at line {line}"))?;
        records.push(record);
    }

    debug!(records = records.len(), "deserialized csv rows");
    Ok(TitleBatch { headers, records })
}
