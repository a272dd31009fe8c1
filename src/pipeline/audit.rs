//! Data quality audit of the rows a run committed.
//!
//! Nothing here aborts a run. The counts are logged and returned in the run
//! summary so that null rates and out-of-range values can be tracked over time.
use chrono::{Datelike, NaiveDate};

use crate::store::LoadBatch;

use super::enrich::GenderOutcome;
use super::validate::{TITLE_TYPE_MOVIE, TITLE_TYPE_TV_SHOW};

/// Earliest plausible `date_added`; the streaming catalog did not exist before it.
const CATALOG_EPOCH: (i32, u32, u32) = (1997, 1, 1);
const MIN_RELEASE_YEAR: i32 = 1900;
const MAX_SEASONS: i32 = 30;
const MAX_MOVIE_LENGTH_MIN: i32 = 500;

/// Null count of one column of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNulls {
    pub table: &'static str,
    pub column: &'static str,
    pub nulls: usize,
    pub rows: usize,
}

impl ColumnNulls {
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.nulls, self.rows)
    }
}

/// Out-of-range date checks shared by `movies` and `tv_shows`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateAudit {
    /// Before 1900 or after the current year.
    pub release_year_out_of_range: usize,
    /// Before 1997-01-01 or after today.
    pub date_added_out_of_range: usize,
    /// Added in a year earlier than its release year.
    pub added_before_release: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidDataAudit {
    pub unknown_type: usize,
    pub movies: DateAudit,
    pub tv_shows: DateAudit,
    pub movie_length_out_of_range: usize,
    pub season_qty_out_of_range: usize,
    pub cast_rows: usize,
    pub gender_unknown: usize,
    pub gender_request_failed: usize,
}

impl InvalidDataAudit {
    #[must_use]
    pub fn gender_unknown_percent(&self) -> f64 {
        percent(self.gender_unknown, self.cast_rows)
    }

    #[must_use]
    pub fn gender_request_failed_percent(&self) -> f64 {
        percent(self.gender_request_failed, self.cast_rows)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogAudit {
    /// Every auditable column, including those without nulls.
    pub null_counts: Vec<ColumnNulls>,
    pub invalid: InvalidDataAudit,
}

impl CatalogAudit {
    /// Columns holding at least one null, in table order.
    pub fn columns_with_nulls(&self) -> impl Iterator<Item = &ColumnNulls> {
        self.null_counts.iter().filter(|column| column.nulls > 0)
    }
}

/// Audits `batch` against the calendar as of `today`.
#[must_use]
pub fn audit_batch(batch: &LoadBatch, today: NaiveDate) -> CatalogAudit {
    CatalogAudit {
        null_counts: null_counts(batch),
        invalid: invalid_data(batch, today),
    }
}

fn null_counts(batch: &LoadBatch) -> Vec<ColumnNulls> {
    fn count<T>(
        table: &'static str,
        column: &'static str,
        rows: &[T],
        is_null: impl Fn(&T) -> bool,
    ) -> ColumnNulls {
        ColumnNulls {
            table,
            column,
            nulls: rows.iter().filter(|row| is_null(row)).count(),
            rows: rows.len(),
        }
    }

    let titles = &batch.titles;
    let movies = &batch.movies;
    let tv_shows = &batch.tv_shows;
    let cast = &batch.cast_members;

    vec![
        count("titles", "title", titles, |row| row.title.is_none()),
        count("titles", "director", titles, |row| row.director.is_none()),
        count("titles", "country", titles, |row| row.country.is_none()),
        count("titles", "rating", titles, |row| row.rating.is_none()),
        count("titles", "listed_in", titles, |row| row.listed_in.is_none()),
        count("titles", "description", titles, |row| row.description.is_none()),
        count("movies", "date_added", movies, |row| row.date_added.is_none()),
        count("movies", "release_year", movies, |row| row.release_year.is_none()),
        count("movies", "movie_length_min", movies, |row| row.movie_length_min.is_none()),
        count("tv_shows", "date_added", tv_shows, |row| row.date_added.is_none()),
        count("tv_shows", "release_year", tv_shows, |row| row.release_year.is_none()),
        count("tv_shows", "season_qty", tv_shows, |row| row.season_qty.is_none()),
        count("cast_members", "cast_member", cast, |row| row.cast_member.is_none()),
        count("cast_members", "gender", cast, |row| row.gender.is_none()),
    ]
}

fn invalid_data(batch: &LoadBatch, today: NaiveDate) -> InvalidDataAudit {
    let mut audit = InvalidDataAudit {
        unknown_type: batch
            .titles
            .iter()
            .filter(|row| row.kind != TITLE_TYPE_MOVIE && row.kind != TITLE_TYPE_TV_SHOW)
            .count(),
        cast_rows: batch.cast_members.len(),
        ..InvalidDataAudit::default()
    };

    for movie in &batch.movies {
        audit
            .movies
            .record(movie.release_year, movie.date_added, today);
        if movie
            .movie_length_min
            .is_some_and(|length| !(0..=MAX_MOVIE_LENGTH_MIN).contains(&length))
        {
            audit.movie_length_out_of_range += 1;
        }
    }

    for show in &batch.tv_shows {
        audit
            .tv_shows
            .record(show.release_year, show.date_added, today);
        if show
            .season_qty
            .is_some_and(|seasons| !(0..=MAX_SEASONS).contains(&seasons))
        {
            audit.season_qty_out_of_range += 1;
        }
    }

    for row in &batch.cast_members {
        match row.gender {
            Some(GenderOutcome::Unknown) => audit.gender_unknown += 1,
            Some(GenderOutcome::Failed) => audit.gender_request_failed += 1,
            Some(GenderOutcome::Resolved(_)) | None => {}
        }
    }

    audit
}

impl DateAudit {
    fn record(&mut self, release_year: Option<i32>, date_added: Option<NaiveDate>, today: NaiveDate) {
        let (year, month, day) = CATALOG_EPOCH;
        let epoch = NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN);

        if release_year.is_some_and(|year| !(MIN_RELEASE_YEAR..=today.year()).contains(&year)) {
            self.release_year_out_of_range += 1;
        }
        if date_added.is_some_and(|added| added < epoch || added > today) {
            self.date_added_out_of_range += 1;
        }
        if release_year
            .zip(date_added)
            .is_some_and(|(release_year, added)| added.year() < release_year)
        {
            self.added_before_release += 1;
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / whole as f64
}
