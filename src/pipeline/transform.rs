use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::ingest::TitleRecord;
use super::validate::{TITLE_TYPE_MOVIE, TITLE_TYPE_TV_SHOW, parse_date_added};

static FIRST_INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex compiles"));

/// Row of the `titles` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRow {
    pub show_id: String,
    pub kind: String,
    pub title: Option<String>,
    pub director: Option<String>,
    pub country: Option<String>,
    pub rating: Option<String>,
    pub listed_in: Option<String>,
    pub description: Option<String>,
}

/// Row of the `movies` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRow {
    pub show_id: String,
    pub date_added: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub movie_length_min: Option<i32>,
}

/// Row of the `tv_shows` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TvShowRow {
    pub show_id: String,
    pub date_added: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub season_qty: Option<i32>,
}

#[must_use]
pub fn title_rows(records: &[TitleRecord]) -> Vec<TitleRow> {
    records
        .iter()
        .map(|record| TitleRow {
            show_id: record.show_id().to_string(),
            kind: record.kind.clone().unwrap_or_default(),
            title: record.title.clone(),
            director: record.director.clone(),
            country: record.country.clone(),
            rating: record.rating.clone(),
            listed_in: record.listed_in.clone(),
            description: record.description.clone(),
        })
        .collect()
}

#[must_use]
pub fn movie_rows(records: &[TitleRecord]) -> Vec<MovieRow> {
    records
        .iter()
        .filter(|record| record.kind.as_deref() == Some(TITLE_TYPE_MOVIE))
        .map(|record| MovieRow {
            show_id: record.show_id().to_string(),
            date_added: record.date_added.as_deref().and_then(parse_date_added),
            release_year: record.release_year,
            movie_length_min: record.duration.as_deref().and_then(first_integer),
        })
        .collect()
}

#[must_use]
pub fn tv_show_rows(records: &[TitleRecord]) -> Vec<TvShowRow> {
    records
        .iter()
        .filter(|record| record.kind.as_deref() == Some(TITLE_TYPE_TV_SHOW))
        .map(|record| TvShowRow {
            show_id: record.show_id().to_string(),
            date_added: record.date_added.as_deref().and_then(parse_date_added),
            release_year: record.release_year,
            season_qty: record.duration.as_deref().and_then(first_integer),
        })
        .collect()
}

/// First run of digits in `raw` (`"90 min"` -> 90, `"2 Seasons"` -> 2).
#[must_use]
pub fn first_integer(raw: &str) -> Option<i32> {
    FIRST_INTEGER
        .find(raw)
        .and_then(|found| found.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn record(show_id: &str, kind: &str, duration: Option<&str>) -> TitleRecord {
        TitleRecord {
            show_id: Some(show_id.to_string()),
            kind: Some(kind.to_string()),
            title: Some(format!("title {show_id}")),
            date_added: Some(" January 1, 2020".to_string()),
            release_year: Some(2019),
            duration: duration.map(ToString::to_string),
            ..TitleRecord::default()
        }
    }

    #[rstest]
    #[case("90 min", Some(90))]
    #[case("1 Season", Some(1))]
    #[case("12 Seasons", Some(12))]
    #[case("approx. 105 min (cut 98)", Some(105))]
    #[case("unknown", None)]
    #[case("", None)]
    fn first_integer_extracts_leading_number(#[case] raw: &str, #[case] expected: Option<i32>) {
        assert_eq!(first_integer(raw), expected);
    }

    #[test]
    fn splits_movies_and_shows_by_type() {
        let records = vec![
            record("s1", "Movie", Some("90 min")),
            record("s2", "TV Show", Some("3 Seasons")),
            record("s3", "Movie", None),
        ];

        let titles = title_rows(&records);
        let movies = movie_rows(&records);
        let shows = tv_show_rows(&records);

        assert_eq!(titles.len(), 3);
        assert_eq!(titles[1].kind, "TV Show");
        assert_eq!(
            movies,
            vec![
                MovieRow {
                    show_id: "s1".to_string(),
                    date_added: NaiveDate::from_ymd_opt(2020, 1, 1),
                    release_year: Some(2019),
                    movie_length_min: Some(90),
                },
                MovieRow {
                    show_id: "s3".to_string(),
                    date_added: NaiveDate::from_ymd_opt(2020, 1, 1),
                    release_year: Some(2019),
                    movie_length_min: None,
                },
            ]
        );
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].season_qty, Some(3));
    }
}
