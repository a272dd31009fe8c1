use crate::pipeline::merge::EnrichedCastRecord;
use crate::pipeline::transform::{MovieRow, TitleRow, TvShowRow};

/// Everything one run writes, committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBatch {
    pub titles: Vec<TitleRow>,
    pub movies: Vec<MovieRow>,
    pub tv_shows: Vec<TvShowRow>,
    pub cast_members: Vec<EnrichedCastRecord>,
}

impl LoadBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
            && self.movies.is_empty()
            && self.tv_shows.is_empty()
            && self.cast_members.is_empty()
    }
}

/// Column vectors for one `cast_members` UNNEST insert.
#[derive(Debug, Default)]
pub(crate) struct CastMemberColumns {
    pub(crate) show_ids: Vec<String>,
    pub(crate) cast_members: Vec<Option<String>>,
    pub(crate) genders: Vec<Option<String>>,
}

impl CastMemberColumns {
    pub(crate) fn from_rows(rows: &[EnrichedCastRecord]) -> Self {
        let mut columns = Self {
            show_ids: Vec::with_capacity(rows.len()),
            cast_members: Vec::with_capacity(rows.len()),
            genders: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            columns.show_ids.push(row.record_id.clone());
            columns.cast_members.push(row.cast_member.clone());
            columns
                .genders
                .push(row.gender.map(|outcome| outcome.as_db_str().to_string()));
        }
        columns
    }
}
