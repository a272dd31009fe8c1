use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::models::{CastMemberColumns, LoadBatch};
use crate::pipeline::merge::EnrichedCastRecord;
use crate::pipeline::orchestrator::CastMemberSink;
use crate::pipeline::transform::{MovieRow, TitleRow, TvShowRow};

/// Persistence seam for the catalog pipeline.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// `show_id`s already present in `titles`.
    async fn existing_show_ids(&self) -> Result<HashSet<String>>;

    /// Writes every table of `batch` in one transaction.
    async fn persist(&self, batch: &LoadBatch) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn existing_show_ids(&self) -> Result<HashSet<String>> {
        let ids: Vec<String> = sqlx::query_scalar(r"SELECT show_id FROM titles")
            .fetch_all(&self.pool)
            .await
            .context("failed to select existing show_ids")?;
        Ok(ids.into_iter().collect())
    }

    async fn persist(&self, batch: &LoadBatch) -> Result<()> {
        if batch.is_empty() {
            debug!("nothing to persist");
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin catalog transaction")?;

        insert_titles(&mut tx, &batch.titles).await?;
        insert_movies(&mut tx, &batch.movies).await?;
        insert_tv_shows(&mut tx, &batch.tv_shows).await?;
        insert_cast_members(&mut tx, &batch.cast_members).await?;

        tx.commit()
            .await
            .context("failed to commit catalog transaction")?;

        info!(
            titles = batch.titles.len(),
            movies = batch.movies.len(),
            tv_shows = batch.tv_shows.len(),
            cast_members = batch.cast_members.len(),
            "catalog batch persisted"
        );
        Ok(())
    }
}

#[async_trait]
impl CastMemberSink for PgCatalogStore {
    async fn append_cast_members(&self, rows: &[EnrichedCastRecord]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin cast_members transaction")?;
        insert_cast_members(&mut tx, rows).await?;
        tx.commit()
            .await
            .context("failed to commit cast_members")?;
        Ok(())
    }
}

async fn insert_titles(tx: &mut Transaction<'_, Postgres>, rows: &[TitleRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let show_ids: Vec<&str> = rows.iter().map(|r| r.show_id.as_str()).collect();
    let kinds: Vec<&str> = rows.iter().map(|r| r.kind.as_str()).collect();
    let titles: Vec<Option<String>> = rows.iter().map(|r| r.title.clone()).collect();
    let directors: Vec<Option<String>> = rows.iter().map(|r| r.director.clone()).collect();
    let countries: Vec<Option<String>> = rows.iter().map(|r| r.country.clone()).collect();
    let ratings: Vec<Option<String>> = rows.iter().map(|r| r.rating.clone()).collect();
    let listed_in: Vec<Option<String>> = rows.iter().map(|r| r.listed_in.clone()).collect();
    let descriptions: Vec<Option<String>> = rows.iter().map(|r| r.description.clone()).collect();

    sqlx::query(
        r"
        INSERT INTO titles (show_id, type, title, director, country, rating, listed_in, description)
        SELECT *
        FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::text[], $8::text[])
        ",
    )
    .bind(&show_ids)
    .bind(&kinds)
    .bind(&titles)
    .bind(&directors)
    .bind(&countries)
    .bind(&ratings)
    .bind(&listed_in)
    .bind(&descriptions)
    .execute(&mut **tx)
    .await
    .context("failed to insert titles")?;

    Ok(())
}

async fn insert_movies(tx: &mut Transaction<'_, Postgres>, rows: &[MovieRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let show_ids: Vec<&str> = rows.iter().map(|r| r.show_id.as_str()).collect();
    let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| r.date_added).collect();
    let years: Vec<Option<i32>> = rows.iter().map(|r| r.release_year).collect();
    let lengths: Vec<Option<i32>> = rows.iter().map(|r| r.movie_length_min).collect();

    sqlx::query(
        r"
        INSERT INTO movies (show_id, date_added, release_year, movie_length_min)
        SELECT * FROM UNNEST($1::text[], $2::date[], $3::int[], $4::int[])
        ",
    )
    .bind(&show_ids)
    .bind(&dates)
    .bind(&years)
    .bind(&lengths)
    .execute(&mut **tx)
    .await
    .context("failed to insert movies")?;

    Ok(())
}

async fn insert_tv_shows(tx: &mut Transaction<'_, Postgres>, rows: &[TvShowRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let show_ids: Vec<&str> = rows.iter().map(|r| r.show_id.as_str()).collect();
    let dates: Vec<Option<NaiveDate>> = rows.iter().map(|r| r.date_added).collect();
    let years: Vec<Option<i32>> = rows.iter().map(|r| r.release_year).collect();
    let seasons: Vec<Option<i32>> = rows.iter().map(|r| r.season_qty).collect();

    sqlx::query(
        r"
        INSERT INTO tv_shows (show_id, date_added, release_year, season_qty)
        SELECT * FROM UNNEST($1::text[], $2::date[], $3::int[], $4::int[])
        ",
    )
    .bind(&show_ids)
    .bind(&dates)
    .bind(&years)
    .bind(&seasons)
    .execute(&mut **tx)
    .await
    .context("failed to insert tv_shows")?;

    Ok(())
}

async fn insert_cast_members(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[EnrichedCastRecord],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let columns = CastMemberColumns::from_rows(rows);
    sqlx::query(
        r"
        INSERT INTO cast_members (show_id, cast_member, gender)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
        ",
    )
    .bind(&columns.show_ids)
    .bind(&columns.cast_members)
    .bind(&columns.genders)
    .execute(&mut **tx)
    .await
    .context("failed to insert cast_members")?;

    Ok(())
}
