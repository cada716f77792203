//! Episode repository

use anyhow::Result;
use sqlx::PgPool;

/// Input for upserting an episode row after cataloging.
#[derive(Debug, Clone)]
pub struct EpisodeUpsert {
    pub season_tmdb_id: i32,
    /// Canonical (offset-corrected) episode number.
    pub episode_number: i32,
    pub title: Option<String>,
    pub overview: String,
    pub still_url: Option<String>,
    pub asset_id: String,
    /// Set iff the fetched synopsis was non-empty at insert time.
    pub translated: bool,
}

/// One episode still lacking a translated synopsis, with the coordinates
/// needed to re-query the metadata service.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UntranslatedEpisode {
    pub id: i64,
    pub series_tmdb_id: i32,
    pub season_number: i32,
    pub episode_number: i32,
}

pub struct EpisodeRepository {
    pool: PgPool,
}

impl EpisodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert an episode by (season, number) identity, returning its row id.
    /// A re-ingested episode replaces the stored asset reference.
    pub async fn upsert(&self, episode: &EpisodeUpsert) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO episodes
                (season_tmdb_id, episode_number, title, overview, still_url, asset_id, translated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (season_tmdb_id, episode_number) DO UPDATE SET
                title = EXCLUDED.title,
                overview = EXCLUDED.overview,
                still_url = EXCLUDED.still_url,
                asset_id = EXCLUDED.asset_id,
                translated = EXCLUDED.translated,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(episode.season_tmdb_id)
        .bind(episode.episode_number)
        .bind(&episode.title)
        .bind(&episode.overview)
        .bind(&episode.still_url)
        .bind(&episode.asset_id)
        .bind(episode.translated)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Fill in translated metadata and clear the untranslated flag.
    pub async fn set_translation(
        &self,
        episode_id: i64,
        title: Option<String>,
        overview: String,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE episodes
            SET title = COALESCE($2, title),
                overview = $3,
                translated = TRUE,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(episode_id)
        .bind(&title)
        .bind(&overview)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Episodes still flagged untranslated, joined with their season so the
    /// backfill sweep can address the metadata service directly.
    pub async fn list_untranslated(&self) -> Result<Vec<UntranslatedEpisode>> {
        let rows = sqlx::query_as::<_, UntranslatedEpisode>(
            r#"
            SELECT e.id, s.series_tmdb_id, s.season_number, e.episode_number
            FROM episodes e
            JOIN seasons s ON s.tmdb_id = e.season_tmdb_id
            WHERE e.translated = FALSE
            ORDER BY e.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
