//! Movie repository

use anyhow::Result;
use sqlx::PgPool;

/// Input for upserting a movie row after cataloging.
#[derive(Debug, Clone)]
pub struct MovieUpsert {
    pub tmdb_id: i64,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub asset_id: String,
    pub translated: bool,
}

pub struct MovieRepository {
    pool: PgPool,
}

impl MovieRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a movie by metadata-service id, returning its row id.
    pub async fn upsert(&self, movie: &MovieUpsert) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO movies
                (tmdb_id, title, overview, poster_url, backdrop_url, asset_id, translated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                title = EXCLUDED.title,
                overview = EXCLUDED.overview,
                poster_url = EXCLUDED.poster_url,
                backdrop_url = EXCLUDED.backdrop_url,
                asset_id = EXCLUDED.asset_id,
                translated = EXCLUDED.translated,
                updated_at = now()
            RETURNING id
            "#,
        )
        .bind(movie.tmdb_id)
        .bind(&movie.title)
        .bind(&movie.overview)
        .bind(&movie.poster_url)
        .bind(&movie.backdrop_url)
        .bind(&movie.asset_id)
        .bind(movie.translated)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
