//! Series and season repository

use anyhow::Result;
use sqlx::PgPool;
use tracing::warn;

/// Direction the stored episode-number offset is applied in when reconciling
/// on-disk numbering with the metadata service's canonical numbering.
///
/// `Subtract` is the production default: when a season's specials are counted
/// upstream but excluded from on-disk numbering, the on-disk numbers run
/// ahead of canonical numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetDirection {
    Add,
    #[default]
    Subtract,
}

impl OffsetDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetDirection::Add => "add",
            OffsetDirection::Subtract => "subtract",
        }
    }

    /// Parse the stored column value. An unrecognized value falls back to the
    /// default direction with a warning rather than failing the sweep.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "add" => OffsetDirection::Add,
            "subtract" => OffsetDirection::Subtract,
            other => {
                warn!(value = %other, "Unknown offset direction, using subtract");
                OffsetDirection::Subtract
            }
        }
    }
}

/// Input for upserting a series from a metadata payload
#[derive(Debug, Clone)]
pub struct SeriesUpsert {
    pub tmdb_id: i32,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
}

/// Input for upserting a season from a metadata payload
#[derive(Debug, Clone)]
pub struct SeasonUpsert {
    pub tmdb_id: i32,
    pub series_tmdb_id: i32,
    pub season_number: i32,
    pub title: Option<String>,
    pub poster_url: Option<String>,
}

/// One season flagged for automatic ingestion.
#[derive(Debug, Clone)]
pub struct AutoIngestSeason {
    pub season_tmdb_id: i32,
    pub series_tmdb_id: i32,
    pub season_number: i32,
    pub search_query: String,
    pub episode_offset: i32,
    pub offset_direction: OffsetDirection,
}

#[derive(sqlx::FromRow)]
struct AutoIngestRow {
    tmdb_id: i32,
    series_tmdb_id: i32,
    season_number: i32,
    search_query: String,
    episode_offset: i32,
    offset_direction: String,
}

pub struct SeriesRepository {
    pool: PgPool,
}

impl SeriesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a series row. Identity is the metadata-service id; the title
    /// and artwork refresh on conflict, rows are never deleted.
    pub async fn upsert(&self, series: &SeriesUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO series (tmdb_id, title, overview, poster_url, backdrop_url)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                title = EXCLUDED.title,
                overview = EXCLUDED.overview,
                poster_url = EXCLUDED.poster_url,
                backdrop_url = EXCLUDED.backdrop_url,
                updated_at = now()
            "#,
        )
        .bind(series.tmdb_id)
        .bind(&series.title)
        .bind(&series.overview)
        .bind(&series.poster_url)
        .bind(&series.backdrop_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert a season row. Ingestion flags and the stored offset are
    /// operator-managed and deliberately left untouched on conflict.
    pub async fn upsert_season(&self, season: &SeasonUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO seasons (tmdb_id, series_tmdb_id, season_number, title, poster_url)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tmdb_id) DO UPDATE SET
                title = EXCLUDED.title,
                poster_url = EXCLUDED.poster_url,
                updated_at = now()
            "#,
        )
        .bind(season.tmdb_id)
        .bind(season.series_tmdb_id)
        .bind(season.season_number)
        .bind(&season.title)
        .bind(&season.poster_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Seasons flagged for automatic ingestion that carry a saved query.
    pub async fn list_auto_ingest_seasons(&self) -> Result<Vec<AutoIngestSeason>> {
        let rows = sqlx::query_as::<_, AutoIngestRow>(
            r#"
            SELECT tmdb_id, series_tmdb_id, season_number, search_query,
                   episode_offset, offset_direction
            FROM seasons
            WHERE auto_ingest = TRUE AND search_query IS NOT NULL
            ORDER BY tmdb_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AutoIngestSeason {
                season_tmdb_id: row.tmdb_id,
                series_tmdb_id: row.series_tmdb_id,
                season_number: row.season_number,
                search_query: row.search_query,
                episode_offset: row.episode_offset,
                offset_direction: OffsetDirection::parse(&row.offset_direction),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_direction_round_trips() {
        assert_eq!(OffsetDirection::parse("add"), OffsetDirection::Add);
        assert_eq!(OffsetDirection::parse("subtract"), OffsetDirection::Subtract);
        assert_eq!(OffsetDirection::Add.as_str(), "add");
        assert_eq!(OffsetDirection::Subtract.as_str(), "subtract");
    }

    #[test]
    fn unknown_direction_defaults_to_subtract() {
        assert_eq!(OffsetDirection::parse("sideways"), OffsetDirection::Subtract);
    }
}
