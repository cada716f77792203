//! Database connection and catalog operations

pub mod episodes;
pub mod ledger;
pub mod memory;
pub mod movies;
pub mod series;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::warn;

pub use episodes::{EpisodeRepository, EpisodeUpsert, UntranslatedEpisode};
pub use ledger::LedgerRepository;
pub use memory::MemoryCatalog;
pub use movies::{MovieRepository, MovieUpsert};
pub use series::{
    AutoIngestSeason, OffsetDirection, SeasonUpsert, SeriesRepository, SeriesUpsert,
};

/// Catalog operations the pipeline and the scheduled sweeps depend on. The
/// store only ever upserts; rows are never deleted here.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Whether a release with this content hash has already been attempted.
    async fn is_release_seen(&self, content_hash: &str) -> Result<bool>;

    /// Record a release as attempted. Idempotent; never rolled back.
    async fn record_release(&self, content_hash: &str) -> Result<()>;

    /// Link a ledger entry to the episode row it produced.
    async fn link_release(&self, content_hash: &str, episode_id: i64) -> Result<()>;

    async fn upsert_series(&self, series: &SeriesUpsert) -> Result<()>;

    async fn upsert_season(&self, season: &SeasonUpsert) -> Result<()>;

    /// Upsert an episode row, returning its id.
    async fn upsert_episode(&self, episode: &EpisodeUpsert) -> Result<i64>;

    /// Upsert a movie row, returning its id.
    async fn upsert_movie(&self, movie: &MovieUpsert) -> Result<i64>;

    /// Fill in a translated title/synopsis and clear the untranslated flag.
    async fn set_episode_translation(
        &self,
        episode_id: i64,
        title: Option<String>,
        overview: String,
    ) -> Result<()>;

    /// Episodes still flagged as lacking a translated synopsis.
    async fn list_untranslated_episodes(&self) -> Result<Vec<UntranslatedEpisode>>;

    /// Seasons flagged for automatic ingestion with a saved search query.
    async fn list_auto_ingest_seasons(&self) -> Result<Vec<AutoIngestSeason>>;
}

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn get_max_connections() -> u32 {
        std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10)
    }

    /// Create a new database connection pool
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(Self::get_max_connections())
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a new database connection pool with retry logic.
    /// Retries every `retry_interval` until successful.
    pub async fn connect_with_retry(url: &str, retry_interval: std::time::Duration) -> Self {
        let max_connections = Self::get_max_connections();
        loop {
            match PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(std::time::Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    return Self { pool };
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_secs = retry_interval.as_secs(),
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a series repository
    pub fn series(&self) -> SeriesRepository {
        SeriesRepository::new(self.pool.clone())
    }

    /// Get an episode repository
    pub fn episodes(&self) -> EpisodeRepository {
        EpisodeRepository::new(self.pool.clone())
    }

    /// Get a movie repository
    pub fn movies(&self) -> MovieRepository {
        MovieRepository::new(self.pool.clone())
    }

    /// Get a download-ledger repository
    pub fn ledger(&self) -> LedgerRepository {
        LedgerRepository::new(self.pool.clone())
    }

    /// Create the schema if it does not exist. Every statement is idempotent,
    /// so running this on every startup is safe.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS series (
                tmdb_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                overview TEXT,
                poster_url TEXT,
                backdrop_url TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seasons (
                tmdb_id INTEGER PRIMARY KEY,
                series_tmdb_id INTEGER NOT NULL REFERENCES series(tmdb_id),
                season_number INTEGER NOT NULL,
                title TEXT,
                poster_url TEXT,
                auto_ingest BOOLEAN NOT NULL DEFAULT FALSE,
                search_query TEXT,
                episode_offset INTEGER NOT NULL DEFAULT 0,
                offset_direction TEXT NOT NULL DEFAULT 'subtract',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS episodes (
                id BIGSERIAL PRIMARY KEY,
                season_tmdb_id INTEGER NOT NULL REFERENCES seasons(tmdb_id),
                episode_number INTEGER NOT NULL,
                title TEXT,
                overview TEXT,
                still_url TEXT,
                asset_id TEXT NOT NULL,
                translated BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (season_tmdb_id, episode_number)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS movies (
                id BIGSERIAL PRIMARY KEY,
                tmdb_id BIGINT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                overview TEXT,
                poster_url TEXT,
                backdrop_url TEXT,
                asset_id TEXT NOT NULL,
                translated BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS download_ledger (
                content_hash TEXT PRIMARY KEY,
                linked_episode_id BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for Database {
    async fn is_release_seen(&self, content_hash: &str) -> Result<bool> {
        self.ledger().is_seen(content_hash).await
    }

    async fn record_release(&self, content_hash: &str) -> Result<()> {
        self.ledger().record(content_hash).await
    }

    async fn link_release(&self, content_hash: &str, episode_id: i64) -> Result<()> {
        self.ledger().link(content_hash, episode_id).await
    }

    async fn upsert_series(&self, series: &SeriesUpsert) -> Result<()> {
        self.series().upsert(series).await
    }

    async fn upsert_season(&self, season: &SeasonUpsert) -> Result<()> {
        self.series().upsert_season(season).await
    }

    async fn upsert_episode(&self, episode: &EpisodeUpsert) -> Result<i64> {
        self.episodes().upsert(episode).await
    }

    async fn upsert_movie(&self, movie: &MovieUpsert) -> Result<i64> {
        self.movies().upsert(movie).await
    }

    async fn set_episode_translation(
        &self,
        episode_id: i64,
        title: Option<String>,
        overview: String,
    ) -> Result<()> {
        self.episodes()
            .set_translation(episode_id, title, overview)
            .await
    }

    async fn list_untranslated_episodes(&self) -> Result<Vec<UntranslatedEpisode>> {
        self.episodes().list_untranslated().await
    }

    async fn list_auto_ingest_seasons(&self) -> Result<Vec<AutoIngestSeason>> {
        self.series().list_auto_ingest_seasons().await
    }
}
