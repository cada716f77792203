//! In-memory catalog store
//!
//! Backs tests that exercise the coordinator and the sweeps without a
//! running PostgreSQL. Mirrors the relational store's observable behavior:
//! upsert-by-identity, ledger idempotence, untranslated/auto-ingest listings.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    AutoIngestSeason, CatalogStore, EpisodeUpsert, MovieUpsert, SeasonUpsert, SeriesUpsert,
    UntranslatedEpisode,
};

#[derive(Debug, Clone)]
pub struct StoredEpisode {
    pub id: i64,
    pub season_tmdb_id: i32,
    pub episode_number: i32,
    pub title: Option<String>,
    pub overview: String,
    pub still_url: Option<String>,
    pub asset_id: String,
    pub translated: bool,
}

#[derive(Default)]
struct Inner {
    ledger: HashMap<String, Option<i64>>,
    series: HashMap<i32, SeriesUpsert>,
    seasons: HashMap<i32, SeasonUpsert>,
    episodes: Vec<StoredEpisode>,
    movies: HashMap<i64, MovieUpsert>,
    auto_ingest: Vec<AutoIngestSeason>,
    next_id: i64,
}

/// In-memory `CatalogStore` for tests.
#[derive(Default)]
pub struct MemoryCatalog {
    inner: Mutex<Inner>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a season flagged for automatic ingestion.
    pub fn seed_auto_ingest(&self, season: AutoIngestSeason) {
        self.inner.lock().auto_ingest.push(season);
    }

    pub fn episodes(&self) -> Vec<StoredEpisode> {
        self.inner.lock().episodes.clone()
    }

    pub fn movie_count(&self) -> usize {
        self.inner.lock().movies.len()
    }

    pub fn series_count(&self) -> usize {
        self.inner.lock().series.len()
    }

    pub fn linked_episode(&self, content_hash: &str) -> Option<i64> {
        self.inner.lock().ledger.get(content_hash).copied().flatten()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn is_release_seen(&self, content_hash: &str) -> Result<bool> {
        Ok(self.inner.lock().ledger.contains_key(content_hash))
    }

    async fn record_release(&self, content_hash: &str) -> Result<()> {
        self.inner
            .lock()
            .ledger
            .entry(content_hash.to_string())
            .or_insert(None);
        Ok(())
    }

    async fn link_release(&self, content_hash: &str, episode_id: i64) -> Result<()> {
        if let Some(link) = self.inner.lock().ledger.get_mut(content_hash) {
            *link = Some(episode_id);
        }
        Ok(())
    }

    async fn upsert_series(&self, series: &SeriesUpsert) -> Result<()> {
        self.inner
            .lock()
            .series
            .insert(series.tmdb_id, series.clone());
        Ok(())
    }

    async fn upsert_season(&self, season: &SeasonUpsert) -> Result<()> {
        self.inner
            .lock()
            .seasons
            .insert(season.tmdb_id, season.clone());
        Ok(())
    }

    async fn upsert_episode(&self, episode: &EpisodeUpsert) -> Result<i64> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.episodes.iter_mut().find(|e| {
            e.season_tmdb_id == episode.season_tmdb_id
                && e.episode_number == episode.episode_number
        }) {
            existing.title = episode.title.clone();
            existing.overview = episode.overview.clone();
            existing.still_url = episode.still_url.clone();
            existing.asset_id = episode.asset_id.clone();
            existing.translated = episode.translated;
            return Ok(existing.id);
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.episodes.push(StoredEpisode {
            id,
            season_tmdb_id: episode.season_tmdb_id,
            episode_number: episode.episode_number,
            title: episode.title.clone(),
            overview: episode.overview.clone(),
            still_url: episode.still_url.clone(),
            asset_id: episode.asset_id.clone(),
            translated: episode.translated,
        });
        Ok(id)
    }

    async fn upsert_movie(&self, movie: &MovieUpsert) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.movies.insert(movie.tmdb_id, movie.clone());
        inner.next_id += 1;
        Ok(inner.next_id)
    }

    async fn set_episode_translation(
        &self,
        episode_id: i64,
        title: Option<String>,
        overview: String,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(episode) = inner.episodes.iter_mut().find(|e| e.id == episode_id) {
            if let Some(title) = title {
                episode.title = Some(title);
            }
            episode.overview = overview;
            episode.translated = true;
        }
        Ok(())
    }

    async fn list_untranslated_episodes(&self) -> Result<Vec<UntranslatedEpisode>> {
        let inner = self.inner.lock();
        Ok(inner
            .episodes
            .iter()
            .filter(|e| !e.translated)
            .map(|e| {
                let season = inner.seasons.get(&e.season_tmdb_id);
                UntranslatedEpisode {
                    id: e.id,
                    series_tmdb_id: season.map(|s| s.series_tmdb_id).unwrap_or_default(),
                    season_number: season.map(|s| s.season_number).unwrap_or_default(),
                    episode_number: e.episode_number,
                }
            })
            .collect())
    }

    async fn list_auto_ingest_seasons(&self) -> Result<Vec<AutoIngestSeason>> {
        Ok(self.inner.lock().auto_ingest.clone())
    }
}
