//! TMDB (The Movie Database) API client for series/episode/movie metadata
//!
//! Requests a translated synopsis by passing the configured language code.
//! Lookups distinguish an explicit not-found signal (a season whose episode
//! is not registered upstream yet reports TMDB status 34) from "found, but
//! synopsis not yet published" (an empty overview in the requested
//! language); the coordinator and the backfill sweep handle the two
//! differently.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

/// Outcome of a metadata lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    /// The service explicitly reported the entity as not (yet) existing.
    NotFound,
}

/// Series detail, including its seasons.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeriesDetail {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub seasons: Vec<SeasonSummary>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SeasonSummary {
    pub id: i32,
    pub season_number: i32,
    pub name: Option<String>,
    pub poster_path: Option<String>,
}

/// Episode detail for one season/episode pair.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EpisodeDetail {
    pub id: i64,
    pub episode_number: i32,
    pub name: Option<String>,
    #[serde(default)]
    pub overview: String,
    pub still_path: Option<String>,
    pub runtime: Option<i32>,
}

/// Movie detail.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MovieDetail {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub runtime: Option<i32>,
}

/// Narrow metadata-service contract consumed by the pipeline and the
/// backfill sweep; tests substitute a scripted fake.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn series_by_id(&self, series_id: i32) -> Result<Lookup<SeriesDetail>>;

    async fn episode_detail(
        &self,
        series_id: i32,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Lookup<EpisodeDetail>>;

    async fn movie_detail(&self, movie_id: i64) -> Result<Lookup<MovieDetail>>;
}

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: Arc<RateLimitedClient>,
    base_url: String,
    api_key: String,
    language: String,
    retry_config: RetryConfig,
}

impl TmdbClient {
    pub fn new(api_key: String, base_url: String, language: String) -> Self {
        Self {
            client: Arc::new(RateLimitedClient::for_tmdb()),
            base_url,
            api_key,
            language,
            retry_config: RetryConfig::default(),
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Full image URL for a TMDB image path.
    pub fn image_url(path: Option<&str>) -> Option<String> {
        path.map(|p| format!("https://image.tmdb.org/t/p/original{}", p))
    }

    /// Fetch and deserialize one endpoint, mapping 404 to `NotFound`.
    async fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
    ) -> Result<Lookup<T>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let language = self.language.clone();

        retry_async(
            || {
                let url = url.clone();
                let client = client.clone();
                let key = api_key.clone();
                let lang = language.clone();
                async move {
                    let response = client
                        .get_with_query(&url, &[("api_key", key.as_str()), ("language", &lang)])
                        .await?;

                    // TMDB reports a missing entity (status_code 34) as 404
                    if response.status().as_u16() == 404 {
                        debug!(url = %url, "TMDB entity not found");
                        return Ok(Lookup::NotFound);
                    }
                    if response.status().as_u16() == 401 {
                        anyhow::bail!("TMDB API key is invalid");
                    }
                    if !response.status().is_success() {
                        anyhow::bail!("TMDB request failed with status {}", response.status());
                    }

                    let detail: T = response
                        .json()
                        .await
                        .context("Failed to parse TMDB response")?;
                    Ok(Lookup::Found(detail))
                }
            },
            &self.retry_config,
            operation,
        )
        .await
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn series_by_id(&self, series_id: i32) -> Result<Lookup<SeriesDetail>> {
        self.fetch(&format!("/tv/{}", series_id), "tmdb_series").await
    }

    async fn episode_detail(
        &self,
        series_id: i32,
        season_number: i32,
        episode_number: i32,
    ) -> Result<Lookup<EpisodeDetail>> {
        self.fetch(
            &format!(
                "/tv/{}/season/{}/episode/{}",
                series_id, season_number, episode_number
            ),
            "tmdb_episode",
        )
        .await
    }

    async fn movie_detail(&self, movie_id: i64) -> Result<Lookup<MovieDetail>> {
        self.fetch(&format!("/movie/{}", movie_id), "tmdb_movie").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_joins_original_size() {
        assert_eq!(
            TmdbClient::image_url(Some("/abc.jpg")).as_deref(),
            Some("https://image.tmdb.org/t/p/original/abc.jpg")
        );
        assert_eq!(TmdbClient::image_url(None), None);
    }

    #[test]
    fn episode_detail_tolerates_missing_overview() {
        let detail: EpisodeDetail = serde_json::from_value(serde_json::json!({
            "id": 5514293,
            "episode_number": 6,
            "name": "Episode 6",
            "still_path": "/still.jpg",
            "runtime": 26
        }))
        .unwrap();
        assert_eq!(detail.overview, "");
        assert_eq!(detail.episode_number, 6);
    }
}
