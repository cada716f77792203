//! Metadata backfill sweep
//!
//! Episodes cataloged before a translated synopsis was published keep their
//! untranslated flag. Each sweep re-queries the metadata service for every
//! flagged episode and clears the flag once a usable synopsis appears.
//! Retries are unbounded with no backoff: a still-empty synopsis just leaves
//! the flag for the next cycle.

use anyhow::Result;
use tracing::{debug, warn};

use crate::db::CatalogStore;
use crate::services::tmdb::{Lookup, MetadataProvider};

/// Re-query every untranslated episode; returns how many were repaired.
pub async fn refresh_untranslated(
    catalog: &dyn CatalogStore,
    metadata: &dyn MetadataProvider,
) -> Result<usize> {
    let pending = catalog.list_untranslated_episodes().await?;
    debug!(pending = pending.len(), "Untranslated episodes to re-query");

    let mut updated = 0;
    for episode in pending {
        let lookup = match metadata
            .episode_detail(
                episode.series_tmdb_id,
                episode.season_number,
                episode.episode_number,
            )
            .await
        {
            Ok(lookup) => lookup,
            Err(e) => {
                // one bad lookup never stops the sweep
                warn!(episode_id = episode.id, error = %e, "Backfill lookup failed");
                continue;
            }
        };

        match lookup {
            Lookup::Found(detail) if !detail.overview.is_empty() => {
                catalog
                    .set_episode_translation(episode.id, detail.name, detail.overview)
                    .await?;
                updated += 1;
            }
            // still untranslated or still unknown upstream; next cycle
            Lookup::Found(_) | Lookup::NotFound => {
                debug!(episode_id = episode.id, "Synopsis still unavailable");
            }
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryCatalog;
    use crate::db::{EpisodeUpsert, SeasonUpsert};
    use crate::services::tmdb::{EpisodeDetail, MovieDetail, SeriesDetail};
    use async_trait::async_trait;

    struct ScriptedMetadata {
        overview: String,
    }

    #[async_trait]
    impl MetadataProvider for ScriptedMetadata {
        async fn series_by_id(&self, _series_id: i32) -> Result<Lookup<SeriesDetail>> {
            Ok(Lookup::NotFound)
        }

        async fn episode_detail(
            &self,
            _series_id: i32,
            _season_number: i32,
            episode_number: i32,
        ) -> Result<Lookup<EpisodeDetail>> {
            Ok(Lookup::Found(EpisodeDetail {
                id: 1,
                episode_number,
                name: Some("Translated title".to_string()),
                overview: self.overview.clone(),
                still_path: None,
                runtime: None,
            }))
        }

        async fn movie_detail(&self, _movie_id: i64) -> Result<Lookup<MovieDetail>> {
            Ok(Lookup::NotFound)
        }
    }

    async fn seed_untranslated(catalog: &MemoryCatalog) -> i64 {
        catalog
            .upsert_season(&SeasonUpsert {
                tmdb_id: 100,
                series_tmdb_id: 42,
                season_number: 1,
                title: None,
                poster_url: None,
            })
            .await
            .unwrap();
        catalog
            .upsert_episode(&EpisodeUpsert {
                season_tmdb_id: 100,
                episode_number: 3,
                title: None,
                overview: String::new(),
                still_url: None,
                asset_id: "asset-3".to_string(),
                translated: false,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn published_synopsis_clears_the_flag() {
        let catalog = MemoryCatalog::new();
        let id = seed_untranslated(&catalog).await;
        let metadata = ScriptedMetadata {
            overview: "드디어 공개된 줄거리".to_string(),
        };

        let updated = refresh_untranslated(&catalog, &metadata).await.unwrap();
        assert_eq!(updated, 1);

        let episodes = catalog.episodes();
        let episode = episodes.iter().find(|e| e.id == id).unwrap();
        assert!(episode.translated);
        assert_eq!(episode.overview, "드디어 공개된 줄거리");
    }

    #[tokio::test]
    async fn empty_synopsis_leaves_the_flag_without_error() {
        let catalog = MemoryCatalog::new();
        seed_untranslated(&catalog).await;
        let metadata = ScriptedMetadata {
            overview: String::new(),
        };

        let updated = refresh_untranslated(&catalog, &metadata).await.unwrap();
        assert_eq!(updated, 0);
        assert!(!catalog.episodes()[0].translated);

        // unbounded retries: a second sweep still finds it pending
        let pending = catalog.list_untranslated_episodes().await.unwrap();
        assert_eq!(pending.len(), 1);
    }
}
