//! Auto-ingest sweep
//!
//! Walks seasons flagged for automatic ingestion, re-runs their saved
//! discovery query, filters candidates through the ledger, and schedules the
//! accepted releases with staggered start times so the discovery source and
//! the transfer capability are never hit in a burst.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::JobContext;
use crate::services::pipeline::{
    OffsetCorrection, ReleaseRequest, ReleaseTarget, SeasonContext,
};

/// Run one sweep; returns how many releases were scheduled.
pub async fn run(context: Arc<JobContext>) -> Result<usize> {
    let seasons = context.catalog.list_auto_ingest_seasons().await?;
    debug!(seasons = seasons.len(), "Seasons flagged for auto-ingest");

    let mut scheduled: u32 = 0;
    for season in seasons {
        let candidates = match context.discovery.search(&season.search_query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                // one query failure never stops the sweep
                warn!(
                    query = %season.search_query,
                    error = %e,
                    "Discovery query failed"
                );
                continue;
            }
        };

        for locator in candidates {
            if context.coordinator.is_seen(&locator).await? {
                continue;
            }

            let request = ReleaseRequest {
                locator,
                target: ReleaseTarget::Episode(SeasonContext {
                    season_tmdb_id: season.season_tmdb_id,
                    series_tmdb_id: season.series_tmdb_id,
                    season_number: season.season_number,
                    offset: OffsetCorrection {
                        amount: season.episode_offset,
                        direction: season.offset_direction,
                    },
                }),
            };

            let delay = context.stagger * scheduled;
            scheduled += 1;
            info!(
                season = season.season_tmdb_id,
                delay_secs = delay.as_secs(),
                "Scheduling release ingest"
            );
            let coordinator = context.coordinator.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                match coordinator.ingest_release(request).await {
                    Ok(outcome) => debug!(?outcome, "Auto-ingest release finished"),
                    Err(e) => error!("Auto-ingest release error: {:#}", e),
                }
            });
        }
    }
    Ok(scheduled as usize)
}
