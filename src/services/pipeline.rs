//! Acquisition and dedup coordinator
//!
//! Drives one release through its lifecycle: dedup check against the
//! download ledger, transfer to completion, then a per-file fan-out of
//! identifier extraction, metadata lookup, normalization, and cataloging.
//! The ledger entry is written the moment a release is accepted, before the
//! transfer completes, so overlapping discovery passes cannot start the same
//! download twice. It is never rolled back: a permanently failing release is
//! not retried automatically.
//!
//! Failure isolation follows the release shape. A single-file release
//! aborts whole on any per-file failure; inside a multi-file release each
//! file is its own unit of work and one file's failure never blocks its
//! siblings.

use std::sync::Arc;

use anyhow::Result;
use base64::Engine;
use futures::future::join_all;
use tracing::{error, info, warn};

use crate::db::{CatalogStore, EpisodeUpsert, MovieUpsert, OffsetDirection, SeasonUpsert, SeriesUpsert};
use crate::error::PipelineError;
use crate::services::filename_parser::extract_episode_number;
use crate::services::tmdb::{Lookup, MetadataProvider, SeriesDetail, TmdbClient};
use crate::services::transcode::MediaNormalizer;
use crate::services::transfer::{FetchedFile, TransferCapability};
use crate::services::webhook::{CatalogNotification, NotificationSink};

/// Stable ledger digest of a release locator. Hashing bounds ledger row size
/// regardless of how long tracker-laden locators get.
pub fn locator_digest(locator: &str) -> String {
    let digest = md5::compute(locator.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(digest.0)
}

/// Whether a produced file is a processing candidate: a media container by
/// extension, and not a special/extra (`[SP` marker).
pub fn is_media_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let is_container = lower.ends_with(".mkv") || lower.ends_with(".mp4");
    is_container && !name.contains("[SP")
}

/// Per-season correction reconciling on-disk episode numbers with the
/// metadata service's canonical numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetCorrection {
    pub amount: i32,
    pub direction: OffsetDirection,
}

impl OffsetCorrection {
    pub fn none() -> Self {
        Self {
            amount: 0,
            direction: OffsetDirection::default(),
        }
    }

    /// Canonical episode number for a parsed on-disk number. Always applied
    /// before any metadata query.
    pub fn apply(&self, parsed: u32) -> i32 {
        let parsed = parsed as i32;
        match self.direction {
            OffsetDirection::Add => parsed + self.amount,
            OffsetDirection::Subtract => parsed - self.amount,
        }
    }
}

/// The season a release's episodes belong to.
#[derive(Debug, Clone)]
pub struct SeasonContext {
    pub season_tmdb_id: i32,
    pub series_tmdb_id: i32,
    pub season_number: i32,
    pub offset: OffsetCorrection,
}

/// What the release is expected to contain.
#[derive(Debug, Clone)]
pub enum ReleaseTarget {
    Episode(SeasonContext),
    Movie { tmdb_id: i64 },
}

/// One release handed to the coordinator.
#[derive(Debug, Clone)]
pub struct ReleaseRequest {
    pub locator: String,
    pub target: ReleaseTarget,
}

/// Terminal state of one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Ledger hit; no transfer was started.
    Rejected,
    /// The release as a whole failed before anything was cataloged.
    Aborted { reason: String },
    /// At least one file was cataloged; skipped files are logged for
    /// manual review.
    Cataloged { cataloged: usize, skipped: usize },
}

/// Wires the dedup ledger, transfer capability, metadata service,
/// normalization engine, and notification sink into one release pipeline.
pub struct Coordinator {
    catalog: Arc<dyn CatalogStore>,
    transfer: Arc<dyn TransferCapability>,
    metadata: Arc<dyn MetadataProvider>,
    normalizer: Arc<dyn MediaNormalizer>,
    notifier: Arc<dyn NotificationSink>,
    public_base_url: Option<String>,
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        transfer: Arc<dyn TransferCapability>,
        metadata: Arc<dyn MetadataProvider>,
        normalizer: Arc<dyn MediaNormalizer>,
        notifier: Arc<dyn NotificationSink>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            catalog,
            transfer,
            metadata,
            normalizer,
            notifier,
            public_base_url,
        }
    }

    /// Check a locator against the ledger without accepting it.
    pub async fn is_seen(&self, locator: &str) -> Result<bool> {
        self.catalog.is_release_seen(&locator_digest(locator)).await
    }

    /// Drive one release to a terminal state.
    pub async fn ingest_release(&self, request: ReleaseRequest) -> Result<ReleaseOutcome> {
        let digest = locator_digest(&request.locator);
        if self.catalog.is_release_seen(&digest).await? {
            info!(digest = %digest, "Release already in ledger, rejecting");
            return Ok(ReleaseOutcome::Rejected);
        }
        // accepted: write the ledger entry before the transfer starts
        self.catalog.record_release(&digest).await?;

        let release = match self.transfer.fetch(&request.locator).await {
            Ok(release) => release,
            Err(e) => {
                warn!(digest = %digest, error = %e, "Transfer failed, aborting release");
                return Ok(ReleaseOutcome::Aborted {
                    reason: format!("transfer failed: {:#}", e),
                });
            }
        };

        let candidates: Vec<FetchedFile> = release
            .files
            .iter()
            .filter(|f| {
                let keep = is_media_file(&f.name);
                if !keep {
                    info!(file = %f.name, "Skipping non-candidate file");
                }
                keep
            })
            .cloned()
            .collect();

        if candidates.is_empty() {
            warn!(digest = %digest, release = %release.name, "No media files in release");
            return Ok(ReleaseOutcome::Aborted {
                reason: "release contains no media files".to_string(),
            });
        }

        let outcome = match &request.target {
            ReleaseTarget::Episode(context) => {
                self.ingest_episodes(&digest, context, &candidates).await?
            }
            ReleaseTarget::Movie { tmdb_id } => {
                self.ingest_movie(&digest, *tmdb_id, &candidates).await?
            }
        };

        // a fully processed multi-file release leaves an empty directory
        if let (Some(dir), ReleaseOutcome::Cataloged { skipped: 0, .. }) =
            (&release.release_dir, &outcome)
        {
            if let Err(e) = tokio::fs::remove_dir_all(dir).await {
                warn!(dir = %dir.display(), error = %e, "Failed to remove release directory");
            }
        }

        Ok(outcome)
    }

    /// Upsert the series and season rows for an accepted episode release,
    /// returning the series title for notifications.
    async fn sync_series(&self, context: &SeasonContext) -> Result<Option<SeriesDetail>> {
        match self.metadata.series_by_id(context.series_tmdb_id).await? {
            Lookup::Found(series) => {
                self.catalog
                    .upsert_series(&SeriesUpsert {
                        tmdb_id: series.id,
                        title: series.name.clone(),
                        overview: series.overview.clone(),
                        poster_url: TmdbClient::image_url(series.poster_path.as_deref()),
                        backdrop_url: TmdbClient::image_url(series.backdrop_path.as_deref()),
                    })
                    .await?;
                let season_title = series
                    .seasons
                    .iter()
                    .find(|s| s.id == context.season_tmdb_id)
                    .and_then(|s| s.name.clone());
                let season_poster = series
                    .seasons
                    .iter()
                    .find(|s| s.id == context.season_tmdb_id)
                    .and_then(|s| s.poster_path.as_deref().map(str::to_string));
                self.catalog
                    .upsert_season(&SeasonUpsert {
                        tmdb_id: context.season_tmdb_id,
                        series_tmdb_id: context.series_tmdb_id,
                        season_number: context.season_number,
                        title: season_title,
                        poster_url: TmdbClient::image_url(season_poster.as_deref()),
                    })
                    .await?;
                Ok(Some(series))
            }
            Lookup::NotFound => Ok(None),
        }
    }

    async fn ingest_episodes(
        &self,
        digest: &str,
        context: &SeasonContext,
        candidates: &[FetchedFile],
    ) -> Result<ReleaseOutcome> {
        let Some(series) = self.sync_series(context).await? else {
            warn!(
                series_id = context.series_tmdb_id,
                "Series unknown to the metadata service, aborting release"
            );
            return Ok(ReleaseOutcome::Aborted {
                reason: format!("series {} not found upstream", context.series_tmdb_id),
            });
        };

        let single_file = candidates.len() == 1;
        let results = join_all(candidates.iter().map(|file| {
            let series_title = series.name.clone();
            async move {
                let result = self
                    .process_episode_file(digest, context, &series_title, file)
                    .await;
                (file.name.clone(), result)
            }
        }))
        .await;

        let mut cataloged = 0;
        let mut skipped = 0;
        let mut first_failure = None;
        for (file_name, result) in results {
            match result {
                Ok(()) => cataloged += 1,
                Err(e) => {
                    skipped += 1;
                    error!(
                        file = %file_name,
                        digest = %digest,
                        error = %format!("{:#}", e),
                        "Episode file failed, flagged for manual review"
                    );
                    if first_failure.is_none() {
                        first_failure = Some(format!("{}: {:#}", file_name, e));
                    }
                }
            }
        }

        // a lone file is the whole release; its failure aborts everything
        if single_file && cataloged == 0 {
            return Ok(ReleaseOutcome::Aborted {
                reason: first_failure.unwrap_or_else(|| "episode file failed".to_string()),
            });
        }
        Ok(ReleaseOutcome::Cataloged { cataloged, skipped })
    }

    /// One file's strictly sequential stage pipeline: extract, fetch
    /// metadata, normalize, catalog, notify.
    async fn process_episode_file(
        &self,
        digest: &str,
        context: &SeasonContext,
        series_title: &str,
        file: &FetchedFile,
    ) -> Result<()> {
        let parsed = extract_episode_number(&file.name).ok_or_else(|| {
            PipelineError::UnparsableFilename {
                name: file.name.clone(),
            }
        })?;
        let episode_number = context.offset.apply(parsed);

        let detail = match self
            .metadata
            .episode_detail(context.series_tmdb_id, context.season_number, episode_number)
            .await?
        {
            Lookup::Found(detail) => detail,
            Lookup::NotFound => {
                // not yet registered upstream; never catalog blank fields
                return Err(PipelineError::MetadataUnavailable {
                    entity: format!(
                        "series {} s{}e{}",
                        context.series_tmdb_id, context.season_number, episode_number
                    ),
                }
                .into());
            }
        };
        // a missing translation still catalogs; the backfill sweep repairs it
        let translated = !detail.overview.is_empty();

        let asset_id = self.normalizer.normalize(&file.path).await?;

        let episode_id = self
            .catalog
            .upsert_episode(&EpisodeUpsert {
                season_tmdb_id: context.season_tmdb_id,
                episode_number,
                title: detail.name.clone(),
                overview: detail.overview.clone(),
                still_url: TmdbClient::image_url(detail.still_path.as_deref()),
                asset_id,
                translated,
            })
            .await?;
        self.catalog.link_release(digest, episode_id).await?;

        info!(
            series = %series_title,
            episode = episode_number,
            translated,
            "Episode cataloged"
        );
        self.notifier
            .notify(CatalogNotification {
                title: format!("{} E{:02}", series_title, episode_number),
                image_url: TmdbClient::image_url(detail.still_path.as_deref()),
                link: self
                    .public_base_url
                    .as_ref()
                    .map(|base| format!("{}/episodes/{}", base, episode_id)),
            })
            .await;
        Ok(())
    }

    async fn ingest_movie(
        &self,
        digest: &str,
        tmdb_id: i64,
        candidates: &[FetchedFile],
    ) -> Result<ReleaseOutcome> {
        let detail = match self.metadata.movie_detail(tmdb_id).await? {
            Lookup::Found(detail) => detail,
            Lookup::NotFound => {
                warn!(movie_id = tmdb_id, "Movie unknown to the metadata service");
                return Ok(ReleaseOutcome::Aborted {
                    reason: format!("movie {} not found upstream", tmdb_id),
                });
            }
        };

        // a movie release carries exactly one feature file; extra candidates
        // are surplus (samples, repacks) and skipped
        let Some(file) = candidates.first() else {
            return Ok(ReleaseOutcome::Aborted {
                reason: "no movie file".to_string(),
            });
        };
        let surplus = candidates.len() - 1;
        for extra in &candidates[1..] {
            info!(file = %extra.name, "Skipping surplus movie-release file");
        }

        let asset_id = match self.normalizer.normalize(&file.path).await {
            Ok(id) => id,
            Err(e) => {
                error!(
                    file = %file.name,
                    digest = %digest,
                    error = %format!("{:#}", e),
                    "Movie file failed, flagged for manual review"
                );
                return Ok(ReleaseOutcome::Aborted {
                    reason: format!("{}: {:#}", file.name, e),
                });
            }
        };

        let translated = !detail.overview.is_empty();
        self.catalog
            .upsert_movie(&MovieUpsert {
                tmdb_id: detail.id,
                title: detail.title.clone(),
                overview: detail.overview.clone(),
                poster_url: TmdbClient::image_url(detail.poster_path.as_deref()),
                backdrop_url: TmdbClient::image_url(detail.backdrop_path.as_deref()),
                asset_id,
                translated,
            })
            .await?;

        info!(title = %detail.title, translated, "Movie cataloged");
        self.notifier
            .notify(CatalogNotification {
                title: detail.title.clone(),
                image_url: TmdbClient::image_url(detail.poster_path.as_deref()),
                link: self
                    .public_base_url
                    .as_ref()
                    .map(|base| format!("{}/movies/{}", base, detail.id)),
            })
            .await;
        Ok(ReleaseOutcome::Cataloged {
            cataloged: 1,
            skipped: surplus,
        })
    }
}
