//! Process entrypoint: config, database, services, jobs, HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use curator::api::{self, ApiState};
use curator::config::Config;
use curator::db::{CatalogStore, Database};
use curator::jobs::{self, JobContext};
use curator::services::discovery::{DiscoveryClient, ReleaseSource};
use curator::services::pipeline::Coordinator;
use curator::services::storage::StorageManager;
use curator::services::tmdb::{MetadataProvider, TmdbClient};
use curator::services::transcode::{CodecTargets, MediaNormalizer, TranscodeEngine};
use curator::services::transfer::{TorrentTransfer, TransferCapability, TransferConfig};
use curator::services::webhook::{DiscordWebhook, NoopNotifier, NotificationSink};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curator=debug,tower_http=debug,librqbit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let db = Database::connect_with_retry(&config.database_url, Duration::from_secs(5)).await;
    db.init_schema().await?;
    info!("Database ready");
    let catalog: Arc<dyn CatalogStore> = Arc::new(db);

    let storage = StorageManager::new(
        config.storage_tiers.clone(),
        config.legacy_media_path.clone(),
    );

    let transfer: Arc<dyn TransferCapability> = Arc::new(
        TorrentTransfer::new(TransferConfig {
            download_dir: config.downloads_path.clone().into(),
            session_dir: config.session_path.clone().into(),
            enable_dht: config.torrent_enable_dht,
            listen_port: config.torrent_listen_port,
        })
        .await?,
    );

    let metadata: Arc<dyn MetadataProvider> = Arc::new(TmdbClient::new(
        config.tmdb_api_key.clone().unwrap_or_default(),
        config.tmdb_base_url.clone(),
        config.metadata_language.clone(),
    ));

    let normalizer: Arc<dyn MediaNormalizer> = Arc::new(TranscodeEngine::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
        CodecTargets {
            video_codec: config.target_video_codec.clone(),
            audio_codec: config.target_audio_codec.clone(),
            audio_encoder: config.audio_encoder.clone(),
            audio_language: config.preferred_audio_language.clone(),
        },
        storage.clone(),
    ));

    let notifier: Arc<dyn NotificationSink> = match &config.webhook_url {
        Some(url) => Arc::new(DiscordWebhook::new(url.clone())),
        None => Arc::new(NoopNotifier),
    };

    let discovery: Arc<dyn ReleaseSource> =
        Arc::new(DiscoveryClient::new(config.discovery_base_url.clone()));

    let coordinator = Arc::new(Coordinator::new(
        catalog.clone(),
        transfer,
        metadata.clone(),
        normalizer,
        notifier,
        config.public_base_url.clone(),
    ));

    let job_context = Arc::new(JobContext {
        catalog,
        metadata,
        discovery,
        coordinator,
        stagger: Duration::from_secs(config.auto_ingest_stagger_secs),
    });

    // both sweeps run once at startup, then on the scheduler's timer
    let startup_context = job_context.clone();
    tokio::spawn(async move {
        jobs::run_sweeps(startup_context).await;
    });
    let _scheduler = jobs::start_scheduler(job_context).await?;

    let app = api::router(ApiState { storage });
    let addr = format!("0.0.0.0:{}", config.port);
    match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            info!(addr = %addr, "HTTP server listening");
            axum::serve(listener, app).await?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            // another instance holds the port; keep the pipeline jobs running
            warn!(addr = %addr, "Port already bound, continuing without an HTTP surface");
            std::future::pending::<()>().await;
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
