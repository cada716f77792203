//! Peer-to-peer transfer capability backed by an embedded librqbit session
//!
//! The rest of the pipeline treats a transfer as an opaque long-running
//! operation: hand in a locator, get back a directory of one or more media
//! files. Progress is polled and logged every five seconds, informationally
//! only. A failed transfer discards its partial output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use librqbit::api::TorrentIdOrHash;
use librqbit::dht::PersistentDhtConfig;
use librqbit::{
    AddTorrent, AddTorrentOptions, AddTorrentResponse, Session, SessionOptions, TorrentStatsState,
};
use tracing::{info, warn};

use crate::error::PipelineError;

/// One file produced by a completed transfer.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// A completed transfer: one or more files, plus the release directory for
/// multi-file transfers (cleaned up by the coordinator after processing).
#[derive(Debug, Clone)]
pub struct FetchedRelease {
    pub name: String,
    pub files: Vec<FetchedFile>,
    pub release_dir: Option<PathBuf>,
}

/// Opaque transfer capability; tests substitute a fake that stages files on
/// disk directly.
#[async_trait]
pub trait TransferCapability: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<FetchedRelease>;
}

/// Configuration for the torrent-backed transfer client.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub download_dir: PathBuf,
    pub session_dir: PathBuf,
    pub enable_dht: bool,
    pub listen_port: u16,
}

/// Transfer capability driving a librqbit session.
pub struct TorrentTransfer {
    session: Arc<Session>,
    download_dir: PathBuf,
}

impl TorrentTransfer {
    /// Create the session. DHT state and resume data persist in the session
    /// directory across restarts.
    pub async fn new(config: TransferConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download_dir)
            .await
            .context("Failed to create download directory")?;
        tokio::fs::create_dir_all(&config.session_dir)
            .await
            .context("Failed to create session directory")?;

        let dht_config = if config.enable_dht {
            Some(PersistentDhtConfig {
                config_filename: Some(config.session_dir.join("dht.json")),
                ..Default::default()
            })
        } else {
            None
        };

        let session_opts = SessionOptions {
            disable_dht: !config.enable_dht,
            disable_dht_persistence: !config.enable_dht,
            dht_config,
            persistence: Some(librqbit::SessionPersistenceConfig::Json {
                folder: Some(config.session_dir.clone()),
            }),
            listen_port_range: if config.listen_port > 0 {
                Some(config.listen_port..config.listen_port + 1)
            } else {
                None
            },
            ..Default::default()
        };

        let session = Session::new_with_opts(config.download_dir.clone(), session_opts)
            .await
            .context("Failed to create torrent session")?;

        Ok(Self {
            session,
            download_dir: config.download_dir,
        })
    }

    /// Enumerate the files a finished torrent produced on disk.
    fn fetched_files(&self, handle: &Arc<librqbit::ManagedTorrent>, name: &str) -> Vec<FetchedFile> {
        let mut files = Vec::new();
        if let Some(metadata) = handle.metadata.load_full() {
            let single_file = metadata.file_infos.len() == 1;
            for file_info in metadata.file_infos.iter() {
                let relative = file_info.relative_filename.clone();
                let file_name = relative
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| relative.to_string_lossy().to_string());
                let path = if single_file {
                    self.download_dir.join(&relative)
                } else {
                    self.download_dir.join(name).join(&relative)
                };
                files.push(FetchedFile {
                    name: file_name,
                    path,
                    size: file_info.len,
                });
            }
        }
        files
    }
}

#[async_trait]
impl TransferCapability for TorrentTransfer {
    async fn fetch(&self, locator: &str) -> Result<FetchedRelease> {
        let add_result = self
            .session
            .add_torrent(
                AddTorrent::from_url(locator),
                Some(AddTorrentOptions {
                    overwrite: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| PipelineError::TransferFailed {
                reason: format!("failed to add transfer: {:#}", e),
            })?;

        let (id, handle) = match add_result {
            AddTorrentResponse::Added(id, handle) => (id, handle),
            AddTorrentResponse::AlreadyManaged(id, handle) => (id, handle),
            AddTorrentResponse::ListOnly(_) => {
                return Err(PipelineError::TransferFailed {
                    reason: "transfer was added in list-only mode".to_string(),
                }
                .into());
            }
        };

        let name = handle.name().unwrap_or_else(|| "unknown".to_string());
        info!(name = %name, "Transfer started");

        // poll to completion, logging progress at a 5-second cadence
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            let stats = handle.stats();
            let progress = stats.progress_bytes as f64 / stats.total_bytes.max(1) as f64;

            if matches!(stats.state, TorrentStatsState::Error) {
                warn!(name = %name, "Transfer errored, discarding partial output");
                if let Err(e) = self.session.delete(TorrentIdOrHash::Id(id), true).await {
                    warn!(name = %name, error = %e, "Failed to discard partial transfer");
                }
                return Err(PipelineError::TransferFailed {
                    reason: format!("transfer '{}' reported an error state", name),
                }
                .into());
            }

            info!(name = %name, progress = format!("{:.1}%", progress * 100.0), "Transfer progress");
            if stats.total_bytes > 0 && stats.progress_bytes >= stats.total_bytes {
                break;
            }
        }

        let files = self.fetched_files(&handle, &name);
        let release_dir = (files.len() > 1).then(|| self.download_dir.join(&name));

        // forget the torrent but keep its files for processing
        if let Err(e) = self.session.delete(TorrentIdOrHash::Id(id), false).await {
            warn!(name = %name, error = %e, "Failed to remove completed transfer from session");
        }

        info!(name = %name, files = files.len(), "Transfer complete");
        Ok(FetchedRelease {
            name,
            files,
            release_dir,
        })
    }
}
