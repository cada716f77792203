//! Tiered storage management
//!
//! Stored assets live across a set of configured volumes ("tiers"). Placement
//! always targets the tier with the most free space at call time; lookup
//! scans tiers in priority order and falls back to a single legacy location
//! left over from before tiering existed. Free space is queried live on every
//! placement call, never cached, so adding a tier is a config edit and a
//! restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sysinfo::Disks;
use tracing::{debug, info, warn};

use crate::config::TierConfig;
use crate::error::PipelineError;

/// Live free-space lookup for a path. The production implementation asks the
/// OS; tests substitute fixed numbers.
pub trait FreeSpaceProbe: Send + Sync {
    /// Available bytes on the volume holding `path`, or `None` when the
    /// volume cannot be resolved.
    fn available_bytes(&self, path: &Path) -> Option<u64>;
}

/// Probe backed by the OS disk list. Matches a path to the disk with the
/// longest mount-point prefix.
pub struct DiskFreeSpace;

impl FreeSpaceProbe for DiskFreeSpace {
    fn available_bytes(&self, path: &Path) -> Option<u64> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();
        disks
            .iter()
            .filter(|disk| canonical.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Resolves and places stored assets across the configured tiers.
#[derive(Clone)]
pub struct StorageManager {
    tiers: Vec<TierConfig>,
    legacy_dir: PathBuf,
    probe: Arc<dyn FreeSpaceProbe>,
}

impl StorageManager {
    pub fn new(tiers: Vec<TierConfig>, legacy_dir: PathBuf) -> Self {
        Self::with_probe(tiers, legacy_dir, Arc::new(DiskFreeSpace))
    }

    pub fn with_probe(
        tiers: Vec<TierConfig>,
        legacy_dir: PathBuf,
        probe: Arc<dyn FreeSpaceProbe>,
    ) -> Self {
        Self {
            tiers,
            legacy_dir,
            probe,
        }
    }

    /// Pick the writable tier with the most free space.
    ///
    /// Ensures every configured tier directory exists first; a tier whose
    /// directory cannot be created or whose volume cannot be queried is
    /// skipped for this call only. Ties keep the higher-priority tier.
    pub async fn best_writable_tier(&self) -> Result<PathBuf> {
        let mut best: Option<(PathBuf, u64)> = None;

        for tier in &self.tiers {
            if let Err(e) = tokio::fs::create_dir_all(&tier.path).await {
                warn!(
                    tier = %tier.path.display(),
                    error = %e,
                    "Storage tier unreachable, skipping"
                );
                continue;
            }
            let Some(free) = self.probe.available_bytes(&tier.path) else {
                warn!(tier = %tier.path.display(), "Could not query free space, skipping");
                continue;
            };
            debug!(tier = %tier.path.display(), free_bytes = free, "Tier free space");
            if best.as_ref().is_none_or(|(_, max)| free > *max) {
                best = Some((tier.path.clone(), free));
            }
        }

        match best {
            Some((path, free)) => {
                debug!(tier = %path.display(), free_bytes = free, "Selected storage tier");
                Ok(path)
            }
            None => Err(PipelineError::NoStorageAvailable.into()),
        }
    }

    /// Find the stored file for `id`, scanning tiers in priority order and
    /// the legacy location last.
    pub async fn locate(&self, id: &str) -> Option<PathBuf> {
        for tier in &self.tiers {
            let candidate = tier.path.join(id);
            if is_file(&candidate).await {
                return Some(candidate);
            }
        }
        let legacy = self.legacy_dir.join(id);
        if is_file(&legacy).await {
            debug!(id = %id, "Asset resolved via legacy location");
            return Some(legacy);
        }
        None
    }

    /// Copy `source` into the best tier under `id` and verify the copy by
    /// byte size before reporting success. A short copy is removed and the
    /// call fails; the source file is left exactly as it was either way.
    pub async fn place(&self, id: &str, source: &Path) -> Result<PathBuf> {
        let tier = self.best_writable_tier().await?;
        let dest = tier.join(id);

        let source_len = tokio::fs::metadata(source)
            .await
            .with_context(|| format!("Failed to stat source file {}", source.display()))?
            .len();

        tokio::fs::copy(source, &dest)
            .await
            .with_context(|| format!("Failed to copy into tier {}", tier.display()))?;

        let dest_len = tokio::fs::metadata(&dest)
            .await
            .with_context(|| format!("Failed to stat placed file {}", dest.display()))?
            .len();

        if dest_len != source_len {
            warn!(
                id = %id,
                expected = source_len,
                actual = dest_len,
                "Placed file size mismatch, removing partial copy"
            );
            if let Err(e) = tokio::fs::remove_file(&dest).await {
                warn!(path = %dest.display(), error = %e, "Failed to remove partial copy");
            }
            anyhow::bail!(
                "placement verification failed for {}: {} != {} bytes",
                id,
                dest_len,
                source_len
            );
        }

        info!(
            id = %id,
            tier = %tier.display(),
            bytes = source_len,
            "Placed asset"
        );
        Ok(dest)
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierClass;
    use std::collections::HashMap;

    struct FixedSpace(HashMap<PathBuf, u64>);

    impl FreeSpaceProbe for FixedSpace {
        fn available_bytes(&self, path: &Path) -> Option<u64> {
            self.0.get(path).copied()
        }
    }

    fn tier(path: &Path, priority: u32) -> TierConfig {
        TierConfig {
            path: path.to_path_buf(),
            priority,
            class: TierClass::Primary,
        }
    }

    #[tokio::test]
    async fn placement_targets_most_free_tier() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let probe = FixedSpace(HashMap::from([(a.clone(), 10_000), (b.clone(), 90_000)]));
        let manager = StorageManager::with_probe(
            vec![tier(&a, 1), tier(&b, 2)],
            root.path().join("legacy"),
            Arc::new(probe),
        );

        let source = root.path().join("episode.mp4");
        tokio::fs::write(&source, b"0123456789").await.unwrap();

        let placed = manager.place("asset-1", &source).await.unwrap();
        assert_eq!(placed, b.join("asset-1"));
        // the original is untouched
        assert!(source.exists());
        // and lookup resolves to the same path
        assert_eq!(manager.locate("asset-1").await, Some(placed));
    }

    #[tokio::test]
    async fn ties_keep_higher_priority_tier() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        let probe = FixedSpace(HashMap::from([(a.clone(), 50_000), (b.clone(), 50_000)]));
        let manager = StorageManager::with_probe(
            vec![tier(&a, 1), tier(&b, 2)],
            root.path().join("legacy"),
            Arc::new(probe),
        );

        assert_eq!(manager.best_writable_tier().await.unwrap(), a);
    }

    #[tokio::test]
    async fn unreachable_tier_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        // a file where the tier directory should be makes create_dir_all fail
        let blocked = root.path().join("blocked");
        tokio::fs::write(&blocked, b"not a directory").await.unwrap();
        let ok = root.path().join("ok");
        let probe = FixedSpace(HashMap::from([
            (blocked.clone(), 999_999),
            (ok.clone(), 1_000),
        ]));
        let manager = StorageManager::with_probe(
            vec![tier(&blocked, 1), tier(&ok, 2)],
            root.path().join("legacy"),
            Arc::new(probe),
        );

        assert_eq!(manager.best_writable_tier().await.unwrap(), ok);
    }

    #[tokio::test]
    async fn no_reachable_tier_is_a_storage_error() {
        let root = tempfile::tempdir().unwrap();
        let blocked = root.path().join("blocked");
        tokio::fs::write(&blocked, b"not a directory").await.unwrap();
        let manager = StorageManager::with_probe(
            vec![tier(&blocked, 1)],
            root.path().join("legacy"),
            Arc::new(FixedSpace(HashMap::new())),
        );

        let err = manager.best_writable_tier().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoStorageAvailable)
        ));
    }

    #[tokio::test]
    async fn locate_falls_back_to_legacy_location() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("a");
        tokio::fs::create_dir_all(&a).await.unwrap();
        let legacy = root.path().join("legacy");
        tokio::fs::create_dir_all(&legacy).await.unwrap();
        tokio::fs::write(legacy.join("old-asset"), b"x").await.unwrap();

        let manager = StorageManager::with_probe(
            vec![tier(&a, 1)],
            legacy.clone(),
            Arc::new(FixedSpace(HashMap::new())),
        );

        assert_eq!(
            manager.locate("old-asset").await,
            Some(legacy.join("old-asset"))
        );
        assert_eq!(manager.locate("missing").await, None);
    }
}
