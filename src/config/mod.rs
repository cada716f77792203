//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// One configured storage volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    /// Directory files are placed into
    pub path: PathBuf,

    /// Lookup order; lower scans first
    pub priority: u32,

    /// Primary tiers hold recent content, archive tiers hold the long tail
    pub class: TierClass,
}

/// Storage tier class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierClass {
    Primary,
    Archive,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Database URL (PostgreSQL)
    pub database_url: String,

    /// Downloads directory path (transfer capability writes here)
    pub downloads_path: String,

    /// Session/state directory path (for DHT, resume data)
    pub session_path: String,

    /// Storage tiers, parsed from `path:priority:class` entries joined by `;`
    pub storage_tiers: Vec<TierConfig>,

    /// Single legacy location checked after all tiers during lookup
    pub legacy_media_path: PathBuf,

    /// ffprobe binary path
    pub ffprobe_path: String,

    /// ffmpeg binary path
    pub ffmpeg_path: String,

    /// Video codec every stored asset is normalized to
    pub target_video_codec: String,

    /// Audio codec considered already-compatible
    pub target_audio_codec: String,

    /// Codec used when audio must be re-encoded
    pub audio_encoder: String,

    /// Spoken-language tag preferred when selecting the audio stream
    pub preferred_audio_language: String,

    /// Metadata service API token
    pub tmdb_api_key: Option<String>,

    /// Metadata service base URL
    pub tmdb_base_url: String,

    /// Language code requested from the metadata service
    pub metadata_language: String,

    /// Discovery listing base URL (saved queries append to this)
    pub discovery_base_url: String,

    /// Notification webhook URL; unset disables notifications
    pub webhook_url: Option<String>,

    /// Public base URL used to build notification links; unset omits links
    pub public_base_url: Option<String>,

    /// Seconds between auto-ingest starts within one sweep
    pub auto_ingest_stagger_secs: u64,

    /// Enable DHT for torrent discovery
    pub torrent_enable_dht: bool,

    /// Listen port for incoming torrent connections (0 = random)
    pub torrent_listen_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let storage_tiers = parse_tier_list(
            &env::var("STORAGE_TIERS").unwrap_or_else(|_| {
                "./data/media:1:primary;./data/archive:2:archive".to_string()
            }),
        )
        .context("Invalid STORAGE_TIERS")?;

        Ok(Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "3003".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,

            downloads_path: env::var("DOWNLOADS_PATH")
                .unwrap_or_else(|_| "./data/downloads".to_string()),

            session_path: env::var("SESSION_PATH").unwrap_or_else(|_| "./data/session".to_string()),

            storage_tiers,

            legacy_media_path: PathBuf::from(
                env::var("LEGACY_MEDIA_PATH").unwrap_or_else(|_| "./public/video".to_string()),
            ),

            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),

            target_video_codec: env::var("TARGET_VIDEO_CODEC")
                .unwrap_or_else(|_| "hevc".to_string()),

            target_audio_codec: env::var("TARGET_AUDIO_CODEC")
                .unwrap_or_else(|_| "aac".to_string()),

            audio_encoder: env::var("AUDIO_ENCODER").unwrap_or_else(|_| "flac".to_string()),

            preferred_audio_language: env::var("PREFERRED_AUDIO_LANGUAGE")
                .unwrap_or_else(|_| "jpn".to_string()),

            tmdb_api_key: env::var("TMDB_API_KEY").ok(),

            tmdb_base_url: env::var("TMDB_BASE_URL")
                .unwrap_or_else(|_| "https://api.themoviedb.org/3".to_string()),

            metadata_language: env::var("METADATA_LANGUAGE")
                .unwrap_or_else(|_| "ko-KR".to_string()),

            discovery_base_url: env::var("DISCOVERY_BASE_URL")
                .unwrap_or_else(|_| "https://nyaa.si".to_string()),

            webhook_url: env::var("WEBHOOK_URL").ok(),

            public_base_url: env::var("PUBLIC_BASE_URL").ok(),

            auto_ingest_stagger_secs: env::var("AUTO_INGEST_STAGGER_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .unwrap_or(1800),

            torrent_enable_dht: env::var("TORRENT_ENABLE_DHT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            torrent_listen_port: env::var("TORRENT_LISTEN_PORT")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
        })
    }
}

/// Parse a `path:priority:class` tier list. Entries are separated by `;`,
/// ranking is recomputed from this list on every placement call, so editing
/// the variable and restarting is the whole migration story.
fn parse_tier_list(raw: &str) -> Result<Vec<TierConfig>> {
    let mut tiers = Vec::new();
    for entry in raw.split(';').filter(|e| !e.trim().is_empty()) {
        let parts: Vec<&str> = entry.rsplitn(3, ':').collect();
        if parts.len() != 3 {
            anyhow::bail!("tier entry must be path:priority:class, got '{}'", entry);
        }
        // rsplitn yields [class, priority, path] so Windows-style drive colons
        // stay inside the path segment
        let class = match parts[0].trim().to_ascii_lowercase().as_str() {
            "primary" => TierClass::Primary,
            "archive" => TierClass::Archive,
            other => anyhow::bail!("unknown tier class '{}'", other),
        };
        let priority: u32 = parts[1]
            .trim()
            .parse()
            .with_context(|| format!("invalid tier priority in '{}'", entry))?;
        tiers.push(TierConfig {
            path: PathBuf::from(parts[2].trim()),
            priority,
            class,
        });
    }
    if tiers.is_empty() {
        anyhow::bail!("tier list is empty");
    }
    tiers.sort_by_key(|t| t.priority);
    Ok(tiers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_tier_list() {
        let tiers = parse_tier_list("/mnt/c/media/videos:1:primary;/mnt/d/media/videos:2:archive")
            .expect("valid list");
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].path, PathBuf::from("/mnt/c/media/videos"));
        assert_eq!(tiers[0].priority, 1);
        assert_eq!(tiers[0].class, TierClass::Primary);
        assert_eq!(tiers[1].class, TierClass::Archive);
    }

    #[test]
    fn sorts_by_priority() {
        let tiers = parse_tier_list("/b:2:archive;/a:1:primary").expect("valid list");
        assert_eq!(tiers[0].path, PathBuf::from("/a"));
        assert_eq!(tiers[1].path, PathBuf::from("/b"));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_tier_list("").is_err());
        assert!(parse_tier_list("/a:1").is_err());
        assert!(parse_tier_list("/a:one:primary").is_err());
        assert!(parse_tier_list("/a:1:hot").is_err());
    }
}
