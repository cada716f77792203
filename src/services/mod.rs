//! External service integrations and pipeline stages

pub mod discovery;
pub mod ffmpeg;
pub mod filename_parser;
pub mod pipeline;
pub mod rate_limiter;
pub mod storage;
pub mod tmdb;
pub mod transcode;
pub mod transfer;
pub mod webhook;

pub use discovery::{DiscoveryClient, ReleaseSource};
pub use ffmpeg::{MediaProber, ProbedStream, StreamInfo};
pub use pipeline::{
    Coordinator, OffsetCorrection, ReleaseOutcome, ReleaseRequest, ReleaseTarget, SeasonContext,
};
pub use storage::{DiskFreeSpace, FreeSpaceProbe, StorageManager};
pub use tmdb::{Lookup, MetadataProvider, TmdbClient};
pub use transcode::{CodecTargets, MediaNormalizer, TranscodeEngine, TranscodeOptions};
pub use transfer::{FetchedFile, FetchedRelease, TorrentTransfer, TransferCapability, TransferConfig};
pub use webhook::{CatalogNotification, DiscordWebhook, NoopNotifier, NotificationSink};
