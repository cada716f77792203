//! Transcode decision engine and executor
//!
//! `decide` maps a probed stream layout onto the cheapest ffmpeg operation
//! that yields a streamable file: copy whatever already matches the target
//! codecs, re-encode only what does not. `TranscodeEngine` runs the chosen
//! operation as a subprocess, places the verified output through the storage
//! manager, and only then deletes the original download.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::services::ffmpeg::{MediaProber, StreamInfo};
use crate::services::storage::StorageManager;

/// Codec targets every stored asset is normalized to.
#[derive(Debug, Clone)]
pub struct CodecTargets {
    /// Video codec considered already-streamable (and encoder for the rest)
    pub video_codec: String,

    /// Audio codec considered already-streamable
    pub audio_codec: String,

    /// Codec used when audio must be re-encoded
    pub audio_encoder: String,

    /// Spoken-language tag preferred when selecting the audio stream
    pub audio_language: String,
}

/// What happens to one stream kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    /// Stream already matches the target, copy it through
    Copy,
    /// Re-encode into the target codec
    Encode,
}

/// The selected minimal re-encode operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub video: StreamAction,
    pub audio: StreamAction,

    /// Absolute index of the video stream to carry over
    video_map: StreamMap,

    /// Absolute index of the audio stream to carry over
    audio_map: StreamMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamMap {
    /// Map a specific container stream by absolute index
    Index(usize),
    /// Map the first stream of the kind
    First(&'static str),
}

impl StreamMap {
    fn specifier(&self) -> String {
        match self {
            StreamMap::Index(i) => format!("0:{}", i),
            StreamMap::First(kind) => format!("0:{}:0", kind),
        }
    }
}

/// Pick the cheapest operation for the observed stream layout.
///
/// Four-way table keyed by whether video/audio already match the target:
/// both match copies both, one mismatch re-encodes only that stream, and a
/// file matching nothing goes down the full re-encode path rather than
/// being dropped.
pub fn decide(info: &StreamInfo, targets: &CodecTargets) -> TranscodeOptions {
    let video_match = info.matching_video(&targets.video_codec);
    let audio_match = info.matching_audio(&targets.audio_codec, &targets.audio_language);

    let video = if video_match.is_some() {
        StreamAction::Copy
    } else {
        StreamAction::Encode
    };
    let audio = if audio_match.is_some() {
        StreamAction::Copy
    } else {
        StreamAction::Encode
    };

    let video_map = match video_match {
        Some(s) => StreamMap::Index(s.index),
        None => StreamMap::First("v"),
    };
    let audio_map = match audio_match {
        Some(s) => StreamMap::Index(s.index),
        // re-encodes normalize the preferred-language track when present
        None => match info.preferred_audio(&targets.audio_language) {
            Some(s) => StreamMap::Index(s.index),
            None => StreamMap::First("a"),
        },
    };

    TranscodeOptions {
        video,
        audio,
        video_map,
        audio_map,
    }
}

impl TranscodeOptions {
    /// ffmpeg output arguments for this operation.
    ///
    /// The container is always tagged for the target video codec, even when
    /// video is copied: a copied stream's existing container tag may be
    /// stale.
    pub fn ffmpeg_args(&self, targets: &CodecTargets) -> Vec<String> {
        let mut args = vec![
            "-map".to_string(),
            self.video_map.specifier(),
            "-map".to_string(),
            self.audio_map.specifier(),
        ];

        match self.video {
            StreamAction::Copy => args.extend(["-c:v".to_string(), "copy".to_string()]),
            StreamAction::Encode => {
                args.extend(["-c:v".to_string(), targets.video_codec.clone()])
            }
        }

        match self.audio {
            StreamAction::Copy => args.extend(["-c:a".to_string(), "copy".to_string()]),
            StreamAction::Encode => {
                // re-encoded audio is always normalized to stereo s16
                args.extend([
                    "-c:a".to_string(),
                    targets.audio_encoder.clone(),
                    "-sample_fmt".to_string(),
                    "s16".to_string(),
                    "-ac".to_string(),
                    "2".to_string(),
                    "-strict".to_string(),
                    "-2".to_string(),
                ]);
            }
        }

        if targets.video_codec == "hevc" {
            args.extend(["-tag:v".to_string(), "hvc1".to_string()]);
        }

        args
    }
}

/// Normalizes one downloaded file into a stored asset, returning its id.
///
/// Seam for the acquisition coordinator; tests substitute a fake that skips
/// the external processes.
#[async_trait]
pub trait MediaNormalizer: Send + Sync {
    async fn normalize(&self, input: &Path) -> Result<String>;
}

/// Probe, decide, and run the external transcode process.
pub struct TranscodeEngine {
    ffmpeg_path: String,
    prober: MediaProber,
    targets: CodecTargets,
    storage: StorageManager,
}

impl TranscodeEngine {
    pub fn new(
        ffmpeg_path: String,
        ffprobe_path: String,
        targets: CodecTargets,
        storage: StorageManager,
    ) -> Self {
        Self {
            ffmpeg_path,
            prober: MediaProber::new(ffprobe_path),
            targets,
            storage,
        }
    }

    /// Run the selected operation against a temporary output next to the
    /// input. On success the output is placed through the storage manager
    /// and the original input deleted; on a non-zero exit the original is
    /// left untouched.
    async fn execute(&self, input: &Path, options: &TranscodeOptions) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let work_dir = input.parent().unwrap_or_else(|| Path::new("."));
        let work_path = work_dir.join(format!("{}.mp4", id));

        let args = options.ffmpeg_args(&self.targets);
        info!(
            input = %input.display(),
            id = %id,
            video = ?options.video,
            audio = ?options.audio,
            "Transcoding"
        );

        let output = Command::new(&self.ffmpeg_path)
            .arg("-y")
            .arg("-i")
            .arg(input)
            .args(&args)
            .arg(&work_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to execute ffmpeg for {}", input.display()))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if let Err(e) = tokio::fs::remove_file(&work_path).await {
                debug!(path = %work_path.display(), error = %e, "No partial output to remove");
            }
            return Err(PipelineError::TranscodeFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            }
            .into());
        }
        if !stderr.trim().is_empty() {
            debug!(id = %id, "ffmpeg stderr: {}", stderr.trim());
        }

        let placed = self.storage.place(&id, &work_path).await?;
        if let Err(e) = tokio::fs::remove_file(&work_path).await {
            warn!(path = %work_path.display(), error = %e, "Failed to remove work file");
        }
        // the input is only deleted once the placed copy is verified
        if let Err(e) = tokio::fs::remove_file(input).await {
            warn!(path = %input.display(), error = %e, "Failed to remove original download");
        }

        info!(id = %id, path = %placed.display(), "Transcode complete");
        Ok(id)
    }
}

#[async_trait]
impl MediaNormalizer for TranscodeEngine {
    async fn normalize(&self, input: &Path) -> Result<String> {
        let info = self.prober.probe(input).await?;
        let options = decide(&info, &self.targets);
        self.execute(input, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ffmpeg::ProbedStream;

    fn targets() -> CodecTargets {
        CodecTargets {
            video_codec: "hevc".to_string(),
            audio_codec: "aac".to_string(),
            audio_encoder: "flac".to_string(),
            audio_language: "jpn".to_string(),
        }
    }

    fn stream(index: usize, codec: &str, language: Option<&str>) -> ProbedStream {
        ProbedStream {
            index,
            codec: codec.to_string(),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn both_matching_copies_both() {
        let info = StreamInfo {
            video: vec![stream(0, "hevc", None)],
            audio: vec![stream(1, "aac", Some("jpn"))],
        };
        let options = decide(&info, &targets());
        assert_eq!(options.video, StreamAction::Copy);
        assert_eq!(options.audio, StreamAction::Copy);

        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        // the container tag is refreshed even on a pure copy
        assert!(args.windows(2).any(|w| w == ["-tag:v", "hvc1"]));
    }

    #[test]
    fn video_mismatch_reencodes_video_only() {
        let info = StreamInfo {
            video: vec![stream(0, "h264", None)],
            audio: vec![stream(1, "aac", Some("jpn"))],
        };
        let options = decide(&info, &targets());
        assert_eq!(options.video, StreamAction::Encode);
        assert_eq!(options.audio, StreamAction::Copy);

        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-c:v", "hevc"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
    }

    #[test]
    fn audio_mismatch_reencodes_audio_to_stereo() {
        let info = StreamInfo {
            video: vec![stream(0, "hevc", None)],
            audio: vec![stream(1, "dts", Some("jpn"))],
        };
        let options = decide(&info, &targets());
        assert_eq!(options.video, StreamAction::Copy);
        assert_eq!(options.audio, StreamAction::Encode);

        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "flac"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "2"]));
        assert!(args.windows(2).any(|w| w == ["-sample_fmt", "s16"]));
    }

    #[test]
    fn both_mismatched_reencodes_both() {
        let info = StreamInfo {
            video: vec![stream(0, "mpeg4", None)],
            audio: vec![stream(1, "mp3", None)],
        };
        let options = decide(&info, &targets());
        assert_eq!(options.video, StreamAction::Encode);
        assert_eq!(options.audio, StreamAction::Encode);
    }

    #[test]
    fn nothing_matching_still_produces_full_reencode() {
        // no stream matches any acceptable codec, the file is never dropped
        let info = StreamInfo::default();
        let options = decide(&info, &targets());
        assert_eq!(options.video, StreamAction::Encode);
        assert_eq!(options.audio, StreamAction::Encode);

        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-map", "0:v:0"]));
        assert!(args.windows(2).any(|w| w == ["-map", "0:a:0"]));
    }

    #[test]
    fn copy_maps_matching_stream_even_when_not_first() {
        let info = StreamInfo {
            video: vec![stream(0, "mjpeg", None), stream(1, "hevc", None)],
            audio: vec![stream(2, "aac", Some("jpn"))],
        };
        let options = decide(&info, &targets());
        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-map", "0:1"]));
        assert!(args.windows(2).any(|w| w == ["-map", "0:2"]));
    }

    #[test]
    fn audio_reencode_targets_preferred_language_track() {
        let info = StreamInfo {
            video: vec![stream(0, "hevc", None)],
            audio: vec![stream(1, "dts", Some("eng")), stream(2, "dts", Some("jpn"))],
        };
        let options = decide(&info, &targets());
        let args = options.ffmpeg_args(&targets());
        assert!(args.windows(2).any(|w| w == ["-map", "0:2"]));
    }
}
