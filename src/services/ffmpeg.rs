//! FFprobe-based stream analysis
//!
//! Runs ffprobe (command-line) against a downloaded file and reports the
//! video and audio streams relevant to the transcode decision. The JSON
//! output format is stable, which makes this more reliable than FFmpeg
//! bindings. Codec facts are transient: they are derived here on every
//! probe and never persisted.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::PipelineError;

/// One stream as reported by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedStream {
    /// Absolute stream index in the container
    pub index: usize,

    /// Codec name (e.g., "hevc", "h264", "aac", "flac")
    pub codec: String,

    /// Spoken-language tag, when the stream carries one
    pub language: Option<String>,
}

/// Video and audio stream layout of one file.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub video: Vec<ProbedStream>,
    pub audio: Vec<ProbedStream>,
}

impl StreamInfo {
    /// Video stream already in the target codec, if any. Preferred over the
    /// first stream even when it is not the first: sample clips and cover
    /// art sometimes occupy index zero.
    pub fn matching_video(&self, target_codec: &str) -> Option<&ProbedStream> {
        self.video.iter().find(|s| s.codec == target_codec)
    }

    /// Audio stream in the target codec acceptable for a stream copy.
    ///
    /// A stream tagged with the preferred language wins over every other
    /// candidate; an untagged stream in the right codec is accepted next. A
    /// stream tagged with a different language is never a match, so the
    /// decision engine re-encodes and remaps instead of copying the wrong
    /// dub.
    pub fn matching_audio(&self, target_codec: &str, language: &str) -> Option<&ProbedStream> {
        let mut candidates = self.audio.iter().filter(|s| s.codec == target_codec);
        let untagged = candidates.clone().find(|s| s.language.is_none());
        candidates
            .find(|s| s.language.as_deref() == Some(language))
            .or(untagged)
    }

    /// Audio stream to feed a re-encode: the preferred-language stream when
    /// one exists, regardless of codec, else the first audio stream.
    pub fn preferred_audio(&self, language: &str) -> Option<&ProbedStream> {
        self.audio
            .iter()
            .find(|s| s.language.as_deref() == Some(language))
            .or_else(|| self.audio.first())
    }
}

/// FFprobe JSON output structures
mod ffprobe {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: usize,
        pub codec_name: Option<String>,
        pub codec_type: Option<String>,
        pub tags: Option<HashMap<String, String>>,
    }
}

/// Media probe backed by the ffprobe executable.
pub struct MediaProber {
    ffprobe_path: String,
}

impl MediaProber {
    pub fn new(ffprobe_path: String) -> Self {
        Self { ffprobe_path }
    }

    /// Probe a file's stream layout.
    ///
    /// A spawn failure, a non-zero exit, or unparseable output all surface
    /// as [`PipelineError::UnreadableMedia`]; stderr is carried in the
    /// reason, never parsed for control flow.
    pub async fn probe(&self, path: &Path) -> Result<StreamInfo> {
        debug!(path = %path.display(), "Probing media file");

        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-print_format", "json"])
            .args(["-show_streams"])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: format!("failed to execute ffprobe: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: if stderr.trim().is_empty() {
                    format!("ffprobe exit status {}", output.status)
                } else {
                    stderr.trim().to_string()
                },
            }
            .into());
        }

        let probe: ffprobe::FfprobeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| PipelineError::UnreadableMedia {
                path: path.to_path_buf(),
                reason: format!("unparseable ffprobe output: {}", e),
            })?;

        let mut info = StreamInfo::default();
        for stream in probe.streams.unwrap_or_default() {
            let probed = ProbedStream {
                index: stream.index,
                codec: stream.codec_name.clone().unwrap_or_default(),
                language: stream
                    .tags
                    .as_ref()
                    .and_then(|t| t.get("language").cloned()),
            };
            match stream.codec_type.as_deref() {
                Some("video") => info.video.push(probed),
                Some("audio") => info.audio.push(probed),
                _ => {}
            }
        }

        debug!(
            path = %path.display(),
            video_streams = info.video.len(),
            audio_streams = info.audio.len(),
            "Probe complete"
        );
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: usize, codec: &str, language: Option<&str>) -> ProbedStream {
        ProbedStream {
            index,
            codec: codec.to_string(),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn matching_video_prefers_target_codec_over_first() {
        let info = StreamInfo {
            video: vec![stream(0, "mjpeg", None), stream(1, "hevc", None)],
            audio: vec![],
        };
        assert_eq!(info.matching_video("hevc").map(|s| s.index), Some(1));
        assert_eq!(info.matching_video("av1"), None);
    }

    #[test]
    fn matching_audio_prefers_language_tag() {
        let info = StreamInfo {
            video: vec![],
            audio: vec![
                stream(1, "aac", Some("eng")),
                stream(2, "aac", None),
                stream(3, "aac", Some("jpn")),
            ],
        };
        assert_eq!(info.matching_audio("aac", "jpn").map(|s| s.index), Some(3));
    }

    #[test]
    fn matching_audio_accepts_untagged_stream() {
        let info = StreamInfo {
            video: vec![],
            audio: vec![stream(1, "aac", None)],
        };
        assert_eq!(info.matching_audio("aac", "jpn").map(|s| s.index), Some(1));
    }

    #[test]
    fn matching_audio_rejects_wrong_language() {
        let info = StreamInfo {
            video: vec![],
            audio: vec![stream(1, "aac", Some("ita"))],
        };
        assert_eq!(info.matching_audio("aac", "jpn"), None);
    }

    #[test]
    fn preferred_audio_falls_back_to_first_stream() {
        let info = StreamInfo {
            video: vec![],
            audio: vec![stream(1, "dts", Some("eng")), stream(2, "flac", Some("jpn"))],
        };
        assert_eq!(info.preferred_audio("jpn").map(|s| s.index), Some(2));
        assert_eq!(info.preferred_audio("kor").map(|s| s.index), Some(1));
    }
}
