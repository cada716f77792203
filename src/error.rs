//! Pipeline error taxonomy
//!
//! Failures inside the acquisition pipeline fall into three classes with
//! different handling rules:
//! - transient: retried by a later sweep or skipped for the current file,
//!   siblings keep running
//! - unit-fatal: the file (or single-file release) is abandoned and logged
//!   for manual remediation, no placeholder record is written
//! - placement-fatal: the placement call fails but the process stays up

use std::path::PathBuf;

/// Errors raised by pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No configured storage tier could be created or queried.
    #[error("no storage tier available")]
    NoStorageAvailable,

    /// The probe process failed, the file cannot be analyzed.
    #[error("unreadable media: {path}: {reason}")]
    UnreadableMedia { path: PathBuf, reason: String },

    /// The transcode process exited non-zero; the original file is untouched.
    #[error("transcode failed with status {status}: {stderr}")]
    TranscodeFailed { status: i32, stderr: String },

    /// No matcher in the cascade produced an episode number.
    #[error("no episode number in filename: {name}")]
    UnparsableFilename { name: String },

    /// The metadata service knows the entity but has not published details yet.
    #[error("metadata not yet available for {entity}")]
    MetadataUnavailable { entity: String },

    /// The transfer capability reported an error; partial output is discarded.
    #[error("transfer failed: {reason}")]
    TransferFailed { reason: String },
}

impl PipelineError {
    /// Transient failures carry no terminal state; a later sweep retries them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::MetadataUnavailable { .. } | PipelineError::TransferFailed { .. }
        )
    }

    /// Unit-fatal failures abandon one file and demand operator attention.
    pub fn is_unit_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::UnparsableFilename { .. }
                | PipelineError::UnreadableMedia { .. }
                | PipelineError::TranscodeFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_disjoint() {
        let transient = PipelineError::MetadataUnavailable {
            entity: "episode 3".into(),
        };
        assert!(transient.is_transient());
        assert!(!transient.is_unit_fatal());

        let fatal = PipelineError::UnparsableFilename {
            name: "garbage.mkv".into(),
        };
        assert!(fatal.is_unit_fatal());
        assert!(!fatal.is_transient());

        let storage = PipelineError::NoStorageAvailable;
        assert!(!storage.is_transient());
        assert!(!storage.is_unit_fatal());
    }
}
