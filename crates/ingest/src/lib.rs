pub mod catalog;
pub mod layout;
pub mod orchestrator;
pub mod staging;
pub mod sweep;

use thiserror::Error;
use vodpack_core::types::{IngestStage, PackagingFormat};
use vodpack_db::DbError;
use vodpack_transcoder::TranscodeError;
use vodpack_transcoder::encode::EncodeError;

/// Terminal failure of one ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no file received")]
    NoFile,
    #[error("unable to save file: {0}")]
    Storage(#[source] std::io::Error),
    #[error("unable to extract metadata: {0}")]
    Probe(#[source] TranscodeError),
    #[error("unable to save thumbnail: {0}")]
    Thumbnail(#[source] std::io::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("persistence failed: {0}")]
    Persistence(#[source] DbError),
}

impl IngestError {
    /// Last stage the ingestion completed before failing.
    pub fn stage(&self) -> IngestStage {
        match self {
            Self::NoFile | Self::Storage(_) => IngestStage::Received,
            Self::Probe(_) => IngestStage::Stored,
            Self::Thumbnail(_) => IngestStage::Probed,
            Self::Encode(e) => match e.format {
                PackagingFormat::Hls => IngestStage::Probed,
                PackagingFormat::Dash => IngestStage::HlsReady,
            },
            Self::Persistence(_) => IngestStage::DashReady,
        }
    }

    /// Short message safe to show to the uploader.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NoFile => "no file received",
            Self::Storage(_) => "unable to save file",
            Self::Probe(_) => "unable to extract metadata",
            Self::Thumbnail(_) => "unable to save thumbnail",
            Self::Encode(_) => "encoding failed",
            Self::Persistence(_) => "persistence failed",
        }
    }
}

/// Fresh asset id. Ids are random v4 UUIDs and are never reused.
pub fn new_asset_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_across_many_ingestions() {
        let ids: HashSet<String> = (0..10_000).map(|_| new_asset_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn errors_report_the_stage_they_abort_from() {
        let dash = IngestError::Encode(EncodeError {
            format: PackagingFormat::Dash,
            cause: "exit status: 1".into(),
        });
        assert_eq!(dash.stage(), IngestStage::HlsReady);
        assert_eq!(dash.public_message(), "encoding failed");
        assert_eq!(IngestError::NoFile.stage(), IngestStage::Received);
        assert_eq!(
            IngestError::Probe(TranscodeError::ProbeFailed("bad".into())).public_message(),
            "unable to extract metadata"
        );
    }
}
