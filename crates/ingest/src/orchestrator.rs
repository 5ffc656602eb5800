//! Upload → probe → thumbnail → HLS → DASH → catalog.
//!
//! Every ingestion gets its own id and id-derived paths, so concurrent
//! ingestions share nothing but the catalog. The two encode jobs of one
//! ingestion run back to back. A record is inserted only after both succeed;
//! any earlier failure leaves the catalog untouched and hands the partial
//! output to the configured [`CleanupPolicy`].

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info, warn};
use vodpack_core::types::{CleanupPolicy, IngestStage, PackagingFormat};
use vodpack_db::repo::assets::AssetRow;
use vodpack_transcoder::encode::{Executor, Transcoder};
use vodpack_transcoder::ffprobe::MediaProber;

use crate::catalog::CatalogStore;
use crate::layout::{self, StorageLayout};
use crate::staging::StagedUpload;
use crate::sweep::{self, SweepReport};
use crate::{IngestError, new_asset_id};

/// One upload as received from the transport layer.
#[derive(Debug, Default)]
pub struct IngestRequest {
    pub display_name: String,
    /// Raw video, already streamed to a staging file.
    pub video: Option<StagedUpload>,
    pub thumbnail: Option<ThumbnailUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct ThumbnailUpload {
    /// Client-side file name, used only for its extension.
    pub filename: Option<String>,
    pub data: Bytes,
}

/// Descriptor of a committed asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub video_id: String,
    pub hls_url: String,
    pub dash_url: String,
    pub duration: String,
    pub thumbnail: Option<String>,
}

/// Ids of ingestions currently running in this process.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    pub fn contains(&self, asset_id: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(asset_id)
    }

    fn track(&self, asset_id: &str) -> InFlightGuard {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(asset_id.to_string());
        InFlightGuard {
            set: self.clone(),
            asset_id: asset_id.to_string(),
        }
    }
}

struct InFlightGuard {
    set: InFlight,
    asset_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.asset_id);
    }
}

/// Progress of a single ingestion: the stage reached and what it has written.
struct Ingestion {
    asset_id: String,
    stage: IngestStage,
    artifacts: Vec<PathBuf>,
}

impl Ingestion {
    fn advance(&mut self, stage: IngestStage) {
        self.stage = stage;
        info!(asset_id = %self.asset_id, %stage, "ingest stage reached");
    }
}

/// Coordinates the pipeline. Collaborators are injected; cheap to share
/// behind an `Arc` across request handlers.
pub struct Ingestor {
    layout: StorageLayout,
    prober: Arc<dyn MediaProber>,
    executor: Executor,
    catalog: Arc<dyn CatalogStore>,
    cleanup: CleanupPolicy,
    in_flight: InFlight,
}

impl Ingestor {
    pub fn new(
        layout: StorageLayout,
        prober: Arc<dyn MediaProber>,
        transcoder: Arc<dyn Transcoder>,
        catalog: Arc<dyn CatalogStore>,
    ) -> Self {
        Self {
            layout,
            prober,
            executor: Executor::new(transcoder),
            catalog,
            cleanup: CleanupPolicy::default(),
            in_flight: InFlight::default(),
        }
    }

    pub fn with_cleanup(mut self, cleanup: CleanupPolicy) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Start a staging file for an incoming upload next to the final raw
    /// uploads, so storing it is a rename.
    pub async fn stage_upload(&self) -> Result<StagedUpload, IngestError> {
        StagedUpload::create(self.layout.uploads_dir())
            .await
            .map_err(IngestError::Storage)
    }

    /// Run one upload through the whole pipeline.
    pub async fn ingest(&self, mut request: IngestRequest) -> Result<IngestReceipt, IngestError> {
        let video = match request.video.take() {
            Some(video) if !video.is_empty() => video,
            _ => return Err(IngestError::NoFile),
        };

        let mut run = Ingestion {
            asset_id: new_asset_id(),
            stage: IngestStage::Received,
            artifacts: Vec::new(),
        };
        let _guard = self.in_flight.track(&run.asset_id);
        info!(
            asset_id = %run.asset_id,
            name = %request.display_name,
            bytes = video.len(),
            "ingest started"
        );

        match self.run_stages(&mut run, video, request).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                error!(
                    asset_id = %run.asset_id,
                    stage = %run.stage,
                    error = %e,
                    "ingest aborted"
                );
                self.compensate(&run).await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        run: &mut Ingestion,
        video: StagedUpload,
        request: IngestRequest,
    ) -> Result<IngestReceipt, IngestError> {
        let id = run.asset_id.clone();
        let uploaded_at = chrono::Utc::now();

        let source = self.layout.upload_path(&id);
        run.artifacts.push(source.clone());
        tokio::fs::create_dir_all(self.layout.uploads_dir())
            .await
            .map_err(IngestError::Storage)?;
        video.persist(&source).await.map_err(IngestError::Storage)?;
        run.advance(IngestStage::Stored);

        let duration = self
            .prober
            .probe_duration(&source)
            .await
            .map_err(IngestError::Probe)?;
        run.advance(IngestStage::Probed);

        let thumbnail_path = match request.thumbnail {
            Some(thumb) => {
                let ext = layout::thumbnail_extension(thumb.filename.as_deref());
                let path = self.layout.thumbnail_path(&id, &ext);
                run.artifacts.push(path.clone());
                tokio::fs::create_dir_all(self.layout.thumbnails_dir())
                    .await
                    .map_err(IngestError::Thumbnail)?;
                tokio::fs::write(&path, &thumb.data)
                    .await
                    .map_err(IngestError::Thumbnail)?;
                Some(path)
            }
            None => None,
        };

        let plan = self.layout.plan(&id);
        for format in PackagingFormat::ALL {
            run.artifacts.push(plan.output_dir(format).to_path_buf());
            self.executor.encode(&source, &plan, format).await?;
            run.advance(IngestStage::after_encode(format));
        }

        let record = AssetRow {
            id: id.clone(),
            name: request.display_name,
            path: source.to_string_lossy().into_owned(),
            upload_ts: uploaded_at.timestamp_millis(),
            duration: duration.clone(),
            thumbnail: thumbnail_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        };
        self.catalog
            .insert(&record)
            .await
            .map_err(IngestError::Persistence)?;
        run.advance(IngestStage::Committed);

        Ok(IngestReceipt {
            hls_url: layout::rendition_url(&id, PackagingFormat::Hls),
            dash_url: layout::rendition_url(&id, PackagingFormat::Dash),
            duration,
            thumbnail: thumbnail_path.map(|_| layout::thumbnail_url(&id)),
            video_id: id,
        })
    }

    /// Apply the cleanup policy to whatever an aborted ingestion wrote.
    async fn compensate(&self, run: &Ingestion) {
        if run.artifacts.is_empty() {
            return;
        }
        match self.cleanup {
            CleanupPolicy::Retain => {
                warn!(
                    asset_id = %run.asset_id,
                    artifacts = ?run.artifacts,
                    "partial output retained for inspection"
                );
            }
            CleanupPolicy::Remove => {
                for path in &run.artifacts {
                    if let Err(e) = sweep::remove_path(path).await {
                        warn!(
                            asset_id = %run.asset_id,
                            path = %path.display(),
                            error = %e,
                            "failed to remove partial output"
                        );
                    }
                }
                info!(asset_id = %run.asset_id, "partial output removed");
            }
        }
    }

    /// Remove on-disk artifacts with no catalog record that are older than `grace`.
    pub async fn sweep_orphans(&self, grace: Duration) -> Result<SweepReport, IngestError> {
        sweep::sweep_orphans(&self.layout, self.catalog.as_ref(), &self.in_flight, grace)
            .await
            .map_err(IngestError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use async_trait::async_trait;
    use mockall::mock;
    use vodpack_db::DbError;
    use vodpack_transcoder::TranscodeError;
    use vodpack_transcoder::encode::EncodeJob;

    use crate::catalog::SqliteCatalog;

    mock! {
        Prober {}
        #[async_trait]
        impl MediaProber for Prober {
            async fn probe_duration(&self, file: &Path) -> Result<String, TranscodeError>;
        }
    }

    mock! {
        Encoder {}
        #[async_trait]
        impl Transcoder for Encoder {
            async fn run(&self, job: &EncodeJob) -> Result<(), TranscodeError>;
        }
    }

    mock! {
        Catalog {}
        #[async_trait]
        impl CatalogStore for Catalog {
            async fn insert(&self, asset: &AssetRow) -> Result<(), DbError>;
            async fn get(&self, id: &str) -> Result<Option<AssetRow>, DbError>;
            async fn list_recent(&self) -> Result<Vec<AssetRow>, DbError>;
            async fn contains(&self, id: &str) -> Result<bool, DbError>;
        }
    }

    async fn sqlite_catalog() -> Arc<SqliteCatalog> {
        let pool = vodpack_db::connect(":memory:").await.unwrap();
        vodpack_db::migrate::run(&pool).await.unwrap();
        Arc::new(SqliteCatalog::new(pool))
    }

    fn prober_returning(duration: &'static str) -> MockProber {
        let mut prober = MockProber::new();
        prober
            .expect_probe_duration()
            .returning(move |_| Ok(duration.to_string()));
        prober
    }

    fn encoder_ok() -> MockEncoder {
        let mut encoder = MockEncoder::new();
        encoder.expect_run().returning(|_| Ok(()));
        encoder
    }

    fn encoder_failing_on(format: PackagingFormat) -> MockEncoder {
        let mut encoder = MockEncoder::new();
        encoder.expect_run().returning(move |job: &EncodeJob| {
            if job.format == format {
                Err(TranscodeError::FfmpegFailed("exit status: 1".into()))
            } else {
                Ok(())
            }
        });
        encoder
    }

    /// A request whose video is staged outside the uploads directory.
    async fn upload(root: &Path, name: &str) -> IngestRequest {
        let video = StagedUpload::from_bytes(&root.join("incoming"), b"not really an mp4")
            .await
            .unwrap();
        IngestRequest {
            display_name: name.to_string(),
            video: Some(video),
            thumbnail: None,
        }
    }

    fn layout_in(root: &Path) -> StorageLayout {
        StorageLayout::new(root.join("uploads"), root.join("static"))
    }

    #[tokio::test]
    async fn successful_ingest_commits_one_record() {
        let root = tempfile::tempdir().unwrap();
        let catalog = sqlite_catalog().await;
        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.000000")),
            Arc::new(encoder_ok()),
            catalog.clone(),
        );

        let receipt = ingestor.ingest(upload(root.path(), "clip1").await).await.unwrap();
        let id = &receipt.video_id;
        assert_eq!(receipt.hls_url, format!("/static/{id}_hls/playlist.m3u8"));
        assert_eq!(receipt.dash_url, format!("/static/{id}_dash/manifest.mpd"));
        assert_eq!(receipt.duration, "5.000000");
        assert!(receipt.thumbnail.is_none());

        let row = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(row.name, "clip1");
        assert_eq!(row.thumbnail, None);
        assert!(Path::new(&row.path).exists());
        assert!(root.path().join(format!("static/{id}_hls")).is_dir());
        assert!(root.path().join(format!("static/{id}_dash")).is_dir());
        assert!(!ingestor.in_flight().contains(id));
    }

    #[tokio::test]
    async fn encodes_hls_before_dash() {
        let root = tempfile::tempdir().unwrap();
        let mut seq = mockall::Sequence::new();
        let mut encoder = MockEncoder::new();
        encoder
            .expect_run()
            .withf(|job: &EncodeJob| job.format == PackagingFormat::Hls && job.video_tiers.len() == 1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        encoder
            .expect_run()
            .withf(|job: &EncodeJob| job.format == PackagingFormat::Dash && job.video_tiers.len() == 3)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder),
            sqlite_catalog().await,
        );
        ingestor.ingest(upload(root.path(), "ordered").await).await.unwrap();
    }

    #[tokio::test]
    async fn dash_failure_leaves_no_catalog_record() {
        let root = tempfile::tempdir().unwrap();
        let mut catalog = MockCatalog::new();
        catalog.expect_insert().never();

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.000000")),
            Arc::new(encoder_failing_on(PackagingFormat::Dash)),
            Arc::new(catalog),
        );

        let err = ingestor.ingest(upload(root.path(), "clip1").await).await.unwrap_err();
        assert!(matches!(err, IngestError::Encode(ref e) if e.format == PackagingFormat::Dash));
        assert_eq!(err.stage(), IngestStage::HlsReady);
    }

    #[tokio::test]
    async fn probe_failure_skips_transcoding() {
        let root = tempfile::tempdir().unwrap();
        let mut prober = MockProber::new();
        prober
            .expect_probe_duration()
            .returning(|_| Err(TranscodeError::ProbeFailed("Invalid data found".into())));
        let mut encoder = MockEncoder::new();
        encoder.expect_run().never();
        let catalog = sqlite_catalog().await;

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober),
            Arc::new(encoder),
            catalog.clone(),
        );

        let err = ingestor.ingest(upload(root.path(), "broken").await).await.unwrap_err();
        assert_eq!(err.public_message(), "unable to extract metadata");
        assert!(catalog.list_recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_upload_has_no_side_effects() {
        let root = tempfile::tempdir().unwrap();
        let mut prober = MockProber::new();
        prober.expect_probe_duration().never();

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober),
            Arc::new(MockEncoder::new()),
            sqlite_catalog().await,
        );

        let err = ingestor.ingest(IngestRequest::default()).await.unwrap_err();
        assert!(matches!(err, IngestError::NoFile));
        assert!(!root.path().join("uploads").exists());

        let empty = StagedUpload::create(&root.path().join("incoming")).await.unwrap();
        let staged_path = empty.path().to_path_buf();
        let request = IngestRequest {
            video: Some(empty),
            ..Default::default()
        };
        let err = ingestor.ingest(request).await.unwrap_err();
        assert_eq!(err.public_message(), "no file received");
        assert!(!staged_path.exists());
        assert!(!root.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn hls_failure_skips_dash_and_commit() {
        let root = tempfile::tempdir().unwrap();
        let mut encoder = MockEncoder::new();
        encoder
            .expect_run()
            .withf(|job: &EncodeJob| job.format == PackagingFormat::Hls)
            .times(1)
            .returning(|_| Err(TranscodeError::FfmpegFailed("exit status: 1".into())));
        encoder
            .expect_run()
            .withf(|job: &EncodeJob| job.format == PackagingFormat::Dash)
            .never();
        let mut catalog = MockCatalog::new();
        catalog.expect_insert().never();

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder),
            Arc::new(catalog),
        );

        let err = ingestor.ingest(upload(root.path(), "clip1").await).await.unwrap_err();
        assert!(matches!(err, IngestError::Encode(ref e) if e.format == PackagingFormat::Hls));
        assert_eq!(err.public_message(), "encoding failed");
        assert_eq!(err.stage(), IngestStage::Probed);
        assert!(!root.path().join("static").read_dir().unwrap().any(|e| {
            e.unwrap().file_name().to_string_lossy().ends_with("_dash")
        }));
    }

    #[tokio::test]
    async fn thumbnail_write_failure_aborts_before_encoding() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("static")).unwrap();
        // a regular file where the thumbnails directory should be
        std::fs::write(root.path().join("static/thumbnails"), b"").unwrap();

        let mut encoder = MockEncoder::new();
        encoder.expect_run().never();
        let mut catalog = MockCatalog::new();
        catalog.expect_insert().never();

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder),
            Arc::new(catalog),
        );

        let mut request = upload(root.path(), "thumb").await;
        request.thumbnail = Some(ThumbnailUpload {
            filename: Some("cover.jpg".into()),
            data: Bytes::from_static(b"jpg"),
        });
        let err = ingestor.ingest(request).await.unwrap_err();
        assert!(matches!(err, IngestError::Thumbnail(_)));
        assert_eq!(err.public_message(), "unable to save thumbnail");
        assert_eq!(err.stage(), IngestStage::Probed);
    }

    #[tokio::test]
    async fn store_failure_stops_before_reading_duration() {
        let root = tempfile::tempdir().unwrap();
        // a regular file where the uploads directory should be
        std::fs::write(root.path().join("uploads"), b"").unwrap();

        let mut prober = MockProber::new();
        prober.expect_probe_duration().never();
        let mut encoder = MockEncoder::new();
        encoder.expect_run().never();
        let mut catalog = MockCatalog::new();
        catalog.expect_insert().never();

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober),
            Arc::new(encoder),
            Arc::new(catalog),
        );

        let err = ingestor.ingest(upload(root.path(), "clip1").await).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(err.public_message(), "unable to save file");
        assert_eq!(err.stage(), IngestStage::Received);
    }

    #[tokio::test]
    async fn thumbnail_is_stored_under_asset_id() {
        let root = tempfile::tempdir().unwrap();
        let catalog = sqlite_catalog().await;
        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("12.5")),
            Arc::new(encoder_ok()),
            catalog.clone(),
        );

        let mut request = upload(root.path(), "with thumb").await;
        request.thumbnail = Some(ThumbnailUpload {
            filename: None,
            data: Bytes::from_static(b"\xff\xd8\xff"),
        });
        let receipt = ingestor.ingest(request).await.unwrap();
        let id = &receipt.video_id;

        let stored = root.path().join(format!("static/thumbnails/{id}.jpg"));
        assert_eq!(std::fs::read(&stored).unwrap(), b"\xff\xd8\xff");
        assert_eq!(receipt.thumbnail, Some(format!("/thumbnail/{id}")));
        let row = catalog.get(id).await.unwrap().unwrap();
        assert_eq!(row.thumbnail.as_deref().map(Path::new), Some(stored.as_path()));
    }

    #[tokio::test]
    async fn remove_policy_deletes_partial_output() {
        let root = tempfile::tempdir().unwrap();
        let catalog = sqlite_catalog().await;
        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder_failing_on(PackagingFormat::Dash)),
            catalog.clone(),
        )
        .with_cleanup(CleanupPolicy::Remove);

        let mut request = upload(root.path(), "doomed").await;
        request.thumbnail = Some(ThumbnailUpload {
            filename: Some("t.png".into()),
            data: Bytes::from_static(b"png"),
        });
        ingestor.ingest(request).await.unwrap_err();

        let leftovers = |dir: &str| std::fs::read_dir(root.path().join(dir)).unwrap().count();
        assert_eq!(leftovers("uploads"), 0);
        assert_eq!(leftovers("static/thumbnails"), 0);
        // only the thumbnails directory itself remains
        assert_eq!(leftovers("static"), 1);
        assert!(catalog.list_recent().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retain_policy_keeps_partial_output() {
        let root = tempfile::tempdir().unwrap();
        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder_failing_on(PackagingFormat::Dash)),
            sqlite_catalog().await,
        );

        ingestor.ingest(upload(root.path(), "kept").await).await.unwrap_err();
        let uploads: Vec<_> = std::fs::read_dir(root.path().join("uploads"))
            .unwrap()
            .collect();
        assert_eq!(uploads.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut catalog = MockCatalog::new();
        catalog
            .expect_insert()
            .times(1)
            .returning(|asset: &AssetRow| Err(DbError::Duplicate(asset.id.clone())));

        let ingestor = Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder_ok()),
            Arc::new(catalog),
        );

        let err = ingestor.ingest(upload(root.path(), "dup").await).await.unwrap_err();
        assert_eq!(err.public_message(), "persistence failed");
        assert_eq!(err.stage(), IngestStage::DashReady);
    }

    #[tokio::test]
    async fn concurrent_ingestions_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let db_path = root.path().join("catalog.db");
        let pool = vodpack_db::connect(&db_path.to_string_lossy()).await.unwrap();
        vodpack_db::migrate::run(&pool).await.unwrap();
        let catalog = Arc::new(SqliteCatalog::new(pool));
        let ingestor = Arc::new(Ingestor::new(
            layout_in(root.path()),
            Arc::new(prober_returning("5.0")),
            Arc::new(encoder_ok()),
            catalog.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ingestor = ingestor.clone();
                let root = root.path().to_path_buf();
                tokio::spawn(async move {
                    let request = upload(&root, &format!("clip{i}")).await;
                    ingestor.ingest(request).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(catalog.list_recent().await.unwrap().len(), 8);
    }
}
