//! Garbage collection of output left behind by ingestions that never
//! committed a catalog record.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};
use vodpack_db::DbError;
use vodpack_transcoder::plan::parse_rendition_dir_name;

use crate::catalog::CatalogStore;
use crate::layout::StorageLayout;
use crate::orchestrator::InFlight;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidate paths examined.
    pub scanned: usize,
    pub removed: Vec<PathBuf>,
    pub failed: usize,
}

/// A path on disk attributed to an asset id.
struct Candidate {
    asset_id: String,
    path: PathBuf,
}

/// Delete raw uploads, thumbnails and rendition directories whose asset id
/// has no catalog record, is not being ingested right now, and whose last
/// modification is older than `grace`.
///
/// Catalog errors abort the sweep before anything else is deleted.
pub async fn sweep_orphans(
    layout: &StorageLayout,
    catalog: &dyn CatalogStore,
    in_flight: &InFlight,
    grace: Duration,
) -> Result<SweepReport, DbError> {
    let mut candidates = file_candidates(layout.uploads_dir()).await;
    candidates.extend(file_candidates(&layout.thumbnails_dir()).await);
    candidates.extend(rendition_candidates(layout.static_dir()).await);

    let mut report = SweepReport {
        scanned: candidates.len(),
        ..Default::default()
    };

    for candidate in candidates {
        if in_flight.contains(&candidate.asset_id) || !older_than(&candidate.path, grace).await {
            continue;
        }
        if catalog.contains(&candidate.asset_id).await? {
            continue;
        }

        match remove_path(&candidate.path).await {
            Ok(()) => {
                debug!(asset_id = %candidate.asset_id, path = %candidate.path.display(), "orphan removed");
                report.removed.push(candidate.path);
            }
            Err(e) => {
                warn!(path = %candidate.path.display(), error = %e, "failed to remove orphan");
                report.failed += 1;
            }
        }
    }

    if !report.removed.is_empty() || report.failed > 0 {
        info!(
            scanned = report.scanned,
            removed = report.removed.len(),
            failed = report.failed,
            "orphan sweep finished"
        );
    }
    Ok(report)
}

/// Remove a file or a directory tree. A path that is already gone is not an error.
pub async fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Regular files named `<id>.<ext>`.
async fn file_candidates(dir: &Path) -> Vec<Candidate> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        if let (true, Some(asset_id)) = (is_file, stem) {
            out.push(Candidate { asset_id, path });
        }
    }
    out
}

/// Directories named `<id>_hls` / `<id>_dash`.
async fn rendition_candidates(dir: &Path) -> Vec<Candidate> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        if let Some((asset_id, _)) = name.to_str().and_then(parse_rendition_dir_name) {
            out.push(Candidate {
                asset_id: asset_id.to_string(),
                path: entry.path(),
            });
        }
    }
    out
}

async fn older_than(path: &Path, grace: Duration) -> bool {
    let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= grace)
        .unwrap_or(false)
}
