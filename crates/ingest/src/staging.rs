//! Raw upload bytes written to disk as they arrive.

use std::io;
use std::path::Path;

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;

const STAGING_PREFIX: &str = ".upload-";
const STAGING_SUFFIX: &str = ".part";

/// A partially received upload in a hidden temporary file. The file is
/// deleted when the value is dropped unless it has been persisted.
#[derive(Debug)]
pub struct StagedUpload {
    file: tokio::fs::File,
    path: TempPath,
    len: u64,
}

impl StagedUpload {
    /// Create an empty staging file in `dir`. Keep `dir` on the same
    /// filesystem as the final upload location so persisting is a rename.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let dir = dir.to_path_buf();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .suffix(STAGING_SUFFIX)
                .tempfile_in(dir)
        })
        .await
        .map_err(io::Error::other)??;

        let (file, path) = named.into_parts();
        Ok(Self {
            file: tokio::fs::File::from_std(file),
            path,
            len: 0,
        })
    }

    /// Stage an in-memory body in one write.
    pub async fn from_bytes(dir: &Path, data: &[u8]) -> io::Result<Self> {
        let mut staged = Self::create(dir).await?;
        staged.write_chunk(data).await?;
        Ok(staged)
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk).await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and move the staged bytes to `dest`, replacing anything there.
    pub async fn persist(self, dest: &Path) -> io::Result<()> {
        let Self { mut file, path, .. } = self;
        file.flush().await?;
        drop(file);

        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || path.persist(&dest).map_err(|e| e.error))
            .await
            .map_err(io::Error::other)?
    }
}

/// Whether a file name belongs to a staging file.
pub fn is_staging_file(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX)
}
