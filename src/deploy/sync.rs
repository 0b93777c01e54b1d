//! Upload of public site files.

use std::path::Path;

use super::archive::{self, ArchiveError};
use crate::cloud::{CloudClient, CloudError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Upload(#[from] CloudError),
}

/// What one site upload did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files: usize,
    pub bytes: u64,
}

/// Upload every file below `dir` to `bucket` under `{site}/{relative path}`.
/// The first failed upload aborts the sync.
pub async fn sync_site(
    cloud: &dyn CloudClient,
    bucket: &str,
    site: &str,
    dir: &Path,
) -> Result<SyncStats, SyncError> {
    let mut stats = SyncStats::default();
    for (relative, path) in archive::list_files(dir)? {
        let body = tokio::fs::read(&path)
            .await
            .map_err(|source| ArchiveError::Read {
                path: path.clone(),
                source,
            })?;
        let key = format!("{site}/{relative}");
        let content_type = mime_guess::from_path(&path).first_or_octet_stream();

        tracing::debug!(%bucket, %key, content_type = %content_type, "Uploading site file");
        stats.bytes += body.len() as u64;
        cloud
            .put_object(bucket, &key, body, Some(content_type.essence_str()))
            .await?;
        stats.files += 1;
    }
    Ok(stats)
}
