//! Content hashing and artifact packaging.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to write zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to write zip archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Hex SHA-256 of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn hash_file(path: &Path) -> Result<String, ArchiveError> {
    Ok(hash_bytes(&read(path)?))
}

/// Hash of a directory tree: every file's relative path and contents, in
/// file name order. Renaming, adding or editing any file changes the hash.
pub fn hash_dir(dir: &Path) -> Result<String, ArchiveError> {
    let mut hasher = Sha256::new();
    for (relative, path) in list_files(dir)? {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(read(&path)?);
        hasher.update([0u8]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// All regular files below `dir` as `(slash-separated relative path, path)`,
/// sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, entry.into_path()));
    }
    Ok(files)
}

/// Package a built executable as a single-entry zip named `entry_name`.
pub fn zip_artifact(path: &Path, entry_name: &str) -> Result<Vec<u8>, ArchiveError> {
    let content = read(path)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    writer.start_file(entry_name, options)?;
    writer.write_all(&content)?;
    Ok(writer.finish()?.into_inner())
}

fn read(path: &Path) -> Result<Vec<u8>, ArchiveError> {
    std::fs::read(path).map_err(|source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    })
}
