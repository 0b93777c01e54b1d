use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use super::{CloudClient, CloudError, InvokeOutput};

/// Object storage on the local file system: `<root>/<bucket>/<key>`.
///
/// Useful for dry runs and for inspecting exactly what a deploy uploads.
/// Direct invocation is not available.
#[derive(Debug, Clone)]
pub struct DirectoryCloud {
    root: PathBuf,
}

impl DirectoryCloud {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait]
impl CloudClient for DirectoryCloud {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), CloudError> {
        let path = self.object_path(bucket, key);
        let err = |e: std::io::Error| CloudError::PutObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(err)?;
        }
        tokio::fs::write(&path, body).await.map_err(err)
    }

    async fn invoke_function(
        &self,
        _function: &str,
        _payload: Vec<u8>,
        _context: BTreeMap<String, String>,
    ) -> Result<InvokeOutput, CloudError> {
        Err(CloudError::Unsupported("direct function invocation"))
    }
}
