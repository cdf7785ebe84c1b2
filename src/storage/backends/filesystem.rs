use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::PublishError;
use crate::storage::template::{new_object_key, StorageBackend, UploadResult};

/// Publishes into a local directory, laid out as `<directory>/<bucket>/<key>`.
pub struct FileSystemBackend {
    directory: PathBuf,
}

impl FileSystemBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { directory: dir }
    }

    #[inline]
    fn format_path(&self, bucket: &str) -> PathBuf {
        self.directory.join(bucket)
    }
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn publish(
        &self,
        bucket: &str,
        region: &str,
        path: &Path,
    ) -> Result<UploadResult, PublishError> {
        let data = tokio::fs::read(path).await?;

        let store_in = self.format_path(bucket);
        let dest = store_in.join(new_object_key());

        debug!("Storing image @ {:?} (region {} ignored)", &dest, region);
        let written = match tokio::fs::write(&dest, &data).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == ErrorKind::NotFound => {
                match tokio::fs::create_dir_all(&store_in).await {
                    Ok(()) => tokio::fs::write(&dest, &data).await,
                    Err(e) => Err(e),
                }
            },
            Err(other) => Err(other),
        };
        written.map_err(|e| PublishError::Storage(e.to_string()))?;

        Ok(UploadResult {
            location: format!("file://{}", dest.display()),
        })
    }
}
