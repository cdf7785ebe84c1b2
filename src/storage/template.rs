use std::path::Path;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::PublishError;

/// Where a published object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub location: String,
}

#[async_trait]
pub trait StorageBackend: Sync + Send + 'static {
    /// Uploads the file at `path` under a freshly generated key.
    async fn publish(
        &self,
        bucket: &str,
        region: &str,
        path: &Path,
    ) -> Result<UploadResult, PublishError>;
}

/// A new random object key, never derived from the content.
#[inline]
pub fn new_object_key() -> String {
    Uuid::new_v4().to_string()
}
