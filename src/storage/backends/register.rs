use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::template::StorageBackend;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendConfigs {
    S3 {
        #[serde(default = "default_profile")]
        /// The profile to read from the shared credentials file.
        ///
        /// Defaults to `thumbnailer`.
        profile: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        /// Overrides the default `~/.aws/credentials` location.
        credentials_file: Option<PathBuf>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        /// The endpoint of an S3 compatible service, e.g. a MinIO server.
        endpoint: Option<String>,
    },
    FileSystem {
        directory: PathBuf,
    },
}

impl Default for BackendConfigs {
    fn default() -> Self {
        Self::S3 {
            profile: default_profile(),
            credentials_file: None,
            endpoint: None,
        }
    }
}

impl BackendConfigs {
    pub async fn connect(
        &self,
        upload_timeout: Option<Duration>,
    ) -> anyhow::Result<Arc<dyn StorageBackend>> {
        match self {
            Self::S3 {
                profile,
                credentials_file,
                endpoint,
            } => Ok(Arc::new(super::blob_storage::BlobStorageBackend::new(
                profile.clone(),
                credentials_file.clone(),
                endpoint.clone(),
                upload_timeout,
            ))),
            Self::FileSystem { directory } => {
                tokio::fs::create_dir_all(directory).await?;
                Ok(Arc::new(super::filesystem::FileSystemBackend::new(directory.clone())))
            },
        }
    }
}

fn default_profile() -> String {
    "thumbnailer".to_string()
}
