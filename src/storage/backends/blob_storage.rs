use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rusoto_core::credential::{AwsCredentials, ProfileProvider, ProvideAwsCredentials, StaticProvider};
use rusoto_core::{HttpClient, Region};
use rusoto_s3::{PutObjectRequest, S3Client, S3};

use crate::errors::PublishError;
use crate::storage::template::{new_object_key, StorageBackend, UploadResult};

/// Publishes to S3 or an S3 compatible service.
///
/// Credentials are read from the named profile of the shared credentials
/// file on every upload, so rotating them does not need a restart.
pub struct BlobStorageBackend {
    profile: String,
    credentials_file: Option<PathBuf>,
    endpoint: Option<String>,
    request_timeout: Option<Duration>,
}

impl BlobStorageBackend {
    pub fn new(
        profile: String,
        credentials_file: Option<PathBuf>,
        endpoint: Option<String>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            profile,
            credentials_file,
            endpoint,
            request_timeout,
        }
    }

    async fn load_credentials(&self) -> Result<AwsCredentials, PublishError> {
        let provider = match self.credentials_file.as_ref() {
            Some(path) => ProfileProvider::with_configuration(path.clone(), self.profile.clone()),
            None => {
                let mut provider = ProfileProvider::new()
                    .map_err(|e| PublishError::Credentials(e.to_string()))?;
                provider.set_profile(self.profile.clone());
                provider
            },
        };

        provider
            .credentials()
            .await
            .map_err(|e| PublishError::Credentials(e.to_string()))
    }

    fn region(&self, region: &str) -> Result<Region, PublishError> {
        match self.endpoint.as_ref() {
            Some(endpoint) => Ok(Region::Custom {
                name: region.to_string(),
                endpoint: endpoint.clone(),
            }),
            None => Region::from_str(region)
                .map_err(|_| PublishError::InvalidRegion(region.to_string())),
        }
    }
}

/// The public location of an object once stored.
fn object_location(bucket: &str, region: &Region, key: &str) -> String {
    match region {
        Region::Custom { endpoint, .. } => {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key)
        },
        other => format!("https://{}.s3.{}.amazonaws.com/{}", bucket, other.name(), key),
    }
}

#[async_trait]
impl StorageBackend for BlobStorageBackend {
    async fn publish(
        &self,
        bucket: &str,
        region: &str,
        path: &Path,
    ) -> Result<UploadResult, PublishError> {
        let data = tokio::fs::read(path).await?;
        let region = self.region(region)?;
        let creds = self.load_credentials().await?;

        let dispatcher = HttpClient::new().map_err(|e| PublishError::Storage(e.to_string()))?;
        let provider = StaticProvider::new(
            creds.aws_access_key_id().to_string(),
            creds.aws_secret_access_key().to_string(),
            creds.token().clone(),
            None,
        );
        let client = S3Client::new_with(dispatcher, provider, region.clone());

        let key = new_object_key();
        let request = PutObjectRequest {
            bucket: bucket.to_string(),
            key: key.clone(),
            content_length: Some(data.len() as i64),
            body: Some(data.into()),
            ..Default::default()
        };

        debug!("Storing image in bucket {} @ {}", bucket, &key);
        let upload = client.put_object(request);
        let result = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, upload)
                .await
                .map_err(|_| PublishError::Timeout(timeout.as_secs()))?,
            None => upload.await,
        };
        result.map_err(|e| PublishError::Storage(e.to_string()))?;

        Ok(UploadResult {
            location: object_location(bucket, &region, &key),
        })
    }
}
