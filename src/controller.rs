use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{PipelineError, ValidationError};
use crate::fetcher::SourceFetcher;
use crate::processor::{OutputLimits, Resizer, TargetSize};
use crate::storage::{StorageBackend, UploadResult};

/// A single thumbnailing request.
#[derive(Debug, Clone)]
pub struct ResizeRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub compression: u32,
}

impl ResizeRequest {
    pub fn validate(&self, limits: OutputLimits) -> Result<(), ValidationError> {
        if self.width == 0 && self.height == 0 {
            return Err(ValidationError::MissingDimensions);
        }

        if self.width > limits.max_dimension || self.height > limits.max_dimension {
            return Err(ValidationError::DimensionsTooLarge {
                width: self.width,
                height: self.height,
                max: limits.max_dimension,
            });
        }

        if self.format.trim().is_empty() {
            return Err(ValidationError::MissingFormat);
        }

        reqwest::Url::parse(&self.url)
            .map_err(|e| ValidationError::InvalidUrl(self.url.clone(), e.to_string()))?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct ExecutionResult {
    /// Where the thumbnail was published.
    pub upload: UploadResult,

    /// The time taken to run the whole pipeline.
    pub execution_time: Duration,
}

/// Runs fetch -> resize -> publish for each request, stopping at the first
/// failing stage.
pub struct ThumbnailController {
    fetcher: Arc<dyn SourceFetcher>,
    resizer: Resizer,
    storage: Arc<dyn StorageBackend>,
    bucket: String,
    region: String,
}

impl ThumbnailController {
    pub fn new(
        fetcher: Arc<dyn SourceFetcher>,
        resizer: Resizer,
        storage: Arc<dyn StorageBackend>,
        bucket: String,
        region: String,
    ) -> Self {
        Self {
            fetcher,
            resizer,
            storage,
            bucket,
            region,
        }
    }

    pub async fn process(&self, request: &ResizeRequest) -> Result<ExecutionResult, PipelineError> {
        request.validate(self.resizer.limits())?;
        let started = Instant::now();

        let instant = Instant::now();
        let source = self.fetcher.fetch(&request.url).await?;
        let fetch_time = instant.elapsed();

        let instant = Instant::now();
        let thumbnail = self
            .resizer
            .resize(
                source.path(),
                &request.format,
                TargetSize::new(request.width, request.height),
                request.compression,
            )
            .await;

        // The source is no longer needed whatever the outcome.
        drop(source);
        let thumbnail = thumbnail?;
        let resize_time = instant.elapsed();

        let instant = Instant::now();
        let upload = self
            .storage
            .publish(&self.bucket, &self.region, thumbnail.path())
            .await?;
        let publish_time = instant.elapsed();

        info!(
            "Published {} as {} (fetch: {:?}, resize: {:?}, publish: {:?})",
            &request.url, &upload.location, fetch_time, resize_time, publish_time,
        );

        Ok(ExecutionResult {
            upload,
            execution_time: started.elapsed(),
        })
    }
}
