use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::errors::FetchError;
use crate::scratch::ScratchFile;

/// Retrieves a source image into a fresh scratch file.
#[async_trait]
pub trait SourceFetcher: Sync + Send + 'static {
    async fn fetch(&self, url: &str) -> Result<ScratchFile, FetchError>;
}

/// Downloads sources over HTTP(S) with a single attempt per request.
pub struct HttpFetcher {
    client: reqwest::Client,
    scratch_dir: PathBuf,
    timeout: Option<Duration>,
}

impl HttpFetcher {
    pub fn new(scratch_dir: PathBuf, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build().map_err(|e| FetchError::Transport {
            url: String::new(),
            reason: format!("unable to build http client: {}", e),
        })?;

        Ok(Self {
            client,
            scratch_dir,
            timeout,
        })
    }

    fn map_reqwest_error(&self, e: reqwest::Error, url: &str) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ScratchFile, FetchError> {
        debug!("Fetching source image @ {}", url);
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?;

        let status = response.status();
        if !status.is_success() {
            // Drain the error body so the connection is closed cleanly.
            while let Ok(Some(_)) = response.chunk().await {}

            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let (scratch, file) = ScratchFile::create_in(&self.scratch_dir)?;
        let mut file = tokio::fs::File::from_std(file);

        let mut written = 0usize;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.map_reqwest_error(e, url))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        debug!("Fetched {} bytes into {:?}", written, scratch.path());
        Ok(scratch)
    }
}
