//! Shared test utilities: in-memory fixture images, a fetcher which never
//! touches the network and a ready-wired controller.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageOutputFormat};
use tempfile::TempDir;

use crate::controller::ThumbnailController;
use crate::errors::FetchError;
use crate::fetcher::SourceFetcher;
use crate::processor::{ImageCrateEngine, Resizer};
use crate::scratch::ScratchFile;
use crate::storage::backends::BackendConfigs;

/// Encodes a blank grayscale image of the given size as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(GrayImage::new(width, height));
    let mut buff = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buff, ImageOutputFormat::Png).unwrap();
    buff.into_inner()
}

/// Serves fixed bytes for every url, or a fixed HTTP status.
pub struct StubFetcher {
    body: Result<Vec<u8>, u16>,
    scratch_dir: PathBuf,
    pub calls: AtomicUsize,
}

impl StubFetcher {
    pub fn serving(body: Vec<u8>, scratch_dir: PathBuf) -> Self {
        Self {
            body: Ok(body),
            scratch_dir,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16, scratch_dir: PathBuf) -> Self {
        Self {
            body: Err(status),
            scratch_dir,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<ScratchFile, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.body {
            Ok(body) => {
                let (scratch, mut file) = ScratchFile::create_in(&self.scratch_dir)?;
                file.write_all(body)?;
                Ok(scratch)
            },
            Err(status) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
            }),
        }
    }
}

/// Temp directories backing a test controller.
pub struct TestEnvironment {
    pub scratch: TempDir,
    pub store: TempDir,
    pub fetcher: Arc<StubFetcher>,
    pub controller: Arc<ThumbnailController>,
}

impl TestEnvironment {
    /// Number of files still sitting in the scratch directory.
    pub fn scratch_files(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }

    /// Every file published so far.
    pub fn published(&self) -> Vec<PathBuf> {
        let bucket = self.store.path().join("thumbs");
        match std::fs::read_dir(bucket) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Wires a controller with the real resizer, a filesystem store and a stub
/// fetcher built by `make_fetcher` around the scratch directory.
pub async fn setup_environment(
    make_fetcher: impl FnOnce(PathBuf) -> StubFetcher,
) -> TestEnvironment {
    let scratch = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();

    let fetcher = Arc::new(make_fetcher(scratch.path().to_path_buf()));
    let storage = BackendConfigs::FileSystem {
        directory: store.path().to_path_buf(),
    }
    .connect(None)
    .await
    .unwrap();

    let resizer = Resizer::new(Arc::new(ImageCrateEngine), scratch.path().to_path_buf());
    let controller = Arc::new(ThumbnailController::new(
        fetcher.clone(),
        resizer,
        storage,
        "thumbs".to_string(),
        "local".to_string(),
    ));

    TestEnvironment {
        scratch,
        store,
        fetcher,
        controller,
    }
}
