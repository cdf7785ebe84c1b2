use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::imageops::FilterType;
use tokio::sync::Semaphore;

use crate::errors::ResizeError;
use crate::processor::engine::Engine;
use crate::processor::geometry::{self, OutputLimits, TargetSize};
use crate::scratch::ScratchFile;

/// Drives the engine to crop, scale and re-encode images.
///
/// Only one resize runs against the engine at a time, process wide. The
/// permit is moved onto the blocking worker so it is held until the engine
/// work itself is over, even if the caller stops waiting.
pub struct Resizer {
    engine: Arc<dyn Engine>,
    gate: Arc<Semaphore>,
    scratch_dir: PathBuf,
    limits: OutputLimits,
}

impl Resizer {
    pub fn new(engine: Arc<dyn Engine>, scratch_dir: PathBuf) -> Self {
        Self {
            engine,
            gate: Arc::new(Semaphore::new(1)),
            scratch_dir,
            limits: OutputLimits::default(),
        }
    }

    /// Replaces the default output size limits.
    pub fn with_limits(mut self, limits: OutputLimits) -> Self {
        self.limits = limits;
        self
    }

    #[inline]
    pub fn limits(&self) -> OutputLimits {
        self.limits
    }

    pub async fn resize(
        &self,
        source: &Path,
        format: &str,
        target: TargetSize,
        quality: u32,
    ) -> Result<ScratchFile, ResizeError> {
        if target.is_unset() {
            return Err(ResizeError::InvalidDimensions);
        }

        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ResizeError::Engine("resize gate has been closed".to_string()))?;

        let engine = self.engine.clone();
        let source = source.to_path_buf();
        let format = format.to_string();
        let scratch_dir = self.scratch_dir.clone();
        let limits = self.limits;

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let instant = Instant::now();
            let result = run_engine(
                engine.as_ref(),
                &source,
                &format,
                target,
                limits,
                quality,
                &scratch_dir,
            );
            debug!("Engine sequence finished in {:?}", instant.elapsed());
            result
        });

        handle
            .await
            .map_err(|e| ResizeError::Engine(format!("resize worker failed: {}", e)))?
    }
}

/// decode -> crop -> scale -> format -> quality -> encode, stopping at the
/// first failing step.
fn run_engine(
    engine: &dyn Engine,
    source: &Path,
    format: &str,
    target: TargetSize,
    limits: OutputLimits,
    quality: u32,
    scratch_dir: &Path,
) -> Result<ScratchFile, ResizeError> {
    let mut session = engine.session();

    session.read(source)?;
    let dimensions = session.dimensions()?;
    let plan = geometry::plan(dimensions, target, limits)?;

    if let Some(region) = plan.crop {
        debug!(
            "Cropping {}x{} source to {}x{}+{}+{}",
            dimensions.width, dimensions.height, region.width, region.height, region.x, region.y,
        );
        session.crop(region)?;
    }

    session.scale(plan.final_width, plan.final_height, FilterType::Lanczos3)?;
    session.set_format(format)?;
    session.set_quality(quality)?;

    let (output, file) = ScratchFile::create_in(scratch_dir)?;
    session.write(file)?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use image::{DynamicImage, GrayImage, Luma};

    use super::*;
    use crate::processor::engine::{EngineSession, ImageCrateEngine, OutputFormat, MAX_QUALITY};
    use crate::processor::geometry::{CropRegion, Dimensions};

    #[derive(Debug, Clone, PartialEq)]
    enum RecordedOp {
        Read,
        Dimensions,
        Crop(CropRegion),
        Scale(u32, u32, FilterType),
        SetFormat(String),
        SetQuality(u32),
        Write,
    }

    /// Records operations without touching pixels, tracking how many
    /// sessions are mid-sequence at once.
    #[derive(Default)]
    struct MockState {
        ops: Mutex<Vec<RecordedOp>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    struct MockEngine {
        dims: Dimensions,
        delay: Duration,
        fail_write: bool,
        state: Arc<MockState>,
    }

    impl MockEngine {
        fn new(width: u32, height: u32) -> Self {
            Self {
                dims: Dimensions::new(width, height),
                delay: Duration::ZERO,
                fail_write: false,
                state: Arc::new(MockState::default()),
            }
        }

        fn ops(&self) -> Vec<RecordedOp> {
            self.state.ops.lock().unwrap().clone()
        }
    }

    struct MockSession {
        dims: Dimensions,
        delay: Duration,
        fail_write: bool,
        state: Arc<MockState>,
    }

    impl MockSession {
        fn record(&self, op: RecordedOp) {
            self.state.ops.lock().unwrap().push(op);
        }
    }

    impl Drop for MockSession {
        fn drop(&mut self) {
            self.state.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Engine for MockEngine {
        fn session(&self) -> Box<dyn EngineSession> {
            let now = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_active.fetch_max(now, Ordering::SeqCst);

            Box::new(MockSession {
                dims: self.dims,
                delay: self.delay,
                fail_write: self.fail_write,
                state: self.state.clone(),
            })
        }
    }

    impl EngineSession for MockSession {
        fn read(&mut self, _path: &Path) -> Result<(), ResizeError> {
            std::thread::sleep(self.delay);
            self.record(RecordedOp::Read);
            Ok(())
        }

        fn dimensions(&self) -> Result<Dimensions, ResizeError> {
            self.record(RecordedOp::Dimensions);
            Ok(self.dims)
        }

        fn crop(&mut self, region: CropRegion) -> Result<(), ResizeError> {
            self.record(RecordedOp::Crop(region));
            Ok(())
        }

        fn scale(&mut self, width: u32, height: u32, filter: FilterType) -> Result<(), ResizeError> {
            self.record(RecordedOp::Scale(width, height, filter));
            Ok(())
        }

        fn set_format(&mut self, format: &str) -> Result<(), ResizeError> {
            self.record(RecordedOp::SetFormat(format.to_string()));
            OutputFormat::parse(format).map(|_| ())
        }

        fn set_quality(&mut self, quality: u32) -> Result<(), ResizeError> {
            self.record(RecordedOp::SetQuality(quality));
            if quality > MAX_QUALITY {
                return Err(ResizeError::InvalidQuality(quality));
            }
            Ok(())
        }

        fn write(&mut self, mut out: File) -> Result<(), ResizeError> {
            self.record(RecordedOp::Write);
            if self.fail_write {
                return Err(ResizeError::Write("disk on fire".to_string()));
            }
            out.write_all(b"encoded")?;
            Ok(())
        }
    }

    fn scratch_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn runs_steps_in_order_with_crop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(100, 100));
        let resizer = Resizer::new(engine.clone(), dir.path().to_path_buf());

        let output = resizer
            .resize(Path::new("src"), "png", TargetSize::new(50, 100), 90)
            .await
            .unwrap();

        assert_eq!(
            engine.ops(),
            vec![
                RecordedOp::Read,
                RecordedOp::Dimensions,
                RecordedOp::Crop(CropRegion { width: 50, height: 100, x: 25, y: 0 }),
                RecordedOp::Scale(50, 100, FilterType::Lanczos3),
                RecordedOp::SetFormat("png".to_string()),
                RecordedOp::SetQuality(90),
                RecordedOp::Write,
            ],
        );
        assert_eq!(std::fs::read(output.path()).unwrap(), b"encoded");
    }

    #[tokio::test]
    async fn taller_source_skips_crop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(100, 400));
        let resizer = Resizer::new(engine.clone(), dir.path().to_path_buf());

        resizer
            .resize(Path::new("src"), "jpg", TargetSize::new(100, 100), 75)
            .await
            .unwrap();

        let ops = engine.ops();
        assert!(!ops.iter().any(|op| matches!(op, RecordedOp::Crop(_))));
        assert!(ops.contains(&RecordedOp::Scale(100, 100, FilterType::Lanczos3)));
    }

    #[tokio::test]
    async fn unset_dimensions_fail_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(100, 100));
        let resizer = Resizer::new(engine.clone(), dir.path().to_path_buf());

        let err = resizer
            .resize(Path::new("src"), "png", TargetSize::new(0, 0), 90)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::InvalidDimensions));
        assert!(engine.ops().is_empty());
    }

    #[tokio::test]
    async fn unsupported_format_stops_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(10, 10));
        let resizer = Resizer::new(engine.clone(), dir.path().to_path_buf());

        let err = resizer
            .resize(Path::new("src"), "psd", TargetSize::new(5, 5), 90)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::UnsupportedFormat(_)));
        assert!(!engine.ops().contains(&RecordedOp::SetQuality(90)));
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn invalid_quality_is_distinguishable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(10, 10));
        let resizer = Resizer::new(engine, dir.path().to_path_buf());

        let err = resizer
            .resize(Path::new("src"), "png", TargetSize::new(5, 5), 250)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::InvalidQuality(250)));
    }

    #[tokio::test]
    async fn oversized_output_never_reaches_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(MockEngine::new(1, 1));
        let resizer = Resizer::new(engine.clone(), dir.path().to_path_buf());

        let err = resizer
            .resize(Path::new("src"), "png", TargetSize::new(200_000, 200_000), 90)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::OutputTooLarge { .. }));
        assert_eq!(engine.ops(), vec![RecordedOp::Read, RecordedOp::Dimensions]);
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn huge_target_on_tiny_source_is_contained() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_source(dir.path(), DynamicImage::ImageLuma8(GrayImage::new(1, 1)));
        let resizer = Resizer::new(Arc::new(ImageCrateEngine), dir.path().to_path_buf())
            .with_limits(OutputLimits {
                max_dimension: 1_000,
                max_pixels: 100_000,
            });

        // Derived height: 1 * 200_000.
        let err = resizer
            .resize(&src, "png", TargetSize::new(200_000, 0), 90)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResizeError::OutputTooLarge { width: 200_000, height: 200_000 }
        ));

        // The gate is released and later requests still go through.
        let output = resizer
            .resize(&src, "png", TargetSize::new(10, 10), 90)
            .await
            .unwrap();
        let img = image::open(output.path()).unwrap();
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[tokio::test]
    async fn failed_write_leaves_no_output_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockEngine::new(10, 10);
        engine.fail_write = true;
        let resizer = Resizer::new(Arc::new(engine), dir.path().to_path_buf());

        let err = resizer
            .resize(Path::new("src"), "png", TargetSize::new(5, 5), 90)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::Write(_)));
        assert_eq!(scratch_entries(dir.path()), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resizes_are_serialized() {
        const CALLS: u32 = 6;
        const DELAY: Duration = Duration::from_millis(25);

        let dir = tempfile::tempdir().unwrap();
        let mut engine = MockEngine::new(100, 100);
        engine.delay = DELAY;
        let state = engine.state.clone();
        let resizer = Arc::new(Resizer::new(Arc::new(engine), dir.path().to_path_buf()));

        let instant = Instant::now();
        let calls = (0..CALLS).map(|_| {
            let resizer = resizer.clone();
            tokio::spawn(async move {
                resizer
                    .resize(Path::new("src"), "png", TargetSize::new(10, 10), 90)
                    .await
            })
        });

        for result in futures::future::join_all(calls).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(state.max_active.load(Ordering::SeqCst), 1);
        assert!(instant.elapsed() >= DELAY * CALLS);
    }

    fn write_source(dir: &Path, img: DynamicImage) -> PathBuf {
        let path = dir.join("source.png");
        img.save_with_format(&path, image::ImageFormat::Png).unwrap();
        path
    }

    #[tokio::test]
    async fn output_sizes_match_requests() {
        // original size, requested size, expected size
        let sizes = [
            ((100, 200), (10, 20), (10, 20)),
            ((100, 200), (10, 0), (10, 20)),
            ((100, 200), (0, 20), (10, 20)),
            ((100, 200), (5, 20), (5, 20)),
            ((100, 200), (500, 0), (500, 1000)),
            ((200, 50), (100, 0), (100, 25)),
            ((200, 50), (100, 100), (100, 100)),
        ];

        let dir = tempfile::tempdir().unwrap();
        let resizer = Resizer::new(Arc::new(ImageCrateEngine), dir.path().to_path_buf());

        for ((ow, oh), (w, h), (ew, eh)) in sizes {
            let src = write_source(dir.path(), DynamicImage::ImageLuma8(GrayImage::new(ow, oh)));
            let output = resizer
                .resize(&src, "jpg", TargetSize::new(w, h), 95)
                .await
                .unwrap();

            let img = image::open(output.path()).unwrap();
            assert_eq!(
                (img.width(), img.height()),
                (ew, eh),
                "{}x{} resized with {}x{}",
                ow,
                oh,
                w,
                h,
            );
        }
    }

    #[tokio::test]
    async fn wider_source_loses_its_outer_strips() {
        let white = Luma([255u8]);
        let gray = Luma([100u8]);

        let mut src = GrayImage::new(100, 100);
        src.put_pixel(24, 24, white);
        src.put_pixel(100 - 25, 100 - 25, white);
        src.put_pixel(25, 25, gray);
        src.put_pixel(100 - 26, 100 - 26, gray);

        let dir = tempfile::tempdir().unwrap();
        let path = write_source(dir.path(), DynamicImage::ImageLuma8(src));
        let resizer = Resizer::new(Arc::new(ImageCrateEngine), dir.path().to_path_buf());

        let output = resizer
            .resize(&path, "png", TargetSize::new(50, 100), 100)
            .await
            .unwrap();

        let img = image::open(output.path()).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (50, 100));

        // The white markers sit just outside the kept region.
        assert!(img.pixels().all(|p| p.0[0] < 200));

        // The gray markers sit just inside it.
        let close = |v: u8| (v as i16 - 100).abs() <= 2;
        assert!(close(img.get_pixel(0, 25).0[0]));
        assert!(close(img.get_pixel(49, 100 - 26).0[0]));
    }

    #[tokio::test]
    async fn corrupt_source_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.png");
        std::fs::write(&path, b"<html>not found</html>").unwrap();

        let resizer = Resizer::new(Arc::new(ImageCrateEngine), dir.path().to_path_buf());
        let err = resizer
            .resize(&path, "png", TargetSize::new(10, 10), 90)
            .await
            .unwrap_err();

        assert!(matches!(err, ResizeError::Decode(_)));
        assert_eq!(scratch_entries(dir.path()), 1);
    }
}
