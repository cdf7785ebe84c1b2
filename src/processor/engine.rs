//! The image engine seam.
//!
//! An [`Engine`] hands out one [`EngineSession`] per resize; the session owns
//! the decoded image and is torn down when dropped. Sessions are not meant to
//! run concurrently, the resizer gates access to them.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, ImageOutputFormat};
use strum::{AsRefStr, EnumString};

use crate::errors::ResizeError;
use crate::processor::geometry::{CropRegion, Dimensions};

/// The highest accepted compression quality.
pub const MAX_QUALITY: u32 = 100;

/// Container formats the engine can write.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[strum(serialize = "jpeg", serialize = "jpg")]
    Jpeg,
    Png,
    Gif,
    Bmp,
    #[strum(serialize = "tiff", serialize = "tif")]
    Tiff,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self, ResizeError> {
        raw.trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| ResizeError::UnsupportedFormat(raw.to_string()))
    }
}

/// A single use handle on the engine's state.
pub trait EngineSession: Send {
    fn read(&mut self, path: &Path) -> Result<(), ResizeError>;

    fn dimensions(&self) -> Result<Dimensions, ResizeError>;

    fn crop(&mut self, region: CropRegion) -> Result<(), ResizeError>;

    fn scale(&mut self, width: u32, height: u32, filter: FilterType) -> Result<(), ResizeError>;

    fn set_format(&mut self, format: &str) -> Result<(), ResizeError>;

    fn set_quality(&mut self, quality: u32) -> Result<(), ResizeError>;

    fn write(&mut self, out: File) -> Result<(), ResizeError>;
}

pub trait Engine: Sync + Send + 'static {
    fn session(&self) -> Box<dyn EngineSession>;
}

/// The production engine, backed by the `image` crate.
#[derive(Default)]
pub struct ImageCrateEngine;

impl Engine for ImageCrateEngine {
    fn session(&self) -> Box<dyn EngineSession> {
        Box::new(ImageCrateSession::default())
    }
}

#[derive(Default)]
pub struct ImageCrateSession {
    img: Option<DynamicImage>,
    format: Option<OutputFormat>,
    quality: Option<u8>,
}

impl ImageCrateSession {
    fn image(&self) -> Result<&DynamicImage, ResizeError> {
        self.img
            .as_ref()
            .ok_or_else(|| ResizeError::Engine("no image has been read".to_string()))
    }
}

impl EngineSession for ImageCrateSession {
    fn read(&mut self, path: &Path) -> Result<(), ResizeError> {
        let img = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ResizeError::Decode(e.to_string()))?;

        self.img = Some(img);
        Ok(())
    }

    fn dimensions(&self) -> Result<Dimensions, ResizeError> {
        let img = self.image()?;
        Ok(Dimensions::new(img.width(), img.height()))
    }

    fn crop(&mut self, region: CropRegion) -> Result<(), ResizeError> {
        let source = self.dimensions()?;
        if !region.fits_within(source) {
            return Err(ResizeError::Crop {
                width: region.width,
                height: region.height,
                x: region.x,
                y: region.y,
                source_width: source.width,
                source_height: source.height,
            });
        }

        let cropped = self
            .image()?
            .crop_imm(region.x, region.y, region.width, region.height);
        self.img = Some(cropped);
        Ok(())
    }

    fn scale(&mut self, width: u32, height: u32, filter: FilterType) -> Result<(), ResizeError> {
        if width == 0 || height == 0 {
            return Err(ResizeError::Scale {
                width,
                height,
                reason: "target has no pixels".to_string(),
            });
        }

        let scaled = self.image()?.resize_exact(width, height, filter);
        self.img = Some(scaled);
        Ok(())
    }

    fn set_format(&mut self, format: &str) -> Result<(), ResizeError> {
        let format = OutputFormat::parse(format)?;
        let name: &str = format.as_ref();
        debug!("Output format set to {}", name);
        self.format = Some(format);
        Ok(())
    }

    fn set_quality(&mut self, quality: u32) -> Result<(), ResizeError> {
        if quality > MAX_QUALITY {
            return Err(ResizeError::InvalidQuality(quality));
        }

        self.quality = Some(quality as u8);
        Ok(())
    }

    fn write(&mut self, out: File) -> Result<(), ResizeError> {
        let img = self.image()?;
        let format = self
            .format
            .ok_or_else(|| ResizeError::Engine("no output format set".to_string()))?;
        let quality = self.quality.unwrap_or(MAX_QUALITY as u8);

        let mut writer = BufWriter::new(out);
        encode(img, format, quality, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Maps the tens digit of the quality to a zlib effort, the same way
/// ImageMagick treats PNG quality.
fn png_compression(quality: u8) -> CompressionType {
    match quality / 10 {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
    writer: &mut BufWriter<File>,
) -> Result<(), ResizeError> {
    let result = match format {
        OutputFormat::Jpeg => {
            // JPEG only takes 8 bit gray or rgb.
            let img = match img {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => Cow::Borrowed(img),
                other => Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
            };

            JpegEncoder::new_with_quality(writer, quality.max(1)).write_image(
                img.as_bytes(),
                img.width(),
                img.height(),
                img.color(),
            )
        },
        OutputFormat::Png => PngEncoder::new_with_quality(
            writer,
            png_compression(quality),
            PngFilter::Adaptive,
        )
        .write_image(img.as_bytes(), img.width(), img.height(), img.color()),
        OutputFormat::Gif => img.write_to(writer, ImageOutputFormat::Gif),
        OutputFormat::Bmp => img.write_to(writer, ImageOutputFormat::Bmp),
        OutputFormat::Tiff => img.write_to(writer, ImageOutputFormat::Tiff),
    };

    result.map_err(|e| ResizeError::Write(e.to_string()))
}
