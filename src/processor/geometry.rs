//! Pure calculation of output dimensions and crop geometry.
//!
//! Nothing here touches the engine, so every rule can be tested with plain
//! numbers. All roundings are round-half-up (`floor(x + 0.5)`).

use crate::errors::ResizeError;

/// Dimensions of a decoded source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// The requested output size, `0` meaning unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_unset(&self) -> bool {
        self.width == 0 && self.height == 0
    }
}

/// A region of the source image, applied before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

impl CropRegion {
    /// Whether the region lies fully inside an image of the given size.
    pub fn fits_within(&self, source: Dimensions) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= source.width as u64
            && self.y as u64 + self.height as u64 <= source.height as u64
    }
}

/// Upper bounds on the size of a produced thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    /// The largest width or height, in pixels.
    pub max_dimension: u32,

    /// The largest `width * height`.
    pub max_pixels: u64,
}

impl OutputLimits {
    pub const DEFAULT_MAX_DIMENSION: u32 = 10_000;
    pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

    /// Whether an image of `width` by `height` stays within the limits.
    pub fn allows(&self, width: u32, height: u32) -> bool {
        width <= self.max_dimension
            && height <= self.max_dimension
            && width as u64 * height as u64 <= self.max_pixels
    }
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_dimension: Self::DEFAULT_MAX_DIMENSION,
            max_pixels: Self::DEFAULT_MAX_PIXELS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub final_width: u32,
    pub final_height: u32,
    pub crop: Option<CropRegion>,
}

#[inline]
fn round_half_up(v: f64) -> u32 {
    (v + 0.5).floor().max(1.0) as u32
}

/// Works out what the engine has to do to turn `source` into `target`.
///
/// - One side unset: the other is derived from the source aspect ratio.
/// - Source wider than the target: an equal strip is cut from the left and
///   right of the source so its aspect matches, then it is scaled.
/// - Otherwise the source is scaled straight to the target, which may
///   stretch it. Taller sources are never cropped.
///
/// Plans whose output would exceed `limits`, derived sides included, are
/// rejected before anything is allocated.
pub fn plan(
    source: Dimensions,
    target: TargetSize,
    limits: OutputLimits,
) -> Result<ResizePlan, ResizeError> {
    let plan = plan_unbounded(source, target)?;
    if !limits.allows(plan.final_width, plan.final_height) {
        return Err(ResizeError::OutputTooLarge {
            width: plan.final_width,
            height: plan.final_height,
        });
    }

    Ok(plan)
}

fn plan_unbounded(source: Dimensions, target: TargetSize) -> Result<ResizePlan, ResizeError> {
    if target.is_unset() {
        return Err(ResizeError::InvalidDimensions);
    }

    if source.width == 0 || source.height == 0 {
        return Err(ResizeError::Decode(format!(
            "source has no pixels ({}x{})",
            source.width, source.height,
        )));
    }

    let ow = source.width as f64;
    let oh = source.height as f64;
    let fw = target.width as f64;
    let fh = target.height as f64;

    if target.width == 0 {
        let scaling = fh / oh;
        return Ok(ResizePlan {
            final_width: round_half_up(scaling * ow),
            final_height: target.height,
            crop: None,
        });
    }

    if target.height == 0 {
        let scaling = fw / ow;
        return Ok(ResizePlan {
            final_width: target.width,
            final_height: round_half_up(scaling * oh),
            crop: None,
        });
    }

    let mut crop = None;
    if ow / oh > fw / fh {
        let scaling = fh / oh;
        let desired_width = round_half_up(fw / scaling);
        let delta = source.width.saturating_sub(desired_width);

        if delta >= 1 {
            crop = Some(CropRegion {
                width: desired_width,
                height: source.height,
                x: delta / 2,
                y: 0,
            });
        }
    }

    Ok(ResizePlan {
        final_width: target.width,
        final_height: target.height,
        crop,
    })
}
