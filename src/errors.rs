use std::path::PathBuf;

use thiserror::Error;

/// The request itself is malformed or insufficient.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("width and height of image cannot both be unset")]
    MissingDimensions,

    #[error("source url {0:?} is not a valid url: {1}")]
    InvalidUrl(String, String),

    #[error("output format must not be empty")]
    MissingFormat,

    #[error("requested size {width}x{height} exceeds the maximum of {max} pixels per side")]
    DimensionsTooLarge { width: u32, height: u32, max: u32 },
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Error getting the file '{url}': HTTP {status}")]
    Status { status: u16, url: String },

    #[error("Error getting the file '{url}': {reason}")]
    Transport { url: String, reason: String },

    #[error("Error getting the file '{url}': timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("Unable to write fetched file to scratch storage: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the resize stage, one variant per engine step.
#[derive(Error, Debug)]
pub enum ResizeError {
    #[error("width and height of image cannot both be unset")]
    InvalidDimensions,

    #[error("Unable to decode source image: {0}")]
    Decode(String),

    #[error("Invalid crop region {width}x{height}+{x}+{y} for a {source_width}x{source_height} image")]
    Crop {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
        source_width: u32,
        source_height: u32,
    },

    #[error("Output of {width}x{height} exceeds the configured size limits")]
    OutputTooLarge { width: u32, height: u32 },

    #[error("Unable to scale image to {width}x{height}: {reason}")]
    Scale {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Unsupported output format {0:?}")]
    UnsupportedFormat(String),

    #[error("Invalid compression quality {0}, expected a value between 0 and 100")]
    InvalidQuality(u32),

    #[error("Unable to encode image: {0}")]
    Write(String),

    #[error("Scratch storage failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image engine failure: {0}")]
    Engine(String),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Unable to open file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to load storage credentials: {0}")]
    Credentials(String),

    #[error("Unknown storage region {0:?}")]
    InvalidRegion(String),

    #[error("Remote storage failure: {0}")]
    Storage(String),

    #[error("Upload timed out after {0}s")]
    Timeout(u64),
}

/// Startup only, the one fatal kind of error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config has already been initialised")]
    AlreadyInitialised,
}

/// Any per-request failure, contained to the request that produced it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resize(#[from] ResizeError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl PipelineError {
    /// The name of the stage that failed, for logging.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Fetch(_) => "fetch",
            Self::Resize(_) => "resize",
            Self::Publish(_) => "publish",
        }
    }
}
