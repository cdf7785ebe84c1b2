use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::{Builder, TempPath};

const SCRATCH_PREFIX: &str = "thumbnailer";

/// A uniquely named local file handed from one pipeline stage to the next.
///
/// The file is removed from disk when this is dropped, so whichever stage
/// owns it last is responsible for its lifetime.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    /// Creates a new empty scratch file in `dir` and returns it along with
    /// an open handle for writing.
    pub fn create_in(dir: &Path) -> io::Result<(Self, File)> {
        let (file, path) = Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempfile_in(dir)?
            .into_parts();

        Ok((Self { path }, file))
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
