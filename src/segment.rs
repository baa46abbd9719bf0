use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::ffmpeg;

/// Audio chunk on disk, deleted when the handle drops.
///
/// The extractor hands ownership to the caller; whichever scope holds the
/// handle last is the one that removes the file, including on early exits.
pub struct ChunkFile {
    path: PathBuf,
}

impl ChunkFile {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChunkFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("failed to remove chunk {:?}: {}", self.path, e);
        }
    }
}

/// Produces one self-contained 16kHz mono chunk per window.
pub trait ChunkSource {
    fn extract(&self, source: &Path, start: f64, end: f64) -> Result<ChunkFile>;
}

/// Slices windows out of the source with the system ffmpeg binary.
///
/// Chunks live in a scratch directory unique to this job; file names carry
/// the window bounds so no two windows ever collide.
pub struct FfmpegExtractor {
    workdir: TempDir,
}

impl FfmpegExtractor {
    pub fn new() -> anyhow::Result<Self> {
        let workdir =
            TempDir::with_prefix("subgen-chunks-").context("failed to create chunk directory")?;
        Ok(Self { workdir })
    }
}

impl ChunkSource for FfmpegExtractor {
    fn extract(&self, source: &Path, start: f64, end: f64) -> Result<ChunkFile> {
        let file_name = format!(
            "chunk_{:08}_{:08}.wav",
            (start * 1000.0) as u64,
            (end * 1000.0) as u64
        );
        let path = self.workdir.path().join(file_name);

        match ffmpeg::slice_audio(source, start, end, &path) {
            Ok(()) => Ok(ChunkFile::new(path)),
            Err(cause) => {
                // ffmpeg can leave a partial file behind on failure
                let _ = fs::remove_file(&path);
                Err(Error::SegmentExtraction { start, end, cause })
            }
        }
    }
}
