use std::io;

use thiserror::Error;

/// Failures of the subtitle pipeline.
///
/// `SegmentExtraction` and per-window transcription failures are recovered
/// inside the window loop; the remaining variants abort the job.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not determine audio duration")]
    DurationUnavailable,

    #[error("failed to extract audio for window {start:.1}s..{end:.1}s: {cause}")]
    SegmentExtraction {
        start: f64,
        end: f64,
        cause: anyhow::Error,
    },

    #[error("transcription failed: {0}")]
    Transcription(anyhow::Error),

    #[error("failed to write subtitle output: {0}")]
    OutputSink(io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
