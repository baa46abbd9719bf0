use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::pipeline::Cue;

/// Renders a seconds offset as an SRT timestamp, `HH:MM:SS,mmm`.
/// Fractional milliseconds are truncated, not rounded.
pub fn format_timestamp(seconds: f64) -> Result<String> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::InvalidInput(format!(
            "timestamp must be a non-negative number of seconds, got {seconds}"
        )));
    }

    let ms = (seconds * 1000.0) as u64;

    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let secs = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    Ok(format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis))
}

/// Writes one numbered cue block. The caller guarantees start <= end.
pub fn write_cue<W: Write>(w: &mut W, index: u64, start: f64, end: f64, text: &str) -> Result<()> {
    let start = format_timestamp(start)?;
    let end = format_timestamp(end)?;

    write!(w, "{}\n{} --> {}\n{}\n\n", index, start, end, text).map_err(Error::OutputSink)
}

pub fn save_transcript_json(path: &Path, cues: &[Cue]) -> Result<()> {
    let file = File::create(path).map_err(Error::OutputSink)?;
    serde_json::to_writer_pretty(file, cues).map_err(|e| Error::OutputSink(e.into()))?;
    Ok(())
}
