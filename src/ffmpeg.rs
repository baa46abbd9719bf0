use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid UTF-8: {:?}", path))
}

fn run_ffmpeg(args: &[&str]) -> Result<()> {
    let mut child = Command::new("ffmpeg")
        .args(args)
        .args(["-hide_banner", "-y", "-loglevel", "error"])
        .stdin(Stdio::null())
        .spawn()
        .context("failed to spawn ffmpeg, is it installed?")?;

    let status = child.wait()?;
    if !status.success() {
        bail!("ffmpeg exited with {status}");
    }

    Ok(())
}

/// Extracts the audio track of `input` into a standalone WAV file.
///
/// The first attempt resamples to the 16kHz mono s16le layout the
/// transcription engine expects; if that fails, a second attempt lets
/// ffmpeg pick codec defaults for the container.
pub fn extract_audio(input: &Path, output: &Path) -> Result<()> {
    let input = path_str(input)?;
    let output = path_str(output)?;

    let attempts: [&[&str]; 2] = [
        &["-vn", "-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"],
        &["-vn"],
    ];

    for (nth, codec_args) in attempts.iter().enumerate() {
        let mut args: Vec<&str> = vec!["-i", input];
        args.extend_from_slice(codec_args);
        args.push(output);

        match run_ffmpeg(&args) {
            Ok(()) => return Ok(()),
            Err(e) => log::warn!("audio extraction attempt {} failed: {e}", nth + 1),
        }
    }

    bail!("all audio extraction attempts failed for {input}");
}

/// Slices `[start, end)` seconds out of `input` as 16kHz mono s16le WAV.
pub fn slice_audio(input: &Path, start: f64, end: f64, output: &Path) -> Result<()> {
    let length = end - start;

    run_ffmpeg(&[
        "-ss",
        &format!("{start:.3}"),
        "-i",
        path_str(input)?,
        "-t",
        &format!("{length:.3}"),
        "-ar",
        "16000",
        "-ac",
        "1",
        "-c:a",
        "pcm_s16le",
        path_str(output)?,
    ])
}
