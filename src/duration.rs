use std::fs::File;
use std::path::Path;

use anyhow::ensure;

use crate::error::{Error, Result};

/// One way of measuring the length of an audio file, in seconds.
trait DurationStrategy {
    fn name(&self) -> &'static str;
    fn probe(&self, path: &Path) -> anyhow::Result<f64>;
}

/// Reads frame count and sample rate from the WAV header, no decode.
struct WavHeader;

impl DurationStrategy for WavHeader {
    fn name(&self) -> &'static str {
        "wav-header"
    }

    fn probe(&self, path: &Path) -> anyhow::Result<f64> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        ensure!(spec.sample_rate > 0, "header reports a zero sample rate");
        Ok(reader.duration() as f64 / spec.sample_rate as f64)
    }
}

/// Decodes the whole stream and counts samples. Slow, but handles
/// containers the header read chokes on.
struct FullDecode;

impl DurationStrategy for FullDecode {
    fn name(&self) -> &'static str {
        "full-decode"
    }

    fn probe(&self, path: &Path) -> anyhow::Result<f64> {
        let mut reader = audrey::Reader::new(File::open(path)?)?;
        let desc = reader.description();
        let channels = desc.channel_count();
        let rate = desc.sample_rate();

        ensure!(channels > 0 && rate > 0, "stream reports no channels or rate");

        let mut samples = 0u64;
        for sample in reader.samples::<i16>() {
            let _: i16 = sample?;
            samples += 1;
        }

        Ok(samples as f64 / (channels as f64 * rate as f64))
    }
}

/// Tries each probe strategy in order until one yields a duration.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let strategies: [&dyn DurationStrategy; 2] = [&WavHeader, &FullDecode];

    for strategy in strategies {
        match strategy.probe(path) {
            Ok(secs) => {
                log::debug!("{} measured {:?} at {:.2}s", strategy.name(), path, secs);
                return Ok(secs);
            }
            Err(e) => {
                log::debug!("duration strategy {} failed for {:?}: {}", strategy.name(), path, e);
            }
        }
    }

    Err(Error::DurationUnavailable)
}
