use std::ffi::c_int;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::config::WhisperConfig;
use crate::transcribe::{RawSegment, TranscriptionEngine};

const DEFAULT_BEAM_SIZE: u32 = 5;
const DEFAULT_PATIENCE: f32 = 1.0;

/// whisper.cpp engine. The model is loaded once and reused for every
/// window of the job.
pub struct Whisper {
    ctx: WhisperContext,
    conf: WhisperConfig,
    lang: String,
}

impl Whisper {
    pub fn new(model_path: &Path, lang: &str, conf: WhisperConfig) -> Result<Self> {
        let model_path = model_path
            .to_str()
            .ok_or_else(|| anyhow!("model path is not valid UTF-8: {:?}", model_path))?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(model_path, params)
            .context("failed to load whisper model")?;

        Ok(Self {
            ctx,
            conf,
            lang: lang.to_string(),
        })
    }
}

impl TranscriptionEngine for Whisper {
    fn transcribe(
        &mut self,
        audio: &Path,
        word_timestamps: bool,
    ) -> Result<Vec<RawSegment>> {
        // make parameters
        let mut params = FullParams::new(whisper_rs::SamplingStrategy::BeamSearch {
            beam_size: self.conf.beam_size.unwrap_or(DEFAULT_BEAM_SIZE) as c_int,
            patience: self.conf.patience.unwrap_or(DEFAULT_PATIENCE),
        });

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_token_timestamps(word_timestamps);
        params.set_temperature(self.conf.temperature.unwrap_or(0.0));
        params.set_language(Some(self.lang.as_str()));
        if let Some(prompt) = self.conf.initial_prompt.as_ref() {
            params.set_initial_prompt(prompt);
        }

        let samples = read_samples(audio)?;

        let mut state = self.ctx.create_state()?;
        state.full(params, &samples)?;

        let num_segments = state.full_n_segments();
        let mut segments = Vec::with_capacity(num_segments.max(0) as usize);

        for segment in state.as_iter() {
            let text = segment.to_str_lossy()?.to_string();
            // whisper reports centiseconds
            let start = segment.start_timestamp() as f64 / 100.0;
            let end = segment.end_timestamp() as f64 / 100.0;

            segments.push(RawSegment { start, end, text });
        }

        Ok(segments)
    }
}

// Inputs are the pipeline's own 16kHz mono s16le WAVs, so a plain sample
// read is enough here.
fn read_samples(path: &Path) -> Result<Vec<f32>> {
    let mut reader = audrey::Reader::new(File::open(path)?)?;
    let audio_buf: Vec<i16> = reader.samples().collect::<Result<_, _>>()?;

    let mut output = vec![0.0f32; audio_buf.len()];
    whisper_rs::convert_integer_to_float_audio(&audio_buf, &mut output)?;

    Ok(output)
}
