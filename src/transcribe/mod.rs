pub mod whisper_cpp;

use std::path::Path;

/// One recognized utterance, offsets in seconds relative to the audio
/// resource handed to the engine.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Black-box speech recognition over a single audio resource.
pub trait TranscriptionEngine {
    /// Transcribes `audio`, optionally requesting word-level timestamps.
    /// Segments come back ordered; an empty list is a valid result.
    fn transcribe(
        &mut self,
        audio: &Path,
        word_timestamps: bool,
    ) -> anyhow::Result<Vec<RawSegment>>;
}
