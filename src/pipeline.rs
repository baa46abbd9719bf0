use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;

use crate::duration;
use crate::error::{Error, Result};
use crate::output;
use crate::segment::{ChunkSource, FfmpegExtractor};
use crate::transcribe::TranscriptionEngine;

/// Half-open slice [start, end) of the source timeline, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

/// Tiles [0, duration) with contiguous windows of `window_secs`, the last
/// one cut short at the total duration.
pub fn windows(duration: f64, window_secs: f64) -> impl Iterator<Item = Window> {
    (0u64..)
        .take_while(move |i| (*i as f64) * window_secs < duration)
        .map(move |i| Window {
            start: i as f64 * window_secs,
            end: ((i + 1) as f64 * window_secs).min(duration),
        })
}

/// Cooperative stop flag, checked between windows.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One numbered subtitle entry, absolute seconds on the source timeline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Cue {
    pub index: u64,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub subtitle_path: PathBuf,
    pub cues: Vec<Cue>,
    pub windows_skipped: usize,
    pub used_fallback: bool,
    pub cancelled: bool,
}

/// Walks the source in fixed windows, transcribes each one, and streams
/// numbered cues to the subtitle sink as they are produced.
///
/// A failed window is logged and skipped; it never consumes a cue index
/// and never aborts the job. When the duration probe comes up empty the
/// whole file goes through the engine in a single pass instead.
pub struct SegmentedTranscriber<E, X = FfmpegExtractor> {
    engine: E,
    extractor: X,
    window_secs: f64,
    cancel: CancelToken,
}

impl<E: TranscriptionEngine> SegmentedTranscriber<E> {
    pub fn new(engine: E, window_secs: f64) -> anyhow::Result<Self> {
        let extractor = FfmpegExtractor::new()?;
        Ok(Self::with_extractor(engine, extractor, window_secs)?)
    }
}

impl<E: TranscriptionEngine, X: ChunkSource> SegmentedTranscriber<E, X> {
    pub fn with_extractor(engine: E, extractor: X, window_secs: f64) -> Result<Self> {
        if !window_secs.is_finite() || window_secs <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "window length must be positive, got {window_secs}"
            )));
        }

        Ok(Self {
            engine,
            extractor,
            window_secs,
            cancel: CancelToken::new(),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(
        &mut self,
        audio: &Path,
        subtitle_path: &Path,
        pb: &ProgressBar,
    ) -> Result<JobOutcome> {
        let sink = File::create(subtitle_path).map_err(Error::OutputSink)?;
        let mut sink = BufWriter::new(sink);

        let mut outcome = JobOutcome {
            subtitle_path: subtitle_path.to_path_buf(),
            cues: Vec::new(),
            windows_skipped: 0,
            used_fallback: false,
            cancelled: false,
        };

        match duration::probe_duration(audio) {
            Ok(total) => self.run_segmented(audio, total, &mut sink, pb, &mut outcome)?,
            Err(Error::DurationUnavailable) => {
                log::warn!(
                    "duration probe exhausted all strategies, transcribing {audio:?} in one pass"
                );
                self.run_whole_file(audio, &mut sink, &mut outcome)?;
            }
            Err(e) => return Err(e),
        }

        sink.flush().map_err(Error::OutputSink)?;
        Ok(outcome)
    }

    fn run_segmented(
        &mut self,
        audio: &Path,
        total: f64,
        sink: &mut impl Write,
        pb: &ProgressBar,
        outcome: &mut JobOutcome,
    ) -> Result<()> {
        pb.set_length((total / self.window_secs).ceil() as u64);

        let mut next_index: u64 = 1;

        for window in windows(total, self.window_secs) {
            if self.cancel.is_cancelled() {
                log::info!("cancelled after {:.1}s of {:.1}s", window.start, total);
                outcome.cancelled = true;
                break;
            }

            let chunk = match self.extractor.extract(audio, window.start, window.end) {
                Ok(chunk) => chunk,
                Err(e) => {
                    log::warn!("skipping window: {e}");
                    outcome.windows_skipped += 1;
                    pb.inc(1);
                    continue;
                }
            };

            match self.engine.transcribe(chunk.path(), true) {
                Ok(raw_segments) => {
                    for raw in raw_segments {
                        let cue = Cue {
                            index: next_index,
                            start: window.start + raw.start,
                            end: window.start + raw.end,
                            text: raw.text.trim().to_string(),
                        };
                        output::write_cue(sink, cue.index, cue.start, cue.end, &cue.text)?;
                        next_index += 1;
                        outcome.cues.push(cue);
                    }
                }
                Err(cause) => {
                    log::warn!(
                        "skipping window {:.1}s..{:.1}s, transcription failed: {cause}",
                        window.start,
                        window.end
                    );
                    outcome.windows_skipped += 1;
                }
            }

            pb.inc(1);
            // chunk handle drops here, removing the file before the next window
        }

        Ok(())
    }

    fn run_whole_file(
        &mut self,
        audio: &Path,
        sink: &mut impl Write,
        outcome: &mut JobOutcome,
    ) -> Result<()> {
        outcome.used_fallback = true;

        let raw_segments = self
            .engine
            .transcribe(audio, false)
            .map_err(Error::Transcription)?;

        for (i, raw) in raw_segments.into_iter().enumerate() {
            let cue = Cue {
                index: i as u64 + 1,
                start: raw.start,
                end: raw.end,
                text: raw.text.trim().to_string(),
            };
            output::write_cue(sink, cue.index, cue.start, cue.end, &cue.text)?;
            outcome.cues.push(cue);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::ChunkFile;
    use crate::transcribe::RawSegment;
    use std::cell::{Cell, RefCell};
    use std::fs;
    use std::rc::Rc;

    fn write_wav(path: &Path, secs: f64) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..(secs * 100.0) as u32 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// Returns the same segments on every call and records what it saw.
    #[derive(Default)]
    struct ScriptedEngine {
        segments: Vec<RawSegment>,
        fail_on_call: Option<usize>,
        fail_always: bool,
        cancel_after_call: Option<CancelToken>,
        calls: Rc<RefCell<Vec<(PathBuf, bool)>>>,
    }

    impl ScriptedEngine {
        fn returning(segments: Vec<RawSegment>) -> Self {
            Self {
                segments,
                ..Self::default()
            }
        }
    }

    impl TranscriptionEngine for ScriptedEngine {
        fn transcribe(
            &mut self,
            audio: &Path,
            word_timestamps: bool,
        ) -> anyhow::Result<Vec<RawSegment>> {
            let nth = self.calls.borrow().len();
            self.calls.borrow_mut().push((audio.to_path_buf(), word_timestamps));

            if self.fail_always || self.fail_on_call == Some(nth) {
                anyhow::bail!("scripted engine failure");
            }
            if let Some(token) = &self.cancel_after_call {
                token.cancel();
            }

            Ok(self.segments.clone())
        }
    }

    /// Writes placeholder chunk files instead of calling ffmpeg.
    struct FakeExtractor {
        dir: PathBuf,
        fail_windows: Vec<usize>,
        created: Rc<RefCell<Vec<PathBuf>>>,
        calls: Cell<usize>,
    }

    impl FakeExtractor {
        fn new(dir: &Path) -> Self {
            Self {
                dir: dir.to_path_buf(),
                fail_windows: Vec::new(),
                created: Rc::default(),
                calls: Cell::new(0),
            }
        }

        fn failing_on(dir: &Path, windows: Vec<usize>) -> Self {
            Self {
                fail_windows: windows,
                ..Self::new(dir)
            }
        }
    }

    impl ChunkSource for FakeExtractor {
        fn extract(&self, _source: &Path, start: f64, end: f64) -> Result<ChunkFile> {
            let nth = self.calls.get();
            self.calls.set(nth + 1);

            if self.fail_windows.contains(&nth) {
                return Err(Error::SegmentExtraction {
                    start,
                    end,
                    cause: anyhow::anyhow!("scripted extraction failure"),
                });
            }

            let path = self.dir.join(format!(
                "chunk_{:08}_{:08}.wav",
                (start * 1000.0) as u64,
                (end * 1000.0) as u64
            ));
            fs::write(&path, b"fake pcm").unwrap();
            self.created.borrow_mut().push(path.clone());

            Ok(ChunkFile::new(path))
        }
    }

    fn hi_segment() -> Vec<RawSegment> {
        vec![RawSegment {
            start: 5.0,
            end: 10.0,
            text: " hi ".to_string(),
        }]
    }

    #[test]
    fn windows_tile_duration_exactly() {
        let all: Vec<Window> = windows(65.0, 30.0).collect();

        assert_eq!(
            all,
            vec![
                Window { start: 0.0, end: 30.0 },
                Window { start: 30.0, end: 60.0 },
                Window { start: 60.0, end: 65.0 },
            ]
        );
    }

    #[test]
    fn windows_are_contiguous_for_awkward_lengths() {
        let tiled: Vec<Window> = windows(123.4, 7.5).collect();

        assert_eq!(tiled.first().unwrap().start, 0.0);
        assert_eq!(tiled.last().unwrap().end, 123.4);
        for pair in tiled.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn exact_multiple_duration_has_no_empty_tail_window() {
        let all: Vec<Window> = windows(60.0, 30.0).collect();

        assert_eq!(all.len(), 2);
        assert_eq!(all[1].end, 60.0);
    }

    #[test]
    fn rejects_non_positive_window_length() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScriptedEngine::default();
        let extractor = FakeExtractor::new(dir.path());

        assert!(matches!(
            SegmentedTranscriber::with_extractor(engine, extractor, 0.0),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn offsets_cues_into_the_global_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(hi_segment());
        let calls = engine.calls.clone();
        let extractor = FakeExtractor::new(dir.path());
        let created = extractor.created.clone();

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert!(!outcome.used_fallback);
        assert_eq!(outcome.windows_skipped, 0);

        let cues: Vec<(u64, f64, f64)> = outcome
            .cues
            .iter()
            .map(|c| (c.index, c.start, c.end))
            .collect();
        assert_eq!(cues, vec![(1, 5.0, 10.0), (2, 35.0, 40.0), (3, 65.0, 70.0)]);
        assert!(outcome.cues.iter().all(|c| c.text == "hi"));

        // every per-window call asked for word-level timestamps
        assert_eq!(calls.borrow().len(), 3);
        assert!(calls.borrow().iter().all(|(_, words)| *words));

        let content = fs::read_to_string(&srt).unwrap();
        assert_eq!(
            content,
            "1\n00:00:05,000 --> 00:00:10,000\nhi\n\n\
             2\n00:00:35,000 --> 00:00:40,000\nhi\n\n\
             3\n00:01:05,000 --> 00:01:10,000\nhi\n\n"
        );

        // no chunk survives the run
        assert_eq!(created.borrow().len(), 3);
        assert!(created.borrow().iter().all(|p| !p.exists()));
    }

    #[test]
    fn extraction_failure_skips_window_without_consuming_indices() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(hi_segment());
        let extractor = FakeExtractor::failing_on(dir.path(), vec![1]);

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert_eq!(outcome.windows_skipped, 1);

        let cues: Vec<(u64, f64)> = outcome.cues.iter().map(|c| (c.index, c.start)).collect();
        assert_eq!(cues, vec![(1, 5.0), (2, 65.0)]);
    }

    #[test]
    fn engine_failure_is_window_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let mut engine = ScriptedEngine::returning(hi_segment());
        engine.fail_on_call = Some(0);
        let extractor = FakeExtractor::new(dir.path());
        let created = extractor.created.clone();

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert_eq!(outcome.windows_skipped, 1);
        let cues: Vec<(u64, f64)> = outcome.cues.iter().map(|c| (c.index, c.start)).collect();
        assert_eq!(cues, vec![(1, 35.0), (2, 65.0)]);

        // the failed window's chunk was still cleaned up
        assert!(created.borrow().iter().all(|p| !p.exists()));
    }

    #[test]
    fn all_windows_failing_still_yields_a_valid_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(hi_segment());
        let extractor = FakeExtractor::failing_on(dir.path(), vec![0, 1, 2]);

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert_eq!(outcome.windows_skipped, 3);
        assert!(outcome.cues.is_empty());
        assert_eq!(fs::read_to_string(&srt).unwrap(), "");
    }

    #[test]
    fn whitespace_only_text_is_trimmed_but_still_emitted() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 20.0);
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(vec![RawSegment {
            start: 1.0,
            end: 2.0,
            text: "   \n".to_string(),
        }]);
        let extractor = FakeExtractor::new(dir.path());

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert_eq!(outcome.cues.len(), 1);
        assert_eq!(outcome.cues[0].text, "");
        assert_eq!(
            fs::read_to_string(&srt).unwrap(),
            "1\n00:00:01,000 --> 00:00:02,000\n\n\n"
        );
    }

    #[test]
    fn duration_probe_failure_falls_back_to_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.bin");
        fs::write(&audio, b"not audio at all").unwrap();
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(vec![RawSegment {
            start: 0.5,
            end: 2.0,
            text: "fallback text".to_string(),
        }]);
        let calls = engine.calls.clone();
        let extractor = FakeExtractor::new(dir.path());
        let chunks_created = extractor.created.clone();

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert!(outcome.used_fallback);
        assert_eq!(outcome.windows_skipped, 0);

        // exactly one engine call, on the original file, without word timestamps
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0], (audio.clone(), false));
        assert!(chunks_created.borrow().is_empty());

        // engine-native timestamps, no window offset applied
        let cues: Vec<(u64, f64, f64)> = outcome
            .cues
            .iter()
            .map(|c| (c.index, c.start, c.end))
            .collect();
        assert_eq!(cues, vec![(1, 0.5, 2.0)]);
        assert_eq!(
            fs::read_to_string(&srt).unwrap(),
            "1\n00:00:00,500 --> 00:00:02,000\nfallback text\n\n"
        );
    }

    #[test]
    fn whole_file_fallback_engine_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.bin");
        fs::write(&audio, b"not audio at all").unwrap();
        let srt = dir.path().join("audio.srt");

        let mut engine = ScriptedEngine::default();
        engine.fail_always = true;
        let extractor = FakeExtractor::new(dir.path());

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        let result = transcriber.run(&audio, &srt, &ProgressBar::hidden());

        assert!(matches!(result, Err(Error::Transcription(_))));
    }

    #[test]
    fn cancel_between_windows_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let mut engine = ScriptedEngine::returning(hi_segment());
        let extractor = FakeExtractor::new(dir.path());
        let created = extractor.created.clone();

        let token = CancelToken::new();
        engine.cancel_after_call = Some(token.clone());

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        // hand the transcriber the pre-wired token
        transcriber.cancel = token;
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert!(outcome.cancelled);

        // only the first window completed, and its output is intact
        let cues: Vec<(u64, f64)> = outcome.cues.iter().map(|c| (c.index, c.start)).collect();
        assert_eq!(cues, vec![(1, 5.0)]);
        assert_eq!(
            fs::read_to_string(&srt).unwrap(),
            "1\n00:00:05,000 --> 00:00:10,000\nhi\n\n"
        );

        // in-flight chunks were removed before exit
        assert_eq!(created.borrow().len(), 1);
        assert!(created.borrow().iter().all(|p| !p.exists()));
    }

    #[test]
    fn pre_cancelled_job_writes_an_empty_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("audio.wav");
        write_wav(&audio, 65.0);
        let srt = dir.path().join("audio.srt");

        let engine = ScriptedEngine::returning(hi_segment());
        let extractor = FakeExtractor::new(dir.path());

        let mut transcriber =
            SegmentedTranscriber::with_extractor(engine, extractor, 30.0).unwrap();
        transcriber.cancel_token().cancel();
        let outcome = transcriber
            .run(&audio, &srt, &ProgressBar::hidden())
            .unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.cues.is_empty());
        assert_eq!(fs::read_to_string(&srt).unwrap(), "");
    }
}
