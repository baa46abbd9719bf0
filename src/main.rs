mod config;
mod duration;
mod error;
mod ffmpeg;
mod output;
mod pipeline;
mod segment;
mod transcribe;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::ModelSize;
use crate::pipeline::SegmentedTranscriber;
use crate::transcribe::whisper_cpp::Whisper;

const DEFAULT_WINDOW_SECS: f64 = 30.0;

#[derive(Parser)]
#[command(name = "subgen")]
#[command(about = "Generate SRT subtitles from video and audio files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the audio track and transcribe it into an SRT file
    Run(RunArgs),

    /// Extract the audio track to a 16kHz mono WAV file
    Extract(ExtractArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Input video or audio file
    input: PathBuf,

    /// Whisper model size
    #[arg(short, long, value_enum, default_value_t = ModelSize::Medium)]
    model: ModelSize,

    /// Explicit path to a ggml model file
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Window length in seconds (default: 30)
    #[arg(short, long)]
    window: Option<f64>,

    /// Spoken language code (default: auto)
    #[arg(short, long)]
    lang: Option<String>,

    /// Output SRT path (default: input with .srt extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output directory (default: next to the input)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Keep the extracted audio file after the job
    #[arg(long)]
    keep_audio: bool,

    /// Stop after audio extraction
    #[arg(long)]
    audio_only: bool,

    /// Configuration profile name or file path
    #[arg(short, long)]
    profile: Option<String>,

    /// Also write the cue list as JSON next to the SRT file
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ExtractArgs {
    /// Input video or audio file
    input: PathBuf,

    /// Output WAV path (default: input with .wav extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_job(args),
        Commands::Extract(args) => extract(args),
    }
}

fn run_job(args: RunArgs) -> anyhow::Result<()> {
    let input = args.input.canonicalize().context("failed to find input file")?;
    let file_stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .context("input file has no usable name")?
        .to_string();
    let parent = input
        .parent()
        .context("input file has no parent directory")?
        .to_path_buf();

    let out_dir = match args.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create output directory {dir:?}"))?;
            dir
        }
        None => parent,
    };

    let srt_path = args
        .output
        .unwrap_or_else(|| out_dir.join(format!("{file_stem}.srt")));
    let wav_path = out_dir.join(format!("{file_stem}.wav"));

    // profile overrides defaults, flags override the profile
    let run_config = match args.profile.as_deref() {
        Some(p) => {
            let path = config::resolve_profile_path(p)?;
            config::load_run_config(&path).context("failed to load run profile")?
        }
        None => config::RunConfig::default(),
    };

    let window_secs = args
        .window
        .or(run_config.window_secs)
        .unwrap_or(DEFAULT_WINDOW_SECS);
    let lang = args
        .lang
        .or(run_config.language)
        .unwrap_or_else(|| "auto".to_string());
    let whisper_conf = run_config.whisper.unwrap_or_default();

    // an input that already is the target WAV is used as-is and never deleted
    let (audio_path, owns_audio) = if wav_path == input {
        (input.clone(), false)
    } else {
        println!("Extracting audio from {input:?}...");
        ffmpeg::extract_audio(&input, &wav_path).context("audio extraction failed")?;
        println!("Audio saved to {wav_path:?}");
        (wav_path, true)
    };

    if args.audio_only {
        return Ok(());
    }

    println!("Loading {} model...", args.model);
    let model_path = config::resolve_model_path(args.model_path.as_deref(), args.model)?;
    let engine =
        Whisper::new(&model_path, &lang, whisper_conf).context("failed to load whisper model")?;

    let mut transcriber = SegmentedTranscriber::new(engine, window_secs)?;

    let cancel = transcriber.cancel_token();
    ctrlc::set_handler(move || {
        log::info!("received ctrl-c, stopping after the current window");
        cancel.cancel();
    })
    .context("failed to install ctrl-c handler")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    println!("Transcribing...");
    let outcome = transcriber.run(&audio_path, &srt_path, &pb)?;
    pb.finish_with_message("Transcription complete");

    if outcome.used_fallback {
        println!("Transcribed in a single pass (duration probe failed)");
    }
    if outcome.windows_skipped > 0 {
        println!(
            "Skipped {} window(s), see log for details",
            outcome.windows_skipped
        );
    }
    if outcome.cancelled {
        println!("Cancelled; subtitles cover the completed windows only");
    }

    if args.json {
        let json_path = out_dir.join(format!("{file_stem}.cues.json"));
        output::save_transcript_json(&json_path, &outcome.cues)?;
        println!("Saved cue list to {json_path:?}");
    }

    if owns_audio && !args.keep_audio {
        if let Err(e) = std::fs::remove_file(&audio_path) {
            log::warn!("failed to remove extracted audio {audio_path:?}: {e}");
        }
    }

    println!(
        "Saved {} cue(s) to {:?}",
        outcome.cues.len(),
        outcome.subtitle_path
    );
    Ok(())
}

fn extract(args: ExtractArgs) -> anyhow::Result<()> {
    let output = match args.output {
        Some(path) => path,
        None => args.input.with_extension("wav"),
    };
    if output == args.input {
        anyhow::bail!("output would overwrite the input, pass --output");
    }

    ffmpeg::extract_audio(&args.input, &output)?;
    println!("Audio saved to {output:?}");
    Ok(())
}
