use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::ValueEnum;
use serde::Deserialize;

/// Whisper model size, resolved to a ggml model file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    fn model_file(&self) -> String {
        format!("ggml-{}.bin", self.as_str())
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoding knobs forwarded to whisper, all optional.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct WhisperConfig {
    pub beam_size: Option<u32>,
    pub patience: Option<f32>,
    pub temperature: Option<f32>,
    pub initial_prompt: Option<String>,
}

/// Per-run profile loaded from a YAML file.
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    pub whisper: Option<WhisperConfig>,
    pub window_secs: Option<f64>,
    pub language: Option<String>,
}

pub fn load_run_config(path: &Path) -> anyhow::Result<RunConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile {path:?}"))?;
    let config =
        serde_yaml::from_str(&content).with_context(|| format!("failed to parse profile {path:?}"))?;
    Ok(config)
}

pub fn resolve_profile_path(profile: &str) -> anyhow::Result<PathBuf> {
    if let Some(rest) = profile.strip_prefix("~/") {
        let home = dirs::home_dir().context("could not find home directory")?;
        return Ok(home.join(rest));
    }

    let path = PathBuf::from(profile);
    if path.is_absolute() || profile.starts_with("./") || profile.starts_with("../") {
        return Ok(path);
    }

    let home = dirs::home_dir().context("could not find home directory")?;
    Ok(home.join(".subgen/profiles").join(format!("{profile}.yaml")))
}

pub fn resolve_model_path(explicit: Option<&Path>, size: ModelSize) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    let home = dirs::home_dir().context("could not find home directory")?;
    let path = home.join(".subgen/models").join(size.model_file());
    if !path.exists() {
        anyhow::bail!(
            "no {size} model at {path:?}; download a ggml model there or pass --model-path"
        );
    }

    Ok(path)
}
