//! Evaluation configuration.
//!
//! A hierarchical YAML file merged into compiled-in defaults: every field at
//! every level is optional in the file and falls back to [`Default`]. This
//! mirrors the yacs-style configs the original checkpoints were trained with,
//! so a training-time YAML can be passed to the evaluator unchanged.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Which stance model the checkpoint contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Text,
    Audio,
    Multimodal,
}

/// Fusion head used by the multimodal model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionKind {
    /// Concatenate pooled embeddings, dropout, single linear layer.
    Concat,
    /// MulT-style cross-modal transformer, audio attending over text.
    CrossAttention,
}

/// Top-level evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl EvalConfig {
    /// Load a YAML config file, merging it into the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject combinations the models cannot satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.dataset.loader.batch_size == 0 {
            return Err(crate::Error::Config(
                "dataset.loader.batch_size must be at least 1".into(),
            ));
        }
        match self.model.name {
            ModelKind::Text if !self.dataset.load_text => Err(crate::Error::Config(
                "model.name = text requires dataset.load_text = true".into(),
            )),
            ModelKind::Audio if !self.dataset.load_audio => Err(crate::Error::Config(
                "model.name = audio requires dataset.load_audio = true".into(),
            )),
            ModelKind::Multimodal if !(self.dataset.load_text && self.dataset.load_audio) => {
                Err(crate::Error::Config(
                    "model.name = multimodal requires both dataset.load_text and dataset.load_audio"
                        .into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Dataset location and batch assembly parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetConfig {
    /// Root directory holding per-split JSONL manifests and WAV files.
    pub data_path: String,
    /// Whether batches carry waveforms.
    pub load_audio: bool,
    /// Whether batches carry token sequences.
    pub load_text: bool,
    /// Waveform length in seconds; longer clips are truncated, shorter
    /// clips zero-padded.
    pub chunk_length: usize,
    /// Expected waveform sample rate. Files at any other rate are rejected.
    pub sample_rate: u32,
    /// HuggingFace model id whose tokenizer.json to fetch.
    pub tokenizer: String,
    /// Token-sequence cap per example.
    pub max_text_len: usize,
    pub loader: LoaderConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_path: "data/ibm_debater".to_string(),
            load_audio: true,
            load_text: true,
            chunk_length: 15,
            sample_rate: 16_000,
            tokenizer: "distilbert-base-uncased".to_string(),
            max_text_len: 512,
            loader: LoaderConfig::default(),
        }
    }
}

impl DatasetConfig {
    /// Waveform length in samples after chunking/padding.
    pub fn chunk_samples(&self) -> usize {
        self.chunk_length * self.sample_rate as usize
    }
}

/// Batch-loader parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub batch_size: usize,
    /// Accepted for training-config compatibility. Loading here is
    /// synchronous, so the value is ignored.
    pub num_workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_workers: 4,
        }
    }
}

/// Model selection and fusion hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub name: ModelKind,
    /// Fusion head; only read when `name` is `multimodal`.
    pub fusion: FusionKind,
    /// Dropout after concatenating embeddings (concat fusion). Identity at
    /// inference.
    pub dropout: f32,
    /// Fine-tuning-time options. No effect at evaluation: no gradients are
    /// computed, so frozen and unfrozen encoders behave identically.
    pub freeze_text: bool,
    pub freeze_audio: bool,
    /// HuggingFace model id for the DistilBERT encoder config.
    pub text_encoder: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: ModelKind::Multimodal,
            fusion: FusionKind::Concat,
            dropout: 0.3,
            freeze_text: false,
            freeze_audio: false,
            text_encoder: "distilbert-base-uncased".to_string(),
        }
    }
}
