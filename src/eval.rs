//! Checkpoint evaluation.
//!
//! A single pass over the held-out split: load the safetensors checkpoint,
//! assemble the model the config names, run every batch forward, and count
//! a prediction correct when `(logit > 0) == label`. The decision threshold
//! sits at logit 0 — probability 0.5 under the implicit sigmoid — and a
//! logit of exactly 0 classifies as label 0.
//!
//! No early stopping, no partial results: the first error aborts the run.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::config::{EvalConfig, ModelKind};
use crate::dataset::{load_tokenizer, DebaterDataset};
use crate::model::encoder::{AudioEncoderConfig, TextEncoderConfig};
use crate::model::stance::StanceModel;
use crate::{Error, Result};

/// Running tally of a single evaluation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvalSummary {
    pub correct: usize,
    pub total: usize,
}

impl EvalSummary {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Count predictions where `(logit > 0) == label`.
///
/// - `logits`: `[B]` (f32)
/// - `labels`: `[B]` (u32, 0 or 1)
pub fn count_correct(logits: &Tensor, labels: &Tensor) -> Result<usize> {
    let logits: Vec<f32> = logits.to_vec1()?;
    let labels: Vec<u32> = labels.to_vec1()?;
    if logits.len() != labels.len() {
        return Err(Error::Dataset(format!(
            "logit/label length mismatch: {} vs {}",
            logits.len(),
            labels.len()
        )));
    }
    Ok(logits
        .iter()
        .zip(labels.iter())
        .filter(|(&logit, &label)| u32::from(logit > 0.0) == label)
        .count())
}

/// Evaluate a model over a dataset split.
pub fn evaluate(model: &StanceModel, dataset: &DebaterDataset, device: &Device) -> Result<EvalSummary> {
    let mut summary = EvalSummary::default();
    for (i, batch) in dataset.batches(device).enumerate() {
        let batch = batch?;
        let output = model.forward(&batch, false)?;
        let logits = output.squeeze(1)?;
        let labels = batch.labels();

        summary.correct += count_correct(&logits, labels)?;
        summary.total += labels.dim(0)?;
        tracing::debug!(
            batch = i,
            seen = summary.total,
            running_accuracy = summary.accuracy(),
            "evaluated batch"
        );
    }
    Ok(summary)
}

/// Full evaluation pipeline: tokenizer, dataset, checkpoint, model, loop.
pub fn evaluate_checkpoint(
    checkpoint: &Path,
    cfg: &EvalConfig,
    device: &Device,
) -> Result<EvalSummary> {
    let tokenizer = if cfg.dataset.load_text {
        tracing::info!(model = %cfg.dataset.tokenizer, "fetching tokenizer");
        Some(load_tokenizer(&cfg.dataset.tokenizer, cfg.dataset.max_text_len)?)
    } else {
        None
    };

    let dataset = DebaterDataset::load(&cfg.dataset, "test", tokenizer)?;
    tracing::info!(examples = dataset.len(), "loaded test split");

    // The audio-only model never touches the text encoder, so skip the
    // config fetch entirely for it.
    let text_cfg = match cfg.model.name {
        ModelKind::Audio => None,
        ModelKind::Text | ModelKind::Multimodal => {
            tracing::info!(model = %cfg.model.text_encoder, "fetching text encoder config");
            Some(TextEncoderConfig::from_hub(&cfg.model.text_encoder)?)
        }
    };
    let audio_cfg = AudioEncoderConfig::default();

    // SAFETY: memory-mapping safetensors is the standard candle pattern.
    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[checkpoint.to_path_buf()], DType::F32, device)
            .map_err(|e| {
                Error::Checkpoint(format!("cannot load {}: {e}", checkpoint.display()))
            })?
    };
    let model = StanceModel::load(vb, &cfg.model, text_cfg.as_ref(), &audio_cfg)?;
    tracing::info!(?device, "model loaded, starting evaluation");

    evaluate(&model, &dataset, device)
}
