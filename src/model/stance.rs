//! Assembled stance models.
//!
//! Three single-logit classifiers, selected by `model.name` in the config:
//!
//! - `text` — DistilBERT CLS → pre-classifier → ReLU → dropout → Linear(·, 1)
//! - `audio` — wav2vec2-style encoder → mean pool → dropout → Linear(·, 1)
//! - `multimodal` — both encoders feeding a fusion head (`model.fusion`)
//!
//! All weights live in one safetensors checkpoint. Encoder parameters sit
//! under the `text_model.` / `audio_model.` prefixes; head parameters at the
//! root (`pre_classifier.`, `classifier.`, `crossmodal.`).

use candle_core::{Module, Tensor};
use candle_nn::{Dropout, VarBuilder};

use crate::config::{FusionKind, ModelConfig, ModelKind};
use crate::dataset::Batch;
use crate::model::encoder::{AudioEncoder, AudioEncoderConfig, TextEncoder, TextEncoderConfig};
use crate::model::fusion::{ConcatFusion, CrossAttentionFusion, CrossModalConfig};
use crate::{Error, Result};

/// Text-only stance classifier.
pub struct TextStanceModel {
    encoder: TextEncoder,
    pre_classifier: candle_nn::Linear,
    dropout: Dropout,
    classifier: candle_nn::Linear,
}

impl TextStanceModel {
    pub fn load(vb: VarBuilder, cfg: &ModelConfig, text_cfg: &TextEncoderConfig) -> Result<Self> {
        let dim = text_cfg.hidden_size;
        Ok(Self {
            encoder: TextEncoder::load(text_cfg, vb.pp("text_model"))?,
            pre_classifier: candle_nn::linear(dim, dim, vb.pp("pre_classifier"))?,
            dropout: Dropout::new(cfg.dropout),
            classifier: candle_nn::linear(dim, 1, vb.pp("classifier"))?,
        })
    }

    /// `[B, T]` tokens + mask → `[B, 1]` logits.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let pooled = self.encoder.forward_pooled(input_ids, attention_mask)?;
        let x = self.pre_classifier.forward(&pooled)?.relu()?;
        let x = self.dropout.forward(&x, train)?;
        self.classifier.forward(&x).map_err(Into::into)
    }
}

/// Audio-only stance classifier.
pub struct AudioStanceModel {
    encoder: AudioEncoder,
    dropout: Dropout,
    classifier: candle_nn::Linear,
}

impl AudioStanceModel {
    pub fn load(vb: VarBuilder, cfg: &ModelConfig, audio_cfg: &AudioEncoderConfig) -> Result<Self> {
        Ok(Self {
            encoder: AudioEncoder::load(vb.pp("audio_model"), audio_cfg)?,
            dropout: Dropout::new(cfg.dropout),
            classifier: candle_nn::linear(audio_cfg.hidden_size, 1, vb.pp("classifier"))?,
        })
    }

    /// `[B, N]` waveforms → `[B, 1]` logits.
    pub fn forward(&self, waves: &Tensor, train: bool) -> Result<Tensor> {
        let pooled = self.encoder.forward_pooled(waves)?;
        let x = self.dropout.forward(&pooled, train)?;
        self.classifier.forward(&x).map_err(Into::into)
    }
}

/// Fusion head of the multimodal model.
enum FusionHead {
    Concat(ConcatFusion),
    CrossAttention(CrossAttentionFusion),
}

/// Multimodal stance classifier: both encoders plus a fusion head.
pub struct MultimodalStanceModel {
    text: TextEncoder,
    audio: AudioEncoder,
    fusion: FusionHead,
}

impl MultimodalStanceModel {
    pub fn load(
        vb: VarBuilder,
        cfg: &ModelConfig,
        text_cfg: &TextEncoderConfig,
        audio_cfg: &AudioEncoderConfig,
    ) -> Result<Self> {
        let text = TextEncoder::load(text_cfg, vb.pp("text_model"))?;
        let audio = AudioEncoder::load(vb.pp("audio_model"), audio_cfg)?;
        let fusion = match cfg.fusion {
            FusionKind::Concat => FusionHead::Concat(ConcatFusion::load(
                vb.clone(),
                text_cfg.hidden_size,
                audio_cfg.hidden_size,
                cfg.dropout,
            )?),
            FusionKind::CrossAttention => {
                if text_cfg.hidden_size != audio_cfg.hidden_size {
                    return Err(Error::Config(format!(
                        "cross-attention fusion needs matching encoder widths, got {} and {}",
                        text_cfg.hidden_size, audio_cfg.hidden_size
                    )));
                }
                let cross_cfg = CrossModalConfig {
                    embed_dim: text_cfg.hidden_size,
                    ffn_dim: 4 * text_cfg.hidden_size,
                    ..CrossModalConfig::default()
                };
                FusionHead::CrossAttention(CrossAttentionFusion::load(vb.clone(), &cross_cfg)?)
            }
        };
        Ok(Self {
            text,
            audio,
            fusion,
        })
    }

    /// Tokens + waveforms → `[B, 1]` logits.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
        waves: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        match &self.fusion {
            FusionHead::Concat(fusion) => {
                let text = self.text.forward_pooled(input_ids, attention_mask)?;
                let audio = self.audio.forward_pooled(waves)?;
                fusion.forward(&text, &audio, train)
            }
            FusionHead::CrossAttention(fusion) => {
                let text = self.text.forward_sequences(input_ids, attention_mask)?;
                let audio = self.audio.forward_sequences(waves)?;
                fusion.forward(&text, &audio, train)
            }
        }
    }
}

/// Any of the three stance models, built from the config.
pub enum StanceModel {
    Text(TextStanceModel),
    Audio(AudioStanceModel),
    Multimodal(MultimodalStanceModel),
}

impl StanceModel {
    /// `text_cfg` is only needed for the text and multimodal models; the
    /// audio model takes `None`.
    pub fn load(
        vb: VarBuilder,
        cfg: &ModelConfig,
        text_cfg: Option<&TextEncoderConfig>,
        audio_cfg: &AudioEncoderConfig,
    ) -> Result<Self> {
        let require_text = || {
            text_cfg.ok_or_else(|| {
                Error::Config(format!(
                    "model.name = {:?} requires a text encoder config",
                    cfg.name
                ))
            })
        };
        match cfg.name {
            ModelKind::Text => Ok(Self::Text(TextStanceModel::load(vb, cfg, require_text()?)?)),
            ModelKind::Audio => Ok(Self::Audio(AudioStanceModel::load(vb, cfg, audio_cfg)?)),
            ModelKind::Multimodal => Ok(Self::Multimodal(MultimodalStanceModel::load(
                vb,
                cfg,
                require_text()?,
                audio_cfg,
            )?)),
        }
    }

    /// Run one batch through the model. The batch layout must match the
    /// model kind; a mismatch is a config error.
    pub fn forward(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        match (self, batch) {
            (Self::Text(model), Batch::Text { tokens, .. }) => {
                model.forward(&tokens.input_ids, &tokens.attention_mask, train)
            }
            (Self::Audio(model), Batch::Audio { waves, .. }) => model.forward(waves, train),
            (Self::Multimodal(model), Batch::Multimodal { tokens, waves, .. }) => model.forward(
                &tokens.input_ids,
                &tokens.attention_mask,
                waves,
                train,
            ),
            _ => Err(Error::Config(
                "batch layout does not match model kind; check dataset.load_text/load_audio".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn tiny_text_cfg() -> TextEncoderConfig {
        let json = r#"{
            "activation": "gelu",
            "attention_dropout": 0.1,
            "dim": 16,
            "dropout": 0.1,
            "hidden_dim": 32,
            "initializer_range": 0.02,
            "max_position_embeddings": 64,
            "model_type": "distilbert",
            "n_heads": 2,
            "n_layers": 1,
            "pad_token_id": 0,
            "qa_dropout": 0.1,
            "seq_classif_dropout": 0.2,
            "sinusoidal_pos_embds": false,
            "tie_weights_": true,
            "vocab_size": 50
        }"#;
        TextEncoderConfig::from_json(json).unwrap()
    }

    fn tiny_audio_cfg() -> AudioEncoderConfig {
        AudioEncoderConfig {
            conv_dim: vec![4, 4],
            conv_kernel: vec![10, 3],
            conv_stride: vec![5, 2],
            hidden_size: 16,
            num_layers: 1,
            num_heads: 2,
            ffn_dim: 32,
            num_conv_pos_embeddings: 4,
            num_conv_pos_embedding_groups: 2,
            layer_norm_eps: 1e-5,
        }
    }

    fn tiny_batch(device: &Device) -> Batch {
        let tokens = crate::dataset::TokenBatch {
            input_ids: Tensor::zeros((2, 5), DType::U32, device).unwrap(),
            attention_mask: Tensor::ones((2, 5), DType::U32, device).unwrap(),
        };
        Batch::Multimodal {
            tokens,
            waves: Tensor::randn(0f32, 1.0, (2, 40), device).unwrap(),
            labels: Tensor::new(&[1u32, 0], device).unwrap(),
        }
    }

    #[test]
    fn test_multimodal_concat_forward() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig::default();
        let model =
            StanceModel::load(vb, &cfg, Some(&tiny_text_cfg()), &tiny_audio_cfg()).unwrap();

        let out = model.forward(&tiny_batch(&device), false).unwrap();
        assert_eq!(out.dims(), &[2, 1]);
    }

    #[test]
    fn test_multimodal_cross_attention_forward() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            fusion: FusionKind::CrossAttention,
            ..ModelConfig::default()
        };
        let model =
            StanceModel::load(vb, &cfg, Some(&tiny_text_cfg()), &tiny_audio_cfg()).unwrap();

        let out = model.forward(&tiny_batch(&device), false).unwrap();
        assert_eq!(out.dims(), &[2, 1]);
    }

    #[test]
    fn test_text_model_forward() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            name: ModelKind::Text,
            ..ModelConfig::default()
        };
        let model =
            StanceModel::load(vb, &cfg, Some(&tiny_text_cfg()), &tiny_audio_cfg()).unwrap();

        let batch = Batch::Text {
            tokens: crate::dataset::TokenBatch {
                input_ids: Tensor::zeros((3, 4), DType::U32, &device).unwrap(),
                attention_mask: Tensor::ones((3, 4), DType::U32, &device).unwrap(),
            },
            labels: Tensor::new(&[0u32, 1, 1], &device).unwrap(),
        };
        let out = model.forward(&batch, false).unwrap();
        assert_eq!(out.dims(), &[3, 1]);
    }

    #[test]
    fn test_audio_model_forward() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            name: ModelKind::Audio,
            ..ModelConfig::default()
        };
        // The audio model needs no text encoder config at all.
        let model = StanceModel::load(vb, &cfg, None, &tiny_audio_cfg()).unwrap();

        let batch = Batch::Audio {
            waves: Tensor::randn(0f32, 1.0, (2, 40), &device).unwrap(),
            labels: Tensor::new(&[0u32, 1], &device).unwrap(),
        };
        let out = model.forward(&batch, false).unwrap();
        assert_eq!(out.dims(), &[2, 1]);
    }

    #[test]
    fn test_batch_model_mismatch_rejected() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            name: ModelKind::Audio,
            ..ModelConfig::default()
        };
        let model = StanceModel::load(vb, &cfg, None, &tiny_audio_cfg()).unwrap();

        let result = model.forward(&tiny_batch(&device), false);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_mismatched_widths_rejected_for_cross_attention() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            fusion: FusionKind::CrossAttention,
            ..ModelConfig::default()
        };
        let mut audio_cfg = tiny_audio_cfg();
        audio_cfg.hidden_size = 32;
        audio_cfg.num_heads = 4;
        let result = StanceModel::load(vb, &cfg, Some(&tiny_text_cfg()), &audio_cfg);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_text_model_without_text_config_rejected() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let cfg = ModelConfig {
            name: ModelKind::Text,
            ..ModelConfig::default()
        };
        let result = StanceModel::load(vb, &cfg, None, &tiny_audio_cfg());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
