//! Text encoder wrapper around DistilBERT.
//!
//! Two encoding paths:
//! - **Pooled**: CLS hidden state → `[B, 768]` (concat fusion, text head)
//! - **Sequence**: full last hidden states → `[B, T, 768]` (cross-modal fusion)
//!
//! DistilBERT itself comes from `candle_transformers`; its config is
//! deserialized from the checkpoint's `config.json` (the candle config type
//! keeps its fields private, so the hidden size is read out separately).

use candle_core::{IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;

use crate::Result;

/// DistilBERT config plus the hidden size the fusion heads need.
#[derive(Debug, Clone)]
pub struct TextEncoderConfig {
    pub inner: DistilBertConfig,
    pub hidden_size: usize,
}

#[derive(Deserialize)]
struct RawDims {
    dim: usize,
}

impl TextEncoderConfig {
    /// Parse a HuggingFace `config.json`.
    pub fn from_json(json: &str) -> Result<Self> {
        let inner: DistilBertConfig = serde_json::from_str(json)?;
        let dims: RawDims = serde_json::from_str(json)?;
        Ok(Self {
            inner,
            hidden_size: dims.dim,
        })
    }

    /// Fetch `config.json` for a model id from the HuggingFace Hub.
    pub fn from_hub(model_id: &str) -> Result<Self> {
        let api = hf_hub::api::sync::Api::new()?;
        let path = api.model(model_id.to_string()).get("config.json")?;
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Text encoder wrapping DistilBERT.
///
/// Weight key paths follow the converted checkpoint layout:
/// `embeddings.*`, `transformer.layer.{i}.*` under the VarBuilder prefix
/// this encoder is loaded with (`text_model.` in the stance models).
pub struct TextEncoder {
    model: DistilBertModel,
    hidden_size: usize,
}

impl TextEncoder {
    pub fn load(cfg: &TextEncoderConfig, vb: VarBuilder) -> Result<Self> {
        let model = DistilBertModel::load(vb, &cfg.inner)?;
        Ok(Self {
            model,
            hidden_size: cfg.hidden_size,
        })
    }

    /// Encode token sequences.
    ///
    /// - `input_ids`: `[B, T]` (u32)
    /// - `attention_mask`: `[B, T]` (u32, 1 = valid token)
    ///
    /// Returns last hidden states `[B, T, hidden]`.
    pub fn forward_sequences(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = padding_mask(attention_mask)?;
        self.model.forward(input_ids, &mask).map_err(Into::into)
    }

    /// Encode and pool: the CLS (first-token) hidden state, `[B, hidden]`.
    pub fn forward_pooled(&self, input_ids: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let sequences = self.forward_sequences(input_ids, attention_mask)?;
        sequences.i((.., 0, ..)).map_err(Into::into)
    }

    /// Output feature width (768 for distilbert-base).
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

/// Turn a `[B, T]` validity mask (1 = valid) into the additive-mask input
/// DistilBERT's attention expects: `[B, 1, 1, T]` (u8, nonzero = masked),
/// broadcastable over attention scores.
pub fn padding_mask(attention_mask: &Tensor) -> Result<Tensor> {
    attention_mask
        .eq(0u32)?
        .unsqueeze(1)?
        .unsqueeze(1)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    // Full field set of a HuggingFace distilbert config.json, scaled down.
    fn tiny_config() -> TextEncoderConfig {
        let json = r#"{
            "activation": "gelu",
            "attention_dropout": 0.1,
            "dim": 32,
            "dropout": 0.1,
            "hidden_dim": 64,
            "initializer_range": 0.02,
            "max_position_embeddings": 128,
            "model_type": "distilbert",
            "n_heads": 2,
            "n_layers": 1,
            "pad_token_id": 0,
            "qa_dropout": 0.1,
            "seq_classif_dropout": 0.2,
            "sinusoidal_pos_embds": false,
            "tie_weights_": true,
            "vocab_size": 100
        }"#;
        TextEncoderConfig::from_json(json).unwrap()
    }

    #[test]
    fn test_config_from_json() {
        let cfg = tiny_config();
        assert_eq!(cfg.hidden_size, 32);
    }

    #[test]
    fn test_padding_mask() {
        let device = Device::Cpu;
        let mask = Tensor::new(&[[1u32, 1, 0], [1, 0, 0]], &device).unwrap();
        let out = padding_mask(&mask).unwrap();
        assert_eq!(out.dims(), &[2, 1, 1, 3]);
        let flat: Vec<u8> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(flat, vec![0, 0, 1, 0, 1, 1]);
    }

    #[test]
    fn test_encoder_shapes() {
        let device = Device::Cpu;
        let cfg = tiny_config();
        let vb = VarBuilder::zeros(DType::F32, &device);
        let encoder = TextEncoder::load(&cfg, vb).unwrap();
        assert_eq!(encoder.hidden_size(), 32);

        let input_ids = Tensor::zeros((2, 5), DType::U32, &device).unwrap();
        let attention_mask = Tensor::ones((2, 5), DType::U32, &device).unwrap();

        let sequences = encoder.forward_sequences(&input_ids, &attention_mask).unwrap();
        assert_eq!(sequences.dims(), &[2, 5, 32]);

        let pooled = encoder.forward_pooled(&input_ids, &attention_mask).unwrap();
        assert_eq!(pooled.dims(), &[2, 32]);
    }
}
