//! Concatenation fusion head.
//!
//! The simplest joint representation: pooled embeddings from both encoders
//! are concatenated along the feature axis, passed through dropout, then one
//! linear layer down to a single stance logit.

use candle_core::{Module, Tensor};
use candle_nn::{Dropout, VarBuilder};

use crate::Result;

/// Concat + dropout + linear fusion classifier.
///
/// Weight key paths: `classifier.{weight,bias}` — Linear(text_dim + audio_dim, 1).
pub struct ConcatFusion {
    dropout: Dropout,
    classifier: candle_nn::Linear,
}

impl ConcatFusion {
    pub fn load(vb: VarBuilder, text_dim: usize, audio_dim: usize, dropout: f32) -> Result<Self> {
        let classifier = candle_nn::linear(text_dim + audio_dim, 1, vb.pp("classifier"))?;
        Ok(Self {
            dropout: Dropout::new(dropout),
            classifier,
        })
    }

    /// Forward pass.
    ///
    /// - `text_embedding`: `[B, text_dim]`
    /// - `audio_embedding`: `[B, audio_dim]`
    ///
    /// Returns `[B, 1]` — one logit per example. Dropout only fires when
    /// `train` is set; at evaluation the pass is deterministic.
    pub fn forward(
        &self,
        text_embedding: &Tensor,
        audio_embedding: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let x = Tensor::cat(&[text_embedding, audio_embedding], 1)?;
        let x = self.dropout.forward(&x, train)?;
        self.classifier.forward(&x).map_err(Into::into)
    }
}
