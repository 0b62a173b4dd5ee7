//! MulT-style cross-modal transformer fusion.
//!
//! Audio sequences attend over text sequences as key/value (asymmetric
//! cross-modal attention, after "Multimodal Transformer for Unaligned
//! Multimodal Language Sequences", Tsai et al. 2019). The attended sequence
//! is mean-pooled, passed through ReLU, and classified down to one logit.
//!
//! ## Architecture
//!
//! ```text
//! audio [B, S_a, 768] ──(·√768 + sinusoidal PE, dropout 0.25)──┐ query
//! text  [B, S_t, 768] ──(·√768 + sinusoidal PE, dropout 0.25)──┤ key/value
//!                                                              ↓
//! 4 × pre-norm layer:
//!   norm → MHA(8 heads, future mask) → res dropout → residual
//!   norm → FFN(768 → 3072 → 768, ReLU) → res dropout → residual
//! final LayerNorm
//!                                                              ↓
//! mean over S_a → ReLU → Linear(768, 1)
//! ```
//!
//! ## Weight key paths (under `crossmodal.` prefix)
//!
//! ```text
//! layers.{i}.attn.{q_proj,k_proj,v_proj,out_proj}.{weight,bias}
//! layers.{i}.attn_norm.{weight,bias}
//! layers.{i}.fc1.{weight,bias}      — Linear(768, 3072)
//! layers.{i}.fc2.{weight,bias}      — Linear(3072, 768)
//! layers.{i}.ffn_norm.{weight,bias}
//! norm.{weight,bias}
//! ```

use candle_core::{Device, Module, Tensor};
use candle_nn::{Dropout, LayerNorm, VarBuilder};

use crate::Result;

/// Configuration for the cross-modal transformer.
#[derive(Debug, Clone)]
pub struct CrossModalConfig {
    /// Feature size of both input streams.
    pub embed_dim: usize,
    /// Number of attention heads.
    pub num_heads: usize,
    /// Number of transformer layers.
    pub layers: usize,
    /// FFN inner size.
    pub ffn_dim: usize,
    /// Dropout on attention weights.
    pub attn_dropout: f32,
    /// Dropout after the FFN activation.
    pub relu_dropout: f32,
    /// Dropout on residual branches.
    pub res_dropout: f32,
    /// Dropout on the scaled, position-encoded inputs.
    pub embed_dropout: f32,
    /// Whether to apply the future mask to attention scores.
    pub attn_mask: bool,
}

impl Default for CrossModalConfig {
    fn default() -> Self {
        let embed_dim = 768;
        Self {
            embed_dim,
            num_heads: 8,
            layers: 4,
            ffn_dim: 4 * embed_dim,
            attn_dropout: 0.1,
            relu_dropout: 0.1,
            res_dropout: 0.1,
            embed_dropout: 0.25,
            attn_mask: true,
        }
    }
}

/// Fairseq-style sinusoidal positional embedding, `[seq_len, dim]`.
///
/// First half of the feature axis is sin, second half cos; an odd `dim`
/// gets one zero column appended.
pub fn sinusoidal_positional_embedding(
    seq_len: usize,
    dim: usize,
    device: &Device,
) -> Result<Tensor> {
    let half_dim = dim / 2;
    let log_step = if half_dim > 1 {
        (10_000f64).ln() / (half_dim - 1) as f64
    } else {
        0.0
    };

    let mut data = Vec::with_capacity(seq_len * dim);
    for pos in 0..seq_len {
        for j in 0..half_dim {
            let freq = (-(j as f64) * log_step).exp();
            data.push((pos as f64 * freq).sin() as f32);
        }
        for j in 0..half_dim {
            let freq = (-(j as f64) * log_step).exp();
            data.push((pos as f64 * freq).cos() as f32);
        }
        if dim % 2 == 1 {
            data.push(0.0);
        }
    }
    Tensor::from_vec(data, (seq_len, dim), device).map_err(Into::into)
}

/// Additive future mask for cross-modal attention, `[s_q, s_k]`.
///
/// Masks (−inf) positions where `j − i ≥ 1 + |s_k − s_q|`. For equal
/// lengths this is the strict upper triangle; for unequal lengths the
/// allowed band widens so every query keeps at least one visible key.
pub fn future_mask(s_q: usize, s_k: usize, device: &Device) -> Result<Tensor> {
    let offset = 1 + s_k.abs_diff(s_q);
    let mut data = Vec::with_capacity(s_q * s_k);
    for i in 0..s_q {
        for j in 0..s_k {
            if j >= i + offset {
                data.push(f32::NEG_INFINITY);
            } else {
                data.push(0.0);
            }
        }
    }
    Tensor::from_vec(data, (s_q, s_k), device).map_err(Into::into)
}

/// Scaled dot-product multi-head attention over two streams.
struct CrossModalAttention {
    q_proj: candle_nn::Linear,
    k_proj: candle_nn::Linear,
    v_proj: candle_nn::Linear,
    out_proj: candle_nn::Linear,
    attn_dropout: Dropout,
    num_heads: usize,
    head_dim: usize,
}

impl CrossModalAttention {
    fn load(vb: VarBuilder, cfg: &CrossModalConfig) -> Result<Self> {
        let dim = cfg.embed_dim;
        Ok(Self {
            q_proj: candle_nn::linear(dim, dim, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(dim, dim, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(dim, dim, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(dim, dim, vb.pp("out_proj"))?,
            attn_dropout: Dropout::new(cfg.attn_dropout),
            num_heads: cfg.num_heads,
            head_dim: dim / cfg.num_heads,
        })
    }

    /// - `query`: `[B, S_q, D]`
    /// - `key_value`: `[B, S_k, D]`
    /// - `attn_bias`: optional additive `[S_q, S_k]` (−inf = masked)
    ///
    /// Returns `[B, S_q, D]`.
    fn forward(
        &self,
        query: &Tensor,
        key_value: &Tensor,
        attn_bias: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        let (batch, s_q, _) = query.dims3()?;
        let (_, s_k, _) = key_value.dims3()?;

        let q = self.q_proj.forward(query)?;
        let k = self.k_proj.forward(key_value)?;
        let v = self.v_proj.forward(key_value)?;

        // Reshape to [B, H, S, D_h]
        let q = q
            .reshape((batch, s_q, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((batch, s_k, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = v
            .reshape((batch, s_k, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let scale = (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(2, 3)?.contiguous()?)? / scale)?;

        let scores = match attn_bias {
            Some(bias) => {
                let bias = bias.to_dtype(scores.dtype())?;
                scores.broadcast_add(&bias)?
            }
            None => scores,
        };

        let weights = candle_nn::ops::softmax_last_dim(&scores)?;
        let weights = self.attn_dropout.forward(&weights, train)?;
        let out = weights.matmul(&v)?; // [B, H, S_q, D_h]

        let out = out
            .transpose(1, 2)?
            .reshape((batch, s_q, self.num_heads * self.head_dim))?;
        self.out_proj.forward(&out).map_err(Into::into)
    }
}

/// Pre-norm transformer layer: cross-attention + FFN, both with residuals.
struct CrossModalLayer {
    attn: CrossModalAttention,
    attn_norm: LayerNorm,
    fc1: candle_nn::Linear,
    fc2: candle_nn::Linear,
    ffn_norm: LayerNorm,
    relu_dropout: Dropout,
    res_dropout: Dropout,
}

impl CrossModalLayer {
    fn load(vb: VarBuilder, cfg: &CrossModalConfig) -> Result<Self> {
        let dim = cfg.embed_dim;
        Ok(Self {
            attn: CrossModalAttention::load(vb.pp("attn"), cfg)?,
            attn_norm: candle_nn::layer_norm(dim, 1e-5, vb.pp("attn_norm"))?,
            fc1: candle_nn::linear(dim, cfg.ffn_dim, vb.pp("fc1"))?,
            fc2: candle_nn::linear(cfg.ffn_dim, dim, vb.pp("fc2"))?,
            ffn_norm: candle_nn::layer_norm(dim, 1e-5, vb.pp("ffn_norm"))?,
            relu_dropout: Dropout::new(cfg.relu_dropout),
            res_dropout: Dropout::new(cfg.res_dropout),
        })
    }

    fn forward(
        &self,
        query: &Tensor,
        key_value: &Tensor,
        attn_bias: Option<&Tensor>,
        train: bool,
    ) -> Result<Tensor> {
        // Attention: one shared norm for the query and key/value streams.
        let residual = query;
        let q = self.attn_norm.forward(query)?;
        let kv = self.attn_norm.forward(key_value)?;
        let h = self.attn.forward(&q, &kv, attn_bias, train)?;
        let h = self.res_dropout.forward(&h, train)?;
        let h = (residual + h)?;

        // FFN with residual.
        let residual = &h;
        let x = self.ffn_norm.forward(&h)?;
        let x = self.fc1.forward(&x)?.relu()?;
        let x = self.relu_dropout.forward(&x, train)?;
        let x = self.fc2.forward(&x)?;
        let x = self.res_dropout.forward(&x, train)?;
        (residual + x).map_err(Into::into)
    }
}

/// Stack of cross-modal layers with scaled, position-encoded inputs.
pub struct CrossModalTransformer {
    layers: Vec<CrossModalLayer>,
    norm: LayerNorm,
    embed_dropout: Dropout,
    embed_scale: f64,
    attn_mask: bool,
}

impl CrossModalTransformer {
    pub fn load(vb: VarBuilder, cfg: &CrossModalConfig) -> Result<Self> {
        let mut layers = Vec::with_capacity(cfg.layers);
        for i in 0..cfg.layers {
            layers.push(CrossModalLayer::load(vb.pp(format!("layers.{i}")), cfg)?);
        }
        Ok(Self {
            layers,
            norm: candle_nn::layer_norm(cfg.embed_dim, 1e-5, vb.pp("norm"))?,
            embed_dropout: Dropout::new(cfg.embed_dropout),
            embed_scale: (cfg.embed_dim as f64).sqrt(),
            attn_mask: cfg.attn_mask,
        })
    }

    /// Scale by √dim, add sinusoidal positions, apply embedding dropout.
    fn embed(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (_, seq_len, dim) = xs.dims3()?;
        let pe = sinusoidal_positional_embedding(seq_len, dim, xs.device())?
            .to_dtype(xs.dtype())?
            .unsqueeze(0)?;
        let xs = ((xs * self.embed_scale)?).broadcast_add(&pe)?;
        self.embed_dropout.forward(&xs, train).map_err(Into::into)
    }

    /// Forward pass.
    ///
    /// - `query`: `[B, S_q, D]` — the attending stream
    /// - `key_value`: `[B, S_k, D]` — the attended stream
    ///
    /// Returns `[B, S_q, D]`.
    pub fn forward(&self, query: &Tensor, key_value: &Tensor, train: bool) -> Result<Tensor> {
        let (_, s_q, _) = query.dims3()?;
        let (_, s_k, _) = key_value.dims3()?;

        let mut h = self.embed(query, train)?;
        let kv = self.embed(key_value, train)?;

        let bias = if self.attn_mask {
            Some(future_mask(s_q, s_k, h.device())?)
        } else {
            None
        };

        for layer in &self.layers {
            h = layer.forward(&h, &kv, bias.as_ref(), train)?;
        }
        self.norm.forward(&h).map_err(Into::into)
    }
}

/// Cross-modal fusion classifier: transformer, mean pool, ReLU, linear.
///
/// Weight key paths: `crossmodal.*` (see module docs) and
/// `classifier.{weight,bias}` — Linear(embed_dim, 1).
pub struct CrossAttentionFusion {
    crossmodal: CrossModalTransformer,
    classifier: candle_nn::Linear,
}

impl CrossAttentionFusion {
    pub fn load(vb: VarBuilder, cfg: &CrossModalConfig) -> Result<Self> {
        Ok(Self {
            crossmodal: CrossModalTransformer::load(vb.pp("crossmodal"), cfg)?,
            classifier: candle_nn::linear(cfg.embed_dim, 1, vb.pp("classifier"))?,
        })
    }

    /// Forward pass.
    ///
    /// - `text_sequences`: `[B, S_t, D]`
    /// - `audio_sequences`: `[B, S_a, D]`
    ///
    /// Audio is the query stream and text supplies key/value. Returns
    /// `[B, 1]`.
    pub fn forward(
        &self,
        text_sequences: &Tensor,
        audio_sequences: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let x = self
            .crossmodal
            .forward(audio_sequences, text_sequences, train)?;
        let x = x.mean(1)?; // [B, D]
        let x = x.relu()?;
        self.classifier.forward(&x).map_err(Into::into)
    }
}
