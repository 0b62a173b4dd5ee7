//! wav2vec2-style audio encoder.
//!
//! candle-transformers carries no wav2vec2, so the encoder is built here:
//! a strided conv feature extractor over the raw waveform, a projection to
//! the transformer width, a grouped convolutional positional embedding, and
//! a post-norm transformer stack.
//!
//! ## Architecture (base configuration)
//!
//! ```text
//! waveform [B, N] (16 kHz mono)
//!   → 7 × Conv1d(512, kernel 10/3/3/3/3/2/2, stride 5/2/2/2/2/2/2), GELU
//!     (group norm after the first conv only)           [B, 512, T]
//!   → LayerNorm(512) → Linear(512, 768)                [B, T, 768]
//!   → + Conv1d(768, 768, kernel 128, groups 16), GELU  (positional)
//!   → LayerNorm(768)
//!   → 12 × post-norm layer: MHA(12 heads) → LN → FFN(3072, GELU) → LN
//! ```
//!
//! One output frame per ~20 ms of input (hop 320 samples).
//!
//! ## Weight key paths (under the stance models' `audio_model.` prefix)
//!
//! ```text
//! feature_extractor.conv_layers.{i}.conv.weight        (no bias)
//! feature_extractor.conv_layers.0.layer_norm.{weight,bias}   — group norm
//! feature_projection.layer_norm.{weight,bias}
//! feature_projection.projection.{weight,bias}
//! pos_conv_embed.conv.{weight,bias}
//! encoder.layer_norm.{weight,bias}
//! encoder.layers.{i}.attention.{q_proj,k_proj,v_proj,out_proj}.{weight,bias}
//! encoder.layers.{i}.layer_norm.{weight,bias}
//! encoder.layers.{i}.feed_forward.{intermediate_dense,output_dense}.{weight,bias}
//! encoder.layers.{i}.final_layer_norm.{weight,bias}
//! ```

use candle_core::{Module, Tensor};
use candle_nn::{Conv1dConfig, LayerNorm, VarBuilder};

use crate::Result;

/// Configuration for the audio encoder.
#[derive(Debug, Clone)]
pub struct AudioEncoderConfig {
    /// Channel width of each feature-extractor conv.
    pub conv_dim: Vec<usize>,
    /// Kernel size of each feature-extractor conv.
    pub conv_kernel: Vec<usize>,
    /// Stride of each feature-extractor conv.
    pub conv_stride: Vec<usize>,
    /// Transformer feature size.
    pub hidden_size: usize,
    /// Number of transformer layers.
    pub num_layers: usize,
    /// Number of attention heads.
    pub num_heads: usize,
    /// FFN inner size.
    pub ffn_dim: usize,
    /// Positional conv kernel size.
    pub num_conv_pos_embeddings: usize,
    /// Positional conv groups.
    pub num_conv_pos_embedding_groups: usize,
    pub layer_norm_eps: f64,
}

impl Default for AudioEncoderConfig {
    fn default() -> Self {
        Self {
            conv_dim: vec![512; 7],
            conv_kernel: vec![10, 3, 3, 3, 3, 2, 2],
            conv_stride: vec![5, 2, 2, 2, 2, 2, 2],
            hidden_size: 768,
            num_layers: 12,
            num_heads: 12,
            ffn_dim: 3072,
            num_conv_pos_embeddings: 128,
            num_conv_pos_embedding_groups: 16,
            layer_norm_eps: 1e-5,
        }
    }
}

impl AudioEncoderConfig {
    /// Number of output frames for an `input_len`-sample waveform.
    pub fn output_frames(&self, input_len: usize) -> usize {
        self.conv_kernel
            .iter()
            .zip(self.conv_stride.iter())
            .fold(input_len, |len, (&k, &s)| {
                if len < k {
                    0
                } else {
                    (len - k) / s + 1
                }
            })
    }
}

/// Strided conv stack turning the waveform into latent frames.
struct FeatureExtractor {
    convs: Vec<candle_nn::Conv1d>,
    group_norm: candle_nn::GroupNorm,
}

impl FeatureExtractor {
    fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let mut convs = Vec::with_capacity(cfg.conv_dim.len());
        let mut in_channels = 1;
        for (i, ((&dim, &kernel), &stride)) in cfg
            .conv_dim
            .iter()
            .zip(cfg.conv_kernel.iter())
            .zip(cfg.conv_stride.iter())
            .enumerate()
        {
            let conv_cfg = Conv1dConfig {
                stride,
                ..Default::default()
            };
            convs.push(candle_nn::conv1d_no_bias(
                in_channels,
                dim,
                kernel,
                conv_cfg,
                vb.pp(format!("conv_layers.{i}.conv")),
            )?);
            in_channels = dim;
        }
        let group_norm = candle_nn::group_norm(
            cfg.conv_dim[0],
            cfg.conv_dim[0],
            cfg.layer_norm_eps,
            vb.pp("conv_layers.0.layer_norm"),
        )?;
        Ok(Self { convs, group_norm })
    }

    /// `[B, N]` waveform → `[B, C, T]` latent frames.
    fn forward(&self, waveforms: &Tensor) -> Result<Tensor> {
        let mut x = waveforms.unsqueeze(1)?; // [B, 1, N]
        for (i, conv) in self.convs.iter().enumerate() {
            x = conv.forward(&x)?;
            if i == 0 {
                x = self.group_norm.forward(&x)?;
            }
            x = x.gelu_erf()?;
        }
        Ok(x)
    }
}

/// LayerNorm + linear projection from conv channels to transformer width.
struct FeatureProjection {
    layer_norm: LayerNorm,
    projection: candle_nn::Linear,
}

impl FeatureProjection {
    fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let conv_out = *cfg.conv_dim.last().expect("conv_dim is non-empty");
        Ok(Self {
            layer_norm: candle_nn::layer_norm(conv_out, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            projection: candle_nn::linear(conv_out, cfg.hidden_size, vb.pp("projection"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.layer_norm.forward(xs)?;
        self.projection.forward(&xs).map_err(Into::into)
    }
}

/// Grouped convolution over time, standing in for absolute positions.
struct PositionalConvEmbedding {
    conv: candle_nn::Conv1d,
    trim_last: bool,
}

impl PositionalConvEmbedding {
    fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let conv_cfg = Conv1dConfig {
            padding: cfg.num_conv_pos_embeddings / 2,
            groups: cfg.num_conv_pos_embedding_groups,
            ..Default::default()
        };
        let conv = candle_nn::conv1d(
            cfg.hidden_size,
            cfg.hidden_size,
            cfg.num_conv_pos_embeddings,
            conv_cfg,
            vb.pp("conv"),
        )?;
        Ok(Self {
            conv,
            // An even kernel with k/2 padding yields one extra frame.
            trim_last: cfg.num_conv_pos_embeddings % 2 == 0,
        })
    }

    /// `[B, T, D]` → positional features `[B, T, D]`.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let x = xs.transpose(1, 2)?; // [B, D, T]
        let x = self.conv.forward(&x)?;
        let x = if self.trim_last {
            let t = x.dim(2)?;
            x.narrow(2, 0, t - 1)?
        } else {
            x
        };
        let x = x.gelu_erf()?;
        x.transpose(1, 2).map_err(Into::into)
    }
}

/// Standard multi-head self-attention, all positions visible.
struct SelfAttention {
    q_proj: candle_nn::Linear,
    k_proj: candle_nn::Linear,
    v_proj: candle_nn::Linear,
    out_proj: candle_nn::Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let dim = cfg.hidden_size;
        Ok(Self {
            q_proj: candle_nn::linear(dim, dim, vb.pp("q_proj"))?,
            k_proj: candle_nn::linear(dim, dim, vb.pp("k_proj"))?,
            v_proj: candle_nn::linear(dim, dim, vb.pp("v_proj"))?,
            out_proj: candle_nn::linear(dim, dim, vb.pp("out_proj"))?,
            num_heads: cfg.num_heads,
            head_dim: dim / cfg.num_heads,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = xs.dims3()?;

        let q = self
            .q_proj
            .forward(xs)?
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = self
            .k_proj
            .forward(xs)?
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = self
            .v_proj
            .forward(xs)?
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let scale = (self.head_dim as f64).sqrt();
        let weights = candle_nn::ops::softmax_last_dim(
            &(q.matmul(&k.transpose(2, 3)?.contiguous()?)? / scale)?,
        )?;
        let out = weights.matmul(&v)?; // [B, H, T, D_h]

        let out = out
            .transpose(1, 2)?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;
        self.out_proj.forward(&out).map_err(Into::into)
    }
}

/// Post-norm transformer layer: residual → LN → FFN residual → LN.
struct AudioEncoderLayer {
    attention: SelfAttention,
    layer_norm: LayerNorm,
    intermediate_dense: candle_nn::Linear,
    output_dense: candle_nn::Linear,
    final_layer_norm: LayerNorm,
}

impl AudioEncoderLayer {
    fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let dim = cfg.hidden_size;
        Ok(Self {
            attention: SelfAttention::load(vb.pp("attention"), cfg)?,
            layer_norm: candle_nn::layer_norm(dim, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            intermediate_dense: candle_nn::linear(
                dim,
                cfg.ffn_dim,
                vb.pp("feed_forward.intermediate_dense"),
            )?,
            output_dense: candle_nn::linear(
                cfg.ffn_dim,
                dim,
                vb.pp("feed_forward.output_dense"),
            )?,
            final_layer_norm: candle_nn::layer_norm(
                dim,
                cfg.layer_norm_eps,
                vb.pp("final_layer_norm"),
            )?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let h = (xs + self.attention.forward(xs)?)?;
        let h = self.layer_norm.forward(&h)?;

        let ffn = self.intermediate_dense.forward(&h)?.gelu_erf()?;
        let ffn = self.output_dense.forward(&ffn)?;
        let h = (h + ffn)?;
        self.final_layer_norm.forward(&h).map_err(Into::into)
    }
}

/// The full waveform encoder.
pub struct AudioEncoder {
    feature_extractor: FeatureExtractor,
    feature_projection: FeatureProjection,
    pos_conv_embed: PositionalConvEmbedding,
    layer_norm: LayerNorm,
    layers: Vec<AudioEncoderLayer>,
    hidden_size: usize,
}

impl AudioEncoder {
    pub fn load(vb: VarBuilder, cfg: &AudioEncoderConfig) -> Result<Self> {
        let mut layers = Vec::with_capacity(cfg.num_layers);
        for i in 0..cfg.num_layers {
            layers.push(AudioEncoderLayer::load(
                vb.pp(format!("encoder.layers.{i}")),
                cfg,
            )?);
        }
        Ok(Self {
            feature_extractor: FeatureExtractor::load(vb.pp("feature_extractor"), cfg)?,
            feature_projection: FeatureProjection::load(vb.pp("feature_projection"), cfg)?,
            pos_conv_embed: PositionalConvEmbedding::load(vb.pp("pos_conv_embed"), cfg)?,
            layer_norm: candle_nn::layer_norm(
                cfg.hidden_size,
                cfg.layer_norm_eps,
                vb.pp("encoder.layer_norm"),
            )?,
            layers,
            hidden_size: cfg.hidden_size,
        })
    }

    /// Encode raw waveforms.
    ///
    /// - `waveforms`: `[B, N]` (f32, 16 kHz mono)
    ///
    /// Returns frame sequences `[B, T, hidden]`.
    pub fn forward_sequences(&self, waveforms: &Tensor) -> Result<Tensor> {
        let x = self.feature_extractor.forward(waveforms)?;
        let x = x.transpose(1, 2)?; // [B, T, C]
        let x = self.feature_projection.forward(&x)?;

        let x = (&x + self.pos_conv_embed.forward(&x)?)?;
        let mut x = self.layer_norm.forward(&x)?;
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }

    /// Encode and pool: mean over frames, `[B, hidden]`.
    pub fn forward_pooled(&self, waveforms: &Tensor) -> Result<Tensor> {
        self.forward_sequences(waveforms)?
            .mean(1)
            .map_err(Into::into)
    }

    /// Output feature width (768 for the base configuration).
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    fn small_cfg() -> AudioEncoderConfig {
        AudioEncoderConfig {
            conv_dim: vec![4, 4],
            conv_kernel: vec![10, 3],
            conv_stride: vec![5, 2],
            hidden_size: 16,
            num_layers: 2,
            num_heads: 2,
            ffn_dim: 32,
            num_conv_pos_embeddings: 4,
            num_conv_pos_embedding_groups: 2,
            layer_norm_eps: 1e-5,
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = AudioEncoderConfig::default();
        assert_eq!(cfg.conv_dim.len(), 7);
        assert_eq!(cfg.hidden_size, 768);
        // Hop length 320: 15 s at 16 kHz → 749 frames.
        assert_eq!(cfg.output_frames(15 * 16_000), 749);
    }

    #[test]
    fn test_output_frames() {
        let cfg = small_cfg();
        // (40 - 10)/5 + 1 = 7, then (7 - 3)/2 + 1 = 3.
        assert_eq!(cfg.output_frames(40), 3);
        // Shorter than the first kernel collapses to zero frames.
        assert_eq!(cfg.output_frames(4), 0);
    }

    #[test]
    fn test_encoder_shapes() {
        let device = Device::Cpu;
        let cfg = small_cfg();
        let vb = VarBuilder::zeros(DType::F32, &device);
        let encoder = AudioEncoder::load(vb, &cfg).unwrap();
        assert_eq!(encoder.hidden_size(), 16);

        let waves = Tensor::randn(0f32, 1.0, (2, 40), &device).unwrap();
        let sequences = encoder.forward_sequences(&waves).unwrap();
        assert_eq!(sequences.dims(), &[2, 3, 16]);

        let pooled = encoder.forward_pooled(&waves).unwrap();
        assert_eq!(pooled.dims(), &[2, 16]);
    }

    #[test]
    fn test_encoder_deterministic() {
        let device = Device::Cpu;
        let cfg = small_cfg();
        let vb = VarBuilder::zeros(DType::F32, &device);
        let encoder = AudioEncoder::load(vb, &cfg).unwrap();

        let waves = Tensor::randn(0f32, 1.0, (1, 40), &device).unwrap();
        let a: Vec<f32> = encoder
            .forward_pooled(&waves)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        let b: Vec<f32> = encoder
            .forward_pooled(&waves)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(a, b);
    }
}
