//! Modality encoders.
//!
//! - [`text`] — DistilBERT wrapper (candle-transformers)
//! - [`audio`] — wav2vec2-style waveform encoder

pub mod audio;
pub mod text;

pub use audio::{AudioEncoder, AudioEncoderConfig};
pub use text::{TextEncoder, TextEncoderConfig};
