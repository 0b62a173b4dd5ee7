//! Multimodal stance classification in pure Rust.
//!
//! A candle-based implementation of a text + audio stance classifier for
//! debate speech. Loads fine-tuned safetensors weights directly and runs a
//! single evaluation pass over a held-out split.
//!
//! ## Architecture
//!
//! Two pretrained encoders feed a small fusion head:
//!
//! ```text
//! transcript → DistilBERT ───┐
//!                             ├→ fusion (concat | cross-modal transformer)
//! waveform → wav2vec2-style ─┘
//!                             ↓
//!                    Linear → stance logit
//! ```
//!
//! The concat variant joins the two pooled embeddings and applies a single
//! linear layer. The cross-modal variant runs a 4-layer MulT-style
//! transformer where audio sequences attend over text sequences as
//! key/value, mean-pools the result, and classifies.
//!
//! ## Modules
//!
//! - [`audio`] — WAV I/O, mono downmix, fixed-length chunking
//! - [`dataset`] — JSONL manifest loading, tokenization, batch assembly
//! - [`model`] — encoders, fusion heads, the assembled stance models
//! - [`eval`] — checkpoint loading and the accuracy loop

pub mod audio;
pub mod config;
pub mod dataset;
pub mod eval;
pub mod model;

mod error;

pub use error::{Error, Result};
