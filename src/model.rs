//! Model components for stance classification.
//!
//! ## Components
//!
//! - [`encoder`] — DistilBERT text encoder, wav2vec2-style audio encoder
//! - [`fusion`] — concat and cross-modal transformer fusion heads
//! - [`stance`] — the assembled single-logit stance models

pub mod encoder;
pub mod fusion;
pub mod stance;
