//! Fusion heads combining text and audio representations.
//!
//! - [`concat`] — concatenate pooled embeddings, dropout, linear classifier
//! - [`cross_attention`] — MulT-style cross-modal transformer over sequences

pub mod concat;
pub mod cross_attention;

pub use concat::ConcatFusion;
pub use cross_attention::{CrossAttentionFusion, CrossModalConfig, CrossModalTransformer};
