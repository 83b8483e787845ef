pub mod bit;
pub mod dequant;
pub mod raw;

pub use bit::{BitScorerSupplier, BitSimilarityScorer, DocFilter};
pub use dequant::DequantizingScorer;
pub use raw::RawFloatScorer;

use crate::core::errors::Result;

/// The contract graph traversal requires from a scorer: random-ordinal
/// scoring plus the ordinal/doc bookkeeping around it. Traversal itself
/// lives in the host engine.
pub trait VectorScorer {
    /// Similarity of the vector at `ordinal` against this scorer's query.
    fn score(&mut self, ordinal: u32) -> Result<f32>;

    /// One past the largest scorable ordinal.
    fn max_ordinal(&self) -> u32;

    /// Doc id owning the given ordinal.
    fn ordinal_to_doc(&self, ordinal: u32) -> u32;

    /// Pre-filter hook; ordinals rejected here are never scored.
    fn accept(&self, ordinal: u32) -> bool;
}
