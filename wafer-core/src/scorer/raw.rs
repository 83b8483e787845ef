//! Full-fidelity scoring over the host's original float storage.
//!
//! Used only by stage-2 rescoring: a thin adapter that looks a doc's raw
//! vector up and applies the field's similarity function.

use crate::core::errors::{Result, WaferError};
use crate::core::fields::SimilarityFunction;
use crate::storage::raw::RawVectorStore;

pub struct RawFloatScorer<'a> {
    store: &'a dyn RawVectorStore,
    query: &'a [f32],
    similarity: SimilarityFunction,
}

impl<'a> RawFloatScorer<'a> {
    pub fn new(
        store: &'a dyn RawVectorStore,
        similarity: SimilarityFunction,
        query: &'a [f32],
    ) -> Result<Self> {
        if query.len() != store.dimension() {
            return Err(WaferError::VectorDimensionMismatch {
                expected: store.dimension(),
                got: query.len(),
            });
        }
        Ok(RawFloatScorer {
            store,
            query,
            similarity,
        })
    }

    /// Score a segment-local doc id against the query.
    pub fn score(&self, doc: u32) -> Result<f32> {
        let vector = self
            .store
            .vector(doc)?
            .ok_or(WaferError::DocMissingVector { doc })?;
        Ok(self.similarity.score(self.query, vector))
    }
}
