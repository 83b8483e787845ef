//! Scoring against dequantized stored vectors.
//!
//! Stage-1 rescoring walks candidates in doc order, dequantizes each stored
//! record into a reusable scratch buffer and applies the field's similarity
//! function against the float query. The dequantized view is valid only
//! until the next advance.

use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};
use crate::core::fields::SimilarityFunction;
use crate::storage::cursor::QuantizedVectorCursor;

pub struct DequantizingScorer {
    cursor: QuantizedVectorCursor,
    query: Vec<f32>,
    similarity: SimilarityFunction,
    scratch: Vec<f32>,
    current_doc: Option<u32>,
}

impl DequantizingScorer {
    pub fn new(
        cursor: QuantizedVectorCursor,
        similarity: SimilarityFunction,
        query: &[f32],
    ) -> Result<Self> {
        if query.len() != cursor.dimension() {
            return Err(WaferError::VectorDimensionMismatch {
                expected: cursor.dimension(),
                got: query.len(),
            });
        }
        let dimension = cursor.dimension();
        Ok(DequantizingScorer {
            cursor,
            query: query.to_vec(),
            similarity,
            scratch: vec![0.0; dimension],
            current_doc: None,
        })
    }

    /// Position on a segment-local doc id. A doc without a stored vector is
    /// an internal inconsistency between the graph and vector storage.
    pub fn advance(&mut self, doc: u32) -> Result<()> {
        let ordinal = self
            .cursor
            .doc_map()
            .doc_to_ordinal(doc)
            .ok_or(WaferError::DocMissingVector { doc })?;
        let packed = self.cursor.packed_vector(ordinal)?;
        bitpack::unpack(packed, &mut self.scratch)?;
        self.current_doc = Some(doc);
        Ok(())
    }

    /// Dequantized view of the current vector; valid until the next advance.
    pub fn vector_value(&self) -> Result<&[f32]> {
        if self.current_doc.is_none() {
            return Err(WaferError::contract(
                ErrorCode::OrdinalOutOfBounds,
                "vector_value() before the first advance",
            ));
        }
        Ok(&self.scratch)
    }

    /// Similarity of the current vector against the query.
    pub fn score(&self) -> Result<f32> {
        let vector = self.vector_value()?;
        Ok(self.similarity.score(&self.query, vector))
    }
}
