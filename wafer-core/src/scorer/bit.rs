//! Bit-similarity scoring over packed quantized vectors.
//!
//! This is the scorer graph traversal runs against: an XNOR-popcount
//! similarity normalized by the padded bit count. The normalization keeps
//! scores in `[0, 1]`; only the ordering is contractual, not the scale.

use std::sync::Arc;

use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};
use crate::scorer::VectorScorer;
use crate::storage::cursor::QuantizedVectorCursor;
use crate::storage::reader::FlatVectorReader;

/// Doc-level pre-filter applied through `accept`.
pub type DocFilter = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// Scores stored vectors against one packed query by bit similarity.
pub struct BitSimilarityScorer {
    query: Vec<u8>,
    cursor: QuantizedVectorCursor,
    bit_dimensions: u32,
    filter: Option<DocFilter>,
}

impl BitSimilarityScorer {
    pub(crate) fn new(
        query: Vec<u8>,
        cursor: QuantizedVectorCursor,
        filter: Option<DocFilter>,
    ) -> Result<Self> {
        if query.len() != cursor.packed_len() {
            return Err(WaferError::contract(
                ErrorCode::PackBufferSize,
                format!(
                    "packed query is {} bytes, stored vectors are {}",
                    query.len(),
                    cursor.packed_len()
                ),
            ));
        }
        let bit_dimensions = cursor.packed_len() as u32 * 8;
        Ok(BitSimilarityScorer {
            query,
            cursor,
            bit_dimensions,
            filter,
        })
    }
}

impl VectorScorer for BitSimilarityScorer {
    fn score(&mut self, ordinal: u32) -> Result<f32> {
        let stored = self.cursor.packed_vector(ordinal)?;
        let differing = bitpack::xor_bit_count(&self.query, stored);
        Ok((self.bit_dimensions - differing) as f32 / self.bit_dimensions as f32)
    }

    fn max_ordinal(&self) -> u32 {
        self.cursor.count()
    }

    fn ordinal_to_doc(&self, ordinal: u32) -> u32 {
        self.cursor.doc_map().ordinal_to_doc(ordinal)
    }

    fn accept(&self, ordinal: u32) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter(self.ordinal_to_doc(ordinal)),
        }
    }
}

/// Produces independent [`BitSimilarityScorer`]s over one field's corpus.
///
/// Every scorer (and every `copy` of the supplier) owns its own cursor, so
/// concurrent graph construction can score many queries against the same
/// corpus with no shared mutable state.
pub struct BitScorerSupplier {
    cursor: QuantizedVectorCursor,
    filter: Option<DocFilter>,
}

impl BitScorerSupplier {
    pub fn new(reader: &FlatVectorReader, field: &str) -> Result<Self> {
        Ok(BitScorerSupplier {
            cursor: reader.cursor(field)?,
            filter: None,
        })
    }

    pub fn with_filter(mut self, filter: DocFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Scorer for a query that is already packed.
    pub fn scorer_for_packed(&self, query: Vec<u8>) -> Result<BitSimilarityScorer> {
        BitSimilarityScorer::new(query, self.cursor.clone(), self.filter.clone())
    }

    /// Scorer for a raw float query, quantized with the same sign rule as
    /// the stored vectors.
    pub fn scorer_for_floats(&self, query: &[f32]) -> Result<BitSimilarityScorer> {
        if query.len() != self.cursor.dimension() {
            return Err(WaferError::VectorDimensionMismatch {
                expected: self.cursor.dimension(),
                got: query.len(),
            });
        }
        let bits: Vec<bool> = query.iter().map(|&v| v > 0.0).collect();
        let mut packed = vec![0u8; bitpack::required_bytes(bits.len())];
        bitpack::pack(&bits, &mut packed)?;
        self.scorer_for_packed(packed)
    }

    /// Independent supplier over a fresh cursor, safe to move to another
    /// thread.
    pub fn copy(&self) -> Self {
        BitScorerSupplier {
            cursor: self.cursor.clone(),
            filter: self.filter.clone(),
        }
    }
}
