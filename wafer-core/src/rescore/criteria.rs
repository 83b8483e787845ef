//! Inputs to rescoring: candidates, search criteria, and the per-segment
//! vector views the host assembles.

use std::fmt;

use crate::core::errors::{ErrorCode, Result, WaferError};
use crate::core::fields::SimilarityFunction;
use crate::scorer::bit::DocFilter;
use crate::storage::raw::RawVectorStore;
use crate::storage::reader::FlatVectorReader;

/// One scored hit, addressed by global doc id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub doc: u32,
    pub score: f32,
}

/// The query-operator output this core consumes, not parses: field path,
/// query vector, result limit, candidate oversampling, optional pre-filter.
#[derive(Clone)]
pub struct VectorSearchCriteria {
    pub field: String,
    pub query: Vec<f32>,
    pub limit: usize,
    pub num_candidates: usize,
    pub pre_filter: Option<DocFilter>,
}

impl VectorSearchCriteria {
    pub fn new(
        field: impl Into<String>,
        query: Vec<f32>,
        limit: usize,
        num_candidates: usize,
    ) -> Self {
        VectorSearchCriteria {
            field: field.into(),
            query,
            limit,
            num_candidates,
            pre_filter: None,
        }
    }

    pub fn with_pre_filter(mut self, filter: DocFilter) -> Self {
        self.pre_filter = Some(filter);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.limit == 0 || self.limit > self.num_candidates {
            return Err(WaferError::contract(
                ErrorCode::InvalidCriteria,
                format!(
                    "limit {} must be in 1..={}",
                    self.limit, self.num_candidates
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for VectorSearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorSearchCriteria")
            .field("field", &self.field)
            .field("query_dim", &self.query.len())
            .field("limit", &self.limit)
            .field("num_candidates", &self.num_candidates)
            .field("pre_filter", &self.pre_filter.is_some())
            .finish()
    }
}

/// The vector capabilities of one segment, assembled by the host for a
/// query. Segments are ordered by `doc_base`; a global doc id belongs to
/// the segment with `doc_base <= doc < doc_base + max_doc`.
pub struct SegmentVectors<'a> {
    pub doc_base: u32,
    pub max_doc: u32,
    /// Quantized flat vector storage, absent when this segment was written
    /// without the quantized format.
    pub quantized: Option<&'a FlatVectorReader>,
    /// Full-fidelity float storage.
    pub raw: &'a dyn RawVectorStore,
    pub similarity: SimilarityFunction,
}
