// ============================================================================
// CORE TYPES & UTILITIES
// ============================================================================
pub mod core;

// ============================================================================
// QUANTIZATION & BIT PACKING
// ============================================================================
pub mod compression;

// ============================================================================
// STORAGE & ON-DISK FORMAT
// ============================================================================
pub mod storage;

// ============================================================================
// SCORING
// ============================================================================
pub mod scorer;

// ============================================================================
// SEGMENT MERGING
// ============================================================================
pub mod merge;

// ============================================================================
// TWO-STAGE RESCORING
// ============================================================================
pub mod rescore;

// Re-export commonly used types
pub use crate::compression::{BinaryQuantizer, SCORE_CORRECTION};
pub use crate::core::{ErrorCode, FieldInfo, FieldSchema, Result, SimilarityFunction, WaferError};
pub use crate::merge::{
    merge_field, merge_quantiles, should_recompute, should_requantize, MergeSource,
};
pub use crate::rescore::{Candidate, SegmentVectors, TwoStageRescorer, VectorSearchCriteria};
pub use crate::scorer::{
    BitScorerSupplier, BitSimilarityScorer, DequantizingScorer, DocFilter, RawFloatScorer,
    VectorScorer,
};
pub use crate::storage::{
    DocIdMap, FieldEntry, FlatVectorReader, FlatVectorWriter, InMemoryRawVectors, MergedRecord,
    QuantizedVectorCursor, RawVectorStore, WriterConfig,
};
