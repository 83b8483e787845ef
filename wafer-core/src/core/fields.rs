use serde::{Deserialize, Serialize};

use crate::core::errors::{ErrorCode, Result, WaferError};

/// Similarity function applied between a query vector and a stored vector.
///
/// All variants are score-shaped: higher means closer. The conversion from
/// raw distance keeps scores in a bounded, comparable range so that graph
/// traversal and rescoring can mix segments freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityFunction {
    Euclidean,
    DotProduct,
    Cosine,
}

impl SimilarityFunction {
    /// Score two vectors of equal dimension.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            SimilarityFunction::Euclidean => {
                let d2: f32 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
                1.0 / (1.0 + d2)
            }
            SimilarityFunction::DotProduct => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                (1.0 + dot) / 2.0
            }
            SimilarityFunction::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let denom = (norm_a * norm_b).sqrt();
                if denom == 0.0 {
                    return 0.0;
                }
                (1.0 + dot / denom) / 2.0
            }
        }
    }

    /// On-disk marker value.
    pub(crate) fn marker(&self) -> u32 {
        match self {
            SimilarityFunction::Euclidean => 0,
            SimilarityFunction::DotProduct => 1,
            SimilarityFunction::Cosine => 2,
        }
    }

    pub(crate) fn from_marker(marker: u32) -> Result<Self> {
        match marker {
            0 => Ok(SimilarityFunction::Euclidean),
            1 => Ok(SimilarityFunction::DotProduct),
            2 => Ok(SimilarityFunction::Cosine),
            other => Err(WaferError::corruption(
                ErrorCode::SchemaMismatch,
                format!("unknown similarity marker: {}", other),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SimilarityFunction::Euclidean => "euclidean",
            SimilarityFunction::DotProduct => "dotProduct",
            SimilarityFunction::Cosine => "cosine",
        }
    }
}

/// Authoritative description of one vector field in a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub number: i32,
    pub name: String,
    pub dimension: u32,
    pub similarity: SimilarityFunction,
}

/// Per-segment field schema. The reader validates every on-disk field entry
/// against this table; an entry for a number the schema does not know is
/// treated as corruption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: Vec<FieldInfo>,
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        FieldSchema { fields }
    }

    pub fn by_number(&self, number: i32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }
}
