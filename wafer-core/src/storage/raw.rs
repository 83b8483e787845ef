//! Boundary to the host's full-fidelity (non-quantized) float storage.
//!
//! The raw float path is owned by the host engine; this crate consumes it
//! for stage-2 rescoring and for re-quantization during merges. The
//! in-memory implementation backs tests and small merge sources.

use std::collections::BTreeMap;

use crate::core::errors::{Result, WaferError};

/// Read-only access to a segment's original float vectors, addressed by
/// segment-local doc id.
pub trait RawVectorStore: Send + Sync {
    fn dimension(&self) -> usize;

    /// Number of docs with a stored vector.
    fn count(&self) -> u32;

    /// The vector for `doc`, or `None` when the doc has no vector.
    fn vector(&self, doc: u32) -> Result<Option<&[f32]>>;

    /// Ascending iterator over the docs with a stored vector.
    fn docs(&self) -> Box<dyn Iterator<Item = u32> + '_>;
}

/// In-memory raw vector store keyed by doc id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRawVectors {
    dimension: usize,
    vectors: BTreeMap<u32, Vec<f32>>,
}

impl InMemoryRawVectors {
    pub fn new(dimension: usize) -> Self {
        InMemoryRawVectors {
            dimension,
            vectors: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, doc: u32, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(WaferError::VectorDimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        self.vectors.insert(doc, vector);
        Ok(())
    }

    /// Ascending (doc, vector) iterator.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[f32])> {
        self.vectors.iter().map(|(&doc, v)| (doc, v.as_slice()))
    }
}

impl RawVectorStore for InMemoryRawVectors {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn count(&self) -> u32 {
        self.vectors.len() as u32
    }

    fn vector(&self, doc: u32) -> Result<Option<&[f32]>> {
        Ok(self.vectors.get(&doc).map(|v| v.as_slice()))
    }

    fn docs(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        Box::new(self.vectors.keys().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut store = InMemoryRawVectors::new(2);
        store.insert(3, vec![1.0, 2.0]).unwrap();
        assert_eq!(store.count(), 1);
        assert_eq!(store.vector(3).unwrap(), Some([1.0, 2.0].as_slice()));
        assert_eq!(store.vector(4).unwrap(), None);
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut store = InMemoryRawVectors::new(3);
        assert!(store.insert(0, vec![1.0]).is_err());
    }

    #[test]
    fn iterates_in_doc_order() {
        let mut store = InMemoryRawVectors::new(1);
        store.insert(9, vec![9.0]).unwrap();
        store.insert(1, vec![1.0]).unwrap();
        store.insert(5, vec![5.0]).unwrap();
        let docs: Vec<u32> = store.iter().map(|(doc, _)| doc).collect();
        assert_eq!(docs, vec![1, 5, 9]);
    }
}
