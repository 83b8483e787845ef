//! Random-access cursors over stored binary-quantized vectors.
//!
//! A segment stores vectors for a field in one of three topologies:
//! dense (every doc up to `max_doc` has a vector, ordinal == doc), sparse
//! (a monotone ordinal → doc table), or empty. All three sit behind
//! [`QuantizedVectorCursor`], dispatched as tagged variants.

use std::sync::Arc;

use memmap2::Mmap;

use crate::compression::binary_quant::BinaryQuantizer;
use crate::core::errors::{ErrorCode, Result, WaferError};

/// Ordinal ↔ doc-id mapping for one field in one segment.
#[derive(Debug, Clone)]
pub enum DocIdMap {
    /// Every doc in `0..count` has a vector; ordinal == doc.
    Dense { count: u32 },
    /// Ascending doc ids indexed by ordinal.
    Sparse { docs: Arc<Vec<u32>> },
    /// No vectors stored.
    Empty,
}

impl DocIdMap {
    pub fn count(&self) -> u32 {
        match self {
            DocIdMap::Dense { count } => *count,
            DocIdMap::Sparse { docs } => docs.len() as u32,
            DocIdMap::Empty => 0,
        }
    }

    /// Doc id owning the given ordinal. Ordinal must be in bounds.
    pub fn ordinal_to_doc(&self, ordinal: u32) -> u32 {
        match self {
            DocIdMap::Dense { .. } => ordinal,
            DocIdMap::Sparse { docs } => docs[ordinal as usize],
            DocIdMap::Empty => ordinal,
        }
    }

    /// Ordinal of the given doc id, if the doc has a vector.
    pub fn doc_to_ordinal(&self, doc: u32) -> Option<u32> {
        match self {
            DocIdMap::Dense { count } => (doc < *count).then_some(doc),
            DocIdMap::Sparse { docs } => docs.binary_search(&doc).ok().map(|i| i as u32),
            DocIdMap::Empty => None,
        }
    }

    /// Ascending iterator over the docs that have a vector.
    pub fn iter_docs(&self) -> DocIdIter<'_> {
        DocIdIter { map: self, next: 0 }
    }
}

/// Iterator over the doc-id set of a [`DocIdMap`], ascending.
pub struct DocIdIter<'a> {
    map: &'a DocIdMap,
    next: u32,
}

impl Iterator for DocIdIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next >= self.map.count() {
            return None;
        }
        let doc = self.map.ordinal_to_doc(self.next);
        self.next += 1;
        Some(doc)
    }
}

/// Random-ordinal cursor over one field's StoredRecords.
///
/// Each read copies the record's packed bits into an owned scratch buffer; a
/// single-slot last-ordinal cache skips the copy when graph traversal scores
/// the same ordinal repeatedly. The returned slice is valid until the next
/// read on the same cursor. Cloning yields an independent cursor (fresh
/// cache, shared immutable mapping), safe to hand to another thread.
pub struct QuantizedVectorCursor {
    data: Arc<Mmap>,
    block_offset: usize,
    dimension: usize,
    packed_len: usize,
    record_size: usize,
    doc_map: DocIdMap,
    quantizer: Option<BinaryQuantizer>,
    scratch: Vec<u8>,
    correction: f32,
    last_ordinal: Option<u32>,
}

impl QuantizedVectorCursor {
    pub(crate) fn new(
        data: Arc<Mmap>,
        block_offset: usize,
        dimension: usize,
        packed_len: usize,
        record_size: usize,
        doc_map: DocIdMap,
        quantizer: Option<BinaryQuantizer>,
    ) -> Self {
        QuantizedVectorCursor {
            data,
            block_offset,
            dimension,
            packed_len,
            record_size,
            doc_map,
            quantizer,
            scratch: vec![0u8; packed_len],
            correction: 0.0,
            last_ordinal: None,
        }
    }

    pub fn count(&self) -> u32 {
        self.doc_map.count()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Packed byte length of each stored vector.
    pub fn packed_len(&self) -> usize {
        self.packed_len
    }

    pub fn doc_map(&self) -> &DocIdMap {
        &self.doc_map
    }

    pub fn quantizer(&self) -> Option<&BinaryQuantizer> {
        self.quantizer.as_ref()
    }

    fn check_ordinal(&self, ordinal: u32) -> Result<()> {
        if ordinal >= self.count() {
            return Err(WaferError::contract(
                ErrorCode::OrdinalOutOfBounds,
                format!("ordinal {} out of bounds for {} vectors", ordinal, self.count()),
            ));
        }
        Ok(())
    }

    fn record_range(&self, ordinal: u32) -> (usize, usize) {
        let start = self.block_offset + ordinal as usize * self.record_size;
        (start, start + self.record_size)
    }

    /// Packed bits of the vector at `ordinal`. Valid until the next read.
    pub fn packed_vector(&mut self, ordinal: u32) -> Result<&[u8]> {
        self.check_ordinal(ordinal)?;
        if self.last_ordinal != Some(ordinal) {
            let (start, end) = self.record_range(ordinal);
            let record = &self.data[start..end];
            self.scratch.copy_from_slice(&record[..self.packed_len]);
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&record[self.packed_len..]);
            self.correction = f32::from_le_bytes(bytes);
            self.last_ordinal = Some(ordinal);
        }
        Ok(&self.scratch)
    }

    /// Score correction of the vector at `ordinal`. Reads only the
    /// correction slot when the record is not already cached.
    pub fn correction(&mut self, ordinal: u32) -> Result<f32> {
        self.check_ordinal(ordinal)?;
        if self.last_ordinal == Some(ordinal) {
            return Ok(self.correction);
        }
        let (_, end) = self.record_range(ordinal);
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[end - 4..end]);
        Ok(f32::from_le_bytes(bytes))
    }
}

impl Clone for QuantizedVectorCursor {
    fn clone(&self) -> Self {
        QuantizedVectorCursor::new(
            Arc::clone(&self.data),
            self.block_offset,
            self.dimension,
            self.packed_len,
            self.record_size,
            self.doc_map.clone(),
            self.quantizer,
        )
    }
}
