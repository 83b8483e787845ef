//! Reader for the binary-quantized flat vector format.
//!
//! All metadata is parsed eagerly on open into a per-field table, with every
//! entry validated against the authoritative field schema and the record
//! byte-length formula. The data stream is memory-mapped; cursors over it
//! are independent and cheap, so a sealed segment supports any number of
//! concurrent readers.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::compression::binary_quant::BinaryQuantizer;
use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};
use crate::core::fields::{FieldInfo, FieldSchema, SimilarityFunction};
use crate::storage::cursor::{DocIdMap, QuantizedVectorCursor};
use crate::storage::format::{
    self, ByteReader, DATA_CODEC_NAME, DATA_EXTENSION, END_OF_FIELDS, ENCODING_FLOAT32,
    FOOTER_LEN, META_CODEC_NAME, META_EXTENSION, VERSION_ADD_BITS,
};

/// Parsed metadata for one field in one segment.
#[derive(Debug, Clone)]
pub struct FieldEntry {
    info: FieldInfo,
    data_offset: u64,
    data_length: u64,
    max_doc: u32,
    quantizer: Option<BinaryQuantizer>,
    doc_map: DocIdMap,
}

impl FieldEntry {
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    pub fn dimension(&self) -> u32 {
        self.info.dimension
    }

    pub fn count(&self) -> u32 {
        self.doc_map.count()
    }

    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn quantizer(&self) -> Option<&BinaryQuantizer> {
        self.quantizer.as_ref()
    }

    pub fn doc_map(&self) -> &DocIdMap {
        &self.doc_map
    }
}

/// Reader over one segment's metadata and data streams.
#[derive(Debug)]
pub struct FlatVectorReader {
    version: u32,
    data: Arc<Mmap>,
    fields: HashMap<String, FieldEntry>,
}

impl FlatVectorReader {
    /// Open and validate a segment. The metadata stream is checksummed
    /// eagerly; the data stream's footer is validated structurally, with the
    /// full hash deferred to [`check_integrity`](Self::check_integrity).
    pub fn open(
        dir: &Path,
        segment_name: &str,
        segment_id: [u8; 16],
        schema: &FieldSchema,
    ) -> Result<Self> {
        let meta_path = dir.join(format::segment_file_name(segment_name, META_EXTENSION));
        let meta_bytes =
            fs::read(&meta_path).map_err(|e| WaferError::io("read metadata stream", e))?;
        format::check_footer(&meta_bytes)?;

        let body = &meta_bytes[..meta_bytes.len() - FOOTER_LEN];
        let mut meta = ByteReader::new(body);
        let version = format::check_header(&mut meta, META_CODEC_NAME, &segment_id)?;

        let mut fields = HashMap::new();
        loop {
            let field_number = meta.read_i32()?;
            if field_number == END_OF_FIELDS {
                break;
            }
            let (name, entry) = Self::read_field(&mut meta, version, field_number, schema)?;
            if fields.insert(name.clone(), entry).is_some() {
                return Err(WaferError::corruption(
                    ErrorCode::UnexpectedFieldNumber,
                    format!("duplicate metadata entry for field {}", name),
                ));
            }
        }

        let data_path = dir.join(format::segment_file_name(segment_name, DATA_EXTENSION));
        let data_file =
            File::open(&data_path).map_err(|e| WaferError::io("open data stream", e))?;
        // Read-only map of a sealed, write-once stream.
        let data = unsafe {
            MmapOptions::new()
                .map(&data_file)
                .map_err(|e| WaferError::io("map data stream", e))?
        };
        format::retrieve_footer(&data)?;
        let mut data_header = ByteReader::new(&data);
        let data_version = format::check_header(&mut data_header, DATA_CODEC_NAME, &segment_id)?;
        if data_version != version {
            return Err(WaferError::corruption(
                ErrorCode::FormatVersionMismatch,
                format!(
                    "format versions mismatch: meta={}, data={}",
                    version, data_version
                ),
            ));
        }
        let data_start = data_header.position() as u64;
        let data_end = (data.len() - FOOTER_LEN) as u64;
        for (name, entry) in &fields {
            if entry.data_offset < data_start
                || entry.data_offset + entry.data_length > data_end
            {
                return Err(WaferError::corruption(
                    ErrorCode::DataLengthMismatch,
                    format!(
                        "field {} block [{}, {}) outside data stream [{}, {})",
                        name,
                        entry.data_offset,
                        entry.data_offset + entry.data_length,
                        data_start,
                        data_end
                    ),
                ));
            }
        }

        Ok(FlatVectorReader {
            version,
            data: Arc::new(data),
            fields,
        })
    }

    fn read_field(
        meta: &mut ByteReader<'_>,
        version: u32,
        field_number: i32,
        schema: &FieldSchema,
    ) -> Result<(String, FieldEntry)> {
        let info = schema.by_number(field_number).ok_or_else(|| {
            WaferError::corruption(
                ErrorCode::UnexpectedFieldNumber,
                format!("invalid field number: {}", field_number),
            )
        })?;

        let encoding = meta.read_u32()?;
        if encoding != ENCODING_FLOAT32 {
            return Err(WaferError::corruption(
                ErrorCode::SchemaMismatch,
                format!("field {} has unsupported encoding {}", info.name, encoding),
            ));
        }
        let similarity = SimilarityFunction::from_marker(meta.read_u32()?)?;
        if similarity != info.similarity {
            return Err(WaferError::corruption(
                ErrorCode::SchemaMismatch,
                format!(
                    "inconsistent similarity for field {}: {} != {}",
                    info.name,
                    similarity.name(),
                    info.similarity.name()
                ),
            ));
        }
        let data_offset = meta.read_u64()?;
        let data_length = meta.read_u64()?;
        let dimension = meta.read_u32()?;
        if dimension != info.dimension {
            return Err(WaferError::corruption(
                ErrorCode::SchemaMismatch,
                format!(
                    "inconsistent vector dimension for field {}: {} != {}",
                    info.name, dimension, info.dimension
                ),
            ));
        }
        let count = meta.read_u32()?;

        let expected_length =
            count as u64 * format::record_byte_size(dimension as usize) as u64;
        if expected_length != data_length {
            return Err(WaferError::corruption(
                ErrorCode::DataLengthMismatch,
                format!(
                    "data length {} not matching count={} * (packed {} + 4) = {}",
                    data_length,
                    count,
                    bitpack::required_bytes(dimension as usize),
                    expected_length
                ),
            ));
        }

        let quantizer = if count > 0 {
            if version >= VERSION_ADD_BITS {
                let bits = meta.read_u8()?;
                if bits != 1 {
                    return Err(WaferError::corruption(
                        ErrorCode::SchemaMismatch,
                        format!("field {} stored with {} bits, expected 1", info.name, bits),
                    ));
                }
                let _compressed = meta.read_u8()?;
            }
            let lower = meta.read_f32()?;
            let upper = meta.read_f32()?;
            if !lower.is_finite() || !upper.is_finite() {
                return Err(WaferError::corruption(
                    ErrorCode::SchemaMismatch,
                    format!("field {} has non-finite quantiles", info.name),
                ));
            }
            Some(BinaryQuantizer::new(lower, upper))
        } else {
            None
        };

        let max_doc = meta.read_u32()?;
        let doc_map = if count == 0 {
            DocIdMap::Empty
        } else if count == max_doc {
            DocIdMap::Dense { count }
        } else {
            let mut docs = Vec::with_capacity(count as usize);
            for _ in 0..count {
                docs.push(meta.read_u32()?);
            }
            for window in docs.windows(2) {
                if window[1] <= window[0] {
                    return Err(WaferError::corruption(
                        ErrorCode::SchemaMismatch,
                        format!("doc ids not ascending for field {}", info.name),
                    ));
                }
            }
            if let Some(&last) = docs.last() {
                if last >= max_doc {
                    return Err(WaferError::corruption(
                        ErrorCode::SchemaMismatch,
                        format!("doc {} >= max_doc {} for field {}", last, max_doc, info.name),
                    ));
                }
            }
            DocIdMap::Sparse {
                docs: Arc::new(docs),
            }
        };

        Ok((
            info.name.clone(),
            FieldEntry {
                info: info.clone(),
                data_offset,
                data_length,
                max_doc,
                quantizer,
                doc_map,
            },
        ))
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldEntry)> {
        self.fields.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Quantization state of a field, absent when the field stored no
    /// vectors. The field itself must exist in this segment.
    pub fn quantizer(&self, field: &str) -> Result<Option<BinaryQuantizer>> {
        let entry = self
            .fields
            .get(field)
            .ok_or_else(|| WaferError::FieldNotFound(field.to_string()))?;
        Ok(entry.quantizer)
    }

    /// Independent random-access cursor over a field's stored records.
    pub fn cursor(&self, field: &str) -> Result<QuantizedVectorCursor> {
        let entry = self
            .fields
            .get(field)
            .ok_or_else(|| WaferError::FieldNotFound(field.to_string()))?;
        let dimension = entry.info.dimension as usize;
        Ok(QuantizedVectorCursor::new(
            Arc::clone(&self.data),
            entry.data_offset as usize,
            dimension,
            bitpack::required_bytes(dimension),
            format::record_byte_size(dimension),
            entry.doc_map.clone(),
            entry.quantizer,
        ))
    }

    /// Re-hash the entire data stream against its stored checksum.
    pub fn check_integrity(&self) -> Result<()> {
        format::check_footer(&self.data)
    }
}
