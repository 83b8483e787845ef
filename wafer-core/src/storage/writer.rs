//! Writer for the binary-quantized flat vector format.
//!
//! The writer buffers raw float vectors per field in memory, fed in
//! ascending doc order by the host's indexing pipeline. `flush` calibrates
//! (or, on merge, reuses) a quantizer per field and streams StoredRecords in
//! natural or sorted doc order; `finish` seals both streams with footer
//! checksums. A writer produces exactly one segment and is not thread-safe.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compression::binary_quant::BinaryQuantizer;
use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};
use crate::core::fields::{FieldInfo, FieldSchema};
use crate::storage::format::{
    self, ChecksumWriter, DATA_CODEC_NAME, DATA_EXTENSION, END_OF_FIELDS, ENCODING_FLOAT32,
    META_CODEC_NAME, META_EXTENSION, VERSION_ADD_BITS, VERSION_CURRENT, VERSION_START,
};

/// Identity and layout version of the segment being written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    pub segment_name: String,
    pub segment_id: [u8; 16],
    pub version: u32,
}

impl WriterConfig {
    pub fn new(segment_name: impl Into<String>, segment_id: [u8; 16]) -> Self {
        WriterConfig {
            segment_name: segment_name.into(),
            segment_id,
            version: VERSION_CURRENT,
        }
    }

    /// Write an older layout version; used for compatibility tests and
    /// reindex tooling.
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

/// One record produced by the merge pipeline: already-packed bits plus the
/// score correction, addressed to its post-merge doc id.
#[derive(Debug, Clone)]
pub struct MergedRecord {
    pub doc: u32,
    pub packed: Vec<u8>,
    pub correction: f32,
}

struct FieldWriter {
    info: FieldInfo,
    docs: Vec<u32>,
    vectors: Vec<Vec<f32>>,
}

/// Writer for one segment's metadata and data streams.
pub struct FlatVectorWriter {
    config: WriterConfig,
    meta_path: PathBuf,
    data_path: PathBuf,
    meta: Option<ChecksumWriter<BufWriter<File>>>,
    data: Option<ChecksumWriter<BufWriter<File>>>,
    fields: Vec<FieldWriter>,
    schema: FieldSchema,
    finished: bool,
}

impl FlatVectorWriter {
    /// Create both streams and write their headers.
    pub fn create(dir: &Path, schema: FieldSchema, config: WriterConfig) -> Result<Self> {
        if !(VERSION_START..=VERSION_CURRENT).contains(&config.version) {
            return Err(WaferError::contract(
                ErrorCode::FormatVersionMismatch,
                format!("cannot write unknown format version {}", config.version),
            ));
        }
        let meta_path = dir.join(format::segment_file_name(&config.segment_name, META_EXTENSION));
        let data_path = dir.join(format::segment_file_name(&config.segment_name, DATA_EXTENSION));

        let meta_file = File::create(&meta_path)
            .map_err(|e| WaferError::io("create metadata stream", e))?;
        let data_file = File::create(&data_path)
            .map_err(|e| WaferError::io("create data stream", e))?;

        let mut meta = ChecksumWriter::new(BufWriter::new(meta_file));
        let mut data = ChecksumWriter::new(BufWriter::new(data_file));
        meta.write_header(META_CODEC_NAME, config.version, &config.segment_id)?;
        data.write_header(DATA_CODEC_NAME, config.version, &config.segment_id)?;

        Ok(FlatVectorWriter {
            config,
            meta_path,
            data_path,
            meta: Some(meta),
            data: Some(data),
            fields: Vec::new(),
            schema,
            finished: false,
        })
    }

    /// Register a field for buffered writes. The field must exist in the
    /// segment schema.
    pub fn add_field(&mut self, field_number: i32) -> Result<()> {
        let info = self
            .schema
            .by_number(field_number)
            .ok_or_else(|| WaferError::FieldNotFound(format!("field number {}", field_number)))?
            .clone();
        if self.fields.iter().any(|f| f.info.number == field_number) {
            return Err(WaferError::contract(
                ErrorCode::UnexpectedFieldNumber,
                format!("field {} registered twice", field_number),
            ));
        }
        self.fields.push(FieldWriter {
            info,
            docs: Vec::new(),
            vectors: Vec::new(),
        });
        Ok(())
    }

    /// Buffer one vector. Docs must arrive in strictly ascending order.
    pub fn add_vector(&mut self, field_number: i32, doc: u32, vector: &[f32]) -> Result<()> {
        let field = self
            .fields
            .iter_mut()
            .find(|f| f.info.number == field_number)
            .ok_or_else(|| WaferError::FieldNotFound(format!("field number {}", field_number)))?;
        if vector.len() != field.info.dimension as usize {
            return Err(WaferError::VectorDimensionMismatch {
                expected: field.info.dimension as usize,
                got: vector.len(),
            });
        }
        if let Some(&last) = field.docs.last() {
            if doc <= last {
                return Err(WaferError::contract(
                    ErrorCode::DocOrderViolation,
                    format!("doc {} after doc {} for field {}", doc, last, field.info.name),
                ));
            }
        }
        field.docs.push(doc);
        field.vectors.push(vector.to_vec());
        Ok(())
    }

    /// Write all buffered fields. `sort_map`, when present, maps each old doc
    /// id to its position under the segment's index sort; records are then
    /// emitted in sorted doc order.
    pub fn flush(&mut self, max_doc: u32, sort_map: Option<&[u32]>) -> Result<()> {
        if let Some(map) = sort_map {
            if map.len() != max_doc as usize {
                return Err(WaferError::contract(
                    ErrorCode::InvalidCriteria,
                    format!("sort map covers {} docs, segment has {}", map.len(), max_doc),
                ));
            }
        }
        let fields = std::mem::take(&mut self.fields);
        for field in fields {
            self.write_field(field, max_doc, sort_map)?;
        }
        Ok(())
    }

    fn write_field(
        &mut self,
        field: FieldWriter,
        max_doc: u32,
        sort_map: Option<&[u32]>,
    ) -> Result<()> {
        if let Some(&last) = field.docs.last() {
            if last >= max_doc {
                return Err(WaferError::contract(
                    ErrorCode::DocOrderViolation,
                    format!("doc {} >= max_doc {}", last, max_doc),
                ));
            }
        }
        let count = field.docs.len();
        let quantizer = if count == 0 {
            None
        } else {
            Some(BinaryQuantizer::from_sampling(
                field.vectors.iter().map(|v| v.as_slice()),
            ))
        };

        // Emission order: natural, or ascending post-sort doc ids.
        let (order, docs): (Vec<usize>, Vec<u32>) = match sort_map {
            None => ((0..count).collect(), field.docs.clone()),
            Some(map) => {
                let mut pairs: Vec<(u32, usize)> = field
                    .docs
                    .iter()
                    .enumerate()
                    .map(|(ordinal, &doc)| (map[doc as usize], ordinal))
                    .collect();
                pairs.sort_unstable_by_key(|&(new_doc, _)| new_doc);
                (
                    pairs.iter().map(|&(_, ordinal)| ordinal).collect(),
                    pairs.iter().map(|&(new_doc, _)| new_doc).collect(),
                )
            }
        };

        let data = Self::stream(&mut self.data)?;
        let offset = data.align_f32()?;
        if let Some(quantizer) = &quantizer {
            let mut packed = vec![0u8; bitpack::required_bytes(field.info.dimension as usize)];
            for &ordinal in &order {
                let correction = quantizer.quantize(&field.vectors[ordinal], &mut packed)?;
                data.write_bytes(&packed)?;
                data.write_f32(correction)?;
            }
        }
        let length = Self::stream(&mut self.data)?.position() - offset;

        debug!(
            field = %field.info.name,
            count,
            offset,
            length,
            sorted = sort_map.is_some(),
            "flushed quantized vector field"
        );
        self.write_meta(&field.info, max_doc, offset, length, quantizer.as_ref(), &docs)
    }

    /// Write one field produced by the merge pipeline: records are already
    /// quantized and arrive in ascending post-merge doc order.
    pub fn write_merged_field<I>(
        &mut self,
        field_number: i32,
        max_doc: u32,
        quantizer: &BinaryQuantizer,
        records: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = Result<MergedRecord>>,
    {
        let info = self
            .schema
            .by_number(field_number)
            .ok_or_else(|| WaferError::FieldNotFound(format!("field number {}", field_number)))?
            .clone();
        let packed_len = bitpack::required_bytes(info.dimension as usize);

        let data = Self::stream(&mut self.data)?;
        let offset = data.align_f32()?;
        let mut docs = Vec::new();
        for record in records {
            let record = record?;
            if record.packed.len() != packed_len {
                return Err(WaferError::contract(
                    ErrorCode::PackBufferSize,
                    format!(
                        "merged record is {} bytes, field {} requires {}",
                        record.packed.len(),
                        info.name,
                        packed_len
                    ),
                ));
            }
            if let Some(&last) = docs.last() {
                if record.doc <= last {
                    return Err(WaferError::contract(
                        ErrorCode::DocOrderViolation,
                        format!("merged doc {} after doc {}", record.doc, last),
                    ));
                }
            }
            data.write_bytes(&record.packed)?;
            data.write_f32(record.correction)?;
            docs.push(record.doc);
        }
        let length = Self::stream(&mut self.data)?.position() - offset;

        debug!(
            field = %info.name,
            count = docs.len(),
            offset,
            length,
            "wrote merged quantized vector field"
        );
        let quantizer = if docs.is_empty() { None } else { Some(quantizer) };
        self.write_meta(&info, max_doc, offset, length, quantizer, &docs)
    }

    fn write_meta(
        &mut self,
        info: &FieldInfo,
        max_doc: u32,
        offset: u64,
        length: u64,
        quantizer: Option<&BinaryQuantizer>,
        docs: &[u32],
    ) -> Result<()> {
        let version = self.config.version;
        let meta = Self::stream(&mut self.meta)?;
        meta.write_i32(info.number)?;
        meta.write_u32(ENCODING_FLOAT32)?;
        meta.write_u32(info.similarity.marker())?;
        meta.write_u64(offset)?;
        meta.write_u64(length)?;
        meta.write_u32(info.dimension)?;
        let count = docs.len() as u32;
        meta.write_u32(count)?;
        if count > 0 {
            let quantizer = quantizer.ok_or_else(|| {
                WaferError::contract(
                    ErrorCode::MissingQuantizer,
                    format!("field {} has vectors but no quantizer", info.name),
                )
            })?;
            if version >= VERSION_ADD_BITS {
                meta.write_u8(1)?; // bits
                meta.write_u8(1)?; // compressed
            }
            meta.write_f32(quantizer.lower_quantile())?;
            meta.write_f32(quantizer.upper_quantile())?;
        }
        // Doc-id mapping block, sized against count/max_doc.
        meta.write_u32(max_doc)?;
        if count > 0 && count != max_doc {
            for &doc in docs {
                meta.write_u32(doc)?;
            }
        }
        Ok(())
    }

    /// Seal both streams. Fails loudly on a second call.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(WaferError::contract(
                ErrorCode::AlreadyFinished,
                "finish() called twice on vector writer",
            ));
        }
        if !self.fields.is_empty() {
            return Err(WaferError::contract(
                ErrorCode::AlreadyFinished,
                "finish() called with unflushed fields",
            ));
        }
        self.finished = true;

        let mut meta = self.meta.take().ok_or_else(|| {
            WaferError::contract(ErrorCode::AlreadyFinished, "metadata stream already sealed")
        })?;
        meta.write_i32(END_OF_FIELDS)?;
        Self::seal(meta, &self.meta_path)?;

        let data = self.data.take().ok_or_else(|| {
            WaferError::contract(ErrorCode::AlreadyFinished, "data stream already sealed")
        })?;
        Self::seal(data, &self.data_path)?;
        debug!(segment = %self.config.segment_name, "sealed quantized vector segment");
        Ok(())
    }

    fn seal(stream: ChecksumWriter<BufWriter<File>>, path: &Path) -> Result<()> {
        let mut writer = stream.finish_footer()?;
        writer
            .flush()
            .map_err(|e| WaferError::io("flush stream", e))?;
        let file = writer
            .into_inner()
            .map_err(|e| WaferError::io("flush stream", e.into_error()))?;
        file.sync_all()
            .map_err(|e| WaferError::io(&format!("sync {}", path.display()), e))?;
        Ok(())
    }

    fn stream<'a>(
        slot: &'a mut Option<ChecksumWriter<BufWriter<File>>>,
    ) -> Result<&'a mut ChecksumWriter<BufWriter<File>>> {
        slot.as_mut().ok_or_else(|| {
            WaferError::contract(ErrorCode::AlreadyFinished, "writer already finished")
        })
    }
}
