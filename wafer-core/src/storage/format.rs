//! On-disk format constants and stream framing for binary-quantized flat
//! vectors.
//!
//! A segment-field-group is stored as two streams:
//!
//! ```text
//! <segment>.wqm   metadata: header, field records, -1 sentinel, footer
//! <segment>.wqd   data:     header, per-field StoredRecord blocks, footer
//! ```
//!
//! Both streams share the same framing:
//!
//! ```text
//! header: magic(u32) + codec_name(u16 len + utf8) + version(u32) + segment_id(16)
//! footer: footer_magic(u32) + crc32(u32 over all preceding bytes)
//! ```
//!
//! A StoredRecord is `required_bytes(dim)` packed bits followed by one
//! little-endian f32 score correction. Every record of a field has the same
//! byte size, and each field's block starts float32-aligned.

use std::io::Write;

use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};

pub const META_EXTENSION: &str = "wqm";
pub const DATA_EXTENSION: &str = "wqd";

pub const META_CODEC_NAME: &str = "WaferBinaryQuantizedMeta";
pub const DATA_CODEC_NAME: &str = "WaferBinaryQuantizedData";

pub const STREAM_MAGIC: u32 = 0x5746_5142;
pub const FOOTER_MAGIC: u32 = !STREAM_MAGIC;

/// First released metadata layout.
pub const VERSION_START: u32 = 0;
/// Adds the explicit bit-width/compression marker pair to field records.
pub const VERSION_ADD_BITS: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_ADD_BITS;

/// Terminates the metadata field-record list.
pub const END_OF_FIELDS: i32 = -1;

/// Encoding marker for float32 source vectors, the only supported encoding.
pub const ENCODING_FLOAT32: u32 = 0;

/// Footer magic + crc32.
pub const FOOTER_LEN: usize = 8;

/// On-disk size of one StoredRecord for the given dimension.
pub fn record_byte_size(dimension: usize) -> usize {
    bitpack::required_bytes(dimension) + 4
}

pub fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{}.{}", segment, extension)
}

// ---------------------------------------------------------------------------
// Checksumming writer
// ---------------------------------------------------------------------------

/// Write adapter that tracks the stream position and maintains a running
/// CRC32 so the footer can be emitted without a second pass.
pub(crate) struct ChecksumWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(inner: W) -> Self {
        ChecksumWriter {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    /// Bytes written so far; doubles as the current stream offset.
    pub fn position(&self) -> u64 {
        self.written
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| WaferError::io("stream write", e))?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Pad with zero bytes until the stream offset is float32-aligned.
    pub fn align_f32(&mut self) -> Result<u64> {
        while self.written % 4 != 0 {
            self.write_u8(0)?;
        }
        Ok(self.written)
    }

    pub fn write_header(&mut self, codec_name: &str, version: u32, segment_id: &[u8; 16]) -> Result<()> {
        self.write_u32(STREAM_MAGIC)?;
        let name = codec_name.as_bytes();
        self.write_u16(name.len() as u16)?;
        self.write_bytes(name)?;
        self.write_u32(version)?;
        self.write_bytes(segment_id)
    }

    /// Append the footer and return the inner writer for flushing/syncing.
    /// The footer magic is hashed but the checksum itself is not.
    pub fn finish_footer(mut self) -> Result<W> {
        self.write_u32(FOOTER_MAGIC)?;
        let crc = self.hasher.finalize();
        self.inner
            .write_all(&crc.to_le_bytes())
            .map_err(|e| WaferError::io("stream footer", e))?;
        Ok(self.inner)
    }
}

// ---------------------------------------------------------------------------
// Bounds-checked stream reader
// ---------------------------------------------------------------------------

/// Cursor over an in-memory stream with bounds-checked reads. Any read past
/// the end reports a truncated stream, which the caller surfaces as
/// corruption.
pub(crate) struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| {
            WaferError::corruption(ErrorCode::TruncatedStream, "stream offset overflow")
        })?;
        if end > self.buf.len() {
            return Err(WaferError::corruption(
                ErrorCode::TruncatedStream,
                format!("read of {} bytes at {} past end {}", len, self.pos, self.buf.len()),
            ));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut bytes = [0u8; 2];
        bytes.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(bytes))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }
}

// ---------------------------------------------------------------------------
// Header / footer validation
// ---------------------------------------------------------------------------

/// Validate the stream header and return the declared version.
pub(crate) fn check_header(
    reader: &mut ByteReader<'_>,
    codec_name: &str,
    segment_id: &[u8; 16],
) -> Result<u32> {
    let magic = reader.read_u32()?;
    if magic != STREAM_MAGIC {
        return Err(WaferError::corruption(
            ErrorCode::BadMagic,
            format!("bad stream magic: {:#010x}", magic),
        ));
    }
    let name_len = reader.read_u16()? as usize;
    let name = reader.read_bytes(name_len)?;
    if name != codec_name.as_bytes() {
        return Err(WaferError::corruption(
            ErrorCode::BadMagic,
            format!(
                "codec name mismatch: expected {}, got {}",
                codec_name,
                String::from_utf8_lossy(name)
            ),
        ));
    }
    let version = reader.read_u32()?;
    if !(VERSION_START..=VERSION_CURRENT).contains(&version) {
        return Err(WaferError::corruption(
            ErrorCode::FormatVersionMismatch,
            format!(
                "unsupported format version {} (supported {}..={})",
                version, VERSION_START, VERSION_CURRENT
            ),
        ));
    }
    let id = reader.read_bytes(16)?;
    if id != segment_id {
        return Err(WaferError::corruption(
            ErrorCode::SegmentIdMismatch,
            "segment id in stream header does not match the expected segment",
        ));
    }
    Ok(version)
}

/// Validate the footer structure of a stream without hashing its body, and
/// return the stored checksum. Used on open for large data streams; full
/// verification happens in `check_integrity`.
pub(crate) fn retrieve_footer(stream: &[u8]) -> Result<u32> {
    if stream.len() < FOOTER_LEN {
        return Err(WaferError::corruption(
            ErrorCode::TruncatedStream,
            format!("stream of {} bytes has no room for a footer", stream.len()),
        ));
    }
    let magic_at = stream.len() - FOOTER_LEN;
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&stream[magic_at..magic_at + 4]);
    if u32::from_le_bytes(magic) != FOOTER_MAGIC {
        return Err(WaferError::corruption(
            ErrorCode::BadMagic,
            "bad footer magic",
        ));
    }
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&stream[magic_at + 4..]);
    Ok(u32::from_le_bytes(stored))
}

/// Verify the footer magic and CRC32 of a complete stream.
pub(crate) fn check_footer(stream: &[u8]) -> Result<()> {
    if stream.len() < FOOTER_LEN {
        return Err(WaferError::corruption(
            ErrorCode::TruncatedStream,
            format!("stream of {} bytes has no room for a footer", stream.len()),
        ));
    }
    let body_end = stream.len() - 4;
    let magic_at = stream.len() - FOOTER_LEN;
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&stream[magic_at..magic_at + 4]);
    if u32::from_le_bytes(magic) != FOOTER_MAGIC {
        return Err(WaferError::corruption(
            ErrorCode::BadMagic,
            "bad footer magic",
        ));
    }
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&stream[body_end..]);
    let stored = u32::from_le_bytes(stored);
    let computed = crc32fast::hash(&stream[..body_end]);
    if stored != computed {
        return Err(WaferError::corruption(
            ErrorCode::ChecksumMismatch,
            format!(
                "stream checksum mismatch: stored={:#010x}, computed={:#010x}",
                stored, computed
            ),
        ));
    }
    Ok(())
}
