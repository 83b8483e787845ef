//! Quantizer blending and segment merge for binary-quantized vectors.
//!
//! Merging combines sealed segments into a wholly new one. Where the
//! constituent segments' quantiles agree closely enough with the merged
//! state, their stored bits are copied verbatim; otherwise vectors are
//! re-quantized from the segment's full-fidelity float storage on the fly.

use tracing::debug;

use crate::compression::binary_quant::BinaryQuantizer;
use crate::compression::bitpack;
use crate::core::errors::{Result, WaferError};
use crate::storage::cursor::QuantizedVectorCursor;
use crate::storage::raw::RawVectorStore;
use crate::storage::writer::{FlatVectorWriter, MergedRecord};

/// Divisor of the merged quantile range beyond which a constituent
/// segment's drift forces a fresh sampling pass.
pub const QUANTILE_RECOMPUTE_LIMIT: f32 = 32.0;

/// Scale factor of the requantization tolerance. Bounds the expected
/// bit-flip rate from reusing stale bits under slightly shifted quantiles
/// to roughly 1/5 of near-boundary vectors.
pub const REQUANTIZATION_LIMIT: f32 = 0.2;

/// Sample-size-weighted mean of per-segment quantiles. Absent when any
/// segment never computed a quantizer.
pub fn merge_quantiles(
    states: &[Option<BinaryQuantizer>],
    sizes: &[u32],
) -> Option<BinaryQuantizer> {
    debug_assert_eq!(states.len(), sizes.len());
    if states.is_empty() {
        return None;
    }
    let mut lower = 0.0f64;
    let mut upper = 0.0f64;
    let mut total = 0u64;
    for (state, &size) in states.iter().zip(sizes.iter()) {
        let state = (*state)?;
        lower += state.lower_quantile() as f64 * size as f64;
        upper += state.upper_quantile() as f64 * size as f64;
        total += size as u64;
    }
    if total == 0 {
        return None;
    }
    Some(BinaryQuantizer::new(
        (lower / total as f64) as f32,
        (upper / total as f64) as f32,
    ))
}

/// True when the merged quantiles sit too far from any individual
/// segment's, or when a segment has no quantization state at all. True
/// means: run a fresh sampling pass over the merged vector stream instead
/// of trusting the blend.
pub fn should_recompute(
    merged: &BinaryQuantizer,
    states: &[Option<BinaryQuantizer>],
) -> bool {
    let limit = (merged.upper_quantile() - merged.lower_quantile()) / QUANTILE_RECOMPUTE_LIMIT;
    for state in states {
        let Some(state) = state else {
            return true;
        };
        if (state.upper_quantile() - merged.upper_quantile()).abs() > limit {
            return true;
        }
        if (state.lower_quantile() - merged.lower_quantile()).abs() > limit {
            return true;
        }
    }
    false
}

/// True when a segment's stored bits cannot be reused against the new
/// quantization state.
pub fn should_requantize(existing: &BinaryQuantizer, new: &BinaryQuantizer) -> bool {
    let tol = REQUANTIZATION_LIMIT * (new.upper_quantile() - new.lower_quantile()) / 128.0;
    if (existing.upper_quantile() - new.upper_quantile()).abs() > tol {
        return true;
    }
    (existing.lower_quantile() - new.lower_quantile()).abs() > tol
}

/// One constituent segment of a merge.
pub struct MergeSource<'a> {
    /// Quantization state the segment was written with, if any.
    pub quantizer: Option<BinaryQuantizer>,
    /// Cursor over the segment's stored bits, absent when the segment has
    /// no quantized representation.
    pub quantized: Option<QuantizedVectorCursor>,
    /// The segment's full-fidelity float storage.
    pub raw: &'a dyn RawVectorStore,
    /// Old doc id -> post-merge doc id; `None` drops a deleted doc.
    pub doc_map: Vec<Option<u32>>,
}

/// Decide the quantizer for the merged segment: the size-weighted blend
/// when it is trustworthy, otherwise a fresh sampling pass over the live
/// merged vectors.
pub fn merged_quantizer(sources: &[MergeSource<'_>]) -> Result<BinaryQuantizer> {
    let mut states = Vec::new();
    let mut sizes = Vec::new();
    for source in sources {
        if source.raw.count() > 0 {
            states.push(source.quantizer);
            sizes.push(source.raw.count());
        }
    }
    if let Some(merged) = merge_quantiles(&states, &sizes) {
        if !should_recompute(&merged, &states) {
            debug!(
                lower = merged.lower_quantile(),
                upper = merged.upper_quantile(),
                "reusing blended quantiles for merge"
            );
            return Ok(merged);
        }
    }

    let mut live = Vec::new();
    for source in sources {
        for doc in source.raw.docs() {
            let alive = source
                .doc_map
                .get(doc as usize)
                .copied()
                .flatten()
                .is_some();
            if !alive {
                continue;
            }
            if let Some(vector) = source.raw.vector(doc)? {
                live.push(vector);
            }
        }
    }
    let recomputed = BinaryQuantizer::from_sampling(live);
    debug!(
        lower = recomputed.lower_quantile(),
        upper = recomputed.upper_quantile(),
        "recomputed quantiles for merge"
    );
    Ok(recomputed)
}

struct PlanEntry {
    new_doc: u32,
    source: usize,
    old_doc: u32,
    requantize: bool,
}

/// Merge one field from `sources` into `writer`, emitting records in
/// ascending post-merge doc order.
pub fn merge_field(
    writer: &mut FlatVectorWriter,
    field_number: i32,
    max_doc: u32,
    sources: &mut [MergeSource<'_>],
) -> Result<()> {
    let merged = merged_quantizer(sources)?;

    let mut plan = Vec::new();
    for (index, source) in sources.iter().enumerate() {
        let requantize = match (&source.quantizer, &source.quantized) {
            (Some(existing), Some(_)) => should_requantize(existing, &merged),
            _ => true,
        };
        if requantize {
            debug!(source = index, "merge will requantize from float storage");
        }
        for old_doc in source.raw.docs() {
            let Some(new_doc) = source.doc_map.get(old_doc as usize).copied().flatten() else {
                continue;
            };
            plan.push(PlanEntry {
                new_doc,
                source: index,
                old_doc,
                requantize,
            });
        }
    }
    plan.sort_unstable_by_key(|entry| entry.new_doc);

    let records = plan.into_iter().map(|entry| -> Result<MergedRecord> {
        let source = &mut sources[entry.source];
        if entry.requantize {
            let vector = source
                .raw
                .vector(entry.old_doc)?
                .ok_or(WaferError::DocMissingVector { doc: entry.old_doc })?;
            let mut packed = vec![0u8; bitpack::required_bytes(vector.len())];
            let correction = merged.quantize(vector, &mut packed)?;
            Ok(MergedRecord {
                doc: entry.new_doc,
                packed,
                correction,
            })
        } else {
            let cursor = source
                .quantized
                .as_mut()
                .ok_or(WaferError::DocMissingVector { doc: entry.old_doc })?;
            let ordinal = cursor
                .doc_map()
                .doc_to_ordinal(entry.old_doc)
                .ok_or(WaferError::DocMissingVector { doc: entry.old_doc })?;
            let packed = cursor.packed_vector(ordinal)?.to_vec();
            let correction = cursor.correction(ordinal)?;
            Ok(MergedRecord {
                doc: entry.new_doc,
                packed,
                correction,
            })
        }
    });
    writer.write_merged_field(field_number, max_doc, &merged, records)
}
