//! Two-stage rescoring of approximate candidate lists.
//!
//! Stage 1 replaces the coarse bit-similarity scores with dequantized-vector
//! scores, cheap enough to run over the whole oversampled list. Stage 2
//! re-scores a truncated subset against full-fidelity floats, optionally one
//! task per segment group on a caller-supplied worker pool. Rescoring either
//! fully succeeds or fully fails; a segment without quantized support
//! degrades stage 1 to a no-op instead of failing the query.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::warn;

use crate::core::errors::{Result, WaferError};
use crate::rescore::criteria::{Candidate, SegmentVectors, VectorSearchCriteria};
use crate::scorer::dequant::DequantizingScorer;
use crate::scorer::raw::RawFloatScorer;

/// Stage-2 cutoff: the geometric mean of `limit` and `num_candidates`,
/// biased toward the smaller `limit`. A larger cutoff improves recall but
/// pays for it in full-fidelity I/O (page faults on cold float storage).
pub(crate) fn full_fidelity_limit(limit: usize, num_candidates: usize) -> usize {
    ((limit * num_candidates) as f64).sqrt() as usize
}

pub struct TwoStageRescorer {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl TwoStageRescorer {
    /// Rescorer running stage 2 inline on the calling thread.
    pub fn new() -> Self {
        TwoStageRescorer { pool: None }
    }

    /// Rescorer dispatching stage-2 segment groups onto `pool`.
    pub fn with_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        TwoStageRescorer { pool: Some(pool) }
    }

    /// Refine `candidates` (approximate-ranked, size >= `criteria.limit`)
    /// into the final ranking.
    pub fn rescore(
        &self,
        segments: &[SegmentVectors<'_>],
        candidates: &[Candidate],
        criteria: &VectorSearchCriteria,
    ) -> Result<Vec<Candidate>> {
        criteria.validate()?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Stage 1: dequantized re-scoring over the oversampled list.
        let keep = candidates.len().min(criteria.num_candidates);
        let mut work = candidates[..keep].to_vec();
        work.sort_unstable_by_key(|c| c.doc);
        for (segment, range) in group_by_segment(&work, segments)? {
            let Some(reader) = segment.quantized else {
                warn!(
                    doc_base = segment.doc_base,
                    "skipped rescoring: segment has no quantized vector storage"
                );
                return Ok(candidates.to_vec());
            };
            let cursor = match reader.cursor(&criteria.field) {
                Ok(cursor) => cursor,
                Err(WaferError::FieldNotFound(_)) => {
                    warn!(
                        field = %criteria.field,
                        doc_base = segment.doc_base,
                        "skipped rescoring: segment has no quantized values for field"
                    );
                    return Ok(candidates.to_vec());
                }
                Err(other) => return Err(other),
            };
            let mut scorer =
                DequantizingScorer::new(cursor, segment.similarity, &criteria.query)?;
            for candidate in &mut work[range] {
                scorer.advance(candidate.doc - segment.doc_base)?;
                candidate.score = scorer.score()?;
            }
        }
        sort_by_score_descending(&mut work);

        // Stage 2: full-fidelity re-scoring of the head of the list.
        let cutoff = full_fidelity_limit(criteria.limit, criteria.num_candidates);
        work.truncate(cutoff.min(work.len()));
        work.sort_unstable_by_key(|c| c.doc);
        let groups = group_by_segment(&work, segments)?;

        let mut tasks: Vec<(&SegmentVectors<'_>, &mut [Candidate])> =
            Vec::with_capacity(groups.len());
        let mut rest: &mut [Candidate] = &mut work;
        for (segment, range) in groups {
            let slice = std::mem::take(&mut rest);
            let (chunk, tail) = slice.split_at_mut(range.len());
            tasks.push((segment, chunk));
            rest = tail;
        }

        match &self.pool {
            None => {
                for (segment, chunk) in tasks {
                    score_chunk(segment, chunk, criteria)?;
                }
            }
            Some(pool) => {
                let failures: Vec<WaferError> = pool.install(|| {
                    tasks
                        .into_par_iter()
                        .map(|(segment, chunk)| score_chunk(segment, chunk, criteria))
                        .filter_map(|result| result.err())
                        .collect()
                });
                match failures.len() {
                    0 => {}
                    1 => {
                        let mut failures = failures;
                        return Err(failures.remove(0));
                    }
                    _ => return Err(WaferError::Aggregate(failures)),
                }
            }
        }

        sort_by_score_descending(&mut work);
        work.truncate(criteria.limit);
        Ok(work)
    }
}

impl Default for TwoStageRescorer {
    fn default() -> Self {
        TwoStageRescorer::new()
    }
}

fn score_chunk(
    segment: &SegmentVectors<'_>,
    chunk: &mut [Candidate],
    criteria: &VectorSearchCriteria,
) -> Result<()> {
    let scorer = RawFloatScorer::new(segment.raw, segment.similarity, &criteria.query)?;
    for candidate in chunk {
        candidate.score = scorer.score(candidate.doc - segment.doc_base)?;
    }
    Ok(())
}

/// Contiguous per-segment ranges of a doc-sorted candidate list. Each range
/// is disjoint, so stage-2 tasks mutate the list without synchronization.
fn group_by_segment<'a, 's>(
    sorted: &[Candidate],
    segments: &'a [SegmentVectors<'s>],
) -> Result<Vec<(&'a SegmentVectors<'s>, Range<usize>)>> {
    let mut groups = Vec::new();
    let mut start = 0;
    while start < sorted.len() {
        let doc = sorted[start].doc;
        let index = segments.partition_point(|s| s.doc_base + s.max_doc <= doc);
        let segment = segments
            .get(index)
            .filter(|s| doc >= s.doc_base)
            .ok_or(WaferError::DocMissingVector { doc })?;
        let segment_end = segment.doc_base + segment.max_doc;
        let mut end = start + 1;
        while end < sorted.len() && sorted[end].doc < segment_end {
            end += 1;
        }
        groups.push((segment, start..end));
        start = end;
    }
    Ok(groups)
}

fn sort_by_score_descending(candidates: &mut [Candidate]) {
    candidates.sort_unstable_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
