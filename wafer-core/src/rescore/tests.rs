#[cfg(test)]
mod tests {
    use crate::core::errors::{ErrorCode, Result, WaferError};
    use crate::core::fields::{FieldInfo, FieldSchema, SimilarityFunction};
    use crate::rescore::criteria::{Candidate, SegmentVectors, VectorSearchCriteria};
    use crate::rescore::two_stage::{full_fidelity_limit, TwoStageRescorer};
    use crate::storage::raw::{InMemoryRawVectors, RawVectorStore};
    use crate::storage::reader::FlatVectorReader;
    use crate::storage::writer::{FlatVectorWriter, WriterConfig};
    use std::path::Path;
    use std::sync::Arc;

    const FIELD: i32 = 0;

    fn schema(dimension: u32) -> FieldSchema {
        FieldSchema::new(vec![FieldInfo {
            number: FIELD,
            name: "embedding".to_string(),
            dimension,
            similarity: SimilarityFunction::DotProduct,
        }])
    }

    fn segment_id(tag: u8) -> [u8; 16] {
        let mut id = *b"wafer-rescore-s-";
        id[15] = tag;
        id
    }

    /// Writes a quantized segment plus its raw float twin.
    fn build_segment(
        dir: &Path,
        name: &str,
        tag: u8,
        dimension: u32,
        max_doc: u32,
        vectors: &[(u32, Vec<f32>)],
    ) -> (FlatVectorReader, InMemoryRawVectors) {
        let config = WriterConfig::new(name, segment_id(tag));
        let mut writer = FlatVectorWriter::create(dir, schema(dimension), config).unwrap();
        writer.add_field(FIELD).unwrap();
        let mut raw = InMemoryRawVectors::new(dimension as usize);
        for (doc, vector) in vectors {
            writer.add_vector(FIELD, *doc, vector).unwrap();
            raw.insert(*doc, vector.clone()).unwrap();
        }
        writer.flush(max_doc, None).unwrap();
        writer.finish().unwrap();
        let reader = FlatVectorReader::open(dir, name, segment_id(tag), &schema(dimension)).unwrap();
        (reader, raw)
    }

    #[test]
    fn test_full_fidelity_limit_is_geometric_mean() {
        assert_eq!(full_fidelity_limit(10, 100), 31);
        assert_eq!(full_fidelity_limit(50, 50), 50);
        assert_eq!(full_fidelity_limit(1, 1), 1);
    }

    #[test]
    fn test_stage_one_reorders_and_stage_two_truncates() {
        let dir = tempfile::tempdir().unwrap();
        // Doc 9 is truly closest to the all-positive query; the coarse
        // scores below pretend otherwise.
        let vectors = vec![
            (2, vec![-1.0, -1.0, -1.0, -1.0]),
            (5, vec![1.0, 1.0, -1.0, -1.0]),
            (9, vec![1.0, 1.0, 1.0, 1.0]),
        ];
        let (reader, raw) = build_segment(dir.path(), "_0", b'0', 4, 10, &vectors);
        let segments = vec![SegmentVectors {
            doc_base: 0,
            max_doc: 10,
            quantized: Some(&reader),
            raw: &raw,
            similarity: SimilarityFunction::DotProduct,
        }];

        let candidates = vec![
            Candidate { doc: 5, score: 0.9 },
            Candidate { doc: 2, score: 0.5 },
            Candidate { doc: 9, score: 0.1 },
        ];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0, 1.0, 1.0], 2, 3);

        let rescored = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap();

        // floor(sqrt(2 * 3)) = 2, further truncated to limit 2.
        assert_eq!(rescored.len(), 2);
        assert_eq!(rescored[0].doc, 9);
        assert_eq!(rescored[1].doc, 5);
        assert!(rescored[0].score > rescored[1].score);
    }

    #[test]
    fn test_missing_quantized_capability_returns_original_list() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = vec![(0, vec![1.0, 1.0]), (1, vec![-1.0, -1.0])];
        let (_reader, raw) = build_segment(dir.path(), "_0", b'1', 2, 2, &vectors);
        let segments = vec![SegmentVectors {
            doc_base: 0,
            max_doc: 2,
            quantized: None,
            raw: &raw,
            similarity: SimilarityFunction::DotProduct,
        }];

        let candidates = vec![
            Candidate { doc: 1, score: 0.9 },
            Candidate { doc: 0, score: 0.4 },
        ];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0], 1, 2);

        let rescored = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap();
        assert_eq!(rescored, candidates);
    }

    #[test]
    fn test_missing_field_returns_original_list() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = vec![(0, vec![1.0, 1.0])];
        let (reader, raw) = build_segment(dir.path(), "_0", b'2', 2, 1, &vectors);
        let segments = vec![SegmentVectors {
            doc_base: 0,
            max_doc: 1,
            quantized: Some(&reader),
            raw: &raw,
            similarity: SimilarityFunction::DotProduct,
        }];

        let candidates = vec![Candidate { doc: 0, score: 0.7 }];
        let criteria = VectorSearchCriteria::new("no_such_field", vec![1.0, 1.0], 1, 1);

        let rescored = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap();
        assert_eq!(rescored, candidates);
    }

    #[test]
    fn test_multi_segment_doc_base_translation_with_pool() {
        let dir = tempfile::tempdir().unwrap();
        let a_vectors = vec![(0, vec![1.0, 1.0]), (1, vec![-1.0, 1.0])];
        let (reader_a, raw_a) = build_segment(dir.path(), "_a", b'a', 2, 2, &a_vectors);
        let b_vectors = vec![(0, vec![1.0, 0.5]), (1, vec![-1.0, -1.0])];
        let (reader_b, raw_b) = build_segment(dir.path(), "_b", b'b', 2, 2, &b_vectors);

        let segments = vec![
            SegmentVectors {
                doc_base: 0,
                max_doc: 2,
                quantized: Some(&reader_a),
                raw: &raw_a,
                similarity: SimilarityFunction::DotProduct,
            },
            SegmentVectors {
                doc_base: 2,
                max_doc: 2,
                quantized: Some(&reader_b),
                raw: &raw_b,
                similarity: SimilarityFunction::DotProduct,
            },
        ];

        // Global docs: 0, 1 in segment A; 2, 3 in segment B.
        let candidates = vec![
            Candidate { doc: 3, score: 0.9 },
            Candidate { doc: 0, score: 0.3 },
            Candidate { doc: 2, score: 0.2 },
            Candidate { doc: 1, score: 0.1 },
        ];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0], 4, 4);

        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .unwrap(),
        );
        let rescored = TwoStageRescorer::with_pool(pool)
            .rescore(&segments, &candidates, &criteria)
            .unwrap();

        assert_eq!(rescored.len(), 4);
        // Full-fidelity dot products against (1, 1): doc0=2.0, doc2=1.5,
        // doc1=0.0, doc3=-2.0 before score shaping.
        let order: Vec<u32> = rescored.iter().map(|c| c.doc).collect();
        assert_eq!(order, vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_candidate_outside_all_segments_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = vec![(0, vec![1.0, 1.0])];
        let (reader, raw) = build_segment(dir.path(), "_0", b'3', 2, 1, &vectors);
        let segments = vec![SegmentVectors {
            doc_base: 0,
            max_doc: 1,
            quantized: Some(&reader),
            raw: &raw,
            similarity: SimilarityFunction::DotProduct,
        }];

        let candidates = vec![Candidate { doc: 42, score: 0.7 }];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0], 1, 1);

        let err = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DocMissingVector);
    }

    #[test]
    fn test_invalid_criteria_rejected() {
        let segments: Vec<SegmentVectors<'_>> = Vec::new();
        let candidates = vec![Candidate { doc: 0, score: 0.5 }];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0], 5, 3);
        let err = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidCriteria);
    }

    #[test]
    fn test_empty_candidates_stay_empty() {
        let segments: Vec<SegmentVectors<'_>> = Vec::new();
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0], 1, 1);
        let rescored = TwoStageRescorer::new()
            .rescore(&segments, &[], &criteria)
            .unwrap();
        assert!(rescored.is_empty());
    }

    /// Raw store whose reads always fail; drives the aggregation path.
    #[derive(Debug)]
    struct FailingStore {
        dimension: usize,
    }

    impl RawVectorStore for FailingStore {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn count(&self) -> u32 {
            0
        }

        fn vector(&self, _doc: u32) -> Result<Option<&[f32]>> {
            Err(WaferError::StorageError {
                code: ErrorCode::StorageIOError,
                message: "injected read failure".to_string(),
            })
        }

        fn docs(&self) -> Box<dyn Iterator<Item = u32> + '_> {
            Box::new(std::iter::empty())
        }
    }

    #[test]
    fn test_pooled_failures_are_aggregated() {
        let dir = tempfile::tempdir().unwrap();
        let a_vectors = vec![(0, vec![1.0, 1.0])];
        let (reader_a, _raw_a) = build_segment(dir.path(), "_a", b'x', 2, 1, &a_vectors);
        let b_vectors = vec![(0, vec![-1.0, -1.0])];
        let (reader_b, _raw_b) = build_segment(dir.path(), "_b", b'y', 2, 1, &b_vectors);

        let failing_a = FailingStore { dimension: 2 };
        let failing_b = FailingStore { dimension: 2 };
        let segments = vec![
            SegmentVectors {
                doc_base: 0,
                max_doc: 1,
                quantized: Some(&reader_a),
                raw: &failing_a,
                similarity: SimilarityFunction::DotProduct,
            },
            SegmentVectors {
                doc_base: 1,
                max_doc: 1,
                quantized: Some(&reader_b),
                raw: &failing_b,
                similarity: SimilarityFunction::DotProduct,
            },
        ];

        let candidates = vec![
            Candidate { doc: 0, score: 0.9 },
            Candidate { doc: 1, score: 0.8 },
        ];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0], 2, 2);

        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .unwrap(),
        );
        let err = TwoStageRescorer::with_pool(pool)
            .rescore(&segments, &candidates, &criteria)
            .unwrap_err();
        match err {
            WaferError::Aggregate(failures) => assert_eq!(failures.len(), 2),
            other => panic!("expected aggregated failure, got {}", other),
        }
    }

    #[test]
    fn test_sequential_failure_propagates_directly() {
        let dir = tempfile::tempdir().unwrap();
        let vectors = vec![(0, vec![1.0, 1.0])];
        let (reader, _raw) = build_segment(dir.path(), "_0", b'z', 2, 1, &vectors);
        let failing = FailingStore { dimension: 2 };
        let segments = vec![SegmentVectors {
            doc_base: 0,
            max_doc: 1,
            quantized: Some(&reader),
            raw: &failing,
            similarity: SimilarityFunction::DotProduct,
        }];

        let candidates = vec![Candidate { doc: 0, score: 0.9 }];
        let criteria = VectorSearchCriteria::new("embedding", vec![1.0, 1.0], 1, 1);

        let err = TwoStageRescorer::new()
            .rescore(&segments, &candidates, &criteria)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorageIOError);
    }
}
