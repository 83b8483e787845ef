use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use wafer_core::{
    Candidate, FieldInfo, FieldSchema, FlatVectorReader, FlatVectorWriter, InMemoryRawVectors,
    SegmentVectors, SimilarityFunction, TwoStageRescorer, VectorSearchCriteria, WriterConfig,
};

const FIELD: i32 = 0;
const DIMENSION: u32 = 128;
const SEGMENT_ID: [u8; 16] = *b"wafer-bench-seg0";

fn schema() -> FieldSchema {
    FieldSchema::new(vec![FieldInfo {
        number: FIELD,
        name: "embedding".to_string(),
        dimension: DIMENSION,
        similarity: SimilarityFunction::DotProduct,
    }])
}

fn pseudo_vector(doc: u32) -> Vec<f32> {
    // Deterministic, sign-varied values; no RNG needed for a stable bench.
    (0..DIMENSION)
        .map(|d| {
            let x = (doc.wrapping_mul(2654435761).wrapping_add(d * 40503)) as f32;
            (x % 17.0) - 8.0
        })
        .collect()
}

fn bench_rescore(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let max_doc = 4096u32;

    let mut writer =
        FlatVectorWriter::create(dir.path(), schema(), WriterConfig::new("_0", SEGMENT_ID))
            .unwrap();
    writer.add_field(FIELD).unwrap();
    let mut raw = InMemoryRawVectors::new(DIMENSION as usize);
    for doc in 0..max_doc {
        let vector = pseudo_vector(doc);
        writer.add_vector(FIELD, doc, &vector).unwrap();
        raw.insert(doc, vector).unwrap();
    }
    writer.flush(max_doc, None).unwrap();
    writer.finish().unwrap();

    let reader = FlatVectorReader::open(dir.path(), "_0", SEGMENT_ID, &schema()).unwrap();
    let segments = vec![SegmentVectors {
        doc_base: 0,
        max_doc,
        quantized: Some(&reader),
        raw: &raw,
        similarity: SimilarityFunction::DotProduct,
    }];

    let query = pseudo_vector(max_doc + 1);
    let mut group = c.benchmark_group("two_stage_rescore");
    for &num_candidates in &[100usize, 400] {
        let candidates: Vec<Candidate> = (0..num_candidates)
            .map(|i| Candidate {
                doc: (i as u32 * 37) % max_doc,
                score: 1.0 / (i + 1) as f32,
            })
            .collect();
        let criteria =
            VectorSearchCriteria::new("embedding", query.clone(), 10, num_candidates);
        let rescorer = TwoStageRescorer::new();
        group.bench_with_input(
            BenchmarkId::from_parameter(num_candidates),
            &num_candidates,
            |b, _| {
                b.iter(|| {
                    rescorer
                        .rescore(&segments, &candidates, &criteria)
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_rescore);
criterion_main!(benches);
