use assert_matches::assert_matches;
use chunk_codec::{
    estimate_encoded_size, reassemble, split, validate, Chunk, ChunkError, ChunkPolicy,
    InsertionPlan,
};
use pretty_assertions::assert_eq;

fn texts(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|chunk| chunk.text.as_str()).collect()
}

#[test]
fn fifty_thousand_characters_split_into_twenty_five_chunks() {
    let text: String = "0123456789".repeat(5_000);
    assert_eq!(text.chars().count(), 50_000);

    let chunks = split(&text, 2000).expect("split succeeds");

    assert_eq!(chunks.len(), 25);
    for (index, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence_index, index);
        assert_eq!(chunk.total_chunks, 25);
        assert!(chunk.text.chars().count() <= 2000);
    }
    assert_eq!(reassemble(&chunks).expect("reassemble"), text);
}

#[test]
fn oversized_insertion_is_rejected_before_any_split() {
    let text = "x".repeat(500_000);
    assert_eq!(estimate_encoded_size(&text), 600_000);

    let error = validate(&text, 100_000 * 12 / 10).expect_err("validate must fail");
    assert_eq!(
        error,
        ChunkError::SizeExceeded {
            actual: 600_000,
            max: 120_000,
        }
    );

    let plan = ChunkPolicy::default().plan(&text);
    assert_matches!(plan, Err(ChunkError::SizeExceeded { actual: 600_000, .. }));
}

#[test]
fn empty_text_produces_one_empty_chunk() {
    let chunks = split("", 10).expect("split");
    assert_eq!(
        chunks,
        vec![Chunk {
            sequence_index: 0,
            total_chunks: 1,
            text: String::new(),
        }]
    );
    assert_eq!(reassemble(&chunks).expect("reassemble"), "");
}

#[test]
fn split_rejects_zero_chunk_size() {
    assert_matches!(split("abc", 0), Err(ChunkError::InvalidChunkSize));
}

#[test]
fn split_and_reassemble_across_sizes() {
    let samples = [
        "a",
        "hello world",
        "fn main() {\n    println!(\"hi\");\n}\n",
        "snowman ☃ and crab 🦀 mixed with ascii",
    ];

    for sample in samples {
        let char_count = sample.chars().count();
        for chunk_size in [1, 2, 3, 7, 64] {
            let chunks = split(sample, chunk_size).expect("split");
            assert_eq!(chunks.len(), char_count.div_ceil(chunk_size));
            assert_eq!(reassemble(&chunks).expect("reassemble"), sample);
        }
    }
}

#[test]
fn reassemble_accepts_out_of_order_chunks() {
    let mut chunks = split("abcdefg", 3).expect("split");
    assert_eq!(texts(&chunks), vec!["abc", "def", "g"]);

    chunks.reverse();
    assert_eq!(reassemble(&chunks).expect("reassemble"), "abcdefg");
}

#[test]
fn reassemble_detects_missing_duplicate_and_inconsistent_chunks() {
    let chunks = split("abcdefg", 3).expect("split");

    let missing = vec![chunks[0].clone(), chunks[2].clone()];
    assert_matches!(
        reassemble(&missing),
        Err(ChunkError::MissingChunk { index: 1, total: 3 })
    );

    let truncated = vec![chunks[0].clone(), chunks[1].clone()];
    assert_matches!(
        reassemble(&truncated),
        Err(ChunkError::MissingChunk { index: 2, total: 3 })
    );

    let duplicated = vec![chunks[0].clone(), chunks[0].clone(), chunks[1].clone()];
    assert_matches!(
        reassemble(&duplicated),
        Err(ChunkError::DuplicateChunk { index: 0 })
    );

    let mut inconsistent = chunks.clone();
    inconsistent[1].total_chunks = 4;
    assert_matches!(
        reassemble(&inconsistent),
        Err(ChunkError::InconsistentTotal {
            index: 1,
            expected: 3,
            found: 4,
        })
    );

    assert_matches!(reassemble(&[]), Err(ChunkError::EmptyChunkSet));
}

#[test]
fn policy_writes_small_payloads_whole() {
    let policy = ChunkPolicy::default();
    let plan = policy.plan(&"y".repeat(2000)).expect("plan");
    assert_eq!(plan, InsertionPlan::Single);
    assert_eq!(plan.chunk_count(), 1);
}

#[test]
fn policy_chunks_payloads_between_thresholds() {
    let policy = ChunkPolicy::default();
    let text = "z".repeat(4_500);

    let plan = policy.plan(&text).expect("plan");
    let InsertionPlan::Chunked(chunks) = plan else {
        panic!("expected a chunked plan");
    };

    assert_eq!(chunks.len(), 3);
    assert_eq!(reassemble(&chunks).expect("reassemble"), text);
}

#[test]
fn policy_limits_follow_builders() {
    let policy = ChunkPolicy::default()
        .with_soft_threshold(10)
        .with_hard_ceiling(100)
        .with_outer_ceiling(50);

    assert_eq!(policy.insertion_limit(), 120);
    assert_eq!(policy.plan(&"a".repeat(25)).expect("plan").chunk_count(), 3);
    assert_matches!(
        policy.plan(&"a".repeat(101)),
        Err(ChunkError::SizeExceeded { max: 120, .. })
    );

    assert!(policy.validate_request(&"b".repeat(50)).is_ok());
    assert_matches!(
        policy.validate_request(&"b".repeat(51)),
        Err(ChunkError::SizeExceeded {
            actual: 51,
            max: 50,
        })
    );
}

#[test]
fn recovery_hint_suggests_independent_operations() {
    let policy = ChunkPolicy::default();
    let error = ChunkError::size_exceeded(600_000, policy.insertion_limit());

    let hint = policy.recovery_hint(&error);
    assert!(hint.contains("600000 bytes"), "{hint}");
    assert!(hint.contains("at least 6 independent operations"), "{hint}");
    assert!(hint.contains("102400 bytes each"), "{hint}");
}
