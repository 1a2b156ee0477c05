use proptest::prelude::*;

use newsdb_core::chunker::{chunk_document, reconstruct, split, ChunkSpan};
use newsdb_core::types::ChunkParams;
use newsdb_core::Error;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[test]
fn short_document_is_a_single_chunk() {
    let body = "A short issue.\n\nTwo paragraphs.";
    let spans = split(body, 200, 20).expect("split");
    assert_eq!(spans, vec![ChunkSpan { start: 0, end: body.len() }]);
}

#[test]
fn empty_document_has_no_chunks() {
    assert!(split("", 100, 10).expect("split").is_empty());
}

#[test]
fn overlap_must_be_smaller_than_length() {
    assert!(matches!(split("abc", 10, 10), Err(Error::InvalidConfig(_))));
    assert!(matches!(split("abc", 0, 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn chunks_prefer_sentence_breaks_and_overlap() {
    let body = "Inflation cooled in March. Markets rallied on the news. Bonds were flat for the week. Analysts expect cuts.";
    let spans = split(body, 60, 15).expect("split");
    assert!(spans.len() >= 2);
    let first = &body[spans[0].start..spans[0].end];
    assert!(first.ends_with(". "), "first chunk should end at a sentence: {first:?}");
    assert!(spans[1].start < spans[0].end, "consecutive chunks overlap");
    assert_eq!(reconstruct(body, &spans), body);
}

#[test]
fn chunk_ids_are_position_based_and_deterministic() {
    let params = ChunkParams { max_chars: 40, overlap_chars: 8 };
    let body = "one two three four five six seven eight nine ten eleven twelve thirteen fourteen";
    let a = chunk_document("2025/01/x/issue.md", body, params).expect("chunk");
    let b = chunk_document("2025/01/x/issue.md", body, params).expect("chunk");
    assert_eq!(a, b);
    assert_eq!(a[0].id, "2025/01/x/issue.md#0");
    assert_eq!(a[1].id, "2025/01/x/issue.md#1");
    for c in &a {
        assert_eq!(c.text, &body[c.span_start..c.span_end]);
    }
}

proptest! {
    #[test]
    fn spans_cover_body_and_respect_bounds(
        body in "[a-zé .!?\n]{0,400}",
        max_len in 2usize..80,
        overlap_seed in 0usize..80,
    ) {
        let overlap = overlap_seed % max_len;
        let spans = split(&body, max_len, overlap).expect("split");

        prop_assert_eq!(reconstruct(&body, &spans), body.clone());
        if !body.is_empty() {
            prop_assert_eq!(spans.first().map(|s| s.start), Some(0));
            prop_assert_eq!(spans.last().map(|s| s.end), Some(body.len()));
        }
        for span in &spans {
            prop_assert!(char_len(&body[span.start..span.end]) <= max_len);
        }
        for pair in spans.windows(2) {
            prop_assert!(pair[1].start > pair[0].start);
            prop_assert!(pair[1].end > pair[0].end);
            prop_assert!(pair[1].start <= pair[0].end, "gap between chunks");
            prop_assert!(char_len(&body[pair[1].start..pair[0].end]) <= overlap);
        }
    }
}
