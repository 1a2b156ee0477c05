use std::collections::BTreeSet;

use newsdb_core::traits::TextIndexer;
use newsdb_core::types::{chunk_id, Chunk, ChunkBatch};
use newsdb_text::KeywordIndex;

fn batch(doc: &str, rev: &str, title: &str, texts: &[&str]) -> ChunkBatch {
    let mut offset = 0;
    let chunks = texts
        .iter()
        .enumerate()
        .map(|(position, t)| {
            let c = Chunk {
                id: chunk_id(doc, position),
                doc_id: doc.to_string(),
                position,
                span_start: offset,
                span_end: offset + t.len(),
                text: (*t).to_string(),
            };
            offset += t.len();
            c
        })
        .collect();
    ChunkBatch { artifact_key: format!("{doc}@{rev}"), title: title.to_string(), chunks }
}

fn keys(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

fn ids(idx: &KeywordIndex, q: &str, visible: &BTreeSet<String>) -> Vec<String> {
    idx.search(q, visible, 10).expect("search").into_iter().map(|h| h.id).collect()
}

#[test]
fn stemmed_terms_match_inflections() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("d1", "r1", "Markets", &["Equities were rallying strongly into the close."])).expect("upsert");
    let all = keys(&["d1@r1"]);
    assert_eq!(ids(&idx, "rally", &all), vec!["d1#0"]);
    assert_eq!(ids(&idx, "rallied", &all), vec!["d1#0"]);
}

#[test]
fn phrase_and_boolean_operators() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("a", "1", "A", &["Central banks held interest rates steady."])).expect("upsert");
    idx.upsert(&batch("b", "1", "B", &["Rates of interest on mortgages climbed."])).expect("upsert");
    let all = keys(&["a@1", "b@1"]);

    assert_eq!(ids(&idx, "\"interest rates\"", &all), vec!["a#0"]);
    let mut both = ids(&idx, "interest rates", &all);
    both.sort();
    assert_eq!(both, vec!["a#0", "b#0"]);
    assert_eq!(ids(&idx, "rates NOT mortgage", &all), vec!["a#0"]);
    assert_eq!(ids(&idx, "rates AND NOT mortgages", &all), vec!["a#0"]);
    let mut either = ids(&idx, "steady OR climbed", &all);
    either.sort();
    assert_eq!(either, vec!["a#0", "b#0"]);
}

#[test]
fn hits_carry_provenance_and_marked_snippets() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("doc", "r", "Weekly", &["Opening remarks.", "Inflation surprised economists this quarter."])).expect("upsert");
    let hits = idx.search("inflation", &keys(&["doc@r"]), 5).expect("search");
    assert_eq!(hits.len(), 1);
    let h = &hits[0];
    assert_eq!(h.doc_id, "doc");
    assert_eq!(h.position, 1);
    assert_eq!(h.span_start, "Opening remarks.".len());
    assert_eq!(h.artifact_key, "doc@r");
    let snippet = h.snippet.as_deref().expect("snippet");
    assert!(snippet.contains(">>>Inflation<<<"), "{snippet}");
}

#[test]
fn restriction_is_applied_before_ranking() {
    let idx = KeywordIndex::in_memory().expect("index");
    for i in 0..30 {
        let doc = format!("noise{i}");
        idx.upsert(&batch(&doc, "1", "Noise", &["tariff tariff tariff tariff tariff"])).expect("upsert");
    }
    idx.upsert(&batch("wanted", "1", "Wanted", &["A brief mention of a tariff among other things."])).expect("upsert");

    // Unrestricted, the wanted chunk would fall outside a window of 5.
    let every: BTreeSet<String> = idx.keys().expect("keys").into_keys().collect();
    assert!(!ids(&idx, "tariff", &every)[..5].contains(&"wanted#0".to_string()));

    let hits = idx.search("tariff", &keys(&["wanted@1"]), 5).expect("search");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["wanted#0"]);
    assert!(idx.search("tariff", &BTreeSet::new(), 5).expect("search").is_empty());
}

#[test]
fn adding_a_required_term_does_not_lower_rank() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("x", "1", "X", &["energy energy energy prices"])).expect("upsert");
    idx.upsert(&batch("y", "1", "Y", &["energy energy policy"])).expect("upsert");
    idx.upsert(&batch("c", "1", "C", &["energy outlook for solar"])).expect("upsert");
    let all = keys(&["x@1", "y@1", "c@1"]);

    let rank = |q: &str| ids(&idx, q, &all).iter().position(|id| id == "c#0").expect("c ranked");
    assert!(rank("energy solar") <= rank("energy"));
}

#[test]
fn upsert_replaces_and_removal_hides() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("d", "1", "T", &["old wording", "more old wording"])).expect("upsert");
    idx.upsert(&batch("d", "1", "T", &["fresh wording"])).expect("upsert");
    assert_eq!(idx.keys().expect("keys").get("d@1"), Some(&1));

    idx.upsert(&batch("d", "2", "T", &["newer revision"])).expect("upsert");
    idx.remove_key("d@1").expect("remove key");
    assert_eq!(idx.keys().expect("keys").len(), 1);

    idx.upsert(&batch("e", "1", "T", &["other doc"])).expect("upsert");
    idx.remove_document("d").expect("remove doc");
    assert!(ids(&idx, "newer", &keys(&["d@2"])).is_empty());
    assert_eq!(idx.keys().expect("keys").into_keys().collect::<Vec<_>>(), vec!["e@1"]);

    idx.clear().expect("clear");
    assert!(idx.keys().expect("keys").is_empty());
}

#[test]
fn on_disk_index_survives_reopen() {
    let tmp = tempfile::TempDir::new().expect("tmp");
    {
        let idx = KeywordIndex::open(tmp.path()).expect("open");
        idx.upsert(&batch("p", "1", "Persisted", &["durable keyword posting"])).expect("upsert");
    }
    let idx = KeywordIndex::open(tmp.path()).expect("reopen");
    assert_eq!(ids(&idx, "durable", &keys(&["p@1"])), vec!["p#0"]);
}

#[test]
fn questions_match_any_term_and_tolerate_stray_syntax() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("a", "1", "A", &["Central banks held interest rates steady."])).expect("upsert");
    idx.upsert(&batch("b", "1", "B", &["Lithium prices fell as new mines opened."])).expect("upsert");
    let all = keys(&["a@1", "b@1"]);

    let question = "What happened to interest rates?";
    assert!(ids(&idx, question, &all).is_empty());
    let hits = idx.search_any(question, &all, 10).expect("search_any");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a#0"]);

    assert!(idx.search("Interest rates: up or down?", &all, 10).is_err());
    let hits = idx.search_any("Interest rates: up or down?", &all, 10).expect("colon");
    assert_eq!(hits.first().map(|h| h.doc_id.as_str()), Some("a"));
    idx.search_any("what about \"interest rates?", &all, 10).expect("open quote");
    idx.search_any("interest rates (2025", &all, 10).expect("open paren");
}

#[test]
fn dangling_not_is_an_invalid_query() {
    let idx = KeywordIndex::in_memory().expect("index");
    idx.upsert(&batch("a", "1", "A", &["rates and more rates"])).expect("upsert");
    let err = idx.search("rates NOT", &keys(&["a@1"]), 10).unwrap_err();
    assert!(matches!(err, newsdb_core::Error::InvalidQuery(_)));
}
