use std::collections::BTreeSet;

use newsdb_core::traits::{Embedding, VectorIndexer};
use newsdb_core::types::{chunk_id, Chunk, ChunkBatch};
use newsdb_core::Error;
use newsdb_vector::VectorIndex;

fn batch(doc: &str, rev: &str, n: usize) -> ChunkBatch {
    let chunks = (0..n)
        .map(|position| Chunk {
            id: chunk_id(doc, position),
            doc_id: doc.to_string(),
            position,
            span_start: position * 10,
            span_end: position * 10 + 10,
            text: format!("{doc} chunk {position}"),
        })
        .collect();
    ChunkBatch { artifact_key: format!("{doc}@{rev}"), title: doc.to_string(), chunks }
}

fn query(v: [f32; 4], model: &str) -> Embedding {
    Embedding { vector: v.to_vec(), model_version: model.to_string() }
}

fn visible(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn nearest_first_with_provenance() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let idx = VectorIndex::open(tmp.path(), 4, 10_000).await?;
    idx.upsert(&batch("a", "1", 2), &[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]], "m1").await?;

    let hits = idx.search_vec(&query([0.9, 0.1, 0.0, 0.0], "m1"), &visible(&["a@1"]), 5).await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "a#0");
    assert!(hits[0].score > hits[1].score);
    assert_eq!(hits[1].span_start, 10);
    assert_eq!(hits[0].artifact_key, "a@1");
    Ok(())
}

#[tokio::test]
async fn other_model_versions_are_never_scored() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let idx = VectorIndex::open(tmp.path(), 4, 10_000).await?;
    idx.upsert(&batch("old", "1", 1), &[vec![1.0, 0.0, 0.0, 0.0]], "m-old").await?;
    idx.upsert(&batch("new", "1", 1), &[vec![0.0, 0.0, 1.0, 0.0]], "m-new").await?;

    let keys = visible(&["old@1", "new@1"]);
    let hits = idx.search_vec(&query([1.0, 0.0, 0.0, 0.0], "m-new"), &keys, 5).await?;
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["new#0"]);

    assert_eq!(idx.purge_foreign("m-new").await?, 1);
    assert_eq!(idx.keys().await?.into_keys().collect::<Vec<_>>(), vec!["new@1"]);

    let wrong_dim = Embedding { vector: vec![1.0, 0.0], model_version: "m-new".into() };
    assert!(matches!(idx.search_vec(&wrong_dim, &keys, 5).await, Err(Error::ModelVersionMismatch { .. })));
    Ok(())
}

#[tokio::test]
async fn visibility_is_a_prefilter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let idx = VectorIndex::open(tmp.path(), 4, 10_000).await?;
    idx.upsert(&batch("near", "1", 1), &[vec![1.0, 0.0, 0.0, 0.0]], "m").await?;
    idx.upsert(&batch("far", "1", 1), &[vec![0.0, 1.0, 0.0, 0.0]], "m").await?;

    let hits = idx.search_vec(&query([1.0, 0.0, 0.0, 0.0], "m"), &visible(&["far@1"]), 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "far#0");
    assert!(idx.search_vec(&query([1.0, 0.0, 0.0, 0.0], "m"), &BTreeSet::new(), 1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn replace_remove_and_clear() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let idx = VectorIndex::open(tmp.path(), 4, 10_000).await?;
    let v = vec![0.5, 0.5, 0.5, 0.5];
    idx.upsert(&batch("d", "1", 3), &[v.clone(), v.clone(), v.clone()], "m").await?;
    idx.upsert(&batch("d", "1", 2), &[v.clone(), v.clone()], "m").await?;
    assert_eq!(idx.keys().await?.get("d@1"), Some(&2));

    idx.upsert(&batch("d", "2", 1), &[v.clone()], "m").await?;
    idx.remove_key("d@1").await?;
    assert_eq!(idx.keys().await?.into_keys().collect::<Vec<_>>(), vec!["d@2"]);

    idx.upsert(&batch("e", "1", 1), &[v.clone()], "m").await?;
    idx.remove_document("d").await?;
    assert_eq!(idx.count_rows().await?, 1);

    idx.clear().await?;
    assert!(idx.keys().await?.is_empty());

    let mismatched = idx.upsert(&batch("f", "1", 1), &[vec![1.0, 0.0]], "m").await;
    assert!(matches!(mismatched, Err(Error::ModelVersionMismatch { .. })));
    Ok(())
}
