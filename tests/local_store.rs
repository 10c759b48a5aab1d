//! Local collection: persistence, approximate search and metadata filters

use fshdkb::config::IndexConfig;
use fshdkb::store::{CollectionStats, LocalStore, MetadataFilter, Record, VectorStore};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

const RECORDS: usize = 300;

/// Point `i` on the unit circle, 0.01 rad apart
fn embedding(i: usize) -> Vec<f32> {
    let theta = i as f32 * 0.01;
    vec![theta.cos(), theta.sin()]
}

fn record(i: usize) -> Record {
    let metadata = match json!({
        "source_file": format!("doc{}.txt", i),
        "language": if i % 2 == 0 { "en" } else { "zh" },
        "category": "遗传学\\基因检测",
        "chunk_index": i,
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };

    Record {
        id: format!("rec{:04}", i),
        document: format!("passage number {}", i),
        metadata,
        embedding: embedding(i),
    }
}

fn open(path: &Path) -> LocalStore {
    LocalStore::open(path, 2, &IndexConfig::default()).unwrap()
}

fn populated(dir: &TempDir) -> LocalStore {
    let store = open(&dir.path().join("kb.sqlite"));
    let records: Vec<Record> = (0..RECORDS).map(record).collect();
    for batch in records.chunks(64) {
        store.upsert(batch).unwrap();
    }
    store
}

#[test]
fn test_large_collection_uses_index_and_ranks_by_distance() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir);
    assert_eq!(store.count().unwrap(), RECORDS);

    let hits = store.query(&[embedding(100), embedding(250)], 5, None).unwrap();
    assert_eq!(hits.len(), 2);

    for (hits, expected) in hits.iter().zip(["doc100.txt", "doc250.txt"]) {
        assert_eq!(hits.len(), 5);
        assert_eq!(hits[0].metadata["source_file"], json!(expected));
        assert!(hits[0].distance.unwrap() < 1e-4);

        let distances: Vec<f64> = hits.iter().map(|h| h.distance.unwrap()).collect();
        assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn test_filtered_query_returns_only_matching_records() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir);

    let filter = MetadataFilter::from_value(&json!({"language": "zh"})).unwrap();
    let hits = store.query(&[embedding(100)], 10, Some(&filter)).unwrap();

    assert_eq!(hits[0].len(), 10);
    assert!(hits[0]
        .iter()
        .all(|h| h.metadata["language"] == json!("zh")));
    // Nearest odd neighbours of 100
    let top: Vec<&Value> = hits[0][..2]
        .iter()
        .map(|h| &h.metadata["source_file"])
        .collect();
    assert!(top.contains(&&json!("doc99.txt")));
    assert!(top.contains(&&json!("doc101.txt")));

    let range = MetadataFilter::from_value(&json!({
        "$and": [{"chunk_index": {"$gte": 10}}, {"chunk_index": {"$lt": 13}}]
    }))
    .unwrap();
    let hits = store.query(&[embedding(0)], 10, Some(&range)).unwrap();
    let mut sources: Vec<String> = hits[0]
        .iter()
        .map(|h| h.metadata["source_file"].as_str().unwrap().to_string())
        .collect();
    sources.sort();
    assert_eq!(sources, vec!["doc10.txt", "doc11.txt", "doc12.txt"]);
}

#[test]
fn test_collection_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kb.sqlite");
    {
        let store = populated(&dir);
        // Replace one record in place
        let mut moved = record(7);
        moved.document = "moved passage".to_string();
        moved.embedding = embedding(200);
        store.upsert(&[moved]).unwrap();
        assert_eq!(store.count().unwrap(), RECORDS);
    }

    let store = open(&path);
    assert_eq!(store.count().unwrap(), RECORDS);

    let hits = store.query(&[embedding(200)], 2, None).unwrap();
    let documents: Vec<&str> = hits[0]
        .iter()
        .filter_map(|h| h.document.as_deref())
        .collect();
    assert!(documents.contains(&"moved passage"));
    assert!(documents.contains(&"passage number 200"));

    store.heartbeat().unwrap();
}

#[test]
fn test_peek_and_stats() {
    let dir = TempDir::new().unwrap();
    let store = populated(&dir);

    let sample = store.peek(10).unwrap();
    assert_eq!(sample.len(), 10);
    assert_eq!(sample[0]["source_file"], json!("doc0.txt"));

    let stats = CollectionStats::collect(&store, 50).unwrap();
    assert_eq!(stats.backend, "local");
    assert_eq!(stats.total_chunks, RECORDS);
    assert_eq!(stats.language_distribution["en"], 25);
    assert_eq!(stats.language_distribution["zh"], 25);
    assert_eq!(stats.category_distribution["基因检测"], 50);
}
