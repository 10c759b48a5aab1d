//! Loading a document tree into a local collection

mod common;

use common::MockEmbedder;
use fshdkb::config::{IndexConfig, IngestConfig};
use fshdkb::ingest::{IngestProgress, IngestReport, Ingestor};
use fshdkb::store::{CollectionStats, LocalStore, VectorStore};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const ENGLISH: &str = "Facioscapulohumeral muscular dystrophy affects the face and shoulders. \
It is usually inherited in an autosomal dominant pattern. \
Physical therapy helps many patients keep their mobility for longer. \
Regular follow up with a neuromuscular clinic is recommended.";

const CHINESE: &str = "面肩肱型肌营养不良症（FSHD）是一种常见的遗传性肌肉疾病，主要累及面部、肩胛带和上臂肌肉，病程进展通常较为缓慢。

FSHD1 与 4 号染色体 D4Z4 重复序列收缩有关，导致 DUX4 基因在肌肉细胞中异常表达，从而引起肌纤维损伤。

基因检测可以帮助确诊，建议有家族史的患者及其亲属在医生指导下进行遗传咨询和相关检查。";

struct Fixture {
    dir: TempDir,
    root: PathBuf,
    embedder: Arc<MockEmbedder>,
    store: Arc<LocalStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("kb");

        write(&root.join("overview.txt"), ENGLISH);
        write(&root.join("short.txt"), "FSHD 简介");
        write(&root.join("遗传").join("dux4.md"), CHINESE);
        write(&root.join("_drafts").join("draft.txt"), ENGLISH);
        write(&root.join("scan.pdf"), ENGLISH);

        let store = LocalStore::open(
            &dir.path().join("db").join("kb.sqlite"),
            1,
            &IndexConfig::default(),
        )
        .unwrap();

        Self {
            dir,
            root,
            embedder: Arc::new(MockEmbedder::default()),
            store: Arc::new(store),
        }
    }

    fn progress_file(&self) -> PathBuf {
        self.dir.path().join("progress.json")
    }

    fn run(&self, fresh: bool) -> IngestReport {
        let config = IngestConfig {
            chunk_size: 80,
            upload_delay_ms: 0,
            progress_file: self.progress_file(),
            ..IngestConfig::default()
        };
        Ingestor::new(self.embedder.clone(), self.store.clone(), config, 2)
            .run(&self.root, fresh)
            .unwrap()
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_ingest_tree() {
    let fx = Fixture::new();
    let report = fx.run(false);

    assert_eq!(
        report,
        IngestReport {
            total_documents: 3,
            skipped: 0,
            processed: 2,
            failed: 1,
            chunks_added: 7,
        }
    );
    assert_eq!(fx.store.count().unwrap(), 7);

    // Documents are visited in path order
    let sample = fx.store.peek(10).unwrap();
    assert_eq!(sample.len(), 7);

    let first = &sample[0];
    assert_eq!(first["source_file"], json!("overview.txt"));
    assert_eq!(first["category"], json!("kb"));
    assert_eq!(first["folder_path"], json!("."));
    assert_eq!(first["language"], json!("en"));
    assert_eq!(first["file_type"], json!("txt"));
    assert_eq!(first["doc_type"], json!("医学文档"));
    assert_eq!(first["chunk_index"], json!(0));

    let last = &sample[6];
    assert_eq!(last["source_file"], json!("dux4.md"));
    assert_eq!(last["category"], json!("遗传"));
    assert_eq!(last["language"], json!("zh"));
    assert_eq!(last["chunk_index"], json!(2));
    assert!(last["full_path"].as_str().unwrap().ends_with("dux4.md"));

    let stats = CollectionStats::collect(fx.store.as_ref(), 50).unwrap();
    assert_eq!(stats.language_distribution["en"], 4);
    assert_eq!(stats.language_distribution["zh"], 3);
    assert_eq!(stats.category_distribution["kb"], 4);
    assert_eq!(stats.category_distribution["遗传"], 3);
}

#[test]
fn test_embedding_batches_are_bounded() {
    let fx = Fixture::new();
    fx.run(false);

    let batches = fx.embedder.batches.lock().unwrap();
    assert!(batches.iter().all(|b| b.len() <= 2));
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 7);
}

#[test]
fn test_resume_skips_processed_documents() {
    let fx = Fixture::new();
    fx.run(false);
    let calls = fx.embedder.calls.load(Ordering::SeqCst);

    let progress = IngestProgress::load(&fx.progress_file());
    assert_eq!(progress.processed_files.len(), 2);
    assert_eq!(progress.total_chunks, 7);
    assert_eq!(progress.failed_files.len(), 1);
    assert!(progress.failed_files[0].path.ends_with("short.txt"));
    assert!(progress.last_checkpoint.is_some());

    let again = fx.run(false);
    assert_eq!(again.skipped, 2);
    assert_eq!(again.processed, 0);
    assert_eq!(again.chunks_added, 0);
    assert_eq!(fx.embedder.calls.load(Ordering::SeqCst), calls);

    // A fresh run re-uploads under the same ids
    let fresh = fx.run(true);
    assert_eq!(fresh.skipped, 0);
    assert_eq!(fresh.processed, 2);
    assert_eq!(fx.store.count().unwrap(), 7);
}

#[test]
fn test_missing_root_is_an_error() {
    let fx = Fixture::new();
    let config = IngestConfig {
        progress_file: fx.progress_file(),
        ..IngestConfig::default()
    };
    let result = Ingestor::new(fx.embedder.clone(), fx.store.clone(), config, 8)
        .run(&fx.dir.path().join("missing"), false);
    assert!(result.is_err());
    assert!(!fx.progress_file().exists());
}
