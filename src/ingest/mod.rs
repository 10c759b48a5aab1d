//! Knowledge-base batch loader
//!
//! Walks a document tree, chunks each plain-text document by language,
//! embeds the chunks and upserts them into the collection in small batches.
//! Progress is checkpointed to a JSON file so an interrupted run resumes
//! where it stopped.

mod chunker;
mod progress;
mod scanner;

pub use chunker::{chunk_text, detect_language, record_id};
pub use progress::{FailedFile, IngestProgress};
pub use scanner::{find_documents, DocumentInfo};

use crate::config::IngestConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::filtering::char_len;
use crate::store::{Metadata, Record, VectorStore, VectorStoreError};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Files between progress checkpoints
const CHECKPOINT_EVERY: usize = 5;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Knowledge base root not found: {0:?}")]
    RootNotFound(PathBuf),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Progress file error: {0}")]
    Progress(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Upsert failed: {0}")]
    Store(#[from] VectorStoreError),
}

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub total_documents: usize,
    /// Already recorded as processed by an earlier run
    pub skipped: usize,
    pub processed: usize,
    pub failed: usize,
    pub chunks_added: usize,
}

/// Loads documents into a collection
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
    embed_batch_size: usize,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: IngestConfig,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
            embed_batch_size: embed_batch_size.max(1),
        }
    }

    /// Ingest every document under `root`
    ///
    /// With `fresh` the saved progress is ignored (and overwritten).
    /// A document failing to upload does not stop the run; it is recorded in
    /// the progress file instead.
    pub fn run(&self, root: &Path, fresh: bool) -> Result<IngestReport, IngestError> {
        if !root.is_dir() {
            return Err(IngestError::RootNotFound(root.to_path_buf()));
        }

        let progress_path = self.config.progress_file.as_path();
        let mut progress = if fresh {
            IngestProgress::default()
        } else {
            IngestProgress::load(progress_path)
        };

        let documents = find_documents(root, &self.config.extensions);
        let mut report = IngestReport {
            total_documents: documents.len(),
            ..IngestReport::default()
        };
        tracing::info!("Found {} documents under {:?}", documents.len(), root);

        let pending: Vec<&DocumentInfo> = documents
            .iter()
            .filter(|doc| !progress.is_processed(&doc.path.to_string_lossy()))
            .collect();
        report.skipped = documents.len() - pending.len();
        if report.skipped > 0 {
            tracing::info!("Skipping {} already processed documents", report.skipped);
        }

        for (i, doc) in pending.iter().enumerate() {
            let key = doc.path.to_string_lossy().into_owned();
            tracing::info!("[{}/{}] {}", i + 1, pending.len(), doc.filename);

            match self.ingest_document(doc) {
                Ok(0) => {
                    report.failed += 1;
                    progress.mark_failed(key, "no usable chunks");
                }
                Ok(added) => {
                    report.processed += 1;
                    report.chunks_added += added;
                    progress.mark_processed(key, added);
                }
                Err(e) => {
                    tracing::warn!("Failed to ingest {:?}: {}", doc.path, e);
                    report.failed += 1;
                    progress.mark_failed(key, e.to_string());
                }
            }

            if (i + 1) % CHECKPOINT_EVERY == 0 {
                progress.save(progress_path)?;
            }
        }

        progress.save(progress_path)?;
        tracing::info!(
            "Ingestion finished: {} processed, {} failed, {} chunks",
            report.processed,
            report.failed,
            report.chunks_added
        );
        Ok(report)
    }

    /// Chunk, embed and upsert one document; returns the number of stored chunks
    pub fn ingest_document(&self, doc: &DocumentInfo) -> Result<usize, IngestError> {
        let bytes = std::fs::read(&doc.path).map_err(|source| IngestError::Io {
            path: doc.path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);

        if char_len(text.trim()) < self.config.min_document_chars {
            tracing::debug!("Document too short, skipping: {:?}", doc.path);
            return Ok(0);
        }

        let language = detect_language(&text);
        let chunks = chunk_text(&text, language, self.config.chunk_size);
        tracing::debug!("{} chunks, language {}", chunks.len(), language);

        let batch_size = self.config.upload_batch_size.max(1);
        let mut uploaded = 0;

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let offset = batch_no * batch_size;
            let kept: Vec<(usize, &String)> = batch
                .iter()
                .enumerate()
                .map(|(j, chunk)| (offset + j, chunk))
                .filter(|(_, chunk)| char_len(chunk.trim()) > self.config.min_chunk_chars)
                .collect();
            if kept.is_empty() {
                continue;
            }

            match self.upload_batch(doc, language, &kept) {
                Ok(n) => {
                    uploaded += n;
                    tracing::debug!("Batch {}: uploaded {} chunks", batch_no + 1, n);
                }
                Err(e) => {
                    tracing::warn!("Batch {} of {:?} failed: {}", batch_no + 1, doc.path, e);
                    continue;
                }
            }

            if self.config.upload_delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(self.config.upload_delay_ms));
            }
        }

        Ok(uploaded)
    }

    fn upload_batch(
        &self,
        doc: &DocumentInfo,
        language: &str,
        chunks: &[(usize, &String)],
    ) -> Result<usize, IngestError> {
        let texts: Vec<String> = chunks.iter().map(|(_, c)| (*c).clone()).collect();

        let mut embeddings = Vec::with_capacity(texts.len());
        for part in texts.chunks(self.embed_batch_size) {
            embeddings.extend(self.embedder.embed_batch(part)?);
        }

        let records: Vec<Record> = chunks
            .iter()
            .zip(texts)
            .zip(embeddings)
            .map(|(((index, _), document), embedding)| Record {
                id: record_id(&doc.category, &doc.filename, language, *index),
                metadata: chunk_metadata(doc, language, *index),
                document,
                embedding,
            })
            .collect();

        self.store.upsert(&records)?;
        Ok(records.len())
    }
}

/// Metadata stored with every chunk
pub fn chunk_metadata(doc: &DocumentInfo, language: &str, chunk_index: usize) -> Metadata {
    let value = json!({
        "category": doc.category,
        "doc_type": "医学文档",
        "source_file": doc.filename,
        "file_type": doc.file_type,
        "language": language,
        "chunk_index": chunk_index,
        "folder_path": doc.folder_path,
        "full_path": doc.path.to_string_lossy(),
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => Metadata::new(),
    }
}
