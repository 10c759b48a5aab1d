//! Local collection: SQLite persistence with an in-memory HNSW index
//!
//! Records live in a `records` table (embedding stored as little-endian f32
//! bytes). On open every record is loaded into an HNSW graph keyed by slot
//! number. HNSW has no delete, so replacing a record tombstones its old slot
//! and appends a new one; searches over-fetch by the tombstone count.

use super::{cosine_distance, Hit, Metadata, MetadataFilter, Record, VectorStore, VectorStoreError};
use crate::config::IndexConfig;
use ahash::AHashMap;
use hnsw_rs::prelude::*;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type DbPool = Pool<SqliteConnectionManager>;

/// Collections this small are scanned exactly
const EXACT_SCAN_LIMIT: usize = 256;

/// Max HNSW layers
const MAX_LAYERS: usize = 16;

const MIGRATIONS: &[&str] = &[
    // 1: records and collection metadata
    r#"
    CREATE TABLE records (
        id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE TABLE collection_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    "#,
];

struct Entry {
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

struct IndexState {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Slot number is the HNSW data id; `None` marks a replaced record
    entries: Vec<Option<Entry>>,
    by_id: AHashMap<String, usize>,
    live: usize,
}

impl IndexState {
    fn new(config: &IndexConfig) -> Self {
        Self {
            hnsw: Hnsw::<f32, DistCosine>::new(
                config.hnsw_m,
                config.max_elements,
                MAX_LAYERS,
                config.hnsw_ef_construction,
                DistCosine,
            ),
            entries: Vec::new(),
            by_id: AHashMap::new(),
            live: 0,
        }
    }

    fn put(&mut self, id: String, entry: Entry) {
        if let Some(old) = self.by_id.get(&id).copied() {
            if self.entries[old].take().is_some() {
                self.live -= 1;
            }
        }

        let slot = self.entries.len();
        self.hnsw.insert((&entry.embedding, slot));
        self.entries.push(Some(entry));
        self.by_id.insert(id, slot);
        self.live += 1;
    }

    fn stale(&self) -> usize {
        self.entries.len() - self.live
    }

    fn hit(&self, slot: usize, distance: f32) -> Option<Hit> {
        let entry = self.entries.get(slot)?.as_ref()?;
        Some(Hit {
            document: Some(entry.document.clone()),
            metadata: entry.metadata.clone(),
            distance: Some(f64::from(distance)),
        })
    }

    fn exact(&self, vector: &[f32], top_k: usize, filter: Option<&MetadataFilter>) -> Vec<Hit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                let entry = entry.as_ref()?;
                if filter.is_some_and(|f| !f.matches(&entry.metadata)) {
                    return None;
                }
                Some((slot, cosine_distance(vector, &entry.embedding)))
            })
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored
            .into_iter()
            .take(top_k)
            .filter_map(|(slot, d)| self.hit(slot, d))
            .collect()
    }

    fn approximate(&self, vector: &[f32], top_k: usize, ef_search: usize) -> Vec<Hit> {
        let k = (top_k + self.stale()).min(self.entries.len());
        let mut neighbours = self.hnsw.search(vector, k, ef_search.max(k));
        neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        neighbours
            .into_iter()
            .filter_map(|n| self.hit(n.d_id, n.distance))
            .take(top_k)
            .collect()
    }
}

/// SQLite-backed collection searched in process
pub struct LocalStore {
    pool: DbPool,
    dimension: usize,
    ef_search: usize,
    state: RwLock<IndexState>,
}

impl LocalStore {
    /// Open (or create) the collection at `db_path` and load it into memory
    pub fn open(
        db_path: &Path,
        dimension: usize,
        config: &IndexConfig,
    ) -> Result<Self, VectorStoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VectorStoreError::Pool(format!("Failed to create {:?}: {}", parent, e))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| VectorStoreError::Pool(e.to_string()))?;

        {
            let conn = pool
                .get()
                .map_err(|e| VectorStoreError::Pool(e.to_string()))?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self {
            pool,
            dimension,
            ef_search: config.hnsw_ef_search,
            state: RwLock::new(IndexState::new(config)),
        };
        store.migrate()?;
        store.check_dimension()?;
        store.load()?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, VectorStoreError> {
        self.pool
            .get()
            .map_err(|e| VectorStoreError::Pool(e.to_string()))
    }

    fn migrate(&self) -> Result<(), VectorStoreError> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = i as i64 + 1;
            if version > current {
                tracing::info!("Applying collection migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }
        Ok(())
    }

    /// A collection keeps the dimension it was created with
    fn check_dimension(&self) -> Result<(), VectorStoreError> {
        let conn = self.conn()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM collection_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match stored {
            Some(value) => {
                let stored: usize = value.parse().map_err(|_| {
                    VectorStoreError::Serialization(format!("bad stored dimension '{}'", value))
                })?;
                if stored != self.dimension {
                    return Err(VectorStoreError::InvalidDimension {
                        expected: stored,
                        actual: self.dimension,
                    });
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO collection_meta (key, value) VALUES ('dimension', ?1)",
                    params![self.dimension.to_string()],
                )?;
            }
        }
        Ok(())
    }

    fn load(&self) -> Result<(), VectorStoreError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, document, metadata, embedding FROM records ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut state = self.write_state()?;
        for row in rows {
            let (id, document, metadata, blob) = row?;
            let metadata: Metadata = serde_json::from_str(&metadata)
                .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
            let embedding = decode_embedding(&blob);
            if embedding.len() != self.dimension {
                tracing::warn!("Skipping record {} with dimension {}", id, embedding.len());
                continue;
            }
            state.put(
                id,
                Entry {
                    document,
                    metadata,
                    embedding,
                },
            );
        }

        tracing::info!("Loaded {} records into the local index", state.live);
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, IndexState>, VectorStoreError> {
        self.state
            .read()
            .map_err(|_| VectorStoreError::Index("index lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, IndexState>, VectorStoreError> {
        self.state
            .write()
            .map_err(|_| VectorStoreError::Index("index lock poisoned".to_string()))
    }

    fn check_vector(&self, vector: &[f32]) -> Result<(), VectorStoreError> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl VectorStore for LocalStore {
    fn query(
        &self,
        query_vectors: &[Vec<f32>],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<Vec<Hit>>, VectorStoreError> {
        for vector in query_vectors {
            self.check_vector(vector)?;
        }

        let state = self.read_state()?;
        let exact = filter.is_some() || state.live <= EXACT_SCAN_LIMIT;

        Ok(query_vectors
            .iter()
            .map(|vector| {
                if top_k == 0 || state.live == 0 {
                    Vec::new()
                } else if exact {
                    state.exact(vector, top_k, filter)
                } else {
                    state.approximate(vector, top_k, self.ef_search)
                }
            })
            .collect())
    }

    fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.read_state()?.live)
    }

    fn upsert(&self, records: &[Record]) -> Result<(), VectorStoreError> {
        for record in records {
            self.check_vector(&record.embedding)?;
        }

        let mut metadata_json = Vec::with_capacity(records.len());
        for record in records {
            metadata_json.push(
                serde_json::to_string(&record.metadata)
                    .map_err(|e| VectorStoreError::Serialization(e.to_string()))?,
            );
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO records (id, document, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (record, metadata) in records.iter().zip(&metadata_json) {
                stmt.execute(params![
                    record.id,
                    record.document,
                    metadata,
                    encode_embedding(&record.embedding)
                ])?;
            }
        }
        tx.commit()?;

        let mut state = self.write_state()?;
        for record in records {
            state.put(
                record.id.clone(),
                Entry {
                    document: record.document.clone(),
                    metadata: record.metadata.clone(),
                    embedding: record.embedding.clone(),
                },
            );
        }
        Ok(())
    }

    fn peek(&self, limit: usize) -> Result<Vec<Metadata>, VectorStoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT metadata FROM records ORDER BY rowid LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            let metadata = serde_json::from_str(&row?)
                .map_err(|e| VectorStoreError::Serialization(e.to_string()))?;
            out.push(metadata);
        }
        Ok(out)
    }

    fn heartbeat(&self) -> Result<(), VectorStoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}
