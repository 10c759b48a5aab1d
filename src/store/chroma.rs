//! Remote Chroma collection over the v2 HTTP API
use super::{Hit, Metadata, MetadataFilter, Record, VectorStore, VectorStoreError};
use crate::config::ChromaConfig;
use crate::error::Result;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

const AUTH_HEADER: &str = "x-chroma-token";

/// Chroma collection client
///
/// The collection id is looked up by name on first use and cached; the
/// client holds no other mutable state and is shared by all requests.
pub struct ChromaStore {
    client: Client,
    host: String,
    api_key: String,
    tenant: String,
    database: String,
    collection: String,
    collection_id: OnceLock<String>,
    resolve_lock: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct CollectionModel {
    id: String,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query_embeddings: &'a [Vec<f32>],
    n_results: usize,
    include: [&'static str; 3],
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<&'a MetadataFilter>,
}

/// Every field is optional; Chroma returns `null` for excluded or empty lists
#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Option<Vec<Option<Vec<Option<String>>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Vec<Option<Metadata>>>>>,
    #[serde(default)]
    distances: Option<Vec<Option<Vec<Option<f64>>>>>,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a Metadata>,
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
}

impl ChromaStore {
    pub fn new(
        host: &str,
        api_key: String,
        tenant: &str,
        database: &str,
        collection: &str,
        timeout: Duration,
    ) -> std::result::Result<Self, VectorStoreError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            tenant: tenant.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
            collection_id: OnceLock::new(),
            resolve_lock: Mutex::new(()),
        })
    }

    /// Build from configuration; the API key and tenant must be present
    pub fn from_config(config: &ChromaConfig) -> Result<Self> {
        let api_key = config.require_credentials()?;
        Ok(Self::new(
            &config.host,
            api_key,
            &config.tenant,
            &config.database,
            &config.collection,
            Duration::from_secs(config.timeout_secs),
        )?)
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.host, self.tenant, self.database
        )
    }

    fn collection_url(&self, suffix: &str) -> std::result::Result<String, VectorStoreError> {
        let id = self.collection_id()?;
        Ok(format!("{}/{}/{}", self.collections_url(), id, suffix))
    }

    fn collection_id(&self) -> std::result::Result<&str, VectorStoreError> {
        if let Some(id) = self.collection_id.get() {
            return Ok(id.as_str());
        }

        let _guard = self
            .resolve_lock
            .lock()
            .map_err(|_| VectorStoreError::Http("collection lookup lock poisoned".to_string()))?;
        if let Some(id) = self.collection_id.get() {
            return Ok(id.as_str());
        }

        let url = format!("{}/{}", self.collections_url(), self.collection);
        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.api_key)
            .send()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(VectorStoreError::CollectionNotFound(self.collection.clone()));
        }
        let model: CollectionModel = decode(check(response)?)?;

        tracing::debug!("Resolved collection {} -> {}", self.collection, model.id);
        Ok(self.collection_id.get_or_init(|| model.id).as_str())
    }

    fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<Response, VectorStoreError> {
        let response = self
            .client
            .post(url)
            .header(AUTH_HEADER, &self.api_key)
            .json(body)
            .send()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;
        check(response)
    }
}

fn check(response: Response) -> std::result::Result<Response, VectorStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(VectorStoreError::Api {
        status: status.as_u16(),
        message,
    })
}

fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, VectorStoreError> {
    response
        .json()
        .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))
}

/// Zip Chroma's parallel per-query arrays into hit lists
///
/// The documents list drives the hit count. Missing or short metadata and
/// distance lists are tolerated: a missing metadata entry becomes `{}` and a
/// missing distance is left absent. Queries without any returned row get an
/// empty list, so the output always has `n_queries` entries.
pub fn assemble_hits(
    n_queries: usize,
    documents: Vec<Option<Vec<Option<String>>>>,
    metadatas: Vec<Option<Vec<Option<Metadata>>>>,
    distances: Vec<Option<Vec<Option<f64>>>>,
) -> Vec<Vec<Hit>> {
    let mut metadatas = metadatas.into_iter();
    let mut distances = distances.into_iter();
    let mut documents = documents.into_iter();

    (0..n_queries)
        .map(|_| {
            let docs = documents.next().flatten().unwrap_or_default();
            let mut metas = metadatas.next().flatten().unwrap_or_default().into_iter();
            let mut dists = distances.next().flatten().unwrap_or_default().into_iter();

            docs.into_iter()
                .map(|document| Hit {
                    document,
                    metadata: metas.next().flatten().unwrap_or_default(),
                    distance: dists.next().flatten(),
                })
                .collect()
        })
        .collect()
}

impl VectorStore for ChromaStore {
    fn query(
        &self,
        query_vectors: &[Vec<f32>],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> std::result::Result<Vec<Vec<Hit>>, VectorStoreError> {
        if query_vectors.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.collection_url("query")?;
        let body = QueryBody {
            query_embeddings: query_vectors,
            n_results: top_k,
            include: ["documents", "metadatas", "distances"],
            filter,
        };
        let response: QueryResponse = decode(self.post(&url, &body)?)?;

        Ok(assemble_hits(
            query_vectors.len(),
            response.documents.unwrap_or_default(),
            response.metadatas.unwrap_or_default(),
            response.distances.unwrap_or_default(),
        ))
    }

    fn count(&self) -> std::result::Result<usize, VectorStoreError> {
        let url = self.collection_url("count")?;
        let response = self
            .client
            .get(&url)
            .header(AUTH_HEADER, &self.api_key)
            .send()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;
        decode(check(response)?)
    }

    fn upsert(&self, records: &[Record]) -> std::result::Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let url = self.collection_url("upsert")?;
        let body = UpsertBody {
            ids: records.iter().map(|r| r.id.as_str()).collect(),
            embeddings: records.iter().map(|r| r.embedding.as_slice()).collect(),
            documents: records.iter().map(|r| r.document.as_str()).collect(),
            metadatas: records.iter().map(|r| &r.metadata).collect(),
        };
        self.post(&url, &body)?;
        Ok(())
    }

    fn peek(&self, limit: usize) -> std::result::Result<Vec<Metadata>, VectorStoreError> {
        let url = self.collection_url("get")?;
        let body = json!({ "limit": limit, "include": ["metadatas"] });
        let response: GetResponse = decode(self.post(&url, &body)?)?;
        Ok(response
            .metadatas
            .unwrap_or_default()
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect())
    }

    fn heartbeat(&self) -> std::result::Result<(), VectorStoreError> {
        let response = self
            .client
            .get(format!("{}/api/v2/heartbeat", self.host))
            .header(AUTH_HEADER, &self.api_key)
            .send()
            .map_err(|e| VectorStoreError::Http(e.to_string()))?;
        check(response)?;
        // A reachable server with a missing collection is still unusable
        self.collection_id()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "chroma"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn meta(source: &str) -> Metadata {
        match json!({ "source_file": source }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_assemble_full_response() {
        let hits = assemble_hits(
            2,
            vec![
                Some(vec![Some("a".into()), Some("b".into())]),
                Some(vec![Some("c".into())]),
            ],
            vec![
                Some(vec![Some(meta("x")), Some(meta("y"))]),
                Some(vec![Some(meta("z"))]),
            ],
            vec![Some(vec![Some(0.1), Some(0.2)]), Some(vec![Some(0.3)])],
        );

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].len(), 2);
        assert_eq!(hits[0][1].document.as_deref(), Some("b"));
        assert_eq!(hits[0][1].metadata, meta("y"));
        assert_eq!(hits[1][0].distance, Some(0.3));
    }

    #[test]
    fn test_assemble_tolerates_short_and_missing_lists() {
        let hits = assemble_hits(
            3,
            vec![Some(vec![Some("a".into()), Some("b".into()), None])],
            vec![Some(vec![Some(meta("x")), None])],
            vec![Some(vec![Some(0.5)])],
        );

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].len(), 3);
        assert!(hits[0][1].metadata.is_empty());
        assert!(hits[0][2].metadata.is_empty());
        assert_eq!(hits[0][1].distance, None);
        assert_eq!(hits[0][2].document, None);
        assert!(hits[1].is_empty());
        assert!(hits[2].is_empty());
    }

    #[test]
    fn test_query_response_accepts_nulls() {
        let response: QueryResponse = serde_json::from_value(json!({
            "ids": [["1"]],
            "documents": [["text"]],
            "metadatas": null,
            "distances": [null]
        }))
        .unwrap();

        let hits = assemble_hits(
            1,
            response.documents.unwrap_or_default(),
            response.metadatas.unwrap_or_default(),
            response.distances.unwrap_or_default(),
        );
        assert_eq!(hits[0].len(), 1);
        assert_eq!(hits[0][0].distance, None);
    }

    #[test]
    fn test_query_body_uses_where_key() {
        let filter = MetadataFilter::from_value(&json!({"language": "zh"})).unwrap();
        let vectors = vec![vec![0.0_f32, 1.0]];
        let body = QueryBody {
            query_embeddings: &vectors,
            n_results: 5,
            include: ["documents", "metadatas", "distances"],
            filter: Some(&filter),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["where"], json!({"language": "zh"}));
        assert_eq!(value["n_results"], json!(5));

        let unfiltered = QueryBody { filter: None, ..body };
        let value = serde_json::to_value(&unfiltered).unwrap();
        assert!(value.get("where").is_none());
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let config = ChromaConfig {
            api_key_env: "FSHDKB_TEST_NO_SUCH_KEY".to_string(),
            ..ChromaConfig::default()
        };
        assert!(ChromaStore::from_config(&config).is_err());
    }
}
