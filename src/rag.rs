//! Retrieval-augmented generation helpers: overlapping text chunking, vector
//! indexing through the embeddings operation, and similarity search over a
//! pluggable vector store.

use crate::api::Options;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::similarity::{normalize_embeddings, rank_by_similarity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Mutex;
use uuid::Uuid;

/// Default chunk width, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Default number of matches returned by a search.
pub const DEFAULT_TOP_K: usize = 5;

/// One stored vector together with its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorItem {
    /// Store-unique identifier; upserting the same id replaces the item.
    pub id: String,
    /// The embedding vector.
    pub embedding: Vec<f64>,
    /// Arbitrary metadata; indexing records the chunk under `text` and its
    /// position under `index`.
    pub metadata: Map<String, Value>,
}

/// One search hit: a stored item's id and metadata plus its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// The matched item's id.
    pub id: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
    /// The matched item's metadata, verbatim.
    pub metadata: Map<String, Value>,
}

/// Storage backend for indexed vectors.
pub trait VectorStore: Send + Sync {
    /// Insert items, replacing any stored item with the same id.
    fn upsert(&self, items: Vec<VectorItem>);

    /// The `top_k` stored items most similar to `vector`, best first.
    fn query(&self, vector: &[f64], top_k: usize) -> Vec<VectorMatch>;
}

/// In-memory [`VectorStore`] for local development and tests.
///
/// Items keep their insertion order, so equal-score matches rank
/// deterministically.
#[derive(Default)]
pub struct InMemoryVectorStore {
    items: Mutex<Vec<VectorItem>>,
}

impl InMemoryVectorStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored items.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Whether the store holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, items: Vec<VectorItem>) {
        let mut stored = self.items.lock().unwrap();
        for item in items {
            if let Some(existing) = stored.iter_mut().find(|e| e.id == item.id) {
                *existing = item;
            } else {
                stored.push(item);
            }
        }
    }

    fn query(&self, vector: &[f64], top_k: usize) -> Vec<VectorMatch> {
        let stored = self.items.lock().unwrap();
        let embeddings: Vec<Vec<f64>> = stored.iter().map(|item| item.embedding.clone()).collect();
        let mut matches: Vec<VectorMatch> = rank_by_similarity(vector, &embeddings)
            .into_iter()
            .map(|(index, score)| VectorMatch {
                id: stored[index].id.clone(),
                score,
                metadata: stored[index].metadata.clone(),
            })
            .collect();
        matches.truncate(top_k);
        matches
    }
}

/// Split `text` into chunks of at most `max_chars` characters, with
/// consecutive chunks overlapping by `overlap` characters.
///
/// Counts characters, not bytes, so chunk boundaries never split a multi-byte
/// character. Chunks are trimmed and empty ones dropped. `overlap` is clamped
/// below `max_chars` so the walk always advances.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let max_chars = max_chars.max(1);
    let overlap = overlap.min(max_chars - 1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = chars.len().min(start + max_chars);
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

impl Dispatcher {
    /// Chunk `text`, embed every chunk in one request, and upsert the results
    /// into `store`.
    ///
    /// Chunk width and overlap come from the `chunk_size` and `chunk_overlap`
    /// options (defaults 1000/100); every option also passes through to the
    /// embeddings dispatch. Chunks whose vectors come back empty are skipped.
    /// Returns the stored items.
    pub async fn rag_index(
        &self,
        text: &str,
        store: &dyn VectorStore,
        options: Options,
    ) -> Result<Vec<VectorItem>> {
        let chunk_size = options
            .get("chunk_size")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = options
            .get("chunk_overlap")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_CHUNK_OVERLAP);

        let chunks = chunk_text(text, chunk_size, chunk_overlap);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<Value> = chunks.iter().map(|chunk| json!(chunk)).collect();
        let response = self
            .embeddings(Value::Array(inputs), options)
            .await?
            .into_response()?;
        let vectors = normalize_embeddings(response.embeddings.as_deref().unwrap_or_default());

        let items: Vec<VectorItem> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .filter(|(_, (_, vector))| !vector.is_empty())
            .map(|(index, (chunk, embedding))| {
                let mut metadata = Map::new();
                metadata.insert("text".to_string(), json!(chunk));
                metadata.insert("index".to_string(), json!(index));
                VectorItem {
                    id: Uuid::new_v4().to_string(),
                    embedding,
                    metadata,
                }
            })
            .collect();

        store.upsert(items.clone());
        Ok(items)
    }

    /// Embed `query` and return the most similar indexed chunks from `store`.
    ///
    /// The result count comes from the `top_k` option (default 5). A query
    /// whose embedding comes back missing or empty yields no matches rather
    /// than an error.
    pub async fn rag_search(
        &self,
        query: &str,
        store: &dyn VectorStore,
        options: Options,
    ) -> Result<Vec<VectorMatch>> {
        let top_k = options
            .get("top_k")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_TOP_K);

        let response = self
            .embeddings(json!(query), options)
            .await?
            .into_response()?;
        let vectors = normalize_embeddings(response.embeddings.as_deref().unwrap_or_default());

        match vectors.first() {
            Some(vector) if !vector.is_empty() => Ok(store.query(vector, top_k)),
            _ => Ok(Vec::new()),
        }
    }
}
