//! Storage abstraction for docsift.
//!
//! The [`Store`] trait is the seam between the indexing/retrieval services
//! and persistence. [`SqliteStore`] is the shipped backend; tests wrap it to
//! inject failures.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

mod sqlite;

pub use sqlite::SqliteStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Chunk, ChunkHit, Document, IndexStats, SearchStats};

/// A chunk matched by the keyword channel, with the raw signals that
/// matched it. Scoring happens in the retriever.
#[derive(Debug, Clone)]
pub struct KeywordCandidate {
    pub hit: ChunkHit,
    /// `-bm25` of the full-text match (larger is better), if it matched.
    pub fts_rank: Option<f64>,
    /// Case-insensitive containment of the whole query.
    pub substring: bool,
    /// Word-level trigram similarity of the query against the chunk.
    pub trigram: f64,
}

/// A chunk with a stored embedding and its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct VectorCandidate {
    pub hit: ChunkHit,
    pub similarity: f64,
}

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](Store::upsert_document) | Insert or update a document by path, preserving its id |
/// | [`insert_chunks`](Store::insert_chunks) | Insert a batch of chunks atomically |
/// | [`keyword_candidates`](Store::keyword_candidates) | Full-text, substring and trigram matches |
/// | [`vector_candidates`](Store::vector_candidates) | Cosine similarity against every embedded chunk |
/// | [`record_access`](Store::record_access) | Bump access counters after retrieval |
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_document_by_path(&self, path: &str) -> Result<Option<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// All documents, most recently updated first.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Insert a document, or update the one already stored at the same path.
    ///
    /// An existing row keeps its id, `created_at` and access counters. Returns
    /// the row as stored.
    async fn upsert_document(&self, doc: &Document) -> Result<Document>;

    /// Delete the document at `path` and, by cascade, its chunks. Returns
    /// whether a row was removed.
    async fn delete_document_by_path(&self, path: &str) -> Result<bool>;

    /// Delete every document and chunk. Returns the number of documents removed.
    async fn delete_all(&self) -> Result<u64>;

    /// Delete every chunk of a document. Returns the number removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<u64>;

    /// Insert chunks in one transaction; nothing is written if any row fails.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// A document's chunks in `chunk_index` order.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>>;

    /// Chunks that match `query` by full text, by substring, or by trigram
    /// similarity at or above `trigram_floor`.
    async fn keyword_candidates(
        &self,
        query: &str,
        trigram_floor: f64,
    ) -> Result<Vec<KeywordCandidate>>;

    /// Similarity of `query_vec` against every chunk that has an embedding,
    /// optionally skipping one chunk.
    async fn vector_candidates(
        &self,
        query_vec: &[f32],
        exclude_chunk: Option<&str>,
    ) -> Result<Vec<VectorCandidate>>;

    /// Increment `access_count` and set `last_accessed_at` for each document.
    async fn record_access(&self, document_ids: &[String], at: DateTime<Utc>) -> Result<()>;

    async fn index_stats(&self) -> Result<IndexStats>;

    async fn search_stats(&self) -> Result<SearchStats>;
}
