//! Core data models used throughout docsift.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the indexing and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Structured fields pulled out of a document's text, keyed by field name
/// (`dates`, `amounts`, `emails`, `phones`, `invoice_numbers`, ...).
pub type ExtractedData = BTreeMap<String, Vec<String>>;

/// One indexed source file.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub title: String,
    pub file_type: String,
    pub file_size: i64,
    pub modified_at: DateTime<Utc>,
    pub content_hash: String,
    pub document_type: String,
    pub category: String,
    pub language: String,
    pub summary: String,
    pub keywords: Vec<String>,
    pub extracted_data: ExtractedData,
    pub importance: f64,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contiguous fragment of a document's extracted text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    pub embedding: Option<Vec<f32>>,
}

/// Size, modification time and content hash of a file on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    /// SHA-256 of the full file bytes, lowercase hex.
    pub content_hash: String,
    pub file_type: String,
}

/// Text pulled out of a file by the parser.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub title: String,
    pub metadata: serde_json::Value,
}

/// A chunk joined with the document fields ranking needs.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub token_count: i64,
    pub path: String,
    pub title: String,
    pub document_type: String,
    pub category: String,
    pub importance: f64,
    pub access_count: i64,
}

/// Which retrieval channel produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSource {
    Keyword,
    Vector,
    Both,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub path: String,
    pub title: String,
    pub chunk_index: i64,
    pub content: String,
    pub score: f64,
    pub document_type: String,
    pub category: String,
    pub importance: f64,
    pub source: MatchSource,
}

/// Aggregate counts over the whole index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub documents: i64,
    pub chunks: i64,
    pub total_size: i64,
}

/// Counts describing how searchable the index currently is.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    pub total_chunks: i64,
    pub avg_token_count: f64,
    pub documents_with_embeddings: i64,
}

/// A document together with its chunks in `chunk_index` order.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub document: Document,
    pub chunks: Vec<Chunk>,
}
