//! Indexing orchestration.
//!
//! Drives a file through fingerprint → extract → chunk → embed → persist.
//! Unchanged files (same content hash) short-circuit before any parsing.
//! Failures degrade instead of aborting wherever a partial index is still
//! useful:
//!
//! - an embedding failure stores the document with null embeddings, so it is
//!   still found by the keyword channel;
//! - a failed chunk batch falls back to one insert per chunk, and a chunk
//!   that still fails is retried once without its embedding before it is
//!   dropped;
//! - during a scan, one file's error is logged and the scan moves on.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunk::{chunk_text, count_tokens};
use crate::classify::{classify, DocumentFacts};
use crate::config::{ChunkingConfig, Config, WatchConfig};
use crate::embedding::EmbeddingProvider;
use crate::error::{LookupError, ParseError};
use crate::models::{Chunk, Document, DocumentContext, IndexStats};
use crate::parser::Parser;
use crate::scanner::{self, PathFilter, DEFAULT_MAX_DEPTH};
use crate::store::Store;

/// What indexing a path did.
#[derive(Debug, Clone)]
pub enum IndexOutcome {
    /// First time this path was indexed.
    New(Document),
    /// Content hash matched the stored document; nothing was written.
    Unchanged(Document),
    /// Content changed; the document was updated in place and its chunks replaced.
    Changed(Document),
}

impl IndexOutcome {
    pub fn document(&self) -> &Document {
        match self {
            IndexOutcome::New(d) | IndexOutcome::Unchanged(d) | IndexOutcome::Changed(d) => d,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndexOutcome::New(_) => "new",
            IndexOutcome::Unchanged(_) => "unchanged",
            IndexOutcome::Changed(_) => "changed",
        }
    }
}

/// Per-file tallies of a directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub seen: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, result: &Result<IndexOutcome>) {
        self.seen += 1;
        match result {
            Ok(IndexOutcome::New(_)) => self.new += 1,
            Ok(IndexOutcome::Changed(_)) => self.changed += 1,
            Ok(IndexOutcome::Unchanged(_)) => self.unchanged += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct Indexer {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    parser: Parser,
    chunking: ChunkingConfig,
    embed_batch_size: usize,
    watch: Option<WatchConfig>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        parser: Parser,
        chunking: ChunkingConfig,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            parser,
            chunking,
            embed_batch_size: embed_batch_size.max(1),
            watch: None,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self::new(
            store,
            embedder,
            Parser::new(&config.parser),
            config.chunking.clone(),
            config.embedding.batch_size,
        )
        .with_watch(config.watch.clone())
    }

    /// Set the watched root used by [`reindex_all`](Self::reindex_all) and scans.
    pub fn with_watch(mut self, watch: Option<WatchConfig>) -> Self {
        self.watch = watch;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Index (or re-index) a single file.
    pub async fn index_file(&self, path: &Path) -> Result<IndexOutcome> {
        let key = document_key(path);
        let fingerprint = self.parser.fingerprint(path)?;
        let existing = self.store.find_document_by_path(&key).await?;

        if let Some(doc) = existing.as_ref() {
            if doc.content_hash == fingerprint.content_hash {
                debug!(path = %key, "content unchanged; skipping");
                return Ok(IndexOutcome::Unchanged(doc.clone()));
            }
        }

        let extracted = self.parser.extract(path)?;
        let pieces = chunk_text(
            &extracted.text,
            self.chunking.chunk_size,
            self.chunking.overlap,
        );
        let embeddings = self.embed_pieces(&key, &pieces).await;

        let classification = classify(
            &DocumentFacts {
                path: &key,
                file_size: fingerprint.size,
                modified_at: fingerprint.modified_at,
            },
            &extracted.text,
        );

        let now = Utc::now();
        // The row keeps its previous hash until the new chunk set is stored,
        // so a failed replacement is retried on the next call.
        let pending = Document {
            id: existing
                .as_ref()
                .map(|d| d.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            path: key.clone(),
            title: extracted.title,
            file_type: fingerprint.file_type,
            file_size: fingerprint.size as i64,
            modified_at: fingerprint.modified_at,
            content_hash: existing
                .as_ref()
                .map(|d| d.content_hash.clone())
                .unwrap_or_default(),
            document_type: classification.document_type,
            category: classification.category,
            language: classification.language,
            summary: classification.summary,
            keywords: classification.keywords,
            extracted_data: classification.extracted_data,
            importance: classification.importance,
            access_count: existing.as_ref().map(|d| d.access_count).unwrap_or(0),
            last_accessed_at: existing.as_ref().and_then(|d| d.last_accessed_at),
            created_at: existing.as_ref().map(|d| d.created_at).unwrap_or(now),
            updated_at: now,
        };

        let pending = self.store.upsert_document(&pending).await?;
        self.store.delete_chunks(&pending.id).await?;

        let mut embeddings = embeddings.map(Vec::into_iter);
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .map(|content| Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: pending.id.clone(),
                chunk_index: 0,
                token_count: count_tokens(&content) as i64,
                content,
                embedding: embeddings.as_mut().and_then(|it| it.next()),
            })
            .collect();

        let written = self.persist_chunks(&key, chunks).await;
        let stored = self
            .store
            .upsert_document(&Document {
                content_hash: fingerprint.content_hash,
                ..pending
            })
            .await?;
        info!(
            path = %key,
            document_type = %stored.document_type,
            category = %stored.category,
            importance = stored.importance,
            chunks = written,
            "indexed document"
        );

        Ok(if existing.is_some() {
            IndexOutcome::Changed(stored)
        } else {
            IndexOutcome::New(stored)
        })
    }

    /// Embed every piece of one document, or none of them.
    ///
    /// Any backend error, or a response with the wrong count or dimension,
    /// degrades the whole document to null embeddings.
    async fn embed_pieces(&self, key: &str, pieces: &[String]) -> Option<Vec<Vec<f32>>> {
        if pieces.is_empty() {
            return None;
        }

        let dims = self.embedder.dimensions();
        let mut vectors = Vec::with_capacity(pieces.len());
        for batch in pieces.chunks(self.embed_batch_size) {
            match self.embedder.embed_batch(batch).await {
                Ok(batch_vectors) => {
                    if batch_vectors.len() != batch.len() {
                        warn!(
                            path = %key,
                            expected = batch.len(),
                            got = batch_vectors.len(),
                            "embedding count mismatch; indexing without embeddings (lexical-only)"
                        );
                        return None;
                    }
                    if let Some(bad) = batch_vectors.iter().find(|v| v.len() != dims) {
                        warn!(
                            path = %key,
                            expected = dims,
                            got = bad.len(),
                            "embedding dimension mismatch; indexing without embeddings (lexical-only)"
                        );
                        return None;
                    }
                    vectors.extend(batch_vectors);
                }
                Err(e) => {
                    warn!(
                        path = %key,
                        error = %format!("{:#}", e),
                        "embedding failed; indexing without embeddings (lexical-only)"
                    );
                    return None;
                }
            }
        }
        Some(vectors)
    }

    /// Insert chunks in fixed-size transactional batches. Returns how many
    /// chunks were stored.
    ///
    /// `chunk_index` is assigned from the number of chunks written so far, so
    /// a dropped chunk does not leave a gap.
    async fn persist_chunks(&self, key: &str, mut chunks: Vec<Chunk>) -> usize {
        let mut written = 0;
        for batch in chunks.chunks_mut(self.chunking.insert_batch_size.max(1)) {
            for (offset, chunk) in batch.iter_mut().enumerate() {
                chunk.chunk_index = (written + offset) as i64;
            }
            match self.store.insert_chunks(batch).await {
                Ok(()) => written += batch.len(),
                Err(e) => {
                    warn!(path = %key, error = %format!("{:#}", e), "chunk batch insert failed; inserting one by one");
                    for chunk in batch.iter_mut() {
                        chunk.chunk_index = written as i64;
                        if self.insert_single(key, chunk).await {
                            written += 1;
                        }
                    }
                }
            }
        }
        written
    }

    async fn insert_single(&self, key: &str, chunk: &Chunk) -> bool {
        let first = match self.store.insert_chunk(chunk).await {
            Ok(()) => return true,
            Err(e) => e,
        };

        if chunk.embedding.is_none() {
            error!(path = %key, chunk_index = chunk.chunk_index, error = %format!("{:#}", first), "dropping chunk");
            return false;
        }

        let stripped = Chunk {
            embedding: None,
            ..chunk.clone()
        };
        match self.store.insert_chunk(&stripped).await {
            Ok(()) => {
                warn!(path = %key, chunk_index = chunk.chunk_index, error = %format!("{:#}", first), "stored chunk without its embedding");
                true
            }
            Err(e) => {
                error!(path = %key, chunk_index = chunk.chunk_index, error = %format!("{:#}", e), "dropping chunk");
                false
            }
        }
    }

    /// Forget a file. Its chunks go with it. Returns whether it was indexed.
    pub async fn remove_file(&self, path: &Path) -> Result<bool> {
        let key = document_key(path);
        let removed = self.store.delete_document_by_path(&key).await?;
        if removed {
            info!(path = %key, "removed document");
        } else {
            debug!(path = %key, "remove requested for unindexed path");
        }
        Ok(removed)
    }

    /// Index every indexable file under `root`. A failing file is logged and
    /// counted; the scan continues.
    pub async fn scan_directory(&self, root: &Path) -> Result<ScanReport> {
        let filter = match &self.watch {
            Some(watch) => PathFilter::from_config(watch)?.with_root(root),
            None => PathFilter::new(root, DEFAULT_MAX_DEPTH, &[])?,
        };
        let paths = scanner::scan_directory(&filter)?;

        let mut report = ScanReport::default();
        for path in &paths {
            let result = self.index_file(path).await;
            if let Err(e) = &result {
                log_index_error(path, e);
            }
            report.record(&result);
        }

        info!(
            root = %root.display(),
            seen = report.seen,
            new = report.new,
            changed = report.changed,
            unchanged = report.unchanged,
            failed = report.failed,
            "scan complete"
        );
        Ok(report)
    }

    /// Drop the whole index, then rescan the watched root.
    pub async fn reindex_all(&self) -> Result<ScanReport> {
        let root = self.watch_root()?;
        self.clear_all().await?;
        self.scan_directory(&root).await
    }

    /// Drop the whole index without rescanning. Returns the number of
    /// documents removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let removed = self.store.delete_all().await?;
        info!(documents = removed, "cleared index");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.store.index_stats().await
    }

    pub async fn get_documents(&self) -> Result<Vec<Document>> {
        self.store.list_documents().await
    }

    /// A document with its chunks in order.
    ///
    /// # Errors
    ///
    /// [`LookupError::DocumentNotFound`] when no document has this id.
    pub async fn get_document_context(&self, id: &str) -> Result<DocumentContext> {
        let document = self
            .store
            .get_document(id)
            .await?
            .ok_or_else(|| LookupError::DocumentNotFound(id.to_string()))?;
        let chunks = self.store.chunks_for_document(id).await?;
        Ok(DocumentContext { document, chunks })
    }

    pub fn watch_root(&self) -> Result<PathBuf> {
        match &self.watch {
            Some(watch) => Ok(watch.root.clone()),
            None => bail!("No watched root configured. Add a [watch] section with a root."),
        }
    }
}

/// Log an indexing failure, telling parse errors apart from everything else.
pub fn log_index_error(path: &Path, e: &anyhow::Error) {
    if let Some(parse) = e.downcast_ref::<ParseError>() {
        warn!(path = %path.display(), error = %parse, "skipping file that could not be parsed");
    } else {
        error!(path = %path.display(), error = %format!("{:#}", e), "failed to index file");
    }
}

/// The stored path for a file: absolute and, where possible, canonical.
///
/// Removed files cannot be canonicalized, so their parent directory is
/// canonicalized instead; that keeps the key identical to the one used when
/// the file was indexed.
pub fn document_key(path: &Path) -> String {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical.display().to_string();
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return parent.join(name).display().to_string();
        }
    }

    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn document_key_survives_file_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone.txt");
        fs::write(&path, "x").unwrap();
        let before = document_key(&path);
        fs::remove_file(&path).unwrap();
        assert_eq!(document_key(&path), before);
    }

    #[test]
    fn scan_report_tallies_outcomes() {
        let doc = |path: &str| Document {
            id: "id".to_string(),
            path: path.to_string(),
            title: String::new(),
            file_type: "txt".to_string(),
            file_size: 0,
            modified_at: Utc::now(),
            content_hash: String::new(),
            document_type: "generic".to_string(),
            category: "general".to_string(),
            language: "unknown".to_string(),
            summary: String::new(),
            keywords: Vec::new(),
            extracted_data: Default::default(),
            importance: 1.0,
            access_count: 0,
            last_accessed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut report = ScanReport::default();
        report.record(&Ok(IndexOutcome::New(doc("a"))));
        report.record(&Ok(IndexOutcome::Unchanged(doc("b"))));
        report.record(&Ok(IndexOutcome::Changed(doc("c"))));
        report.record(&Err(anyhow::anyhow!("boom")));
        assert_eq!(
            report,
            ScanReport {
                seen: 4,
                new: 1,
                changed: 1,
                unchanged: 1,
                failed: 1
            }
        );
    }
}
