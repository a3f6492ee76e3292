//! SQLite-backed [`Store`] implementation.
//!
//! Full-text matching uses the `chunks_fts` FTS5 index (porter stemming,
//! bm25 ranking). Keyword candidates are the chunks that match there or
//! share at least one trigram with the query in `chunks_trigram`; substring
//! containment and trigram similarity are then evaluated in Rust over those
//! rows only. Cosine similarity runs over every embedded chunk.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use super::{KeywordCandidate, Store, VectorCandidate};
use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::fuzzy::{probe_trigrams, TrigramQuery};
use crate::models::{Chunk, ChunkHit, Document, ExtractedData, IndexStats, SearchStats};
use crate::{db, migrate};

const DOCUMENT_COLUMNS: &str = "id, path, title, file_type, file_size, modified_at, content_hash, \
     document_type, category, language, summary, keywords_json, extracted_json, importance, \
     access_count, last_accessed_at, created_at, updated_at";

const HIT_COLUMNS: &str = "c.id AS chunk_id, c.document_id, c.chunk_index, c.content, \
     c.token_count, d.path, d.title, d.document_type, d.category, d.importance, d.access_count";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and bring its schema up to date.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_ts(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let keywords_json: String = row.try_get("keywords_json")?;
    let extracted_json: String = row.try_get("extracted_json")?;
    let last_accessed_at: Option<i64> = row.try_get("last_accessed_at")?;

    Ok(Document {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        title: row.try_get("title")?,
        file_type: row.try_get("file_type")?,
        file_size: row.try_get("file_size")?,
        modified_at: from_ts(row.try_get("modified_at")?),
        content_hash: row.try_get("content_hash")?,
        document_type: row.try_get("document_type")?,
        category: row.try_get("category")?,
        language: row.try_get("language")?,
        summary: row.try_get("summary")?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
        extracted_data: serde_json::from_str::<ExtractedData>(&extracted_json).unwrap_or_default(),
        importance: row.try_get("importance")?,
        access_count: row.try_get("access_count")?,
        last_accessed_at: last_accessed_at.map(from_ts),
        created_at: from_ts(row.try_get("created_at")?),
        updated_at: from_ts(row.try_get("updated_at")?),
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let embedding: Option<Vec<u8>> = row.try_get("embedding")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        token_count: row.try_get("token_count")?,
        embedding: embedding.map(|b| blob_to_vec(&b)),
    })
}

fn hit_from_row(row: &SqliteRow) -> Result<ChunkHit> {
    Ok(ChunkHit {
        chunk_id: row.try_get("chunk_id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        content: row.try_get("content")?,
        token_count: row.try_get("token_count")?,
        path: row.try_get("path")?,
        title: row.try_get("title")?,
        document_type: row.try_get("document_type")?,
        category: row.try_get("category")?,
        importance: row.try_get("importance")?,
        access_count: row.try_get("access_count")?,
    })
}

/// Quote each word of a free-text query for FTS5. Words are ANDed, as a
/// plain-text query would be. `None` when the query has no words.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// `"abc" OR "bcd" OR ...` over the query's trigrams, for `chunks_trigram`.
fn trigram_match_expression(query: &str) -> Option<String> {
    let probes = probe_trigrams(query);
    if probes.is_empty() {
        None
    } else {
        Some(
            probes
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}

async fn insert_chunk_with<'e, E>(executor: E, chunk: &Chunk) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO chunks (id, document_id, chunk_index, content, token_count, embedding) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&chunk.id)
    .bind(&chunk.document_id)
    .bind(chunk.chunk_index)
    .bind(&chunk.content)
    .bind(chunk.token_count)
    .bind(chunk.embedding.as_deref().map(vec_to_blob))
    .execute(executor)
    .await
    .with_context(|| format!("Failed to insert chunk {} of {}", chunk.chunk_index, chunk.document_id))?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_document_by_path(&self, path: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE path = ?", DOCUMENT_COLUMNS))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY updated_at DESC, path ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn upsert_document(&self, doc: &Document) -> Result<Document> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, path, title, file_type, file_size, modified_at,
                                   content_hash, document_type, category, language, summary,
                                   keywords_json, extracted_json, importance, access_count,
                                   last_accessed_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                title = excluded.title,
                file_type = excluded.file_type,
                file_size = excluded.file_size,
                modified_at = excluded.modified_at,
                content_hash = excluded.content_hash,
                document_type = excluded.document_type,
                category = excluded.category,
                language = excluded.language,
                summary = excluded.summary,
                keywords_json = excluded.keywords_json,
                extracted_json = excluded.extracted_json,
                importance = excluded.importance,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.path)
        .bind(&doc.title)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(to_ts(doc.modified_at))
        .bind(&doc.content_hash)
        .bind(&doc.document_type)
        .bind(&doc.category)
        .bind(&doc.language)
        .bind(&doc.summary)
        .bind(serde_json::to_string(&doc.keywords)?)
        .bind(serde_json::to_string(&doc.extracted_data)?)
        .bind(doc.importance)
        .bind(doc.access_count)
        .bind(doc.last_accessed_at.map(to_ts))
        .bind(to_ts(doc.created_at))
        .bind(to_ts(doc.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert document {}", doc.path))?;

        self.find_document_by_path(&doc.path)
            .await?
            .ok_or_else(|| anyhow::anyhow!("document vanished after upsert: {}", doc.path))
    }

    async fn delete_document_by_path(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        let result = sqlx::query("DELETE FROM documents").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            insert_chunk_with(&mut *tx, chunk).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        insert_chunk_with(&self.pool, chunk).await
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, token_count, embedding \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let row = sqlx::query(
            "SELECT id, document_id, chunk_index, content, token_count, embedding \
             FROM chunks WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(chunk_from_row).transpose()
    }

    async fn keyword_candidates(
        &self,
        query: &str,
        trigram_floor: f64,
    ) -> Result<Vec<KeywordCandidate>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let fts_expr = fts_match_expression(&needle);
        let mut fts_ranks: HashMap<String, f64> = HashMap::new();
        if let Some(expr) = &fts_expr {
            let rows = sqlx::query(
                r#"
                SELECT c.id AS chunk_id, bm25(chunks_fts) AS bm25_score
                FROM chunks_fts
                JOIN chunks c ON c.rowid = chunks_fts.rowid
                WHERE chunks_fts MATCH ?
                "#,
            )
            .bind(expr)
            .fetch_all(&self.pool)
            .await?;

            for row in &rows {
                let score: f64 = row.try_get("bm25_score")?;
                fts_ranks.insert(row.try_get("chunk_id")?, (-score).max(0.0));
            }
        }

        let trigram_query = TrigramQuery::new(&needle);
        let rows = match (trigram_match_expression(&needle), fts_expr) {
            (Some(trigrams), fts) => {
                let mut sql = format!(
                    "SELECT {} FROM chunks c JOIN documents d ON d.id = c.document_id \
                     WHERE c.rowid IN (SELECT rowid FROM chunks_trigram WHERE chunks_trigram MATCH ?)",
                    HIT_COLUMNS
                );
                if fts.is_some() {
                    sql.push_str(
                        " OR c.rowid IN (SELECT rowid FROM chunks_fts WHERE chunks_fts MATCH ?)",
                    );
                }
                let mut query = sqlx::query(&sql).bind(trigrams);
                if let Some(fts) = fts {
                    query = query.bind(fts);
                }
                query.fetch_all(&self.pool).await?
            }
            // no word long enough to probe with; score everything
            (None, _) => {
                sqlx::query(&format!(
                    "SELECT {} FROM chunks c JOIN documents d ON d.id = c.document_id",
                    HIT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut candidates = Vec::new();
        for row in &rows {
            let hit = hit_from_row(row)?;
            let fts_rank = fts_ranks.get(&hit.chunk_id).copied();
            let substring = hit.content.to_lowercase().contains(&needle);
            let trigram = trigram_query.score(&hit.content);

            if fts_rank.is_some() || substring || trigram >= trigram_floor {
                candidates.push(KeywordCandidate {
                    hit,
                    fts_rank,
                    substring,
                    trigram,
                });
            }
        }

        Ok(candidates)
    }

    async fn vector_candidates(
        &self,
        query_vec: &[f32],
        exclude_chunk: Option<&str>,
    ) -> Result<Vec<VectorCandidate>> {
        let rows = sqlx::query(&format!(
            "SELECT {}, c.embedding FROM chunks c JOIN documents d ON d.id = c.document_id \
             WHERE c.embedding IS NOT NULL",
            HIT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let hit = hit_from_row(row)?;
            if exclude_chunk == Some(hit.chunk_id.as_str()) {
                continue;
            }
            let blob: Vec<u8> = row.try_get("embedding")?;
            let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64;
            candidates.push(VectorCandidate { hit, similarity });
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(candidates)
    }

    async fn record_access(&self, document_ids: &[String], at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in document_ids {
            sqlx::query(
                "UPDATE documents SET access_count = access_count + 1, last_accessed_at = ? \
                 WHERE id = ?",
            )
            .bind(to_ts(at))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn index_stats(&self) -> Result<IndexStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS documents, COALESCE(SUM(file_size), 0) AS total_size FROM documents",
        )
        .fetch_one(&self.pool)
        .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(IndexStats {
            documents: row.try_get("documents")?,
            chunks,
            total_size: row.try_get("total_size")?,
        })
    }

    async fn search_stats(&self) -> Result<SearchStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(AVG(token_count), 0.0) AS avg_tokens FROM chunks",
        )
        .fetch_one(&self.pool)
        .await?;
        let documents_with_embeddings: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT document_id) FROM chunks WHERE embedding IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SearchStats {
            total_chunks: row.try_get("total")?,
            avg_token_count: row.try_get("avg_tokens")?,
            documents_with_embeddings,
        })
    }
}
