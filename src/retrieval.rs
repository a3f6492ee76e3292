//! Hybrid retrieval: a keyword channel and a vector channel, combined.
//!
//! # Keyword channel
//!
//! A chunk matches by full text (FTS5, porter stemming), by case-insensitive
//! substring, or by word-level trigram similarity at or above
//! `retrieval.trigram_floor`. Its score is the best of the three signals:
//!
//! ```text
//! score = max(fts × 1.2, substring ? 0.9 : 0, trigram × 0.8)
//! fts   = r / (1 + r),  r = -bm25
//! ```
//!
//! The top `2 × limit` matches are kept.
//!
//! # Vector channel
//!
//! ```text
//! score = cosine × importance × (1 + min(access_count × 0.01, 0.2))
//! ```
//!
//! Candidates below the threshold are dropped, the rest go through
//! [`diversify`] and are cut to `limit`.
//!
//! # Combination
//!
//! Keyword hits enter first at `score × keyword_boost`. A vector hit for a
//! chunk that is not present yet is added at its own score. A vector hit for
//! a chunk that is already present keeps the entry and adds
//! `hybrid_bonus × vector score` to it:
//!
//! ```text
//! score = max(keyword × keyword_boost, vector) + hybrid_bonus × vector
//! ```
//!
//! The `max` departs from a purely additive bonus. It only matters when the
//! boosted keyword score sits below the vector score, and there it keeps a
//! chunk found by both channels above what either channel gave it alone.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{DiversityConfig, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::models::{ChunkHit, MatchSource, SearchResult, SearchStats};
use crate::store::{KeywordCandidate, Store, VectorCandidate};

const FTS_WEIGHT: f64 = 1.2;
const SUBSTRING_SCORE: f64 = 0.9;
const TRIGRAM_WEIGHT: f64 = 0.8;
const ACCESS_BOOST_PER_HIT: f64 = 0.01;
const ACCESS_BOOST_CAP: f64 = 0.2;

/// Ranked results plus the reason the vector channel was skipped, if it was.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub vector_error: Option<String>,
}

/// Where one numbered passage of a [`RelevantContext`] came from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttribution {
    pub marker: usize,
    pub path: String,
    pub title: String,
    pub chunk_index: i64,
    pub score: f64,
}

/// Numbered passages ready to hand to an answer generator.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelevantContext {
    /// `[1] …`, `[2] …` passages in rank order, separated by blank lines.
    pub context: String,
    pub sources: Vec<SourceAttribution>,
    pub vector_error: Option<String>,
}

/// A chunk and its channel score.
#[derive(Debug, Clone)]
pub struct Scored {
    pub hit: ChunkHit,
    pub score: f64,
}

pub struct Retriever {
    store: Arc<dyn Store>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Run both channels concurrently and combine them.
    ///
    /// A vector-channel failure (typically the query embedding) does not fail
    /// the search; the keyword results come back with `vector_error` set.
    pub async fn search(&self, query: &str, limit: usize, threshold: f64) -> Result<SearchResponse> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(SearchResponse::default());
        }

        let (keyword, vector) = tokio::join!(
            self.keyword_channel(query, limit),
            self.vector_channel(query, limit, threshold)
        );
        let keyword = keyword?;

        let (vector, vector_error) = match vector {
            Ok(hits) => (Some(hits), None),
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(error = %message, "vector channel unavailable; returning keyword results only");
                (None, Some(message))
            }
        };

        debug!(
            keyword_hits = keyword.len(),
            vector_hits = vector.as_ref().map(Vec::len).unwrap_or(0),
            "channels complete"
        );

        let vector_ok = vector.is_some();
        let results = combine(
            keyword,
            vector.unwrap_or_default(),
            limit,
            self.config.keyword_boost,
            self.config.hybrid_bonus,
        );

        if vector_ok {
            self.track_access(&results).await;
        }

        Ok(SearchResponse {
            results,
            vector_error,
        })
    }

    /// [`search`](Self::search) rendered as numbered passages with sources.
    pub async fn get_relevant_context(
        &self,
        query: &str,
        max_chunks: usize,
        threshold: f64,
    ) -> Result<RelevantContext> {
        let response = self.search(query, max_chunks, threshold).await?;

        let context = response
            .results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}", i + 1, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let sources = response
            .results
            .iter()
            .enumerate()
            .map(|(i, r)| SourceAttribution {
                marker: i + 1,
                path: r.path.clone(),
                title: r.title.clone(),
                chunk_index: r.chunk_index,
                score: r.score,
            })
            .collect();

        Ok(RelevantContext {
            context,
            sources,
            vector_error: response.vector_error,
        })
    }

    /// Chunks whose embeddings are closest to an existing chunk's.
    ///
    /// The seed itself is never returned. An unknown seed, or one stored
    /// without an embedding, yields no results.
    pub async fn find_similar_chunks(&self, chunk_id: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let seed = match self.store.get_chunk(chunk_id).await? {
            Some(chunk) => chunk,
            None => return Ok(Vec::new()),
        };
        let embedding = match seed.embedding {
            Some(embedding) => embedding,
            None => return Ok(Vec::new()),
        };

        let candidates = self
            .store
            .vector_candidates(&embedding, Some(chunk_id))
            .await?;
        let ranked = rank_vector(
            candidates,
            limit,
            self.config.similarity_threshold,
            &self.config.diversity,
        );
        Ok(ranked
            .into_iter()
            .map(|s| to_result(s, MatchSource::Vector))
            .collect())
    }

    pub async fn search_stats(&self) -> Result<SearchStats> {
        self.store.search_stats().await
    }

    async fn keyword_channel(&self, query: &str, limit: usize) -> Result<Vec<Scored>> {
        let candidates = self
            .store
            .keyword_candidates(query, self.config.trigram_floor)
            .await?;

        let mut scored: Vec<Scored> = candidates
            .into_iter()
            .map(|c| {
                let score = keyword_score(&c);
                Scored { hit: c.hit, score }
            })
            .collect();
        sort_by_score(&mut scored);
        scored.truncate(limit.saturating_mul(2));
        Ok(scored)
    }

    async fn vector_channel(&self, query: &str, limit: usize, threshold: f64) -> Result<Vec<Scored>> {
        let query_vec = self
            .embedder
            .embed(query)
            .await
            .context("query embedding failed")?;
        let candidates = self.store.vector_candidates(&query_vec, None).await?;
        Ok(rank_vector(candidates, limit, threshold, &self.config.diversity))
    }

    async fn track_access(&self, results: &[SearchResult]) {
        let mut seen = HashSet::new();
        let ids: Vec<String> = results
            .iter()
            .filter(|r| seen.insert(r.document_id.as_str()))
            .map(|r| r.document_id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.store.record_access(&ids, Utc::now()).await {
            warn!(error = %format!("{:#}", e), "failed to record document access");
        }
    }
}

/// `r / (1 + r)` for `r = -bm25`, so full-text rank lands in `[0, 1)`.
pub fn normalize_fts_rank(rank: f64) -> f64 {
    let r = rank.max(0.0);
    r / (1.0 + r)
}

pub fn keyword_score(candidate: &KeywordCandidate) -> f64 {
    let fts = candidate
        .fts_rank
        .map(|r| normalize_fts_rank(r) * FTS_WEIGHT)
        .unwrap_or(0.0);
    let substring = if candidate.substring { SUBSTRING_SCORE } else { 0.0 };
    let trigram = candidate.trigram * TRIGRAM_WEIGHT;
    fts.max(substring).max(trigram)
}

/// Cosine similarity weighted by document importance and past access.
pub fn enhanced_score(similarity: f64, importance: f64, access_count: i64) -> f64 {
    let access_boost = (access_count.max(0) as f64 * ACCESS_BOOST_PER_HIT).min(ACCESS_BOOST_CAP);
    similarity * importance * (1.0 + access_boost)
}

/// Enhance, threshold, diversify and truncate vector candidates.
pub fn rank_vector(
    candidates: Vec<VectorCandidate>,
    limit: usize,
    threshold: f64,
    diversity: &DiversityConfig,
) -> Vec<Scored> {
    let mut scored: Vec<Scored> = candidates
        .into_iter()
        .map(|c| Scored {
            score: enhanced_score(c.similarity, c.hit.importance, c.hit.access_count),
            hit: c.hit,
        })
        .filter(|s| s.score >= threshold)
        .collect();
    sort_by_score(&mut scored);

    let mut diverse = diversify(scored, limit, diversity);
    diverse.truncate(limit);
    diverse
}

/// Admit candidates in score order while their category and document type
/// stay under the caps.
///
/// Caps are `ceil(limit × category_fraction)` and
/// `ceil(limit × type_fraction)`; candidates above the high-importance
/// threshold are measured against the relaxed `high_*` fractions. With fewer
/// than `limit` candidates in total no cap applies.
pub fn diversify(candidates: Vec<Scored>, limit: usize, config: &DiversityConfig) -> Vec<Scored> {
    if candidates.len() < limit {
        return candidates;
    }

    let cap = |fraction: f64| (limit as f64 * fraction).ceil() as usize;
    let category_cap = cap(config.category_fraction);
    let type_cap = cap(config.type_fraction);
    let high_category_cap = cap(config.high_category_fraction);
    let high_type_cap = cap(config.high_type_fraction);

    let mut categories: HashMap<String, usize> = HashMap::new();
    let mut types: HashMap<String, usize> = HashMap::new();
    let mut admitted = Vec::with_capacity(limit);

    for candidate in candidates {
        if admitted.len() >= limit {
            break;
        }

        let high = candidate.hit.importance > config.high_importance_threshold;
        let (max_category, max_type) = if high {
            (high_category_cap, high_type_cap)
        } else {
            (category_cap, type_cap)
        };

        let in_category = categories.get(&candidate.hit.category).copied().unwrap_or(0);
        let of_type = types.get(&candidate.hit.document_type).copied().unwrap_or(0);
        if in_category >= max_category || of_type >= max_type {
            continue;
        }

        *categories.entry(candidate.hit.category.clone()).or_insert(0) += 1;
        *types.entry(candidate.hit.document_type.clone()).or_insert(0) += 1;
        admitted.push(candidate);
    }

    admitted
}

/// Merge the two channels into one ranking of at most `limit` results.
pub fn combine(
    keyword: Vec<Scored>,
    vector: Vec<Scored>,
    limit: usize,
    keyword_boost: f64,
    hybrid_bonus: f64,
) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = Vec::with_capacity(keyword.len() + vector.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for s in keyword {
        if positions.contains_key(&s.hit.chunk_id) {
            continue;
        }
        positions.insert(s.hit.chunk_id.clone(), results.len());
        let boosted = Scored {
            score: s.score * keyword_boost,
            hit: s.hit,
        };
        results.push(to_result(boosted, MatchSource::Keyword));
    }

    for s in vector {
        match positions.get(&s.hit.chunk_id) {
            Some(&i) => {
                let entry = &mut results[i];
                entry.score = entry.score.max(s.score) + hybrid_bonus * s.score;
                entry.source = MatchSource::Both;
            }
            None => {
                positions.insert(s.hit.chunk_id.clone(), results.len());
                results.push(to_result(s, MatchSource::Vector));
            }
        }
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

fn sort_by_score(scored: &mut [Scored]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn to_result(s: Scored, source: MatchSource) -> SearchResult {
    SearchResult {
        chunk_id: s.hit.chunk_id,
        document_id: s.hit.document_id,
        path: s.hit.path,
        title: s.hit.title,
        chunk_index: s.hit.chunk_index,
        content: s.hit.content,
        score: s.score,
        document_type: s.hit.document_type,
        category: s.hit.category,
        importance: s.hit.importance,
        source,
    }
}
