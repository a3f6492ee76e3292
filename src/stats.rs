//! Index statistics.
//!
//! A quick summary of what is indexed: document and chunk counts, embedding
//! coverage and a per-category breakdown. Used by `docsift stats` to confirm
//! that scans and embeddings are doing what they should.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::indexer::Indexer;
use crate::retrieval::Retriever;

/// Per-category breakdown of documents.
#[derive(Debug, Default, PartialEq)]
struct CategoryStats {
    documents: usize,
    bytes: i64,
    importance_sum: f64,
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config, indexer: &Indexer, retriever: &Retriever) -> Result<()> {
    let index = indexer.stats().await?;
    let search = retriever.search_stats().await?;
    let docs = indexer.get_documents().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docsift: index stats");
    println!("====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {} ({})", index.documents, format_bytes(index.total_size.max(0) as u64));
    println!("  Chunks:      {}", index.chunks);
    println!("  Avg tokens:  {:.1}", search.avg_token_count);
    println!(
        "  Embedded:    {} / {} documents ({}%)",
        search.documents_with_embeddings,
        index.documents,
        if index.documents > 0 {
            (search.documents_with_embeddings * 100) / index.documents
        } else {
            0
        }
    );
    println!("  Embeddings:  {}", config.embedding.provider);

    let mut by_category: BTreeMap<&str, CategoryStats> = BTreeMap::new();
    for doc in &docs {
        let entry = by_category.entry(doc.category.as_str()).or_default();
        entry.documents += 1;
        entry.bytes += doc.file_size;
        entry.importance_sum += doc.importance;
    }

    if !by_category.is_empty() {
        println!();
        println!("  By category:");
        println!(
            "  {:<24} {:>6} {:>10} {:>10}",
            "CATEGORY", "DOCS", "SIZE", "AVG IMP"
        );
        println!("  {}", "-".repeat(54));

        for (category, s) in &by_category {
            println!(
                "  {:<24} {:>6} {:>10} {:>10.3}",
                category,
                s.documents,
                format_bytes(s.bytes.max(0) as u64),
                s.importance_sum / s.documents as f64
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
