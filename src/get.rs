//! Document lookup by ID for the `docsift get` and `docsift docs` commands.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::indexer::Indexer;
use crate::models::Document;

/// Print one document, its classification and every chunk in order.
pub async fn run_get(indexer: &Indexer, id: &str) -> Result<()> {
    let ctx = indexer.get_document_context(id).await?;
    let doc = &ctx.document;

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("title:         {}", doc.title);
    println!("path:          {}", doc.path);
    println!("file_type:     {}", doc.file_type);
    println!("size:          {} bytes", doc.file_size);
    println!("modified_at:   {}", format_ts_iso(&doc.modified_at));
    println!("document_type: {}", doc.document_type);
    println!("category:      {}", doc.category);
    println!("language:      {}", doc.language);
    println!("importance:    {:.3}", doc.importance);
    println!("access_count:  {}", doc.access_count);
    if let Some(ts) = &doc.last_accessed_at {
        println!("last_accessed: {}", format_ts_iso(ts));
    }
    if !doc.keywords.is_empty() {
        println!("keywords:      {}", doc.keywords.join(", "));
    }
    for (field, values) in &doc.extracted_data {
        println!("{:<14} {}", format!("{}:", field), values.join(", "));
    }
    println!();

    println!("--- Summary ---");
    println!("{}", doc.summary);
    println!();

    println!("--- Chunks ({}) ---", ctx.chunks.len());
    for chunk in &ctx.chunks {
        let embedded = if chunk.embedding.is_some() { "" } else { ", no embedding" };
        println!(
            "[chunk {} · {} · {} tokens{}]",
            chunk.chunk_index, chunk.id, chunk.token_count, embedded
        );
        println!("{}", chunk.content);
        println!();
    }

    Ok(())
}

/// Print every indexed document, most recently updated first.
pub async fn run_docs(indexer: &Indexer) -> Result<()> {
    let docs = indexer.get_documents().await?;
    if docs.is_empty() {
        println!("No documents indexed.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12} {:<18} {:>6}  {}",
        "ID", "TYPE", "CATEGORY", "IMPORT", "PATH"
    );
    for doc in &docs {
        print_row(doc);
    }
    println!();
    println!("{} document(s)", docs.len());
    Ok(())
}

fn print_row(doc: &Document) {
    println!(
        "{:<36}  {:<12} {:<18} {:>6.3}  {}",
        doc.id, doc.document_type, doc.category, doc.importance, doc.path
    );
}

pub(crate) fn format_ts_iso(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
