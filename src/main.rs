//! # docsift CLI
//!
//! The `docsift` binary indexes a directory of documents and answers hybrid
//! searches against the index.
//!
//! ## Usage
//!
//! ```bash
//! docsift --config ./config/docsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsift init` | Create the SQLite database and run schema migrations |
//! | `docsift index <path>` | Index (or re-index) one file |
//! | `docsift remove <path>` | Remove one file from the index |
//! | `docsift scan [path]` | Index every supported file under a directory |
//! | `docsift watch` | Scan the watched root, then follow changes |
//! | `docsift search "<query>"` | Hybrid search |
//! | `docsift context "<query>"` | Numbered passages with sources |
//! | `docsift similar <chunk-id>` | Chunks similar to an indexed chunk |
//! | `docsift get <id>` | Show a document and its chunks |
//! | `docsift docs` | List indexed documents |
//! | `docsift stats` | Index statistics |
//! | `docsift reindex` | Clear the index and rescan the watched root |
//! | `docsift clear` | Clear the index |
//! | `docsift health` | Check the database and embedding backend |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docsift::config::{self, Config};
use docsift::embedding::{create_provider, EmbeddingProvider};
use docsift::indexer::Indexer;
use docsift::retrieval::Retriever;
use docsift::store::{SqliteStore, Store};
use docsift::watcher::Watcher;
use docsift::{get, migrate, stats};

/// docsift: watched-folder document indexing with hybrid retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/docsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "docsift",
    about = "Watched-folder document indexing with hybrid, importance- and diversity-aware retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it again leaves existing data in place.
    Init,

    /// Index (or re-index) a single file.
    ///
    /// Unchanged files are detected by content hash and skipped.
    Index {
        /// File to index.
        path: PathBuf,
    },

    /// Remove a file from the index.
    Remove {
        /// Path of the indexed file. It does not have to exist any more.
        path: PathBuf,
    },

    /// Index every supported file under a directory.
    ///
    /// Defaults to `[watch].root`. A file that fails is logged and skipped.
    Scan {
        /// Directory to scan.
        path: Option<PathBuf>,
    },

    /// Scan the watched root, then index changes as they happen.
    Watch,

    /// Hybrid keyword + vector search.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum enhanced vector score for a vector-channel hit.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Search and print the hits as numbered passages with their sources.
    Context {
        /// The search query string.
        query: String,

        /// Maximum number of passages.
        #[arg(long)]
        max_chunks: Option<usize>,

        /// Minimum enhanced vector score for a vector-channel hit.
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Find chunks similar to an indexed chunk.
    Similar {
        /// Chunk UUID.
        chunk_id: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show a document, its classification and its chunks.
    Get {
        /// Document UUID.
        id: String,
    },

    /// List indexed documents.
    Docs,

    /// Show index statistics.
    Stats,

    /// Delete everything, then rescan the watched root.
    Reindex,

    /// Delete every document and chunk.
    Clear,

    /// Check the database and the embedding backend.
    Health,
}

struct Services {
    indexer: Indexer,
    retriever: Retriever,
    embedder: Arc<dyn EmbeddingProvider>,
}

async fn services(cfg: &Config) -> Result<Services> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(cfg).await?);
    let embedder = create_provider(&cfg.embedding)?;
    let query_embedder = create_provider(&cfg.embedding.for_queries())?;
    Ok(Services {
        indexer: Indexer::from_config(cfg, store.clone(), embedder.clone()),
        retriever: Retriever::new(store, query_embedder, cfg.retrieval.clone()),
        embedder,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docsift=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let svc = services(&cfg).await?;
    let limit_or_default = |limit: Option<usize>| limit.unwrap_or(cfg.retrieval.default_limit);
    let threshold_or_default =
        |threshold: Option<f64>| threshold.unwrap_or(cfg.retrieval.similarity_threshold);

    match cli.command {
        Commands::Init => {}
        Commands::Index { path } => {
            let outcome = svc.indexer.index_file(&path).await?;
            let doc = outcome.document();
            println!(
                "{}: {} ({}, {}, importance {:.3})",
                outcome.label(),
                doc.path,
                doc.id,
                doc.document_type,
                doc.importance
            );
        }
        Commands::Remove { path } => {
            if svc.indexer.remove_file(&path).await? {
                println!("Removed {}", path.display());
            } else {
                println!("Not indexed: {}", path.display());
            }
        }
        Commands::Scan { path } => {
            let root = match path {
                Some(p) => p,
                None => svc.indexer.watch_root()?,
            };
            let report = svc.indexer.scan_directory(&root).await?;
            print_report(&report);
        }
        Commands::Watch => {
            let Some(watch) = cfg.watch.as_ref() else {
                bail!("No watched root configured. Add a [watch] section with a root.");
            };
            let report = svc.indexer.scan_directory(&watch.root).await?;
            print_report(&report);

            let watcher = Watcher::from_config(watch, svc.indexer.clone())?;
            let root = watcher.root().to_path_buf();
            let Some(handle) = watcher.spawn() else {
                bail!("Could not watch {}; see the log for details.", root.display());
            };
            println!("Watching {} (Ctrl-C to stop)", root.display());

            tokio::select! {
                _ = tokio::signal::ctrl_c() => println!("Stopped."),
                res = handle.join() => res?,
            }
        }
        Commands::Search {
            query,
            limit,
            threshold,
        } => {
            let response = svc
                .retriever
                .search(&query, limit_or_default(limit), threshold_or_default(threshold))
                .await?;
            if let Some(err) = &response.vector_error {
                eprintln!("Note: keyword results only ({})", err);
            }
            if response.results.is_empty() {
                println!("No results.");
            }
            for (i, r) in response.results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (chunk {}, {:?}, {} / {})",
                    i + 1,
                    r.score,
                    r.title,
                    r.chunk_index,
                    r.source,
                    r.document_type,
                    r.category
                );
                println!("    path: {}", r.path);
                println!("    id:   {}", r.document_id);
                println!("    > {}", snippet(&r.content, 200));
                println!();
            }
        }
        Commands::Context {
            query,
            max_chunks,
            threshold,
        } => {
            let ctx = svc
                .retriever
                .get_relevant_context(
                    &query,
                    limit_or_default(max_chunks),
                    threshold_or_default(threshold),
                )
                .await?;
            if let Some(err) = &ctx.vector_error {
                eprintln!("Note: keyword results only ({})", err);
            }
            if ctx.sources.is_empty() {
                println!("No relevant context.");
            } else {
                println!("{}", ctx.context);
                println!();
                println!("Sources:");
                for s in &ctx.sources {
                    println!(
                        "  [{}] {} ({}, chunk {}, score {:.3})",
                        s.marker, s.title, s.path, s.chunk_index, s.score
                    );
                }
            }
        }
        Commands::Similar { chunk_id, limit } => {
            let results = svc
                .retriever
                .find_similar_chunks(&chunk_id, limit_or_default(limit))
                .await?;
            if results.is_empty() {
                println!("No similar chunks.");
            }
            for (i, r) in results.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} (chunk {}) {}",
                    i + 1,
                    r.score,
                    r.title,
                    r.chunk_index,
                    r.chunk_id
                );
                println!("    > {}", snippet(&r.content, 200));
            }
        }
        Commands::Get { id } => {
            get::run_get(&svc.indexer, &id).await?;
        }
        Commands::Docs => {
            get::run_docs(&svc.indexer).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg, &svc.indexer, &svc.retriever).await?;
        }
        Commands::Reindex => {
            let report = svc.indexer.reindex_all().await?;
            print_report(&report);
        }
        Commands::Clear => {
            let removed = svc.indexer.clear_all().await?;
            println!("Cleared {} document(s).", removed);
        }
        Commands::Health => {
            let index = svc.indexer.stats().await?;
            println!("database:  ok ({} documents)", index.documents);
            if !cfg.embedding.is_enabled() {
                println!("embedding: disabled (keyword search only)");
            } else if svc.embedder.health_check().await {
                println!(
                    "embedding: ok ({}, {} dims)",
                    svc.embedder.model_name(),
                    svc.embedder.dimensions()
                );
            } else {
                bail!(
                    "embedding backend '{}' is not healthy",
                    cfg.embedding.provider
                );
            }
        }
    }

    Ok(())
}

fn print_report(report: &docsift::indexer::ScanReport) {
    println!(
        "Scanned {} file(s): {} new, {} changed, {} unchanged, {} failed",
        report.seen, report.new, report.changed, report.unchanged, report.failed
    );
}

/// First `max` characters of `text` on one line.
fn snippet(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{}…", cut)
    }
}
