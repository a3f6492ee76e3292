//! # docsift
//!
//! Watched-folder document indexing with hybrid retrieval.
//!
//! Files under a watched directory are parsed (text, markup, PDF, Office),
//! split into overlapping chunks, embedded, classified by document type and
//! category, and stored in SQLite. Queries run a keyword channel (FTS5,
//! substring and trigram similarity) and a vector channel (cosine similarity
//! weighted by document importance and usage) side by side, then combine
//! them under per-category and per-type diversity caps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌───────────┐
//! │   Watcher   │──▶│         Indexer          │──▶│  SQLite   │
//! │ notify/scan │   │ parse·chunk·embed·classify│   │ FTS5+BLOB │
//! └─────────────┘   └──────────────────────────┘   └─────┬─────┘
//!                                                        │
//!                                   ┌────────────────────┘
//!                                   ▼
//!                             ┌───────────┐       ┌─────────┐
//!                             │ Retriever │──────▶│   CLI   │
//!                             │ kw ∥ vec  │       │(docsift)│
//!                             └───────────┘       └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docsift init                        # create database
//! docsift scan ./documents            # index a directory
//! docsift search "phone bill march"   # hybrid search
//! docsift watch                       # keep the index live
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parser`] | Fingerprinting and text extraction |
//! | [`chunk`] | Overlapping text chunking |
//! | [`classify`] | Document type, category, language and importance |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`fuzzy`] | Trigram similarity |
//! | [`store`] | Persistence trait and SQLite implementation |
//! | [`indexer`] | Indexing orchestration |
//! | [`scanner`] | Path filtering and directory walks |
//! | [`watcher`] | Live filesystem watching |
//! | [`retrieval`] | Hybrid search |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fuzzy;
pub mod get;
pub mod indexer;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod retrieval;
pub mod scanner;
pub mod stats;
pub mod store;
pub mod watcher;
