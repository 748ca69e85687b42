//! # archivist
//!
//! A local-first document indexing and unified search service.
//!
//! archivist walks a set of local roots, fingerprints and chunks the
//! documents it finds, embeds the chunks through a provider, and upserts
//! them into a vector store. Queries embed once and retrieve by similarity;
//! unified search blends those local hits with live web results under a
//! selectable fusion strategy. Every operation is recorded to a SQLite
//! audit log.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │  Roots   │──▶│   Indexing pipeline      │──▶│ Vector store │
//! │ (files)  │   │ scan→diff→chunk→embed    │   │  + SQLite    │
//! └──────────┘   │ →upsert→commit           │   └──────┬───────┘
//!                └──────────────────────────┘          │
//!                                                      ▼
//!                ┌─────────────┐   ┌────────┐   ┌─────────────┐
//!                │ Web engines │──▶│ Fusion │◀──│    Query    │
//!                │ exa/serper  │   │ engine │   │   pipeline  │
//!                └─────────────┘   └────────┘   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scan`] | File discovery and fingerprinting |
//! | [`extract`] | Multi-format text extraction |
//! | [`chunker`] | Overlapping character-window chunking |
//! | [`diff`] | Change detection |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vectorstore`] | Vector store abstraction |
//! | [`db`] | Fingerprint table and audit log |
//! | [`index`] | The six-stage indexing pipeline |
//! | [`query`] | The query pipeline |
//! | [`fusion`] | Local/web result fusion |
//! | [`websearch`] | Web search engines with fallback |
//! | [`unified`] | Unified search orchestration |

pub mod chunker;
pub mod config;
pub mod db;
pub mod diff;
pub mod embedding;
pub mod extract;
pub mod fusion;
pub mod index;
pub mod models;
pub mod query;
pub mod scan;
pub mod unified;
pub mod vectorstore;
pub mod websearch;
