//! Incremental indexing of source trees into an external vector store.
//!
//! The crate discovers projects under a root directory, extracts semantic
//! chunks (code units, type definitions, document paragraphs, conversation
//! memories), and mirrors them into per-kind collections in a Weaviate-style
//! store. A watch daemon keeps the mirror current with debounced re-indexing,
//! a migrator reconciles schema drift without data loss, and search results
//! pass through a gap-based cutoff instead of a fixed score threshold.
//!
//! Module map:
//! - [`registry`]: one-level project discovery and the persisted manifest
//! - [`extract`]: file to records (code heuristics, paragraph chunking)
//! - [`store`]: the [`store::VectorIndex`] seam plus Weaviate and in-memory
//!   implementations
//! - [`pipeline`]: clear-then-insert ingestion with batched flushes
//! - [`daemon`]: filesystem watching, debouncing, pid-file lifecycle
//! - [`migrate`]: export/recreate/re-import schema reconciliation
//! - [`ranker`]: gap-based result cutoff

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod extract;
pub mod glob_utils;
pub mod migrate;
pub mod paths;
pub mod pipeline;
pub mod ranker;
pub mod registry;
pub mod store;
pub mod types;

pub use error::IndexerError;
