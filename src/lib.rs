//! Mnemo - Retrieval and RAG engine
//!
//! Manages embedded document collections behind pluggable embedding and
//! vector-storage backends, executes multiple retrieval strategies with
//! reranking, diversification, and a bounded result cache, and answers
//! questions over a collection with generation or extractive fallback.

pub mod backend;
pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod rag;
pub mod retrieval;
pub mod store;

pub use document::{Document, Metadata, MetadataValue, SearchResult};
pub use error::{MnemoError, Result};
