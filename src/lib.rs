//! # kb-search
//!
//! Multi-source retrieval and rerank pipeline for a knowledge-base chat
//! backend: concurrent keyword fan-out over an enterprise search index and a
//! wiki connector, hybrid lexical+vector scoring through a cached embedding
//! index, and cross-source combination into prompt-ready passages.
//!
//! ## Architecture
//!
//! ```text
//!                        ┌──────────────┐
//!                        │  User Query   │
//!                        └──────┬───────┘
//!                               │
//!                  ┌────────────┴────────────┐
//!                  ▼                         ▼
//!         ┌────────────────┐       ┌─────────────────┐
//!         │ Keyword Index   │       │ Wiki Connector  │
//!         │ Pipeline        │       │ Pipeline        │
//!         └───────┬────────┘       └────────┬────────┘
//!                 │ LLM keywords (≤2)        │ LLM keywords (≤2)
//!                 │ concurrent fan-out       │ concurrent fan-out
//!                 │ dedup (url, title)       │ dedup + content fetch
//!                 ▼                          ▼
//!         ┌─────────────────────────────────────────┐
//!         │   Vector Index (shared)                  │
//!         │   cache → embed → pending → flush       │
//!         │   cosine scores per candidate            │
//!         └───────┬─────────────────────┬───────────┘
//!                 │ 0.3·lex + 0.7·vec    │
//!                 ▼                      ▼
//!         ┌────────────────┐   ┌─────────────────┐
//!         │ Ranked (index)  │   │ Ranked (wiki)   │
//!         └───────┬────────┘   └────────┬────────┘
//!                 └───────────┬─────────┘
//!                             ▼
//!               ┌───────────────────────────┐
//!               │ Dual Combiner             │
//!               │ min-max normalize, boost  │
//!               │ imbalance → equal-rep     │
//!               └───────────┬───────────────┘
//!                           ▼
//!               ┌───────────────────────────┐
//!               │ Passages + Trace          │
//!               └───────────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for sources, LLM, and ranking
//! - [`models`] - Shared data types: `SearchResult`, `RankedResult`, request/response types
//! - [`llm`] - Embedding provider trait and LLM keyword generation
//! - [`sources`] - Source adapters (keyword index, wiki connector) and content enrichment
//! - [`vector`] - Embedding cache and batched vector index with disk persistence
//! - [`ranking`] - Single-source scoring and the dual-source combiner
//! - [`pipeline`] - Per-source retrieval pipeline with progressive short-circuit
//! - [`orchestrator`] - Strategy selection, profiles, passage formatting, trace
//! - [`retry`] - Bounded exponential backoff for external calls

pub mod config;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod ranking;
pub mod retry;
pub mod sources;
pub mod vector;
