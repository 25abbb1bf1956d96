//! # Azure Search sync connector
//!
//! A connector that keeps an Azure Search index synchronized with a content
//! source: documents are batched through the bulk index endpoint, attached
//! files are extracted (via Apache Tika) and reconciled against what the
//! index already holds, and queries are built in the service's OData dialect
//! with post-processed highlighting and per-result access checks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ ContentItems │──▶│ SearchEngine │──▶│ Azure Search  │
//! │ (source)     │   │ batch+query  │   │ REST API      │
//! └──────────────┘   └──────┬───────┘   └───────────────┘
//!                           │
//!                    ┌──────┴───────┐
//!                    │  Tika server │
//!                    │ (file text)  │
//!                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`transport`] | HTTP transport abstraction and test double |
//! | [`document`] | Document model, field catalogue, index schema |
//! | [`query`] | Search request construction (OData filter dialect) |
//! | [`batch`] | Batch upload engine for the bulk index endpoint |
//! | [`results`] | Result post-processing: highlights and access checks |
//! | [`extract`] | File text extraction via Apache Tika |
//! | [`engine`] | Orchestration: indexing runs, reconciliation, queries |

pub mod batch;
pub mod config;
pub mod document;
pub mod engine;
pub mod extract;
pub mod query;
pub mod results;
pub mod transport;
