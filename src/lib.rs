//! ESI Fragment Core
//!
//! The tag-processing core of an Edge-Side Includes reverse proxy.
//! Upstream origins emit HTML containing `<esi:include …/>` placeholders;
//! this crate finds them in the byte stream, parses them into typed
//! entities, and fetches the referenced micro-services in parallel so a
//! downstream splicer can substitute the payloads by byte offset.
//!
//! # Overview
//!
//! Processing one page is two calls:
//!
//! 1. [`QueryEngine::parse`] (or the free [`parse`]) scans the HTML
//!    stream and returns [`Entities`]: every `<esi:include …/>` with its
//!    exact `[start, end)` byte range and typed attributes (resources,
//!    timeout, ttl, onerror, header allowlists, key, condition).
//! 2. [`QueryEngine::query`] fetches all entities concurrently under the
//!    request's cancellation scope and per-tag timeouts, returning the
//!    completed [`Tag`]s keyed by their original offsets.
//!
//! # Architecture
//!
//! - [`scanner`]: streaming `<esi:` … `/>` locator with chunk-boundary
//!   carry-over and NUL tolerance
//! - [`attribute`]: quote-aware attribute tokenizer
//! - [`entity`]: the `Tag` / `Resource` / `Entity` data model and builder
//! - [`template`]: `{{…}}` compilation for URLs, keys, and conditions
//! - [`fetch`]: pooled HTTP client and the key-value backend capability
//! - [`query`]: task-per-entity fan-out, failover, onerror fallback
//! - [`config`], [`error`], [`metrics`], [`bufpool`]: the surrounding kit
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use esi_fragment::{EsiConfig, PageRequest, QueryEngine};
//! use std::sync::Arc;
//!
//! # async fn run(html: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = QueryEngine::new(Arc::new(EsiConfig::default()));
//! let entities = engine.parse(html)?;
//!
//! let request = PageRequest::get("http://shop.example/checkout")?;
//! let mut tags = engine.query(entities, &request).await?;
//!
//! // tags arrive in completion order; splice in stream order
//! tags.sort_by_key(|t| t.start);
//! # Ok(())
//! # }
//! ```
//!
//! Parse errors mean the page should be passed through unmodified; fetch
//! errors cancel the page's remaining fetches, because a document with a
//! hole cannot be spliced safely.

pub mod attribute;
pub mod bufpool;
pub mod config;
pub mod duration;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod query;
pub mod scanner;
pub mod template;

// Re-export commonly used types
pub use config::EsiConfig;
pub use entity::{Entities, Entity, Resource, Tag};
pub use error::{EsiError, Result};
pub use fetch::{HttpFetcher, KvBackend, PageRequest};
pub use metrics::{EsiMetrics, MetricsSnapshot};
pub use query::QueryEngine;
pub use scanner::{parse, scan, RawTag, TagFinder};
pub use template::{Condition, Template, TEMPLATE_MARKER};
