//! Courtline Core - upcoming-match acquisition and reconciliation.
//!
//! This crate provides:
//! - Pluggable page renderers (rendering proxy, headless browser fallback)
//! - Multi-strategy fetch orchestration with retries and egress rotation
//! - Dual-path extraction (embedded JSON payload and rendered cards)
//! - Fuzzy-key deduplication across fetch passes and extraction paths
//! - Identity resolution against a reference ratings dataset
//! - Replace-set publishing to a table store
//! - Circuit breaker for metered rendering backends

pub mod circuit_breaker;
pub mod config;
pub mod dedup;
pub mod extract;
pub mod fetch;
pub mod matching;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod retry;
pub mod store;
pub mod types;

pub use config::PipelineConfig;
pub use dedup::{reconcile, DedupKey, Reconciler};
pub use extract::{Extraction, Extractor};
pub use fetch::{AggressivenessProfile, FallbackPolicy, FetchFailure, FetchOrchestrator};
pub use matching::{resolve, IdentityResolver, Resolution};
pub use pipeline::{Pipeline, RunExit, RunReport, Stage};
pub use publish::{PublishFilter, PublishReport, Publisher};
pub use render::{Renderer, RenderRequest, RenderResponse};
pub use store::TableStore;
pub use types::*;
