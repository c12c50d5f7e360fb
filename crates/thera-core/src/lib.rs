//! # Thera Core
//!
//! Druggable target discovery: pulls literature, bioactivity and structure
//! evidence for a gene from public biomedical APIs, scores it and ranks
//! targets.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | PubMed/Europe PMC, ChEMBL and RCSB PDB adapters |
//! | [`cache`] | TTL response cache facade over memory or DuckDB storage |
//! | [`collaborators`] | Query parser, disease mapper and summarizer contracts |
//! | [`config`] | Environment-driven configuration |
//! | [`coordinator`] | Concurrent, fault-isolated target analysis |
//! | [`data_source`] | Adapter trait, source errors, fallback strategies |
//! | [`domain`] | Normalized records and reports |
//! | [`error`] | Core error types |
//! | [`fingerprint`] | Deterministic request fingerprints |
//! | [`gateway`] | Cache, throttle and retry around every outbound call |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider_policy`] | Per-host request spacing |
//! | [`retry`] | Backoff policy |
//! | [`scoring`] | Druggability score |
//! | [`telemetry`] | `tracing` subscriber setup |
//! | [`throttling`] | Per-domain rate limiter |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use thera_core::{CoordinatorBuilder, GeneSymbol, PotencyFilters};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     thera_core::telemetry::init_tracing(thera_core::telemetry::DEFAULT_LOG_FILTER);
//!     let coordinator = CoordinatorBuilder::from_env()?.build()?;
//!
//!     let gene = GeneSymbol::parse("EGFR")?;
//!     let report = coordinator
//!         .analyze_target(&gene, PotencyFilters::new(None, Some(100.0))?)
//!         .await;
//!     println!("{}: {:.1}/10", report.gene_symbol, report.target_score);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ OrchestrationCoordinator │
//! └────────────┬─────────────┘
//!              │ tokio::join! per target
//!              ▼
//! ┌──────────────────────────┐     ┌──────────────┐
//! │ Literature / Bioactivity │────▶│   Scoring    │
//! │ / Structure adapters     │     └──────────────┘
//! └────────────┬─────────────┘
//!              ▼
//! ┌──────────────────────────┐     ┌──────────────┐
//! │       HttpGateway        │────▶│  CacheStore  │
//! └────────────┬─────────────┘     └──────────────┘
//!              ▼
//! ┌──────────────────────────┐
//! │ RateLimiter → HttpClient │
//! └──────────────────────────┘
//! ```

pub mod adapters;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod gateway;
pub mod http_client;
pub mod provider_policy;
pub mod retry;
pub mod scoring;
pub mod telemetry;
pub mod throttling;

pub use adapters::{BioactivityAdapter, LiteratureAdapter, StructureAdapter};
pub use cache::{CacheBackend, CacheStats, CacheStore, MemoryCache, PersistentCache, StorageError};
pub use collaborators::{
    DiseaseMapper, ParsedQuery, PlainSummarizer, QueryParser, ReportSummarizer, TargetCandidate,
};
pub use config::TheraConfig;
pub use coordinator::{CoordinatorBuilder, OrchestrationCoordinator, QueryReport, TargetPhase};
pub use data_source::{
    first_found, FetchConstraints, LigandLookup, SourceAdapter, SourceError, SourceErrorKind,
    SourceId, StrategyOutcome,
};
pub use domain::{
    clamp_unit, rank_targets, BioactivityRecord, GeneSymbol, Inhibitor, LiteratureRecord,
    LiteratureSource, MoleculeProfile, MultiTargetReport, NormalizedRecord, PotencyFilters,
    SourceFailure, StructureRecord, TargetReport, UtcDateTime,
};
pub use error::{CoreError, NormalizationError, ValidationError};
pub use fingerprint::RequestFingerprint;
pub use gateway::{GatewayError, GatewayRequest, HttpGateway, ResponseBody};
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};
pub use provider_policy::DomainPolicy;
pub use retry::{Backoff, RetryConfig};
pub use scoring::{score_target, Assessment, ScoreBreakdown};
pub use throttling::{DomainThrottleState, RateLimiter};
