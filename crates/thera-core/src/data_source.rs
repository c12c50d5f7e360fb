//! Source adapter contract and shared error type.
//!
//! Each upstream family (literature, bioactivity, structure) is one
//! [`SourceAdapter`]. Adapters express their fallbacks as an ordered list of
//! strategies run through [`first_found`].
//!
//! | Source | Record | Upstreams |
//! |--------|--------|-----------|
//! | [`SourceId::Literature`] | [`LiteratureRecord`](crate::LiteratureRecord) | PubMed, Europe PMC |
//! | [`SourceId::Bioactivity`] | [`Inhibitor`](crate::Inhibitor) | ChEMBL |
//! | [`SourceId::Structure`] | [`StructureRecord`](crate::StructureRecord) | RCSB PDB |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gateway::GatewayError;
use crate::{GeneSymbol, PotencyFilters};

/// Stable identifier of a source adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Literature,
    Bioactivity,
    Structure,
}

impl SourceId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Literature => "literature",
            Self::Bioactivity => "bioactivity",
            Self::Structure => "structure",
        }
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    Upstream,
    Cancelled,
    InvalidRequest,
    Internal,
}

/// Structured source error recorded in reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Upstream,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Cancelled,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, SourceErrorKind::Cancelled)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Cancelled => "source.cancelled",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<GatewayError> for SourceError {
    fn from(error: GatewayError) -> Self {
        let message = error.to_string();
        match error {
            GatewayError::Network { .. } => Self::unavailable(message),
            GatewayError::Upstream { .. } | GatewayError::Decode { .. } => Self::upstream(message),
            GatewayError::Cancelled => Self::cancelled(message),
            GatewayError::InvalidRequest(_) => Self::invalid_request(message),
        }
    }
}

/// Per-call constraints passed to every adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FetchConstraints {
    pub filters: PotencyFilters,
}

impl FetchConstraints {
    pub const fn new(filters: PotencyFilters) -> Self {
        Self { filters }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; the coordinator shares them across
/// concurrently analysed targets.
pub trait SourceAdapter: Send + Sync {
    type Record: Send;

    fn id(&self) -> SourceId;

    /// Fetch normalized records for `gene`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when every fallback strategy failed or the
    /// request was cancelled. Finding nothing is `Ok(vec![])`.
    fn fetch<'a>(
        &'a self,
        gene: &'a GeneSymbol,
        constraints: &'a FetchConstraints,
    ) -> SourceFuture<'a, Vec<Self::Record>>;
}

/// Lookup of PDB entries containing a given small molecule.
pub trait LigandLookup: Send + Sync {
    fn ligand_structures<'a>(&'a self, molecule_id: &'a str) -> SourceFuture<'a, Vec<String>>;
}

/// Result of one fallback strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome<T> {
    Found(Vec<T>),
    NoData,
}

impl<T> StrategyOutcome<T> {
    pub fn from_records(records: Vec<T>) -> Self {
        if records.is_empty() {
            Self::NoData
        } else {
            Self::Found(records)
        }
    }
}

/// Run `strategies` in order; the first non-empty result wins.
///
/// Failed strategies are logged and skipped. If every strategy failed the
/// source is unavailable; if at least one completed without data the result
/// is empty. Cancellation stops the chain immediately.
pub async fn first_found<S, T, F, Fut>(
    source: SourceId,
    strategies: &[S],
    mut run: F,
) -> Result<Vec<T>, SourceError>
where
    S: Copy + std::fmt::Debug,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<StrategyOutcome<T>, SourceError>>,
{
    let mut failures = Vec::new();

    for &strategy in strategies {
        match run(strategy).await {
            Ok(StrategyOutcome::Found(records)) => return Ok(records),
            Ok(StrategyOutcome::NoData) => {}
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                warn!(%source, ?strategy, %error, "fallback strategy failed");
                failures.push(format!("{strategy:?}: {}", error.message()));
            }
        }
    }

    if !strategies.is_empty() && failures.len() == strategies.len() {
        return Err(SourceError::unavailable(format!(
            "all {source} strategies failed: {}",
            failures.join("; ")
        )));
    }
    Ok(Vec::new())
}
