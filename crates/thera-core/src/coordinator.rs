//! Per-target and multi-target orchestration.
//!
//! Each target runs `Pending -> Fetching -> CrossValidating -> Scored -> Done`.
//! The three sources are fetched concurrently and a failing source only
//! empties its own section of the report. Several targets run concurrently and
//! are ranked by score afterwards.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{BioactivityAdapter, LiteratureAdapter, StructureAdapter};
use crate::cache::CacheStore;
use crate::collaborators::{DiseaseMapper, ParsedQuery, PlainSummarizer, ReportSummarizer};
use crate::config::TheraConfig;
use crate::data_source::{FetchConstraints, LigandLookup, SourceAdapter, SourceError, SourceId};
use crate::gateway::HttpGateway;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::retry::RetryConfig;
use crate::scoring::{score_target, Assessment};
use crate::throttling::RateLimiter;
use crate::{
    rank_targets, CoreError, GeneSymbol, Inhibitor, LiteratureRecord, MultiTargetReport,
    PotencyFilters, SourceFailure, StructureRecord, TargetReport, UtcDateTime, ValidationError,
};

/// Inhibitor molecules checked for ligand-bound structures per target.
pub const MAX_CROSS_VALIDATED_MOLECULES: usize = 10;

pub type LiteratureSourceRef = Arc<dyn SourceAdapter<Record = LiteratureRecord>>;
pub type BioactivitySourceRef = Arc<dyn SourceAdapter<Record = Inhibitor>>;
pub type StructureSourceRef = Arc<dyn SourceAdapter<Record = StructureRecord>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPhase {
    Pending,
    Fetching,
    CrossValidating,
    Scored,
    Done,
}

impl TargetPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::CrossValidating => "cross_validating",
            Self::Scored => "scored",
            Self::Done => "done",
        }
    }
}

impl Display for TargetPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`OrchestrationCoordinator::analyze_query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "report", rename_all = "snake_case")]
pub enum QueryReport {
    Single(Box<TargetReport>),
    Multiple(MultiTargetReport),
}

/// Fans analyses out across sources and targets.
#[derive(Clone)]
pub struct OrchestrationCoordinator {
    literature: LiteratureSourceRef,
    bioactivity: BioactivitySourceRef,
    structure: StructureSourceRef,
    ligands: Option<Arc<dyn LigandLookup>>,
    summarizer: Arc<dyn ReportSummarizer>,
    disease_mapper: Option<Arc<dyn DiseaseMapper>>,
    deadline: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for OrchestrationCoordinator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCoordinator")
            .field("cross_validation", &self.ligands.is_some())
            .field("disease_mapper", &self.disease_mapper.is_some())
            .field("deadline", &self.deadline)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl OrchestrationCoordinator {
    pub fn new(
        literature: LiteratureSourceRef,
        bioactivity: BioactivitySourceRef,
        structure: StructureSourceRef,
    ) -> Self {
        Self {
            literature,
            bioactivity,
            structure,
            ligands: None,
            summarizer: Arc::new(PlainSummarizer),
            disease_mapper: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::new()
    }

    pub fn with_ligand_lookup(mut self, ligands: Arc<dyn LigandLookup>) -> Self {
        self.ligands = Some(ligands);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ReportSummarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_disease_mapper(mut self, mapper: Arc<dyn DiseaseMapper>) -> Self {
        self.disease_mapper = Some(mapper);
        self
    }

    /// Overall time budget of one analysis call; late sources count as failed.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts every in-flight analysis when cancelled.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Analyse one gene. Source failures are recorded in the report, never returned.
    pub async fn analyze_target(&self, gene: &GeneSymbol, filters: PotencyFilters) -> TargetReport {
        self.analyze_target_until(gene, filters, self.deadline_instant())
            .await
    }

    /// Analyse several genes concurrently and rank them by descending score.
    ///
    /// Equal scores keep the order of `genes`.
    pub async fn analyze_multiple_targets(
        &self,
        genes: &[GeneSymbol],
        filters: PotencyFilters,
    ) -> MultiTargetReport {
        let deadline = self.deadline_instant();
        info!(targets = genes.len(), "starting multi-target analysis");

        let reports = join_all(
            genes
                .iter()
                .map(|gene| self.analyze_target_until(gene, filters, deadline)),
        )
        .await;
        let targets = rank_targets(reports);

        let summary_text = match self.summarizer.summarize_targets(&targets).await {
            Ok(text) => text,
            Err(error) => {
                warn!(%error, "summarizer failed, using plain summary");
                PlainSummarizer::multi_target_summary(&targets)
            }
        };

        MultiTargetReport {
            targets,
            summary_text,
            filters,
            timestamp: UtcDateTime::now(),
        }
    }

    /// Run a query produced by a [`QueryParser`](crate::collaborators::QueryParser).
    ///
    /// Disease queries are expanded through the configured [`DiseaseMapper`].
    /// One resulting gene yields a single report, several a ranked report.
    pub async fn analyze_query(&self, query: &ParsedQuery) -> Result<QueryReport, CoreError> {
        let filters = query.filters()?;
        let mut genes = query.gene_symbols.clone();

        if query.is_disease_query {
            let mapper = self
                .disease_mapper
                .as_ref()
                .ok_or(ValidationError::MissingDiseaseMapper)?;
            let disease = query
                .disease_name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .ok_or(ValidationError::EmptyQuery)?;
            let candidates = mapper.map_disease(disease).await?;
            info!(disease, candidates = candidates.len(), "disease mapped to targets");
            genes.extend(candidates.into_iter().map(|candidate| candidate.gene_symbol));
        }

        let mut seen = std::collections::HashSet::new();
        genes.retain(|gene| seen.insert(gene.clone()));

        match genes.as_slice() {
            [] => Err(ValidationError::EmptyQuery.into()),
            [gene] => Ok(QueryReport::Single(Box::new(
                self.analyze_target(gene, filters).await,
            ))),
            _ => Ok(QueryReport::Multiple(
                self.analyze_multiple_targets(&genes, filters).await,
            )),
        }
    }

    fn deadline_instant(&self) -> Option<Instant> {
        self.deadline.map(|budget| Instant::now() + budget)
    }

    #[instrument(skip(self, gene, filters, deadline), fields(gene = %gene))]
    async fn analyze_target_until(
        &self,
        gene: &GeneSymbol,
        filters: PotencyFilters,
        deadline: Option<Instant>,
    ) -> TargetReport {
        log_phase(gene, TargetPhase::Pending);
        let constraints = FetchConstraints::new(filters);

        log_phase(gene, TargetPhase::Fetching);
        let (literature, inhibitors, structures) = tokio::join!(
            self.bounded(SourceId::Literature, deadline, self.literature.fetch(gene, &constraints)),
            self.bounded(SourceId::Bioactivity, deadline, self.bioactivity.fetch(gene, &constraints)),
            self.bounded(SourceId::Structure, deadline, self.structure.fetch(gene, &constraints)),
        );

        let mut source_failures = Vec::new();
        let literature = settle(SourceId::Literature, literature, &mut source_failures);
        let mut inhibitors = settle(SourceId::Bioactivity, inhibitors, &mut source_failures);
        let structures = settle(SourceId::Structure, structures, &mut source_failures);

        log_phase(gene, TargetPhase::CrossValidating);
        self.cross_validate(&mut inhibitors, deadline).await;

        let breakdown = score_target(&literature, &inhibitors, &structures);
        log_phase(gene, TargetPhase::Scored);
        info!(
            gene = %gene,
            score = breakdown.total,
            literature = literature.len(),
            inhibitors = inhibitors.len(),
            structures = structures.len(),
            failed_sources = source_failures.len(),
            "target scored"
        );

        let report = TargetReport {
            gene_symbol: gene.clone(),
            target_score: breakdown.total,
            score_breakdown: breakdown,
            assessment: Assessment::from_score(breakdown.total),
            literature,
            inhibitors,
            structures,
            filters,
            source_failures,
            timestamp: UtcDateTime::now(),
            summary: None,
        };

        let summary = match self.summarizer.summarize_target(&report).await {
            Ok(text) => text,
            Err(error) => {
                warn!(gene = %gene, %error, "summarizer failed, using plain summary");
                PlainSummarizer::target_summary(&report)
            }
        };

        log_phase(gene, TargetPhase::Done);
        report.with_summary(summary)
    }

    /// Attach ligand-bound PDB entries to the first unique inhibitor molecules.
    async fn cross_validate(&self, inhibitors: &mut [Inhibitor], deadline: Option<Instant>) {
        let Some(ligands) = &self.ligands else {
            return;
        };

        let mut molecules: Vec<String> = Vec::new();
        for inhibitor in inhibitors.iter() {
            if molecules.len() == MAX_CROSS_VALIDATED_MOLECULES {
                break;
            }
            if !molecules.iter().any(|id| id == inhibitor.molecule_id()) {
                molecules.push(inhibitor.molecule_id().to_owned());
            }
        }
        if molecules.is_empty() {
            return;
        }

        let lookups = molecules.iter().map(|molecule_id| {
            self.bounded(
                SourceId::Structure,
                deadline,
                ligands.ligand_structures(molecule_id),
            )
        });
        let results = join_all(lookups).await;

        let mut found: HashMap<&str, Vec<String>> = HashMap::new();
        for (molecule_id, result) in molecules.iter().zip(results) {
            match result {
                Ok(pdb_ids) if !pdb_ids.is_empty() => {
                    found.insert(molecule_id.as_str(), pdb_ids);
                }
                Ok(_) => {}
                Err(error) => debug!(molecule_id = %molecule_id, %error, "ligand lookup failed"),
            }
        }

        for inhibitor in inhibitors.iter_mut() {
            if let Some(pdb_ids) = found.get(inhibitor.molecule_id()) {
                inhibitor.pdb_structures.clone_from(pdb_ids);
            }
        }
    }

    /// Bound `fetch` by the analysis deadline and the cancellation token.
    async fn bounded<T, F>(&self, source: SourceId, deadline: Option<Instant>, fetch: F) -> Result<T, SourceError>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        let timed = async {
            match deadline {
                Some(at) => tokio::time::timeout_at(at, fetch).await.unwrap_or_else(|_| {
                    Err(SourceError::cancelled(format!(
                        "{source} fetch exceeded the analysis deadline"
                    )))
                }),
                None => fetch.await,
            }
        };

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SourceError::cancelled(format!("{source} fetch cancelled"))),
            result = timed => result,
        }
    }
}

fn log_phase(gene: &GeneSymbol, phase: TargetPhase) {
    info!(gene = %gene, phase = %phase, "target phase");
}

fn settle<T>(source: SourceId, result: Result<Vec<T>, SourceError>, failures: &mut Vec<SourceFailure>) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(error) => {
            warn!(%source, %error, "source failed, continuing without it");
            failures.push(SourceFailure::from_error(source, &error));
            Vec::new()
        }
    }
}

/// Wires configuration, cache, limiter and gateway into a coordinator.
///
/// # Example
///
/// ```rust,ignore
/// use thera_core::CoordinatorBuilder;
///
/// let coordinator = CoordinatorBuilder::from_env()?
///     .with_deadline(std::time::Duration::from_secs(120))
///     .build()?;
/// ```
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: TheraConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    cache: Option<CacheStore>,
    rate_limiter: Option<RateLimiter>,
    retry: Option<RetryConfig>,
    summarizer: Option<Arc<dyn ReportSummarizer>>,
    disease_mapper: Option<Arc<dyn DiseaseMapper>>,
    deadline: Option<Duration>,
    reference_year: Option<i32>,
    cancel: Option<CancellationToken>,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, ValidationError> {
        Ok(Self::new().with_config(TheraConfig::from_env()?))
    }

    pub fn with_config(mut self, config: TheraConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn ReportSummarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_disease_mapper(mut self, mapper: Arc<dyn DiseaseMapper>) -> Self {
        self.disease_mapper = Some(mapper);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Pin the year structure recency is judged against.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Assemble the coordinator.
    ///
    /// # Errors
    ///
    /// Fails only when the persisted cache cannot be opened.
    pub fn build(self) -> Result<OrchestrationCoordinator, CoreError> {
        let cache = match self.cache {
            Some(cache) => cache,
            None if self.config.cache_disabled => CacheStore::memory(),
            None => CacheStore::open(self.config.cache_config())?,
        };
        let client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new(&self.config.user_agent)));
        let limiter = self
            .rate_limiter
            .unwrap_or_else(RateLimiter::with_default_policies);
        let cancel = self.cancel.unwrap_or_default();

        let gateway = Arc::new(
            HttpGateway::new(client, cache, limiter)
                .with_retry(self.retry.unwrap_or_default())
                .with_timeout(self.config.request_timeout)
                .with_cancellation(cancel.clone()),
        );

        let literature = LiteratureAdapter::new(Arc::clone(&gateway)).with_api_key(self.config.ncbi_api_key);
        let bioactivity = BioactivityAdapter::new(Arc::clone(&gateway));
        let mut structure = StructureAdapter::new(gateway);
        if let Some(year) = self.reference_year {
            structure = structure.with_reference_year(year);
        }
        let structure = Arc::new(structure);

        let mut coordinator = OrchestrationCoordinator::new(
            Arc::new(literature),
            Arc::new(bioactivity),
            Arc::clone(&structure) as StructureSourceRef,
        )
        .with_ligand_lookup(structure)
        .with_cancellation(cancel);

        if let Some(summarizer) = self.summarizer {
            coordinator = coordinator.with_summarizer(summarizer);
        }
        if let Some(mapper) = self.disease_mapper {
            coordinator = coordinator.with_disease_mapper(mapper);
        }
        if let Some(deadline) = self.deadline {
            coordinator = coordinator.with_deadline(deadline);
        }
        Ok(coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceFuture;

    struct Fixed<T: Clone + Send + Sync> {
        id: SourceId,
        records: Result<Vec<T>, SourceError>,
    }

    impl<T: Clone + Send + Sync> SourceAdapter for Fixed<T> {
        type Record = T;

        fn id(&self) -> SourceId {
            self.id
        }

        fn fetch<'a>(&'a self, _gene: &'a GeneSymbol, _constraints: &'a FetchConstraints) -> SourceFuture<'a, Vec<T>> {
            let records = self.records.clone();
            Box::pin(async move { records })
        }
    }

    fn coordinator(structure: Result<Vec<StructureRecord>, SourceError>) -> OrchestrationCoordinator {
        OrchestrationCoordinator::new(
            Arc::new(Fixed::<LiteratureRecord> {
                id: SourceId::Literature,
                records: Ok(Vec::new()),
            }),
            Arc::new(Fixed::<Inhibitor> {
                id: SourceId::Bioactivity,
                records: Ok(Vec::new()),
            }),
            Arc::new(Fixed {
                id: SourceId::Structure,
                records: structure,
            }),
        )
    }

    fn gene(symbol: &str) -> GeneSymbol {
        GeneSymbol::parse(symbol).expect("valid gene")
    }

    #[tokio::test]
    async fn failed_source_is_recorded_not_raised() {
        let coordinator = coordinator(Err(SourceError::unavailable("rcsb down")));

        let report = coordinator
            .analyze_target(&gene("EGFR"), PotencyFilters::unbounded())
            .await;

        assert_eq!(report.target_score, 0.0);
        assert_eq!(report.source_failures.len(), 1);
        assert_eq!(report.source_failures[0].source, SourceId::Structure);
        assert_eq!(report.source_failures[0].code, "source.unavailable");
        assert!(report.summary.is_some());
    }

    #[tokio::test]
    async fn cancelled_token_fails_every_source() {
        let coordinator = coordinator(Ok(Vec::new()));
        coordinator.cancel_token().cancel();

        let report = coordinator
            .analyze_target(&gene("EGFR"), PotencyFilters::unbounded())
            .await;

        assert_eq!(report.source_failures.len(), 3);
        assert!(report
            .source_failures
            .iter()
            .all(|failure| failure.code == "source.cancelled"));
    }

    #[tokio::test]
    async fn disease_query_without_mapper_is_rejected() {
        let coordinator = coordinator(Ok(Vec::new()));

        let err = coordinator
            .analyze_query(&ParsedQuery::for_disease("melanoma"))
            .await
            .expect_err("mapper required");

        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::MissingDiseaseMapper)
        ));
    }

    #[tokio::test]
    async fn query_with_one_gene_yields_single_report() {
        let coordinator = coordinator(Ok(Vec::new()));
        let query = ParsedQuery::for_genes(vec![gene("BRAF"), gene("BRAF")]);

        let report = coordinator.analyze_query(&query).await.expect("query runs");

        assert!(matches!(report, QueryReport::Single(ref target) if target.gene_symbol.as_str() == "BRAF"));
    }
}
