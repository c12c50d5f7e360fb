//! Structure adapter backed by the RCSB PDB search and data APIs.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::data_source::{
    first_found, FetchConstraints, LigandLookup, SourceAdapter, SourceError, SourceFuture,
    SourceId, StrategyOutcome,
};
use crate::gateway::{GatewayRequest, HttpGateway};
use crate::{clamp_unit, GeneSymbol, StructureRecord, UtcDateTime};

pub const RCSB_SEARCH_URL: &str = "https://search.rcsb.org/rcsbsearch/v2/query";
pub const RCSB_ENTRY_URL: &str = "https://data.rcsb.org/rest/v1/core/entry";

/// Crystallization additives and ions that do not count as bound ligands.
pub const BUFFER_COMPONENTS: [&str; 11] = [
    "HOH", "SO4", "CL", "NA", "MG", "CA", "ZN", "GOL", "EDO", "PEG", "TRS",
];

pub const MIN_STRUCTURE_QUALITY: f64 = 0.3;

const SEARCH_TTL_HOURS: u64 = 24;
const DETAIL_TTL_HOURS: u64 = 48;
const CURATED_TTL_HOURS: u64 = 168;
const LIGAND_TTL_HOURS: u64 = 48;
const TITLE_SEARCH_ROWS: usize = 20;
const FULL_TEXT_SEARCH_ROWS: usize = 10;
const LIGAND_SEARCH_ROWS: usize = 25;

type CuratedEntries = &'static [(&'static str, &'static str)];

const CURATED_STRUCTURES: &[(&str, CuratedEntries)] = &[
    (
        "EGFR",
        &[
            ("1M17", "EGFR kinase domain with ATP analog"),
            ("4HJO", "EGFR with erlotinib inhibitor"),
            ("5P21", "EGFR with osimertinib"),
            ("2J5F", "EGFR kinase domain with gefitinib"),
        ],
    ),
    (
        "JAK2",
        &[
            ("3UGC", "JAK2 kinase domain with inhibitor"),
            ("4C61", "JAK2 with ruxolitinib"),
            ("3JY9", "JAK2 pseudokinase domain"),
            ("2B7A", "JAK2 kinase domain structure"),
        ],
    ),
    (
        "BRAF",
        &[
            ("4MNE", "BRAF kinase with vemurafenib"),
            ("3OG7", "BRAF with sorafenib"),
            ("1UWH", "BRAF kinase domain"),
            ("4E26", "BRAF with dabrafenib"),
        ],
    ),
    (
        "CDK9",
        &[
            ("3BLR", "CDK9/cyclin T1 complex"),
            ("4BCF", "CDK9 with flavopiridol"),
            ("3MY1", "CDK9 kinase domain"),
            ("4IMY", "CDK9 with dinaciclib"),
        ],
    ),
    (
        "BCL2",
        &[
            ("2XA0", "BCL-2 with ABT-737"),
            ("4LVT", "BCL-2 family structure"),
            ("6GL9", "BCL-2 with venetoclax"),
            ("5VAX", "BCL-2 apoptosis complex"),
        ],
    ),
    (
        "TP53",
        &[
            ("1TUP", "p53 tumor suppressor DNA-binding"),
            ("3KMD", "p53 with small molecule"),
            ("1AIE", "p53 core domain"),
            ("4MZI", "p53 tetramerization domain"),
        ],
    ),
];

/// Hand-picked reference structures for well-studied targets.
pub fn curated_structures(gene: &GeneSymbol) -> CuratedEntries {
    CURATED_STRUCTURES
        .iter()
        .find(|(symbol, _)| *symbol == gene.as_str())
        .map(|(_, entries)| *entries)
        .unwrap_or(&[])
}

/// Quality of a structure in `[0, 1]` judged on resolution, refinement,
/// method, ligands, organism and recency relative to `current_year`.
pub fn structure_quality(record: &StructureRecord, current_year: i32) -> f64 {
    let mut score = 0.5;

    if let Some(resolution) = record.resolution {
        if resolution <= 1.5 {
            score += 0.3;
        } else if resolution <= 2.0 {
            score += 0.2;
        } else if resolution <= 2.5 {
            score += 0.1;
        } else if resolution > 3.5 {
            score -= 0.1;
        }
    }

    if let Some(r_factor) = record.r_factor {
        if r_factor <= 0.15 {
            score += 0.2;
        } else if r_factor <= 0.20 {
            score += 0.1;
        } else if r_factor > 0.25 {
            score -= 0.1;
        }
    }

    let method = record.method.to_ascii_uppercase();
    if method.contains("X-RAY") {
        score += 0.1;
    } else if method.contains("NMR") {
        score += 0.05;
    } else if method.contains("CRYO") || method.contains("ELECTRON") {
        score += 0.15;
    }

    if !record.ligand_ids.is_empty() {
        score += 0.1;
        if record.ligand_ids.len() >= 2 {
            score += 0.05;
        }
    }

    if record
        .organism
        .as_deref()
        .is_some_and(|organism| organism.to_ascii_lowercase().contains("homo sapiens"))
    {
        score += 0.1;
    }

    if let Some(year) = deposition_year(&record.deposition_date) {
        if year >= current_year - 2 {
            score += 0.1;
        } else if year >= current_year - 5 {
            score += 0.05;
        }
    }

    clamp_unit(score)
}

fn deposition_year(date: &str) -> Option<i32> {
    date.get(..4)?.parse().ok()
}

fn is_buffer_component(component: &str) -> bool {
    BUFFER_COMPONENTS
        .iter()
        .any(|buffer| buffer.eq_ignore_ascii_case(component))
}

fn title_query(gene: &GeneSymbol, rows: usize) -> Value {
    json!({
        "query": {
            "type": "terminal",
            "service": "text",
            "parameters": {
                "attribute": "struct.title",
                "operator": "contains_phrase",
                "value": gene.as_str()
            }
        },
        "return_type": "entry",
        "request_options": {"paginate": {"start": 0, "rows": rows}}
    })
}

fn full_text_query(gene: &GeneSymbol, rows: usize) -> Value {
    json!({
        "query": {
            "type": "terminal",
            "service": "full_text",
            "parameters": {"value": gene.as_str()}
        },
        "return_type": "entry",
        "request_options": {"paginate": {"start": 0, "rows": rows}}
    })
}

fn ligand_query(molecule_id: &str, rows: usize) -> Value {
    json!({
        "query": {
            "type": "terminal",
            "service": "text_chem",
            "parameters": {
                "attribute": "rcsb_chem_comp_related.resource_accession_code",
                "operator": "exact_match",
                "value": molecule_id
            }
        },
        "return_type": "entry",
        "request_options": {"paginate": {"start": 0, "rows": rows}}
    })
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result_set: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    identifier: String,
}

/// Entry identifiers of a search response; an empty (204) body has none.
fn search_hits(value: Value) -> Result<Vec<String>, SourceError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    let response: SearchResponse = serde_json::from_value(value)
        .map_err(|error| SourceError::upstream(format!("unexpected RCSB search payload: {error}")))?;
    Ok(response
        .result_set
        .into_iter()
        .map(|hit| hit.identifier)
        .filter(|id| !id.trim().is_empty())
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryDetail {
    #[serde(rename = "struct")]
    structure: Option<EntryStruct>,
    exptl: Vec<Exptl>,
    refine: Vec<Refine>,
    rcsb_entry_info: Option<EntryInfo>,
    rcsb_accession_info: Option<AccessionInfo>,
    pdbx_database_status: Option<DatabaseStatus>,
    struct_keywords: Option<StructKeywords>,
    rcsb_entity_source_organism: Vec<SourceOrganism>,
    rcsb_nonpolymer_entity_container_identifiers: Option<NonpolymerIdentifiers>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryStruct {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Exptl {
    method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Refine {
    ls_d_res_high: Option<f64>,
    #[serde(rename = "ls_R_factor_obs")]
    ls_r_factor_obs: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EntryInfo {
    resolution_combined: Vec<f64>,
    nonpolymer_bound_components: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AccessionInfo {
    deposit_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatabaseStatus {
    recvd_initial_deposition_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StructKeywords {
    pdbx_keywords: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceOrganism {
    ncbi_scientific_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NonpolymerIdentifiers {
    chem_comp_monomers: Vec<String>,
}

fn entry_url(pdb_id: &str) -> String {
    format!("https://www.rcsb.org/structure/{pdb_id}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

fn build_record(
    pdb_id: &str,
    detail: EntryDetail,
    description: Option<&str>,
    current_year: i32,
) -> StructureRecord {
    let info = detail.rcsb_entry_info.unwrap_or_default();
    let refine = detail.refine.into_iter().next().unwrap_or_default();

    let components = if info.nonpolymer_bound_components.is_empty() {
        detail
            .rcsb_nonpolymer_entity_container_identifiers
            .map(|ids| ids.chem_comp_monomers)
            .unwrap_or_default()
    } else {
        info.nonpolymer_bound_components
    };
    let mut seen = HashSet::new();
    let ligand_ids = components
        .into_iter()
        .map(|component| component.trim().to_ascii_uppercase())
        .filter(|component| !component.is_empty() && !is_buffer_component(component))
        .filter(|component| seen.insert(component.clone()))
        .collect();

    let mut record = StructureRecord {
        pdb_id: pdb_id.to_owned(),
        title: non_empty(detail.structure.and_then(|s| s.title))
            .or_else(|| description.map(str::to_owned))
            .unwrap_or_default(),
        method: non_empty(detail.exptl.into_iter().next().and_then(|e| e.method)).unwrap_or_default(),
        resolution: refine
            .ls_d_res_high
            .or_else(|| info.resolution_combined.first().copied()),
        deposition_date: non_empty(detail.rcsb_accession_info.and_then(|a| a.deposit_date))
            .or_else(|| {
                non_empty(
                    detail
                        .pdbx_database_status
                        .and_then(|s| s.recvd_initial_deposition_date),
                )
            })
            .unwrap_or_default(),
        organism: non_empty(
            detail
                .rcsb_entity_source_organism
                .into_iter()
                .next()
                .and_then(|o| o.ncbi_scientific_name),
        ),
        ligand_ids,
        quality_score: 0.0,
        r_factor: refine.ls_r_factor_obs,
        keywords: non_empty(detail.struct_keywords.and_then(|k| k.pdbx_keywords)),
        description: description.map(str::to_owned),
        url: entry_url(pdb_id),
    };
    record.quality_score = structure_quality(&record, current_year);
    record
}

/// Record for a curated entry whose details could not be fetched.
fn curated_fallback(pdb_id: &str, description: &str, current_year: i32) -> StructureRecord {
    let mut record = StructureRecord {
        pdb_id: pdb_id.to_owned(),
        title: description.to_owned(),
        method: String::from("X-RAY DIFFRACTION"),
        resolution: Some(2.5),
        deposition_date: String::new(),
        organism: None,
        ligand_ids: Vec::new(),
        quality_score: 0.0,
        r_factor: None,
        keywords: None,
        description: Some(description.to_owned()),
        url: entry_url(pdb_id),
    };
    record.quality_score = structure_quality(&record, current_year);
    record
}

/// Keep structures of acceptable quality, best first.
fn select_structures(mut records: Vec<StructureRecord>) -> Vec<StructureRecord> {
    records.retain(|record| record.quality_score >= MIN_STRUCTURE_QUALITY);
    records.sort_by(|left, right| right.quality_score.total_cmp(&left.quality_score));
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StructureStrategy {
    TitleSearch,
    FullTextSearch,
    Curated,
}

/// PDB structure search with quality assessment.
#[derive(Debug, Clone)]
pub struct StructureAdapter {
    gateway: Arc<HttpGateway>,
    detail_concurrency: usize,
    reference_year: Option<i32>,
}

impl StructureAdapter {
    pub fn new(gateway: Arc<HttpGateway>) -> Self {
        Self {
            gateway,
            detail_concurrency: 4,
            reference_year: None,
        }
    }

    /// Pin the year recency is judged against (defaults to the current year).
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    pub fn with_detail_concurrency(mut self, concurrency: usize) -> Self {
        self.detail_concurrency = concurrency.max(1);
        self
    }

    fn current_year(&self) -> i32 {
        self.reference_year
            .unwrap_or_else(|| UtcDateTime::now().year())
    }

    /// Structures for `gene`: title search, then full-text search, then the curated table.
    ///
    /// A strategy whose search returned hits owns the result even when every
    /// hit is filtered out for quality.
    #[instrument(skip(self), fields(gene = %gene))]
    pub async fn structures_for(&self, gene: &GeneSymbol) -> Result<Vec<StructureRecord>, SourceError> {
        let strategies = [
            StructureStrategy::TitleSearch,
            StructureStrategy::FullTextSearch,
            StructureStrategy::Curated,
        ];
        let records = first_found(SourceId::Structure, &strategies, |strategy| async move {
            match strategy {
                StructureStrategy::TitleSearch => {
                    self.search_strategy(title_query(gene, TITLE_SEARCH_ROWS)).await
                }
                StructureStrategy::FullTextSearch => {
                    self.search_strategy(full_text_query(gene, FULL_TEXT_SEARCH_ROWS))
                        .await
                }
                StructureStrategy::Curated => self.curated_strategy(gene).await,
            }
        })
        .await?;
        debug!(count = records.len(), "structure search finished");
        Ok(records)
    }

    async fn search(&self, query: Value, ttl_hours: u64) -> Result<Vec<String>, SourceError> {
        let request = GatewayRequest::post_json(RCSB_SEARCH_URL, query).ttl_hours(ttl_hours);
        search_hits(self.gateway.get_json(request).await?)
    }

    async fn search_strategy(&self, query: Value) -> Result<StrategyOutcome<StructureRecord>, SourceError> {
        let ids = self.search(query, SEARCH_TTL_HOURS).await?;
        if ids.is_empty() {
            return Ok(StrategyOutcome::NoData);
        }

        let year = self.current_year();
        let results: Vec<(String, Result<EntryDetail, SourceError>)> = stream::iter(ids)
            .map(|id| async move {
                let detail = self.entry_detail(&id, DETAIL_TTL_HOURS).await;
                (id, detail)
            })
            .buffered(self.detail_concurrency)
            .collect()
            .await;

        let mut records = Vec::with_capacity(results.len());
        for (id, detail) in results {
            match detail {
                Ok(detail) => records.push(build_record(&id, detail, None, year)),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => warn!(pdb_id = %id, %error, "skipping structure without details"),
            }
        }
        Ok(StrategyOutcome::Found(select_structures(records)))
    }

    async fn curated_strategy(&self, gene: &GeneSymbol) -> Result<StrategyOutcome<StructureRecord>, SourceError> {
        let entries = curated_structures(gene);
        if entries.is_empty() {
            return Ok(StrategyOutcome::NoData);
        }

        let year = self.current_year();
        let results: Vec<Result<StructureRecord, SourceError>> = stream::iter(0..entries.len())
            .map(|index| async move {
                let (id, description) = entries[index];
                match self.entry_detail(id, CURATED_TTL_HOURS).await {
                    Ok(detail) => Ok(build_record(id, detail, Some(description), year)),
                    Err(error) if error.is_cancelled() => Err(error),
                    Err(error) => {
                        warn!(pdb_id = id, %error, "using curated description without details");
                        Ok(curated_fallback(id, description, year))
                    }
                }
            })
            .buffered(self.detail_concurrency)
            .collect()
            .await;

        let records = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(StrategyOutcome::from_records(select_structures(records)))
    }

    async fn entry_detail(&self, pdb_id: &str, ttl_hours: u64) -> Result<EntryDetail, SourceError> {
        let request =
            GatewayRequest::get(format!("{RCSB_ENTRY_URL}/{}", urlencoding::encode(pdb_id))).ttl_hours(ttl_hours);
        let value = self.gateway.get_json(request).await?;
        if value.is_null() {
            return Err(SourceError::upstream(format!("empty entry document for {pdb_id}")));
        }
        serde_json::from_value(value)
            .map_err(|error| SourceError::upstream(format!("unexpected entry payload for {pdb_id}: {error}")))
    }
}

impl SourceAdapter for StructureAdapter {
    type Record = StructureRecord;

    fn id(&self) -> SourceId {
        SourceId::Structure
    }

    fn fetch<'a>(
        &'a self,
        gene: &'a GeneSymbol,
        _constraints: &'a FetchConstraints,
    ) -> SourceFuture<'a, Vec<StructureRecord>> {
        Box::pin(self.structures_for(gene))
    }
}

impl LigandLookup for StructureAdapter {
    fn ligand_structures<'a>(&'a self, molecule_id: &'a str) -> SourceFuture<'a, Vec<String>> {
        Box::pin(async move {
            if molecule_id.trim().is_empty() {
                return Err(SourceError::invalid_request("molecule identifier is empty"));
            }
            self.search(ligand_query(molecule_id, LIGAND_SEARCH_ROWS), LIGAND_TTL_HOURS)
                .await
        })
    }
}
