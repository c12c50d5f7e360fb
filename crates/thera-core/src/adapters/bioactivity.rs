//! Bioactivity adapter backed by the ChEMBL REST API.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::data_source::{FetchConstraints, SourceAdapter, SourceError, SourceFuture, SourceId};
use crate::gateway::{GatewayRequest, HttpGateway};
use crate::{
    clamp_unit, BioactivityRecord, GeneSymbol, Inhibitor, MoleculeProfile, NormalizationError,
    PotencyFilters,
};

pub const CHEMBL_BASE_URL: &str = "https://www.ebi.ac.uk/chembl/api/data";

pub const ACTIVITY_TYPES: [&str; 4] = ["IC50", "Ki", "Kd", "EC50"];

const CACHE_TTL_HOURS: u64 = 24;
const TARGET_SEARCH_LIMIT: usize = 10;
const MOLECULE_BATCH_SIZE: usize = 20;

/// Convert a concentration to nanomolar.
///
/// Units are matched case-insensitively; `μ` and `µ` are accepted for micro.
pub fn convert_to_nm(value: f64, unit: &str) -> Result<f64, NormalizationError> {
    let normalized = unit.trim().replace(['μ', 'µ'], "U").to_ascii_uppercase();
    let factor = match normalized.as_str() {
        "NM" => 1.0,
        "UM" => 1_000.0,
        "MM" => 1_000_000.0,
        "M" => 1_000_000_000.0,
        "PM" => 0.001,
        "FM" => 0.000_001,
        _ => {
            return Err(NormalizationError::UnknownUnit {
                unit: unit.to_owned(),
            })
        }
    };
    Ok(value * factor)
}

/// Data-quality score of one activity measurement, in `[0, 1]`.
pub fn activity_quality(
    pchembl: Option<f64>,
    confidence: Option<f64>,
    assay_type: &str,
    validity_comment: Option<&str>,
) -> f64 {
    let mut score = 0.5;

    if pchembl.is_some() {
        score += 0.2;
    }
    if let Some(confidence) = confidence {
        score += confidence / 10.0 * 0.2;
    }

    let assay = assay_type.trim().to_ascii_lowercase();
    if assay == "f" || assay.contains("functional") || assay.contains("cell") {
        score += 0.1;
    }

    if validity_comment.is_some_and(|comment| comment.to_ascii_lowercase().contains("outside typical range")) {
        score -= 0.2;
    }

    clamp_unit(score)
}

/// ChEMBL numbers arrive as JSON numbers or as decimal strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    fn parse(&self, field: &'static str) -> Result<f64, NormalizationError> {
        let value = match self {
            Self::Number(value) => *value,
            Self::Text(text) => text.trim().parse::<f64>().map_err(|_| NormalizationError::InvalidNumber {
                field,
                value: text.clone(),
            })?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(NormalizationError::InvalidNumber {
                field,
                value: value.to_string(),
            })
        }
    }
}

fn optional_number(value: Option<&NumberOrText>, field: &'static str) -> Option<f64> {
    value.and_then(|value| value.parse(field).ok())
}

fn optional_count(value: Option<&NumberOrText>, field: &'static str) -> Option<u32> {
    optional_number(value, field)
        .filter(|count| *count >= 0.0 && *count <= f64::from(u32::MAX))
        .map(|count| count.round() as u32)
}

#[derive(Debug, Default, Deserialize)]
struct TargetPage {
    #[serde(default)]
    targets: Vec<ChemblTarget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ChemblTarget {
    target_chembl_id: Option<String>,
    pref_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ActivityPage {
    #[serde(default)]
    activities: Vec<ChemblActivity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ChemblActivity {
    activity_id: Option<i64>,
    molecule_chembl_id: Option<String>,
    target_chembl_id: Option<String>,
    standard_type: Option<String>,
    standard_value: Option<NumberOrText>,
    standard_units: Option<String>,
    assay_type: Option<String>,
    assay_description: Option<String>,
    assay_organism: Option<String>,
    confidence_score: Option<NumberOrText>,
    pchembl_value: Option<NumberOrText>,
    data_validity_comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MoleculePage {
    #[serde(default)]
    molecules: Vec<ChemblMolecule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ChemblMolecule {
    molecule_chembl_id: Option<String>,
    pref_name: Option<String>,
    max_phase: Option<NumberOrText>,
    structure_type: Option<String>,
    molecule_properties: Option<MoleculeProperties>,
    molecule_structures: Option<MoleculeStructures>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MoleculeProperties {
    mw_freebase: Option<NumberOrText>,
    alogp: Option<NumberOrText>,
    hbd: Option<NumberOrText>,
    hba: Option<NumberOrText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct MoleculeStructures {
    canonical_smiles: Option<String>,
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, NormalizationError> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
        .ok_or(NormalizationError::MissingField { field })
}

fn normalize_activity(
    activity: ChemblActivity,
    target_id: &str,
) -> Result<BioactivityRecord, NormalizationError> {
    let molecule_id = required_text(activity.molecule_chembl_id, "molecule_chembl_id")?;
    let standard_type = required_text(activity.standard_type, "standard_type")?;
    let value = activity
        .standard_value
        .as_ref()
        .ok_or(NormalizationError::MissingField {
            field: "standard_value",
        })?
        .parse("standard_value")?;
    let unit = required_text(activity.standard_units, "standard_units")?;
    let value_nm = convert_to_nm(value, &unit)?;

    let pchembl = optional_number(activity.pchembl_value.as_ref(), "pchembl_value");
    let confidence = optional_number(activity.confidence_score.as_ref(), "confidence_score");
    let assay_type = activity.assay_type.unwrap_or_default();
    let quality_score = activity_quality(
        pchembl,
        confidence,
        &assay_type,
        activity.data_validity_comment.as_deref(),
    );

    Ok(BioactivityRecord {
        molecule_id,
        target_id: activity
            .target_chembl_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| target_id.to_owned()),
        standard_type,
        value_nm,
        assay_type,
        quality_score,
        confidence_score: confidence,
        pchembl,
        validity_flag: activity.data_validity_comment,
        activity_id: activity.activity_id,
        assay_description: activity.assay_description,
        assay_organism: activity.assay_organism,
    })
}

fn molecule_profile(molecule: &ChemblMolecule) -> MoleculeProfile {
    let properties = molecule.molecule_properties.as_ref();
    MoleculeProfile {
        name: molecule.pref_name.clone(),
        molecular_weight: optional_number(properties.and_then(|p| p.mw_freebase.as_ref()), "mw_freebase"),
        alogp: optional_number(properties.and_then(|p| p.alogp.as_ref()), "alogp"),
        hbd: optional_count(properties.and_then(|p| p.hbd.as_ref()), "hbd"),
        hba: optional_count(properties.and_then(|p| p.hba.as_ref()), "hba"),
        max_phase: optional_number(molecule.max_phase.as_ref(), "max_phase"),
        structure_type: molecule.structure_type.clone(),
        smiles: molecule
            .molecule_structures
            .as_ref()
            .and_then(|structures| structures.canonical_smiles.clone()),
    }
}

/// Highest quality first, then most potent.
pub fn rank_inhibitors(inhibitors: &mut [Inhibitor]) {
    inhibitors.sort_by(|left, right| {
        right
            .quality_score()
            .total_cmp(&left.quality_score())
            .then_with(|| left.value_nm().total_cmp(&right.value_nm()))
    });
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T, SourceError> {
    serde_json::from_value(value)
        .map_err(|error| SourceError::upstream(format!("unexpected ChEMBL {what} payload: {error}")))
}

/// Inhibitor search over ChEMBL targets, activities and molecules.
#[derive(Debug, Clone)]
pub struct BioactivityAdapter {
    gateway: Arc<HttpGateway>,
    base_url: String,
    max_targets: usize,
    activity_limit: usize,
    max_inhibitors: usize,
}

impl BioactivityAdapter {
    pub fn new(gateway: Arc<HttpGateway>) -> Self {
        Self {
            gateway,
            base_url: CHEMBL_BASE_URL.to_owned(),
            max_targets: 3,
            activity_limit: 100,
            max_inhibitors: 50,
        }
    }

    pub fn with_max_inhibitors(mut self, max_inhibitors: usize) -> Self {
        self.max_inhibitors = max_inhibitors;
        self
    }

    /// Potency-filtered inhibitors for `gene` across its top ChEMBL targets.
    #[instrument(skip(self, filters), fields(gene = %gene))]
    pub async fn inhibitors_for(
        &self,
        gene: &GeneSymbol,
        filters: &PotencyFilters,
    ) -> Result<Vec<Inhibitor>, SourceError> {
        let targets: Vec<ChemblTarget> = self
            .targets(gene)
            .await?
            .into_iter()
            .filter(|target| {
                target
                    .target_chembl_id
                    .as_deref()
                    .is_some_and(|id| !id.trim().is_empty())
            })
            .take(self.max_targets)
            .collect();
        if targets.is_empty() {
            debug!("no ChEMBL targets matched");
            return Ok(Vec::new());
        }

        let mut inhibitors = Vec::new();
        let mut failures = Vec::new();
        for target in &targets {
            match self.target_inhibitors(target, filters).await {
                Ok(mut found) => inhibitors.append(&mut found),
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    warn!(target = ?target.target_chembl_id, %error, "skipping ChEMBL target");
                    failures.push(error.message().to_owned());
                }
            }
        }
        if failures.len() == targets.len() {
            return Err(SourceError::unavailable(format!(
                "every ChEMBL target failed: {}",
                failures.join("; ")
            )));
        }

        rank_inhibitors(&mut inhibitors);
        inhibitors.truncate(self.max_inhibitors);
        Ok(inhibitors)
    }

    async fn targets(&self, gene: &GeneSymbol) -> Result<Vec<ChemblTarget>, SourceError> {
        let request = GatewayRequest::get(format!("{}/target.json", self.base_url))
            .param("target_synonym__icontains", gene.as_str())
            .param("format", "json")
            .param("limit", TARGET_SEARCH_LIMIT)
            .ttl_hours(CACHE_TTL_HOURS);
        let page: TargetPage = decode(self.gateway.get_json(request).await?, "target")?;
        Ok(page.targets)
    }

    async fn target_inhibitors(
        &self,
        target: &ChemblTarget,
        filters: &PotencyFilters,
    ) -> Result<Vec<Inhibitor>, SourceError> {
        let target_id = target.target_chembl_id.clone().unwrap_or_default();
        let request = GatewayRequest::get(format!("{}/activity.json", self.base_url))
            .param("target_chembl_id", &target_id)
            .param("standard_type__in", ACTIVITY_TYPES.join(","))
            .param("format", "json")
            .param("limit", self.activity_limit)
            .ttl_hours(CACHE_TTL_HOURS);
        let page: ActivityPage = decode(self.gateway.get_json(request).await?, "activity")?;

        let total = page.activities.len();
        let mut dropped = 0usize;
        let activities: Vec<BioactivityRecord> = page
            .activities
            .into_iter()
            .filter_map(|activity| match normalize_activity(activity, &target_id) {
                Ok(record) => Some(record),
                Err(error) => {
                    dropped += 1;
                    debug!(%error, "activity not normalizable");
                    None
                }
            })
            .filter(|record| filters.admits(record.value_nm))
            .collect();
        if dropped > 0 {
            warn!(target = %target_id, dropped, total, "dropped ChEMBL activities without usable values");
        }

        let mut seen = HashSet::new();
        let molecule_ids: Vec<String> = activities
            .iter()
            .map(|record| record.molecule_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        let profiles = self.molecules(&molecule_ids).await?;

        Ok(activities
            .into_iter()
            .map(|record| {
                let profile = profiles.get(&record.molecule_id).cloned().unwrap_or_default();
                let mut inhibitor = Inhibitor::new(record, target.pref_name.clone());
                inhibitor.molecule = profile;
                inhibitor
            })
            .collect())
    }

    /// Molecule metadata in batches; a failed batch leaves its molecules bare.
    async fn molecules(&self, ids: &[String]) -> Result<HashMap<String, MoleculeProfile>, SourceError> {
        let mut profiles = HashMap::new();
        for batch in ids.chunks(MOLECULE_BATCH_SIZE) {
            let request = GatewayRequest::get(format!("{}/molecule.json", self.base_url))
                .param("molecule_chembl_id__in", batch.join(","))
                .param("format", "json")
                .param("limit", batch.len())
                .ttl_hours(CACHE_TTL_HOURS);
            let page = self
                .gateway
                .get_json(request)
                .await
                .map_err(SourceError::from)
                .and_then(|value| decode::<MoleculePage>(value, "molecule"));
            match page {
                Ok(page) => {
                    for molecule in &page.molecules {
                        if let Some(id) = molecule.molecule_chembl_id.clone() {
                            profiles.insert(id, molecule_profile(molecule));
                        }
                    }
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => warn!(batch = batch.len(), %error, "molecule batch failed"),
            }
        }
        Ok(profiles)
    }
}

impl SourceAdapter for BioactivityAdapter {
    type Record = Inhibitor;

    fn id(&self) -> SourceId {
        SourceId::Bioactivity
    }

    fn fetch<'a>(
        &'a self,
        gene: &'a GeneSymbol,
        constraints: &'a FetchConstraints,
    ) -> SourceFuture<'a, Vec<Inhibitor>> {
        Box::pin(self.inhibitors_for(gene, &constraints.filters))
    }
}
