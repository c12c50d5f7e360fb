use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Clamp a quality score into `[0, 1]`, mapping `NaN` to zero.
pub fn clamp_unit(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

/// Bibliographic database a literature record was normalized from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteratureSource {
    #[serde(rename = "PubMed")]
    PubMed,
    #[serde(rename = "Europe PMC")]
    EuropePmc,
}

impl LiteratureSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PubMed => "PubMed",
            Self::EuropePmc => "Europe PMC",
        }
    }
}

/// Normalized article metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub journal: String,
    pub pub_date: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mesh_terms: Vec<String>,
    pub source: LiteratureSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_count: Option<u32>,
}

/// One measured activity of a molecule against a target, always in nanomolar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BioactivityRecord {
    pub molecule_id: String,
    pub target_id: String,
    pub standard_type: String,
    pub value_nm: f64,
    pub assay_type: String,
    pub quality_score: f64,
    pub confidence_score: Option<f64>,
    pub pchembl: Option<f64>,
    pub validity_flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assay_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assay_organism: Option<String>,
}

/// Physicochemical and clinical metadata of a molecule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoleculeProfile {
    pub name: Option<String>,
    pub molecular_weight: Option<f64>,
    pub alogp: Option<f64>,
    pub hbd: Option<u32>,
    pub hba: Option<u32>,
    pub max_phase: Option<f64>,
    pub structure_type: Option<String>,
    pub smiles: Option<String>,
}

/// Bioactivity enriched with target and molecule context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inhibitor {
    #[serde(flatten)]
    pub activity: BioactivityRecord,
    pub target_name: Option<String>,
    #[serde(flatten)]
    pub molecule: MoleculeProfile,
    /// Ligand-bound PDB entries attached during cross-validation.
    #[serde(default)]
    pub pdb_structures: Vec<String>,
}

impl Inhibitor {
    pub fn new(activity: BioactivityRecord, target_name: Option<String>) -> Self {
        Self {
            activity,
            target_name,
            molecule: MoleculeProfile::default(),
            pdb_structures: Vec::new(),
        }
    }

    pub fn molecule_id(&self) -> &str {
        &self.activity.molecule_id
    }

    pub fn value_nm(&self) -> f64 {
        self.activity.value_nm
    }

    pub fn quality_score(&self) -> f64 {
        self.activity.quality_score
    }
}

/// Experimentally determined 3D structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRecord {
    pub pdb_id: String,
    pub title: String,
    pub method: String,
    pub resolution: Option<f64>,
    pub deposition_date: String,
    pub organism: Option<String>,
    pub ligand_ids: Vec<String>,
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
}

impl StructureRecord {
    pub fn has_ligands(&self) -> bool {
        !self.ligand_ids.is_empty()
    }
}

/// Any record produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedRecord {
    Literature(LiteratureRecord),
    Bioactivity(BioactivityRecord),
    Structure(StructureRecord),
}

/// Inclusive IC50 window applied to inhibitors, in nanomolar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PotencyFilters {
    pub min_ic50_nm: Option<f64>,
    pub max_ic50_nm: Option<f64>,
}

impl PotencyFilters {
    pub fn new(min_ic50_nm: Option<f64>, max_ic50_nm: Option<f64>) -> Result<Self, ValidationError> {
        for (field, bound) in [("min_ic50_nm", min_ic50_nm), ("max_ic50_nm", max_ic50_nm)] {
            if let Some(value) = bound {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteValue { field });
                }
                if value < 0.0 {
                    return Err(ValidationError::NegativeValue { field });
                }
            }
        }

        if let (Some(min), Some(max)) = (min_ic50_nm, max_ic50_nm) {
            if min > max {
                return Err(ValidationError::InvertedPotencyRange { min, max });
            }
        }

        Ok(Self {
            min_ic50_nm,
            max_ic50_nm,
        })
    }

    pub const fn unbounded() -> Self {
        Self {
            min_ic50_nm: None,
            max_ic50_nm: None,
        }
    }

    pub fn admits(&self, value_nm: f64) -> bool {
        if let Some(max) = self.max_ic50_nm {
            if value_nm > max {
                return false;
            }
        }
        if let Some(min) = self.min_ic50_nm {
            if value_nm < min {
                return false;
            }
        }
        true
    }
}
