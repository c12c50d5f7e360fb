use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data_source::{SourceError, SourceId};
use crate::scoring::{Assessment, ScoreBreakdown};
use crate::{CoreError, GeneSymbol, Inhibitor, LiteratureRecord, PotencyFilters, StructureRecord, UtcDateTime};

/// A source that contributed nothing to a report because it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub code: String,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(source: SourceId, error: &SourceError) -> Self {
        Self {
            source,
            code: error.code().to_owned(),
            message: error.message().to_owned(),
        }
    }
}

/// Aggregated evidence and druggability score for one gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub gene_symbol: GeneSymbol,
    pub target_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub assessment: Assessment,
    pub literature: Vec<LiteratureRecord>,
    pub inhibitors: Vec<Inhibitor>,
    pub structures: Vec<StructureRecord>,
    pub filters: PotencyFilters,
    pub source_failures: Vec<SourceFailure>,
    pub timestamp: UtcDateTime,
    pub summary: Option<String>,
}

impl TargetReport {
    /// Attach externally generated summary text; every other field stays as scored.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn best_potency_nm(&self) -> Option<f64> {
        self.inhibitors
            .iter()
            .map(Inhibitor::value_nm)
            .min_by(f64::total_cmp)
    }
}

/// Ranked reports for several genes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTargetReport {
    pub targets: Vec<TargetReport>,
    pub summary_text: String,
    pub filters: PotencyFilters,
    pub timestamp: UtcDateTime,
}

impl MultiTargetReport {
    /// Persist the report as pretty-printed JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn gene_symbols(&self) -> Vec<&str> {
        self.targets
            .iter()
            .map(|target| target.gene_symbol.as_str())
            .collect()
    }
}

/// Sort reports by descending score; equal scores keep their input order.
pub fn rank_targets(mut targets: Vec<TargetReport>) -> Vec<TargetReport> {
    targets.sort_by(|left, right| right.target_score.total_cmp(&left.target_score));
    targets
}
