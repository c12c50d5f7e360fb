//! Contracts for the components that live outside the core.
//!
//! Query parsing, disease-to-target mapping and narrative summaries are
//! supplied by embedders. The core only ships [`PlainSummarizer`], used when no
//! summarizer is configured.

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::scoring::Assessment;
use crate::{CoreError, GeneSymbol, PotencyFilters, TargetReport, ValidationError};

pub type CollaboratorFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CoreError>> + Send + 'a>>;

/// Structure quality at or above which a structure counts as high quality.
pub const HIGH_QUALITY_STRUCTURE: f64 = 0.7;

/// A gene proposed for a disease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCandidate {
    pub gene_symbol: GeneSymbol,
    pub rationale: String,
    pub confidence: f64,
    pub clinical_stage: Option<String>,
    pub pathway: Option<String>,
}

/// Structured form of a free-text request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub gene_symbols: Vec<GeneSymbol>,
    pub min_ic50_nm: Option<f64>,
    pub max_ic50_nm: Option<f64>,
    pub is_disease_query: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disease_name: Option<String>,
}

impl ParsedQuery {
    pub fn for_genes(gene_symbols: Vec<GeneSymbol>) -> Self {
        Self {
            gene_symbols,
            ..Self::default()
        }
    }

    pub fn for_disease(disease_name: impl Into<String>) -> Self {
        Self {
            is_disease_query: true,
            disease_name: Some(disease_name.into()),
            ..Self::default()
        }
    }

    pub fn with_potency(mut self, min_ic50_nm: Option<f64>, max_ic50_nm: Option<f64>) -> Self {
        self.min_ic50_nm = min_ic50_nm;
        self.max_ic50_nm = max_ic50_nm;
        self
    }

    pub fn filters(&self) -> Result<PotencyFilters, ValidationError> {
        PotencyFilters::new(self.min_ic50_nm, self.max_ic50_nm)
    }
}

/// Maps a disease name to candidate targets.
pub trait DiseaseMapper: Send + Sync {
    fn map_disease<'a>(&'a self, disease: &'a str) -> CollaboratorFuture<'a, Vec<TargetCandidate>>;
}

/// Turns free text into a [`ParsedQuery`].
pub trait QueryParser: Send + Sync {
    fn parse<'a>(&'a self, query: &'a str) -> CollaboratorFuture<'a, ParsedQuery>;
}

/// Produces human-readable summary text for reports.
pub trait ReportSummarizer: Send + Sync {
    fn summarize_target<'a>(&'a self, report: &'a TargetReport) -> CollaboratorFuture<'a, String>;

    /// `reports` are already ranked, best first.
    fn summarize_targets<'a>(&'a self, reports: &'a [TargetReport]) -> CollaboratorFuture<'a, String>;
}

/// Deterministic text summaries built from report fields alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSummarizer;

impl PlainSummarizer {
    pub fn target_summary(report: &TargetReport) -> String {
        let mut text = String::new();
        let _ = writeln!(
            text,
            "{} Target Analysis (Score: {:.1}/10.0)",
            report.gene_symbol, report.target_score
        );
        let _ = writeln!(text, "Assessment: {}", report.assessment);
        let _ = writeln!(text, "Literature: {} papers", report.literature.len());
        let _ = writeln!(text, "Inhibitors: {} compounds", report.inhibitors.len());
        match report.best_potency_nm() {
            Some(best) => {
                let _ = writeln!(text, "Best inhibitor: {best:.2} nM");
            }
            None => {
                let _ = writeln!(text, "No inhibitors found");
            }
        }

        let high_quality = report
            .structures
            .iter()
            .filter(|s| s.quality_score >= HIGH_QUALITY_STRUCTURE)
            .count();
        let ligand_bound = report.structures.iter().filter(|s| s.has_ligands()).count();
        let _ = write!(
            text,
            "Structures: {} structures ({high_quality} high-quality (>=0.7), {ligand_bound} ligand-bound)",
            report.structures.len()
        );

        for failure in &report.source_failures {
            let _ = write!(text, "\nUnavailable: {} ({})", failure.source, failure.code);
        }
        text
    }

    pub fn multi_target_summary(reports: &[TargetReport]) -> String {
        if reports.is_empty() {
            return String::from("No targets successfully analyzed");
        }

        let average = reports.iter().map(|r| r.target_score).sum::<f64>() / reports.len() as f64;
        let mut text = String::from("Multi-Target Analysis Summary\n");
        let _ = writeln!(text, "Targets analyzed: {}", reports.len());
        let _ = write!(text, "Average score: {average:.1}/10.0");

        for (rank, report) in reports.iter().enumerate() {
            let _ = write!(
                text,
                "\n{}. {}: {:.1}/10.0 ({})",
                rank + 1,
                report.gene_symbol,
                report.target_score,
                report.assessment
            );
        }

        let groups = [
            ("Excellent targets", &[Assessment::Excellent][..]),
            ("Good targets", &[Assessment::Good][..]),
            ("Challenging targets", &[Assessment::Moderate, Assessment::Challenging, Assessment::Poor][..]),
        ];
        for (heading, tiers) in groups {
            let genes: Vec<&str> = reports
                .iter()
                .filter(|r| tiers.contains(&r.assessment))
                .map(|r| r.gene_symbol.as_str())
                .collect();
            if !genes.is_empty() {
                let _ = write!(text, "\n{heading}: {}", genes.join(", "));
            }
        }
        text
    }
}

impl ReportSummarizer for PlainSummarizer {
    fn summarize_target<'a>(&'a self, report: &'a TargetReport) -> CollaboratorFuture<'a, String> {
        Box::pin(async move { Ok(Self::target_summary(report)) })
    }

    fn summarize_targets<'a>(&'a self, reports: &'a [TargetReport]) -> CollaboratorFuture<'a, String> {
        Box::pin(async move { Ok(Self::multi_target_summary(reports)) })
    }
}
