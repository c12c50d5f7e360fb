//! Druggability scoring.
//!
//! | Component | Points |
//! |-----------|--------|
//! | Literature volume | 0 - 3 |
//! | Best potency | 0 - 2 |
//! | Inhibitor count | 0 - 1 |
//! | Mean inhibitor quality | 0 - 1 |
//! | Structures present | 0 or 1 |
//! | Mean structure quality | 0 - 1 |
//! | Ligand-bound structure | 0 or 1 |
//!
//! The total is capped at [`MAX_TARGET_SCORE`].

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{Inhibitor, LiteratureRecord, StructureRecord};

pub const MAX_TARGET_SCORE: f64 = 10.0;

/// Per-component contributions to a target score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub literature: f64,
    pub potency: f64,
    pub inhibitor_count: f64,
    pub inhibitor_quality: f64,
    pub structure_presence: f64,
    pub structure_quality: f64,
    pub ligand_bound: f64,
    pub total: f64,
}

/// Qualitative tier of a target score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    Excellent,
    Good,
    Moderate,
    Challenging,
    Poor,
}

impl Assessment {
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Self::Excellent
        } else if score >= 6.0 {
            Self::Good
        } else if score >= 4.0 {
            Self::Moderate
        } else if score >= 2.0 {
            Self::Challenging
        } else {
            Self::Poor
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent drug target",
            Self::Good => "Good drug target",
            Self::Moderate => "Moderate drug target",
            Self::Challenging => "Challenging drug target",
            Self::Poor => "Poor drug target",
        }
    }
}

impl Display for Assessment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

fn literature_points(count: usize) -> f64 {
    match count {
        20.. => 3.0,
        10.. => 2.0,
        5.. => 1.0,
        1.. => 0.5,
        0 => 0.0,
    }
}

fn potency_points(best_nm: f64) -> f64 {
    if best_nm <= 1.0 {
        2.0
    } else if best_nm <= 10.0 {
        1.5
    } else if best_nm <= 50.0 {
        1.0
    } else if best_nm <= 100.0 {
        0.5
    } else {
        0.0
    }
}

fn inhibitor_count_points(count: usize) -> f64 {
    match count {
        10.. => 1.0,
        5.. => 0.5,
        _ => 0.0,
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let len = values.len();
    if len == 0 {
        return 0.0;
    }
    values.sum::<f64>() / len as f64
}

/// Score a target's evidence. Pure and deterministic.
pub fn score_target(
    literature: &[LiteratureRecord],
    inhibitors: &[Inhibitor],
    structures: &[StructureRecord],
) -> ScoreBreakdown {
    let mut breakdown = ScoreBreakdown {
        literature: literature_points(literature.len()),
        ..ScoreBreakdown::default()
    };

    if let Some(best) = inhibitors.iter().map(Inhibitor::value_nm).min_by(f64::total_cmp) {
        breakdown.potency = potency_points(best);
        breakdown.inhibitor_count = inhibitor_count_points(inhibitors.len());
        breakdown.inhibitor_quality = mean(inhibitors.iter().map(Inhibitor::quality_score));
    }

    if !structures.is_empty() {
        breakdown.structure_presence = 1.0;
        breakdown.structure_quality = mean(structures.iter().map(|s| s.quality_score));
        if structures.iter().any(StructureRecord::has_ligands) {
            breakdown.ligand_bound = 1.0;
        }
    }

    let sum = breakdown.literature
        + breakdown.potency
        + breakdown.inhibitor_count
        + breakdown.inhibitor_quality
        + breakdown.structure_presence
        + breakdown.structure_quality
        + breakdown.ligand_bound;
    breakdown.total = if sum.is_nan() {
        0.0
    } else {
        sum.clamp(0.0, MAX_TARGET_SCORE)
    };
    breakdown
}
