//! # Domain Models
//!
//! Normalized record types shared by every source adapter, plus the report
//! types the coordinator produces.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GeneSymbol`] | Validated, upper-cased gene symbol |
//! | [`LiteratureRecord`] | Article metadata from PubMed or Europe PMC |
//! | [`BioactivityRecord`] | Activity value in nM with a quality score |
//! | [`Inhibitor`] | Bioactivity enriched with molecule metadata |
//! | [`StructureRecord`] | PDB entry with a quality score |
//! | [`PotencyFilters`] | Inclusive IC50 window |
//! | [`TargetReport`] | Scored evidence for one gene |
//! | [`MultiTargetReport`] | Ranked reports for several genes |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Concentrations are nanomolar everywhere and quality scores are clamped to
//! `[0, 1]` at construction.

mod gene;
mod records;
mod report;
mod timestamp;

pub use gene::GeneSymbol;
pub use records::{
    clamp_unit, BioactivityRecord, Inhibitor, LiteratureRecord, LiteratureSource,
    MoleculeProfile, NormalizedRecord, PotencyFilters, StructureRecord,
};
pub use report::{rank_targets, MultiTargetReport, SourceFailure, TargetReport};
pub use timestamp::UtcDateTime;
