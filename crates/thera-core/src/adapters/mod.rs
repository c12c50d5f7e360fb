mod bioactivity;
mod literature;
mod structure;

pub use bioactivity::{
    activity_quality, convert_to_nm, rank_inhibitors, BioactivityAdapter, ACTIVITY_TYPES,
    CHEMBL_BASE_URL,
};
pub use literature::{
    literature_query, parse_pubmed_xml, LiteratureAdapter, EFETCH_URL, ESEARCH_URL,
    EUROPE_PMC_SEARCH_URL,
};
pub use structure::{
    curated_structures, structure_quality, StructureAdapter, BUFFER_COMPONENTS,
    MIN_STRUCTURE_QUALITY, RCSB_ENTRY_URL, RCSB_SEARCH_URL,
};
