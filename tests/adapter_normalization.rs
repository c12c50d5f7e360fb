//! Behavior-driven tests for source adapters
//!
//! These tests verify HOW upstream payloads from PubMed, Europe PMC, ChEMBL
//! and RCSB are normalized, filtered and ranked, and how each adapter falls
//! back when an upstream fails.

use std::sync::Arc;

use serde_json::json;
use thera_core::adapters::{
    convert_to_nm, CHEMBL_BASE_URL, EFETCH_URL, ESEARCH_URL, EUROPE_PMC_SEARCH_URL,
    RCSB_ENTRY_URL, RCSB_SEARCH_URL,
};
use thera_core::{
    BioactivityAdapter, CacheStore, FetchConstraints, GeneSymbol, HttpError, HttpGateway,
    HttpResponse, LigandLookup, LiteratureAdapter, LiteratureSource, NormalizationError,
    PotencyFilters, RateLimiter, RetryConfig, ScriptedHttpClient, SourceAdapter, SourceErrorKind,
    SourceId, StructureAdapter,
};

const PUBMED_XML: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">111</PMID>
      <Article>
        <Journal><Title>Journal of Oncology</Title></Journal>
        <ArticleTitle>Third-generation EGFR inhibitors</ArticleTitle>
        <Abstract><AbstractText>Osimertinib overcomes T790M.</AbstractText></Abstract>
        <AuthorList><Author><LastName>Doe</LastName><ForeName>Jane</ForeName></Author></AuthorList>
        <ArticleDate><Year>2023</Year><Month>05</Month><Day>14</Day></ArticleDate>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">222</PMID>
      <Article><ArticleTitle>EGFR exon 20 insertions</ArticleTitle></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

fn gateway(client: &Arc<ScriptedHttpClient>) -> Arc<HttpGateway> {
    Arc::new(
        HttpGateway::new(client.clone(), CacheStore::memory(), RateLimiter::unthrottled())
            .with_retry(RetryConfig::no_retry()),
    )
}

fn gene(symbol: &str) -> GeneSymbol {
    GeneSymbol::parse(symbol).expect("valid gene")
}

fn europe_pmc_page() -> HttpResponse {
    HttpResponse::ok_json(
        json!({
            "resultList": {"result": [
                {
                    "pmid": "999",
                    "title": "EGFR inhibitor review",
                    "abstractText": "A review.",
                    "authorList": {"author": [{"fullName": "Smith J"}]},
                    "journalTitle": "Nature Reviews",
                    "firstPublicationDate": "2022-03-01",
                    "citedByCount": 12,
                    "doi": "10.1000/egfr"
                },
                {"id": "PPR1", "title": ""}
            ]}
        })
        .to_string(),
    )
}

// =============================================================================
// Literature: PubMed with Europe PMC fallback
// =============================================================================

#[tokio::test]
async fn when_pubmed_answers_articles_are_normalized_from_xml() {
    // Given: PubMed returns two PMIDs and their efetch XML
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(
                ESEARCH_URL,
                Ok(HttpResponse::ok_json(r#"{"esearchresult":{"idlist":["111","222"]}}"#)),
            )
            .on_get(EFETCH_URL, Ok(HttpResponse::ok_xml(PUBMED_XML))),
    );
    let adapter = LiteratureAdapter::new(gateway(&client));

    // When: Literature for EGFR is fetched
    let records = adapter
        .fetch(&gene("EGFR"), &FetchConstraints::default())
        .await
        .expect("literature");

    // Then: Both articles are mapped and Europe PMC is never consulted
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "111");
    assert_eq!(records[0].authors, vec![String::from("Jane Doe")]);
    assert_eq!(records[0].journal, "Journal of Oncology");
    assert_eq!(records[0].pub_date, "2023-05-14");
    assert_eq!(records[1].abstract_text, "");
    assert!(records.iter().all(|r| r.source == LiteratureSource::PubMed));
    assert_eq!(client.request_count(EUROPE_PMC_SEARCH_URL), 0);

    let search = &client.requests()[0];
    assert!(search.url.contains("term=EGFR%20inhibitors"));
    assert!(search.url.contains("retmax=20"));
}

#[tokio::test]
async fn when_api_key_is_configured_both_eutils_calls_carry_it() {
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(
                ESEARCH_URL,
                Ok(HttpResponse::ok_json(r#"{"esearchresult":{"idlist":["111"]}}"#)),
            )
            .on_get(EFETCH_URL, Ok(HttpResponse::ok_xml(PUBMED_XML))),
    );
    let adapter = LiteratureAdapter::new(gateway(&client)).with_api_key(Some(String::from("k123")));

    adapter.search("EGFR inhibitors").await.expect("literature");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|request| request.url.contains("api_key=k123")));
}

#[tokio::test]
async fn when_pubmed_finds_nothing_europe_pmc_is_used() {
    // Given: An empty PubMed search and a Europe PMC page with one usable hit
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(ESEARCH_URL, Ok(HttpResponse::ok_json(r#"{"esearchresult":{"idlist":[]}}"#)))
            .on_get(EUROPE_PMC_SEARCH_URL, Ok(europe_pmc_page())),
    );
    let adapter = LiteratureAdapter::new(gateway(&client));

    // When: Literature is fetched
    let records = adapter
        .fetch(&gene("EGFR"), &FetchConstraints::default())
        .await
        .expect("literature");

    // Then: The Europe PMC record is returned and the untitled one dropped
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, "999");
    assert_eq!(record.source, LiteratureSource::EuropePmc);
    assert_eq!(record.citation_count, Some(12));
    assert_eq!(record.doi.as_deref(), Some("10.1000/egfr"));
    assert_eq!(record.authors, vec![String::from("Smith J")]);
    assert_eq!(client.request_count(EFETCH_URL), 0);
}

#[tokio::test]
async fn when_pubmed_fails_europe_pmc_is_used() {
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(ESEARCH_URL, Ok(HttpResponse::status(500)))
            .on_get(EUROPE_PMC_SEARCH_URL, Ok(europe_pmc_page())),
    );
    let adapter = LiteratureAdapter::new(gateway(&client));

    let records = adapter.search("EGFR inhibitors").await.expect("fallback");

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source, LiteratureSource::EuropePmc);
}

#[tokio::test]
async fn when_every_literature_upstream_fails_source_is_unavailable() {
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_get(ESEARCH_URL, Err(HttpError::connect("refused")))
            .on_get(EUROPE_PMC_SEARCH_URL, Ok(HttpResponse::status(502))),
    );
    let adapter = LiteratureAdapter::new(gateway(&client));

    let err = adapter.search("EGFR inhibitors").await.expect_err("no upstream");

    assert_eq!(err.kind(), SourceErrorKind::Unavailable);
    assert_eq!(err.code(), "source.unavailable");
}

// =============================================================================
// Bioactivity: ChEMBL
// =============================================================================

fn chembl_client(activity: HttpResponse) -> Arc<ScriptedHttpClient> {
    Arc::new(
        ScriptedHttpClient::new()
            .on_get(
                &format!("{CHEMBL_BASE_URL}/target.json"),
                Ok(HttpResponse::ok_json(
                    json!({"targets": [
                        {"target_chembl_id": "CHEMBL203", "pref_name": "Epidermal growth factor receptor erbB1"}
                    ]})
                    .to_string(),
                )),
            )
            .on_get(&format!("{CHEMBL_BASE_URL}/activity.json"), Ok(activity))
            .on_get(
                &format!("{CHEMBL_BASE_URL}/molecule.json"),
                Ok(HttpResponse::ok_json(
                    json!({"molecules": [{
                        "molecule_chembl_id": "CHEMBL939",
                        "pref_name": "GEFITINIB",
                        "max_phase": "4.0",
                        "molecule_properties": {"mw_freebase": "446.91", "alogp": "4.28", "hbd": 1, "hba": 7},
                        "molecule_structures": {"canonical_smiles": "COc1cc2ncnc(Nc3ccc(F)c(Cl)c3)c2cc1OCCCN1CCOCC1"}
                    }]})
                    .to_string(),
                )),
            ),
    )
}

fn activity_page() -> HttpResponse {
    HttpResponse::ok_json(
        json!({"activities": [
            {
                "activity_id": 1,
                "molecule_chembl_id": "CHEMBL939",
                "standard_type": "IC50",
                "standard_value": "5",
                "standard_units": "nM",
                "assay_type": "B",
                "pchembl_value": "8.30",
                "confidence_score": 9
            },
            {
                "activity_id": 2,
                "molecule_chembl_id": "CHEMBL553",
                "standard_type": "IC50",
                "standard_value": "10",
                "standard_units": "um",
                "assay_type": "F"
            },
            {
                "activity_id": 3,
                "molecule_chembl_id": "CHEMBL1",
                "standard_type": "Ki",
                "standard_value": "3",
                "standard_units": "XX"
            },
            {
                "activity_id": 4,
                "molecule_chembl_id": "CHEMBL2",
                "standard_type": "Kd",
                "standard_value": null,
                "standard_units": "nM"
            }
        ]})
        .to_string(),
    )
}

#[test]
fn concentration_units_convert_to_nanomolar() {
    assert_eq!(convert_to_nm(1.0, "uM"), Ok(1_000.0));
    assert_eq!(convert_to_nm(1.0, "pM"), Ok(0.001));
    assert_eq!(convert_to_nm(10.0, "um"), Ok(10_000.0));
    assert!(matches!(
        convert_to_nm(1.0, "XX"),
        Err(NormalizationError::UnknownUnit { .. })
    ));
}

#[tokio::test]
async fn when_max_ic50_is_set_weaker_activities_are_excluded() {
    // Given: Activities at 5 nM and 10 uM plus two unusable rows
    let client = chembl_client(activity_page());
    let adapter = BioactivityAdapter::new(gateway(&client));
    let filters = PotencyFilters::new(None, Some(100.0)).expect("filters");

    // When: Inhibitors are fetched with a 100 nM ceiling
    let inhibitors = adapter
        .fetch(&gene("EGFR"), &FetchConstraints::new(filters))
        .await
        .expect("bioactivity");

    // Then: Only the 5 nM record survives, enriched with molecule data
    assert_eq!(inhibitors.len(), 1);
    let best = &inhibitors[0];
    assert_eq!(best.molecule_id(), "CHEMBL939");
    assert_eq!(best.value_nm(), 5.0);
    assert!((best.quality_score() - 0.88).abs() < 1e-9);
    assert_eq!(best.target_name.as_deref(), Some("Epidermal growth factor receptor erbB1"));
    assert_eq!(best.molecule.name.as_deref(), Some("GEFITINIB"));
    assert_eq!(best.molecule.hba, Some(7));
    assert_eq!(best.molecule.max_phase, Some(4.0));
}

#[tokio::test]
async fn when_unfiltered_inhibitors_are_ranked_by_quality_then_potency() {
    let client = chembl_client(activity_page());
    let adapter = BioactivityAdapter::new(gateway(&client));

    let inhibitors = adapter
        .inhibitors_for(&gene("EGFR"), &PotencyFilters::unbounded())
        .await
        .expect("bioactivity");

    let ids: Vec<&str> = inhibitors.iter().map(|i| i.molecule_id()).collect();
    assert_eq!(ids, vec!["CHEMBL939", "CHEMBL553"]);
    assert_eq!(inhibitors[1].value_nm(), 10_000.0);
    assert!(inhibitors[1].molecule.name.is_none());
}

#[tokio::test]
async fn when_every_chembl_target_fails_source_is_unavailable() {
    let client = chembl_client(HttpResponse::status(500));
    let adapter = BioactivityAdapter::new(gateway(&client));

    let err = adapter
        .inhibitors_for(&gene("EGFR"), &PotencyFilters::unbounded())
        .await
        .expect_err("all targets failed");

    assert_eq!(err.kind(), SourceErrorKind::Unavailable);
}

#[tokio::test]
async fn when_no_chembl_target_matches_result_is_empty() {
    let client = Arc::new(ScriptedHttpClient::new().on_get(
        &format!("{CHEMBL_BASE_URL}/target.json"),
        Ok(HttpResponse::ok_json(r#"{"targets":[]}"#)),
    ));
    let adapter = BioactivityAdapter::new(gateway(&client));

    let inhibitors = adapter
        .inhibitors_for(&gene("NOTAGENE1"), &PotencyFilters::unbounded())
        .await
        .expect("empty is not an error");

    assert!(inhibitors.is_empty());
    assert_eq!(adapter.id(), SourceId::Bioactivity);
}

// =============================================================================
// Structure: RCSB PDB
// =============================================================================

fn entry_detail() -> HttpResponse {
    HttpResponse::ok_json(
        json!({
            "struct": {"title": "EGFR kinase domain in complex with erlotinib"},
            "exptl": [{"method": "X-RAY DIFFRACTION"}],
            "refine": [{"ls_d_res_high": 1.2}],
            "rcsb_entry_info": {
                "resolution_combined": [1.2],
                "nonpolymer_bound_components": ["AQ4", "HOH", "ANP"]
            },
            "rcsb_accession_info": {"deposit_date": "2024-01-10T00:00:00+0000"},
            "rcsb_entity_source_organism": [{"ncbi_scientific_name": "Homo sapiens"}]
        })
        .to_string(),
    )
}

#[tokio::test]
async fn when_title_search_hits_structures_are_scored_from_details() {
    // Given: A title search hit whose entry is a recent 1.2 A human X-ray with two ligands
    let client = Arc::new(
        ScriptedHttpClient::new()
            .on_post(
                RCSB_SEARCH_URL,
                Ok(HttpResponse::ok_json(r#"{"result_set":[{"identifier":"1XKK"}]}"#)),
            )
            .on_get(&format!("{RCSB_ENTRY_URL}/1XKK"), Ok(entry_detail())),
    );
    let adapter = StructureAdapter::new(gateway(&client)).with_reference_year(2025);

    // When: Structures are fetched
    let structures = adapter
        .fetch(&gene("EGFR"), &FetchConstraints::default())
        .await
        .expect("structures");

    // Then: The record carries details, buffers are excluded and the score clamps to 1.0
    assert_eq!(structures.len(), 1);
    let record = &structures[0];
    assert_eq!(record.pdb_id, "1XKK");
    assert_eq!(record.resolution, Some(1.2));
    assert_eq!(record.ligand_ids, vec![String::from("AQ4"), String::from("ANP")]);
    assert_eq!(record.organism.as_deref(), Some("Homo sapiens"));
    assert_eq!(record.quality_score, 1.0);
    assert_eq!(record.url, "https://www.rcsb.org/structure/1XKK");

    let search = &client.requests()[0];
    let body = search.body.as_deref().unwrap_or_default();
    assert!(body.contains("struct.title"));
}

#[tokio::test]
async fn when_searches_are_empty_curated_structures_are_used() {
    // Given: Both RCSB searches answer 204 and entry details are unavailable
    let client = Arc::new(ScriptedHttpClient::new().on_post(RCSB_SEARCH_URL, Ok(HttpResponse::status(204))));
    let adapter = StructureAdapter::new(gateway(&client)).with_reference_year(2025);

    // When: Structures for a curated gene are fetched
    let structures = adapter
        .structures_for(&gene("EGFR"))
        .await
        .expect("curated fallback");

    // Then: All four curated entries appear, built from their descriptions
    let ids: Vec<&str> = structures.iter().map(|s| s.pdb_id.as_str()).collect();
    assert_eq!(ids, vec!["1M17", "4HJO", "5P21", "2J5F"]);
    assert!(structures.iter().all(|s| (s.quality_score - 0.7).abs() < 1e-9));
    assert_eq!(
        structures[1].description.as_deref(),
        Some("EGFR with erlotinib inhibitor")
    );

    let search_bodies: Vec<String> = client
        .requests()
        .into_iter()
        .filter(|r| r.url.starts_with(RCSB_SEARCH_URL))
        .filter_map(|r| r.body)
        .collect();
    assert_eq!(search_bodies.len(), 2);
    assert!(search_bodies[1].contains("full_text"));
}

#[tokio::test]
async fn when_gene_has_no_structures_anywhere_result_is_empty() {
    let client = Arc::new(ScriptedHttpClient::new().on_post(
        RCSB_SEARCH_URL,
        Ok(HttpResponse::ok_json(r#"{"result_set":[]}"#)),
    ));
    let adapter = StructureAdapter::new(gateway(&client));

    let structures = adapter.structures_for(&gene("ORPHAN1")).await.expect("empty");

    assert!(structures.is_empty());
}

#[tokio::test]
async fn when_ligand_search_matches_entry_ids_are_returned() {
    let client = Arc::new(ScriptedHttpClient::new().on_post_containing(
        RCSB_SEARCH_URL,
        "text_chem",
        Ok(HttpResponse::ok_json(
            r#"{"result_set":[{"identifier":"4HJO"},{"identifier":"1M17"}]}"#,
        )),
    ));
    let adapter = StructureAdapter::new(gateway(&client));

    let entries = adapter.ligand_structures("CHEMBL553").await.expect("ligand search");

    assert_eq!(entries, vec![String::from("4HJO"), String::from("1M17")]);
    let body = client.requests()[0].body.clone().unwrap_or_default();
    assert!(body.contains("CHEMBL553"));
}
