//! Literature adapter: PubMed E-utilities with a Europe PMC fallback.

use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::data_source::{
    first_found, FetchConstraints, SourceAdapter, SourceError, SourceFuture, SourceId,
    StrategyOutcome,
};
use crate::gateway::{GatewayRequest, HttpGateway};
use crate::{GeneSymbol, LiteratureRecord, LiteratureSource, NormalizationError};

pub const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
pub const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
pub const EUROPE_PMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";

const DEFAULT_MAX_RESULTS: usize = 20;
const SEARCH_TTL_HOURS: u64 = 6;
const FETCH_TTL_HOURS: u64 = 24;

/// Search phrase used for a gene's literature.
pub fn literature_query(gene: &GeneSymbol) -> String {
    format!("{gene} inhibitors")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteratureStrategy {
    PubMed,
    EuropePmc,
}

/// Article search over PubMed, falling back to Europe PMC.
#[derive(Debug, Clone)]
pub struct LiteratureAdapter {
    gateway: Arc<HttpGateway>,
    ncbi_api_key: Option<String>,
    max_results: usize,
}

impl LiteratureAdapter {
    pub fn new(gateway: Arc<HttpGateway>) -> Self {
        Self {
            gateway,
            ncbi_api_key: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// NCBI key sent on both E-utilities calls.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.ncbi_api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Search articles for a free-text query.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<LiteratureRecord>, SourceError> {
        let strategies = [LiteratureStrategy::PubMed, LiteratureStrategy::EuropePmc];
        let records = first_found(SourceId::Literature, &strategies, |strategy| async move {
            match strategy {
                LiteratureStrategy::PubMed => self.search_pubmed(query).await,
                LiteratureStrategy::EuropePmc => self.search_europe_pmc(query).await,
            }
        })
        .await?;
        debug!(count = records.len(), "literature search finished");
        Ok(records)
    }

    async fn search_pubmed(&self, query: &str) -> Result<StrategyOutcome<LiteratureRecord>, SourceError> {
        let search = self.with_key(
            GatewayRequest::get(ESEARCH_URL)
                .param("db", "pubmed")
                .param("term", query)
                .param("retmax", self.max_results)
                .param("retmode", "json")
                .ttl_hours(SEARCH_TTL_HOURS),
        );
        let response: ESearchResponse = decode(self.gateway.get_json(search).await?)?;
        let pmids = response.esearchresult.idlist;
        if pmids.is_empty() {
            return Ok(StrategyOutcome::NoData);
        }

        let fetch = self.with_key(
            GatewayRequest::get(EFETCH_URL)
                .param("db", "pubmed")
                .param("id", pmids.join(","))
                .param("retmode", "xml")
                .ttl_hours(FETCH_TTL_HOURS),
        );
        let xml = self.gateway.get_text(fetch).await?;
        let records = parse_pubmed_xml(&xml)
            .map_err(|error| SourceError::upstream(format!("PubMed efetch: {error}")))?;
        Ok(StrategyOutcome::from_records(records))
    }

    async fn search_europe_pmc(&self, query: &str) -> Result<StrategyOutcome<LiteratureRecord>, SourceError> {
        let request = GatewayRequest::get(EUROPE_PMC_SEARCH_URL)
            .param("query", query)
            .param("format", "json")
            .param("pageSize", self.max_results)
            .param("resultType", "core")
            .ttl_hours(SEARCH_TTL_HOURS);
        let response: EuropePmcResponse = decode(self.gateway.get_json(request).await?)?;

        let records = response
            .result_list
            .result
            .into_iter()
            .filter_map(|result| match normalize_europe_pmc(result) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(%error, "dropping Europe PMC result");
                    None
                }
            })
            .collect();
        Ok(StrategyOutcome::from_records(records))
    }

    fn with_key(&self, request: GatewayRequest) -> GatewayRequest {
        match &self.ncbi_api_key {
            Some(key) => request.param("api_key", key),
            None => request,
        }
    }
}

impl SourceAdapter for LiteratureAdapter {
    type Record = LiteratureRecord;

    fn id(&self) -> SourceId {
        SourceId::Literature
    }

    fn fetch<'a>(
        &'a self,
        gene: &'a GeneSymbol,
        _constraints: &'a FetchConstraints,
    ) -> SourceFuture<'a, Vec<LiteratureRecord>> {
        Box::pin(async move { self.search(&literature_query(gene)).await })
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, SourceError> {
    serde_json::from_value(value)
        .map_err(|error| SourceError::upstream(format!("unexpected response shape: {error}")))
}

#[derive(Debug, Default, Deserialize)]
struct ESearchResponse {
    #[serde(default)]
    esearchresult: ESearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcResponse {
    #[serde(rename = "resultList", default)]
    result_list: EuropePmcResultList,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcResultList {
    #[serde(default)]
    result: Vec<EuropePmcResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EuropePmcResult {
    pmid: Option<String>,
    id: Option<String>,
    title: Option<String>,
    abstract_text: Option<String>,
    author_list: Option<EuropePmcAuthorList>,
    journal_title: Option<String>,
    journal_info: Option<EuropePmcJournalInfo>,
    first_publication_date: Option<String>,
    cited_by_count: Option<u32>,
    doi: Option<String>,
    keyword_list: Option<EuropePmcKeywordList>,
    mesh_heading_list: Option<EuropePmcMeshHeadingList>,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcAuthorList {
    #[serde(default)]
    author: Vec<EuropePmcAuthor>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcAuthor {
    full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcJournalInfo {
    journal: Option<EuropePmcJournal>,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcJournal {
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EuropePmcKeywordList {
    #[serde(default)]
    keyword: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcMeshHeadingList {
    #[serde(default)]
    mesh_heading: Vec<EuropePmcMeshHeading>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcMeshHeading {
    descriptor_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_owned())
        .filter(|text| !text.is_empty())
}

fn normalize_europe_pmc(result: EuropePmcResult) -> Result<LiteratureRecord, NormalizationError> {
    let id = non_empty(result.pmid)
        .or_else(|| non_empty(result.id))
        .ok_or(NormalizationError::MissingField { field: "id" })?;
    let title = non_empty(result.title).ok_or(NormalizationError::MissingField { field: "title" })?;

    let journal = non_empty(result.journal_title)
        .or_else(|| non_empty(result.journal_info.and_then(|info| info.journal).and_then(|journal| journal.title)))
        .unwrap_or_default();

    Ok(LiteratureRecord {
        id,
        title,
        abstract_text: non_empty(result.abstract_text).unwrap_or_default(),
        authors: result
            .author_list
            .map(|list| {
                list.author
                    .into_iter()
                    .filter_map(|author| non_empty(author.full_name))
                    .collect()
            })
            .unwrap_or_default(),
        journal,
        pub_date: non_empty(result.first_publication_date).unwrap_or_default(),
        keywords: result
            .keyword_list
            .map(|list| list.keyword)
            .unwrap_or_default(),
        mesh_terms: result
            .mesh_heading_list
            .map(|list| {
                list.mesh_heading
                    .into_iter()
                    .filter_map(|heading| non_empty(heading.descriptor_name))
                    .collect()
            })
            .unwrap_or_default(),
        source: LiteratureSource::EuropePmc,
        doi: non_empty(result.doi),
        citation_count: result.cited_by_count,
    })
}

// Elements whose text content is collected; inline markup inside them is kept.
const CAPTURED: &[&[u8]] = &[
    b"PMID",
    b"ArticleTitle",
    b"AbstractText",
    b"ForeName",
    b"LastName",
    b"Title",
    b"Year",
    b"Month",
    b"Day",
    b"Keyword",
    b"DescriptorName",
];

#[derive(Debug, Default)]
struct ArticleDraft {
    pmid: Option<String>,
    title: String,
    abstract_sections: Vec<String>,
    authors: Vec<String>,
    journal: String,
    pub_date: Option<String>,
    keywords: Vec<String>,
    mesh_terms: Vec<String>,
}

impl ArticleDraft {
    fn finish(self) -> Result<LiteratureRecord, NormalizationError> {
        let id = self
            .pmid
            .filter(|pmid| !pmid.is_empty())
            .ok_or(NormalizationError::MissingField { field: "PMID" })?;
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(NormalizationError::MissingField {
                field: "ArticleTitle",
            });
        }

        Ok(LiteratureRecord {
            id,
            title,
            abstract_text: self.abstract_sections.join(" "),
            authors: self.authors,
            journal: self.journal,
            pub_date: self.pub_date.unwrap_or_default(),
            keywords: self.keywords,
            mesh_terms: self.mesh_terms,
            source: LiteratureSource::PubMed,
            doi: None,
            citation_count: None,
        })
    }
}

/// Parse an efetch `PubmedArticleSet`; articles without PMID or title are dropped.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<LiteratureRecord>, NormalizationError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut records = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut current: Option<ArticleDraft> = None;
    let mut section_label: Option<String> = None;
    let mut fore_name = String::new();
    let mut last_name = String::new();
    let mut date_parts: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => current = Some(ArticleDraft::default()),
                    b"AbstractText" => section_label = label_attribute(e)?,
                    b"Author" => {
                        fore_name.clear();
                        last_name.clear();
                    }
                    b"ArticleDate" => date_parts.clear(),
                    _ => {}
                }
                if CAPTURED.contains(&name.as_slice()) {
                    text.clear();
                }
                path.push(name);
            }
            Ok(Event::Text(ref e)) => {
                let unescaped = e
                    .unescape()
                    .map_err(|error| NormalizationError::Xml(error.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::End(_)) => {
                let name = path.pop().unwrap_or_default();
                let parent = path.last().map(Vec::as_slice);
                let value = text.trim();

                if name.as_slice() == b"PubmedArticle" {
                    if let Some(draft) = current.take() {
                        match draft.finish() {
                            Ok(record) => records.push(record),
                            Err(error) => warn!(%error, "dropping PubMed article"),
                        }
                    }
                } else if let Some(article) = current.as_mut() {
                    match (name.as_slice(), parent) {
                        (b"PMID", Some(b"MedlineCitation")) if article.pmid.is_none() => {
                            article.pmid = Some(value.to_owned());
                        }
                        (b"ArticleTitle", _) => article.title = value.to_owned(),
                        (b"AbstractText", Some(b"Abstract")) => {
                            let section = match section_label.take() {
                                Some(label) if value.is_empty() => label,
                                Some(label) => format!("{label}: {value}"),
                                None => value.to_owned(),
                            };
                            if !section.is_empty() {
                                article.abstract_sections.push(section);
                            }
                        }
                        (b"ForeName", Some(b"Author")) => fore_name = value.to_owned(),
                        (b"LastName", Some(b"Author")) => last_name = value.to_owned(),
                        (b"Author", Some(b"AuthorList")) if !last_name.is_empty() => {
                            article
                                .authors
                                .push(format!("{fore_name} {last_name}").trim().to_owned());
                        }
                        (b"Title", Some(b"Journal")) => article.journal = value.to_owned(),
                        (b"Year" | b"Month" | b"Day", Some(b"ArticleDate")) if !value.is_empty() => {
                            date_parts.push(value.to_owned());
                        }
                        (b"ArticleDate", _) if article.pub_date.is_none() => {
                            article.pub_date = Some(date_parts.join("-"));
                        }
                        (b"Keyword", Some(b"KeywordList")) if !value.is_empty() => {
                            article.keywords.push(value.to_owned());
                        }
                        (b"DescriptorName", Some(b"MeshHeading")) if !value.is_empty() => {
                            article.mesh_terms.push(value.to_owned());
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(NormalizationError::Xml(error.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn label_attribute(element: &BytesStart<'_>) -> Result<Option<String>, NormalizationError> {
    let attribute = element
        .try_get_attribute("Label")
        .map_err(|error| NormalizationError::Xml(error.to_string()))?;
    match attribute {
        Some(attribute) => {
            let label = attribute
                .unescape_value()
                .map_err(|error| NormalizationError::Xml(error.to_string()))?;
            let label = label.trim();
            Ok((!label.is_empty()).then(|| label.to_owned()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ARTICLE_SET: &str = r#"<?xml version="1.0"?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000001</PMID>
      <Article>
        <Journal><Title>Journal of Medicinal Chemistry</Title></Journal>
        <ArticleTitle>Targeting <i>EGFR</i> T790M &amp; beyond</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">Resistance is common.</AbstractText>
          <AbstractText Label="RESULTS">Compound 7 was potent.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Lovelace</LastName><ForeName>Ada</ForeName></Author>
          <Author><CollectiveName>EGFR Consortium</CollectiveName></Author>
        </AuthorList>
        <ArticleDate DateType="Electronic"><Year>2024</Year><Month>03</Month><Day>15</Day></ArticleDate>
      </Article>
      <KeywordList><Keyword>kinase</Keyword><Keyword>NSCLC</Keyword></KeywordList>
      <MeshHeadingList>
        <MeshHeading><DescriptorName UI="D066246">ErbB Receptors</DescriptorName></MeshHeading>
      </MeshHeadingList>
      <CommentsCorrectionsList>
        <CommentsCorrections><PMID Version="1">11111111</PMID></CommentsCorrections>
      </CommentsCorrectionsList>
    </MedlineCitation>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">38000002</PMID>
      <Article><Journal><Title>Orphan</Title></Journal></Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_structured_pubmed_article() {
        let records = parse_pubmed_xml(ARTICLE_SET).expect("parse");

        assert_eq!(records.len(), 1, "article without a title is dropped");
        let record = &records[0];
        assert_eq!(record.id, "38000001");
        assert_eq!(record.title, "Targeting EGFR T790M & beyond");
        assert_eq!(
            record.abstract_text,
            "BACKGROUND: Resistance is common. RESULTS: Compound 7 was potent."
        );
        assert_eq!(record.authors, vec![String::from("Ada Lovelace")]);
        assert_eq!(record.journal, "Journal of Medicinal Chemistry");
        assert_eq!(record.pub_date, "2024-03-15");
        assert_eq!(record.keywords, vec!["kinase", "NSCLC"]);
        assert_eq!(record.mesh_terms, vec!["ErbB Receptors"]);
        assert_eq!(record.source, LiteratureSource::PubMed);
    }

    #[test]
    fn malformed_xml_is_a_normalization_error() {
        let err = parse_pubmed_xml("<PubmedArticleSet><PubmedArticle></Oops>").expect_err("must fail");
        assert!(matches!(err, NormalizationError::Xml(_)));
    }

    #[test]
    fn europe_pmc_result_falls_back_to_id_and_nested_journal() {
        let result: EuropePmcResult = serde_json::from_value(json!({
            "id": "PPR12345",
            "title": "JAK2 inhibitors in myelofibrosis",
            "abstractText": "Ruxolitinib ...",
            "authorList": {"author": [{"fullName": "Doe J"}, {"lastName": "NoFullName"}]},
            "journalInfo": {"journal": {"title": "Blood"}},
            "firstPublicationDate": "2023-11-02",
            "citedByCount": 12,
            "doi": "10.1000/xyz"
        }))
        .expect("schema");

        let record = normalize_europe_pmc(result).expect("normalize");

        assert_eq!(record.id, "PPR12345");
        assert_eq!(record.journal, "Blood");
        assert_eq!(record.authors, vec![String::from("Doe J")]);
        assert_eq!(record.citation_count, Some(12));
        assert_eq!(record.doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(record.source, LiteratureSource::EuropePmc);
    }

    #[test]
    fn europe_pmc_result_without_title_is_rejected() {
        let err = normalize_europe_pmc(EuropePmcResult {
            pmid: Some(String::from("1")),
            ..EuropePmcResult::default()
        })
        .expect_err("must fail");
        assert_eq!(err, NormalizationError::MissingField { field: "title" });
    }
}
