use std::time::Duration;

pub const NCBI_EUTILS_HOST: &str = "eutils.ncbi.nlm.nih.gov";
pub const EBI_HOST: &str = "www.ebi.ac.uk";
pub const RCSB_SEARCH_HOST: &str = "search.rcsb.org";

/// Minimum spacing between consecutive requests to one upstream host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPolicy {
    pub domain: String,
    pub min_interval: Duration,
}

impl DomainPolicy {
    pub fn new(domain: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            min_interval,
        }
    }

    /// Interval equivalent to a requests-per-second budget.
    pub fn per_second(domain: impl Into<String>, requests_per_second: u32) -> Self {
        let interval = Duration::from_secs(1) / requests_per_second.max(1);
        Self::new(domain, interval)
    }

    /// NCBI E-utilities: 10 requests per second.
    pub fn ncbi_default() -> Self {
        Self::per_second(NCBI_EUTILS_HOST, 10)
    }

    /// EBI (ChEMBL, Europe PMC): 2 requests per second.
    pub fn ebi_default() -> Self {
        Self::per_second(EBI_HOST, 2)
    }

    /// RCSB search: 5 requests per second.
    pub fn rcsb_search_default() -> Self {
        Self::per_second(RCSB_SEARCH_HOST, 5)
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::ncbi_default(),
            Self::ebi_default(),
            Self::rcsb_search_default(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_intervals_match_published_limits() {
        let policies = DomainPolicy::defaults();

        assert_eq!(
            policies,
            vec![
                DomainPolicy::new("eutils.ncbi.nlm.nih.gov", Duration::from_millis(100)),
                DomainPolicy::new("www.ebi.ac.uk", Duration::from_millis(500)),
                DomainPolicy::new("search.rcsb.org", Duration::from_millis(200)),
            ]
        );
    }

    #[test]
    fn domain_names_are_lowercased() {
        let policy = DomainPolicy::new("Search.RCSB.org", Duration::from_millis(1));
        assert_eq!(policy.domain, "search.rcsb.org");
    }
}
