use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyData {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
    #[serde(default)]
    pub traffic: Vec<TrafficRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Site {
    pub site_id: String,
    #[serde(default)]
    pub site_name: String,
    /// Site ids this site has an outgoing link to.
    #[serde(default)]
    pub connected: Vec<String>,
    /// Addresses of the services deployed on this site.
    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub address: String,
    /// Addresses this service sends requests to.
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_site: Option<String>,
    #[serde(default)]
    pub target_site: Option<String>,
    #[serde(default)]
    pub bytes_out: u64,
    #[serde(default)]
    pub bytes_in: u64,
    #[serde(default)]
    pub requests: u64,
}

impl Site {
    pub fn display_name(&self) -> &str {
        if self.site_name.is_empty() {
            &self.site_id
        } else {
            &self.site_name
        }
    }
}

impl TopologyData {
    pub fn parse(json: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn site(&self, site_id: &str) -> Option<&Site> {
        self.sites.iter().find(|site| site.site_id == site_id)
    }

    pub fn service(&self, address: &str) -> Option<&ServiceRecord> {
        self.services.iter().find(|svc| svc.address == address)
    }

    /// First site a service is deployed on. Traffic records without site
    /// information are attributed to it.
    fn home_site(&self, address: &str) -> Option<&str> {
        self.sites
            .iter()
            .find(|site| site.services.iter().any(|svc| svc == address))
            .map(|site| site.site_id.as_str())
    }

    /// Aggregated counters for every record from `source` to `target`,
    /// optionally narrowed to a pair of sites. A record without a site on
    /// one end only counts for that service's first deployment.
    pub fn link_request(
        &self,
        source: &str,
        target: &str,
        sites: Option<(&str, &str)>,
    ) -> RequestTotals {
        let mut totals = RequestTotals::default();
        for record in &self.traffic {
            if record.source != source || record.target != target {
                continue;
            }
            if let Some((from_site, to_site)) = sites {
                let (source_site, target_site) = self.record_sites(record);
                if source_site.is_some_and(|s| s != from_site)
                    || target_site.is_some_and(|s| s != to_site)
                {
                    continue;
                }
            }
            totals.add(record);
        }
        totals
    }

    /// Counters summed over every record whose endpoints are deployed on
    /// `from_site` and `to_site` respectively.
    pub fn site_request(&self, from_site: &str, to_site: &str) -> RequestTotals {
        let mut totals = RequestTotals::default();
        for record in &self.traffic {
            if self.record_sites(record) == (Some(from_site), Some(to_site)) {
                totals.add(record);
            }
        }
        totals
    }

    fn record_sites<'a>(&'a self, record: &'a TrafficRecord) -> (Option<&'a str>, Option<&'a str>) {
        let source = record
            .source_site
            .as_deref()
            .or_else(|| self.home_site(&record.source));
        let target = record
            .target_site
            .as_deref()
            .or_else(|| self.home_site(&record.target));
        (source, target)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTotals {
    pub bytes_out: u64,
    pub bytes_in: u64,
    pub requests: u64,
}

impl RequestTotals {
    fn add(&mut self, record: &TrafficRecord) {
        self.bytes_out += record.bytes_out;
        self.bytes_in += record.bytes_in;
        self.requests += record.requests;
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_out == 0 && self.bytes_in == 0 && self.requests == 0
    }
}
