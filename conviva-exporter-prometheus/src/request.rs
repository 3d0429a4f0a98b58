//! Upstream request construction.

use std::fmt;

use reqwest::Url;

use crate::catalog::{ApiVersion, MetricCatalog};
use crate::config::ConvivaConfig;
use crate::error::{Result, ScrapeError};

/// Minutes of real-time data requested from the v3 API.
const V3_WINDOW_MINUTES: &str = "2";
/// Bucket size of the v3 time series.
const V3_GRANULARITY: &str = "PT1M";
/// The v2 metric family returning per-dimension tables.
const V2_METRIC_FAMILY: &str = "quality_metriclens";

/// A query against the Conviva metrics API.
///
/// Identifiers are passed through as opaque strings; a malformed filter or
/// dimension is only rejected by the API itself.
#[derive(Clone)]
pub struct UpstreamQuery {
    base_url: String,
    api_version: String,
    version: ApiVersion,
    filter_ids: Vec<String>,
    dimension: String,
    client_id: String,
    client_secret: String,
    /// Metric names in the form the API generation expects.
    metrics: Vec<String>,
}

impl fmt::Debug for UpstreamQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamQuery")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("filter_ids", &self.filter_ids)
            .field("dimension", &self.dimension)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl UpstreamQuery {
    /// Create a query requesting every metric of the catalog.
    pub fn new(config: &ConvivaConfig, catalog: &MetricCatalog) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
            version: catalog.version(),
            filter_ids: config.filter_ids.clone(),
            dimension: config.dimension.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            metrics: catalog
                .iter()
                .map(|def| match catalog.version() {
                    ApiVersion::V2 => def.key.to_string(),
                    ApiVersion::V3 => def.query_name(),
                })
                .collect(),
        }
    }

    /// Filters requested by this query.
    pub fn filter_ids(&self) -> &[String] {
        &self.filter_ids
    }

    /// Build the full request URL.
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ScrapeError::Request(format!("{}: {}", self.base_url, e)))?;

        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ScrapeError::Request(format!("{} cannot be a base URL", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["insights", self.api_version.as_str()]);

            match self.version {
                ApiVersion::V2 => {
                    segments.push("metrics.json");
                }
                ApiVersion::V3 => {
                    segments
                        .extend(["real-time-metrics", "custom-selection", "group-by"])
                        .push(&self.dimension);
                }
            }
        }

        {
            let mut query = url.query_pairs_mut();
            match self.version {
                ApiVersion::V2 => {
                    query
                        .append_pair("metrics", V2_METRIC_FAMILY)
                        .append_pair("filter_ids", &self.filter_ids.join(","))
                        .append_pair("metriclens_dimension_id", &self.dimension)
                        .append_pair("metriclens_metrics", &self.metrics.join(","));
                }
                ApiVersion::V3 => {
                    query
                        .append_pair("minutes", V3_WINDOW_MINUTES)
                        .append_pair("granularity", V3_GRANULARITY);
                    for filter_id in &self.filter_ids {
                        query.append_pair("filter_id", filter_id);
                    }
                    for metric in &self.metrics {
                        query.append_pair("metric", metric);
                    }
                }
            }
        }

        Ok(url)
    }

    /// Build the authenticated GET request.
    pub fn build(&self, client: &reqwest::Client) -> Result<reqwest::Request> {
        client
            .get(self.url()?)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .build()
            .map_err(|e| ScrapeError::Request(e.to_string()))
    }
}
