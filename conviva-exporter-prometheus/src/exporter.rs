//! The fetch-parse-emit cycle run for every scrape.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::MetricCatalog;
use crate::config::{ConfigError, ConvivaConfig, ExporterConfig};
use crate::emitter::{Emitter, Exposition};
use crate::error::Result;
use crate::model::ScrapeResult;
use crate::parser::ResponseParser;
use crate::request::UpstreamQuery;

const USER_AGENT: &str = concat!("conviva-exporter-prometheus/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used to reach the Conviva API.
///
/// Certificate validation follows `insecure_skip_verify`. No timeout is set,
/// so a scrape waits as long as the upstream call does.
pub fn build_http_client(config: &ConvivaConfig) -> std::result::Result<reqwest::Client, ConfigError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .build()?;
    Ok(client)
}

/// Queries the Conviva API on demand and turns the answer into gauges.
///
/// Holds only read-only state, so concurrent scrapes share one instance.
#[derive(Debug)]
pub struct Exporter {
    client: reqwest::Client,
    query: UpstreamQuery,
    parser: ResponseParser,
    emitter: Emitter,
}

/// Create a shareable exporter handle.
pub type SharedExporter = Arc<Exporter>;

impl Exporter {
    /// Create an exporter with an HTTP client built from the configuration.
    pub fn new(config: &ExporterConfig) -> std::result::Result<Self, ConfigError> {
        let client = build_http_client(&config.conviva)?;
        Self::with_client(config, client)
    }

    /// Create an exporter using the given HTTP client.
    pub fn with_client(
        config: &ExporterConfig,
        client: reqwest::Client,
    ) -> std::result::Result<Self, ConfigError> {
        let catalog = Arc::new(MetricCatalog::for_version(config.conviva.version()?));
        let query = UpstreamQuery::new(&config.conviva, &catalog);
        let parser = ResponseParser::new(catalog.clone(), query.filter_ids().to_vec());
        let emitter = Emitter::new(catalog, &config.prometheus.prefix);

        Ok(Self {
            client,
            query,
            parser,
            emitter,
        })
    }

    /// Fetch and parse one API response.
    pub async fn scrape(&self) -> Result<ScrapeResult> {
        let request = self.query.build(&self.client)?;
        debug!(url = %request.url(), "Querying Conviva API");

        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        self.parser.parse(status, &body)
    }

    /// Run one scrape and produce the samples to expose.
    ///
    /// Never fails: a failed scrape is reported through the liveness gauge.
    pub async fn collect(&self) -> Exposition {
        let outcome = self.scrape().await;

        match &outcome {
            Ok(result) => debug!(
                dimension = %result.dimension_title,
                rows = result.rows.len(),
                samples = result.sample_count(),
                "Scrape succeeded"
            ),
            Err(e) => warn!(error = %e, "Got error from Conviva API"),
        }

        self.emitter.exposition(&outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_config(base_url: &str) -> ExporterConfig {
        let mut config = ExporterConfig::default();
        config.conviva.base_url = base_url.to_string();
        config.conviva.client_id = "client".to_string();
        config.conviva.client_secret = "secret".to_string();
        config.conviva.filter_ids = vec!["myfilter".to_string()];
        config.conviva.dimension = "browser_name".to_string();
        config
    }

    #[tokio::test]
    async fn test_scrape_sends_authenticated_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/insights/3.0/real-time-metrics/custom-selection/group-by/browser_name",
            ))
            .and(query_param("filter_id", "myfilter"))
            .and(wiremock::matchers::header(
                "authorization",
                "Basic Y2xpZW50OnNlY3JldA==",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_meta": {"filter_info": {"id": "myfilter"}},
                "time_series": [{"dimensional_data": [
                    {"dimension": "chrome", "metrics": {"attempts": {"count": 120}}}
                ]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let exporter = Exporter::new(&make_config(&server.uri())).unwrap();
        let result = exporter.scrape().await.unwrap();

        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].samples[0].value, 120.0);
    }

    #[tokio::test]
    async fn test_collect_reports_transport_failure() {
        // Nothing listens on the discard port.
        let exporter = Exporter::new(&make_config("http://127.0.0.1:9")).unwrap();
        let exposition = exporter.collect().await;

        assert_eq!(exposition.samples().len(), 1);
        assert_eq!(exposition.liveness().unwrap().value, 0.0);
    }

    #[tokio::test]
    async fn test_scrape_transport_error_kind() {
        let exporter = Exporter::new(&make_config("http://127.0.0.1:9")).unwrap();
        let err = exporter.scrape().await.unwrap_err();

        assert!(matches!(err, crate::error::ScrapeError::Transport(_)));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut config = make_config("http://localhost");
        config.conviva.api_version = "9".to_string();

        assert!(matches!(
            Exporter::new(&config),
            Err(ConfigError::Validation(_))
        ));
    }
}
