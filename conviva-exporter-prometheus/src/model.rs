//! Per-scrape result model.
//!
//! A [`ScrapeResult`] is built fresh for every scrape and consumed by the
//! emitter in the same call. Nothing here outlives a scrape.

use tracing::warn;

/// Placeholder for metadata the API did not provide.
pub const UNKNOWN: &str = "Unknown";

/// One extracted metric value for one grouping value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Key of the metric definition this value belongs to.
    pub metric_key: &'static str,
    /// The dimension bucket the value is reported against.
    pub grouping_value: String,
    pub value: f64,
}

/// The samples of one response row.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRow {
    /// Filter the row was reported under.
    pub filter: String,
    /// Dimension value of the row (e.g. a browser name).
    pub grouping_value: String,
    /// Samples in metric declaration order.
    pub samples: Vec<MetricSample>,
}

/// Everything extracted from one API response.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    /// Human-readable title of the group-by dimension.
    pub dimension_title: String,
    /// Grouping-value titles: the v2 header region, or the v3 row dimensions.
    pub grouping_titles: Vec<String>,
    /// Rows in encounter order.
    pub rows: Vec<ScrapeRow>,
}

impl ScrapeResult {
    /// Total number of samples across all rows.
    pub fn sample_count(&self) -> usize {
        self.rows.iter().map(|r| r.samples.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Values extracted from one row, as `(metric key, value)` in declaration order.
pub type RowValues = Vec<(&'static str, f64)>;

/// Folds parsed rows into a [`ScrapeResult`].
#[derive(Debug)]
pub struct ScrapeResultBuilder {
    result: ScrapeResult,
}

impl ScrapeResultBuilder {
    /// Start a result for the given dimension title.
    pub fn new(dimension_title: impl Into<String>) -> Self {
        Self {
            result: ScrapeResult {
                dimension_title: dimension_title.into(),
                grouping_titles: Vec::new(),
                rows: Vec::new(),
            },
        }
    }

    /// Set the header region's grouping-value titles.
    pub fn grouping_titles(mut self, titles: Vec<String>) -> Self {
        self.result.grouping_titles = titles;
        self
    }

    /// Append a row that names its own grouping value.
    pub fn push_row(&mut self, filter: &str, grouping_value: String, values: RowValues) {
        let samples = values
            .into_iter()
            .map(|(metric_key, value)| MetricSample {
                metric_key,
                grouping_value: grouping_value.clone(),
                value,
            })
            .collect();

        self.result.rows.push(ScrapeRow {
            filter: filter.to_string(),
            grouping_value,
            samples,
        });
    }

    /// Append rows whose grouping values come from the header titles, by position.
    ///
    /// If the header and the data region disagree in length, only the common
    /// prefix is kept.
    pub fn push_positional_rows(&mut self, filter: &str, rows: Vec<RowValues>) {
        let titles = &self.result.grouping_titles;
        if rows.len() != titles.len() {
            warn!(
                filter,
                rows = rows.len(),
                titles = titles.len(),
                "Row count does not match dimension values, truncating"
            );
        }

        let pairs: Vec<(String, RowValues)> = titles.iter().cloned().zip(rows).collect();
        for (grouping_value, values) in pairs {
            self.push_row(filter, grouping_value, values);
        }
    }

    pub fn build(self) -> ScrapeResult {
        self.result
    }
}
