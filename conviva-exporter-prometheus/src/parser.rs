//! Parsing of Conviva API responses into a [`ScrapeResult`].
//!
//! Both API generations share the same shape: a header region with titles
//! (and, for v2, a warm-up flag) and a repeated data region with one entry
//! per dimension value. Values are read with the [`Selector`] of each
//! metric definition, so the row walk is the same for both generations.
//!
//! Parsing is lenient below the document level: missing titles fall back to
//! [`UNKNOWN`], and a metric value that cannot be read drops only that
//! sample.
//!
//! [`Selector`]: crate::catalog::Selector

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::catalog::{ApiVersion, MetricCatalog};
use crate::error::{Result, ScrapeError};
use crate::model::{RowValues, ScrapeResult, ScrapeResultBuilder, UNKNOWN};

/// Parser for responses of the configured API generation.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    catalog: Arc<MetricCatalog>,
    filter_ids: Vec<String>,
}

impl ResponseParser {
    /// Create a parser for responses to a query on `filter_ids`.
    pub fn new(catalog: Arc<MetricCatalog>, filter_ids: Vec<String>) -> Self {
        Self {
            catalog,
            filter_ids,
        }
    }

    /// Parse a raw response.
    pub fn parse(&self, status: u16, body: &[u8]) -> Result<ScrapeResult> {
        if status != 200 {
            return Err(ScrapeError::upstream(status, self.error_reason(body)));
        }

        let doc: Value = serde_json::from_slice(body)?;

        match self.catalog.version() {
            ApiVersion::V2 => self.parse_v2(&doc),
            ApiVersion::V3 => Ok(self.parse_v3(&doc)),
        }
    }

    /// Human-readable reason of an error response, or the raw body.
    fn error_reason(&self, body: &[u8]) -> String {
        let field = match self.catalog.version() {
            ApiVersion::V2 => "reason",
            ApiVersion::V3 => "name",
        };

        serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|doc| doc.get(field).and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
    }

    fn parse_v3(&self, doc: &Value) -> ScrapeResult {
        let dimension_title = title_at(doc, "/_meta/group_by_dimension/description");
        let filter = title_at(doc, "/_meta/filter_info/id");
        debug!(dimension = %dimension_title, filter = %filter, "Parsing v3 response");

        let rows = doc
            .pointer("/time_series/0/dimensional_data")
            .and_then(Value::as_array);

        let mut parsed = Vec::new();
        for (index, row) in rows.into_iter().flatten().enumerate() {
            let Some(grouping_value) = row.get("dimension").and_then(dimension_value) else {
                warn!(index, "Skipping row without a dimension value");
                continue;
            };

            let metrics = row.get("metrics").unwrap_or(&Value::Null);
            let values = self.extract_row(metrics, &grouping_value);
            parsed.push((grouping_value, values));
        }

        let titles = parsed.iter().map(|(title, _)| title.clone()).collect();
        let mut builder = ScrapeResultBuilder::new(dimension_title).grouping_titles(titles);
        for (grouping_value, values) in parsed {
            builder.push_row(&filter, grouping_value, values);
        }

        builder.build()
    }

    fn parse_v2(&self, doc: &Value) -> Result<ScrapeResult> {
        let lens = doc.get("quality_metriclens").unwrap_or(&Value::Null);

        let warming_up: Vec<String> = lens
            .pointer("/meta/filters_warmup")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(id_string)
            .filter(|id| self.filter_ids.contains(id))
            .collect();
        if !warming_up.is_empty() {
            return Err(ScrapeError::NotReady {
                filters: warming_up,
            });
        }

        let dimension_title = title_at(lens, "/dimension/description");
        debug!(dimension = %dimension_title, "Parsing v2 response");

        // Entries are kept even when unreadable so positions stay aligned.
        let titles: Vec<String> = lens
            .get("xvalues")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|x| dimension_value(x).unwrap_or_else(|| UNKNOWN.to_string()))
            .collect();

        let mut builder = ScrapeResultBuilder::new(dimension_title).grouping_titles(titles);

        for filter in &self.filter_ids {
            let Some(rows) = lens
                .get("tables")
                .and_then(|tables| tables.get(filter.as_str()))
                .and_then(|table| table.get("rows"))
                .and_then(Value::as_array)
            else {
                debug!(filter = %filter, "No table for filter");
                continue;
            };

            let rows: Vec<RowValues> = rows
                .iter()
                .enumerate()
                .map(|(index, row)| self.extract_row(row, &format!("#{index}")))
                .collect();
            builder.push_positional_rows(filter, rows);
        }

        Ok(builder.build())
    }

    /// Read every declared metric out of a row's metric region.
    fn extract_row(&self, metrics: &Value, grouping_value: &str) -> RowValues {
        self.catalog
            .iter()
            .filter_map(|def| match def.selector.extract(def.key, metrics) {
                Ok(value) => Some((def.key, value)),
                Err(e) => {
                    trace!(
                        metric = def.key,
                        dimension_value = grouping_value,
                        error = %e,
                        "Dropping sample"
                    );
                    None
                }
            })
            .collect()
    }
}

/// A string or numeric identifier.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A dimension value, given either directly or as `{"value": ..}` / `{"name": ..}`.
fn dimension_value(value: &Value) -> Option<String> {
    id_string(value).or_else(|| {
        value
            .get("value")
            .or_else(|| value.get("name"))
            .and_then(id_string)
    })
}

fn title_at(doc: &Value, pointer: &str) -> String {
    doc.pointer(pointer)
        .and_then(id_string)
        .unwrap_or_else(|| UNKNOWN.to_string())
}
