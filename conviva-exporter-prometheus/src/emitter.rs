//! Conversion of scrape results into Prometheus gauges.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use tracing::warn;

use crate::catalog::{MetricCatalog, UP_HELP, UP_METRIC};
use crate::error::Result;
use crate::mapping::{DIMENSION_LABEL, FILTER_LABEL, build_metric_name};
use crate::model::ScrapeResult;

/// A single gauge sample.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeSample {
    /// Full Prometheus metric name.
    pub name: String,
    /// HELP text of the metric family.
    pub help: &'static str,
    /// Label pairs, in output order.
    pub labels: Vec<(&'static str, String)>,
    pub value: f64,
}

impl GaugeSample {
    /// Format labels for Prometheus exposition format.
    pub fn format_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }

    /// Get the value of a label.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Builds gauge samples from scrape results.
#[derive(Debug, Clone)]
pub struct Emitter {
    catalog: Arc<MetricCatalog>,
    /// Full metric name per metric key.
    names: HashMap<&'static str, String>,
    up_name: String,
}

impl Emitter {
    /// Create an emitter naming metrics under `prefix`.
    pub fn new(catalog: Arc<MetricCatalog>, prefix: &str) -> Self {
        let names = catalog
            .iter()
            .map(|def| (def.key, build_metric_name(prefix, def.name)))
            .collect();

        Self {
            catalog,
            names,
            up_name: build_metric_name(prefix, UP_METRIC),
        }
    }

    /// One sample per (row, recognized metric), row by row.
    ///
    /// A series repeated under the same labels keeps its first value.
    pub fn emit(&self, result: &ScrapeResult) -> Vec<GaugeSample> {
        let mut samples = Vec::with_capacity(result.sample_count());
        let mut seen: HashSet<(&str, &str, &str)> = HashSet::new();

        for row in &result.rows {
            for sample in &row.samples {
                let (Some(def), Some(name)) = (
                    self.catalog.get(sample.metric_key),
                    self.names.get(sample.metric_key),
                ) else {
                    continue;
                };

                let series = (
                    sample.metric_key,
                    row.filter.as_str(),
                    sample.grouping_value.as_str(),
                );
                if !seen.insert(series) {
                    warn!(
                        metric = sample.metric_key,
                        filter = %row.filter,
                        dimension_value = %sample.grouping_value,
                        "Dropping duplicate series"
                    );
                    continue;
                }

                samples.push(GaugeSample {
                    name: name.clone(),
                    help: def.help,
                    labels: vec![
                        (FILTER_LABEL, row.filter.clone()),
                        (DIMENSION_LABEL, sample.grouping_value.clone()),
                    ],
                    value: sample.value,
                });
            }
        }

        samples
    }

    /// The liveness sample of a scrape attempt.
    pub fn liveness(&self, success: bool) -> GaugeSample {
        GaugeSample {
            name: self.up_name.clone(),
            help: UP_HELP,
            labels: Vec::new(),
            value: if success { 1.0 } else { 0.0 },
        }
    }

    /// All samples of a scrape attempt: data samples on success, then liveness.
    pub fn exposition(&self, outcome: &Result<ScrapeResult>) -> Exposition {
        let mut samples = match outcome {
            Ok(result) => self.emit(result),
            Err(_) => Vec::new(),
        };
        samples.push(self.liveness(outcome.is_ok()));

        Exposition {
            samples,
            up_name: self.up_name.clone(),
        }
    }
}

/// The sample set answered to one scrape request.
#[derive(Debug, Clone)]
pub struct Exposition {
    samples: Vec<GaugeSample>,
    up_name: String,
}

impl Exposition {
    /// All samples, in emission order.
    pub fn samples(&self) -> &[GaugeSample] {
        &self.samples
    }

    /// Samples other than the liveness gauge.
    pub fn data_samples(&self) -> impl Iterator<Item = &GaugeSample> {
        self.samples.iter().filter(|s| s.name != self.up_name)
    }

    /// The liveness gauge.
    pub fn liveness(&self) -> Option<&GaugeSample> {
        self.samples.iter().find(|s| s.name == self.up_name)
    }

    /// Render in Prometheus text exposition format.
    ///
    /// Samples are grouped per metric family, families in order of first
    /// appearance.
    pub fn render(&self) -> String {
        let mut families: Vec<(&str, &str, Vec<&GaugeSample>)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for sample in &self.samples {
            match index.get(sample.name.as_str()) {
                Some(&i) => families[i].2.push(sample),
                None => {
                    index.insert(sample.name.as_str(), families.len());
                    families.push((sample.name.as_str(), sample.help, vec![sample]));
                }
            }
        }

        let mut output = String::with_capacity(self.samples.len() * 100);
        for (name, help, series) in families {
            writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
            writeln!(output, "# TYPE {} gauge", name).ok();
            for sample in series {
                writeln!(
                    output,
                    "{}{} {}",
                    name,
                    sample.format_labels(),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        output
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in HELP text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ApiVersion;
    use crate::error::ScrapeError;
    use crate::model::ScrapeResultBuilder;

    const PREFIX: &str = "conviva_experience_insights";

    fn make_emitter() -> Emitter {
        Emitter::new(Arc::new(MetricCatalog::for_version(ApiVersion::V3)), PREFIX)
    }

    fn chrome_result() -> ScrapeResult {
        let mut builder = ScrapeResultBuilder::new("Browser");
        builder.push_row(
            "myfilter",
            "chrome".to_string(),
            vec![("attempts", 120.0), ("plays", 97.5)],
        );
        builder.build()
    }

    #[test]
    fn test_emit_labels_and_names() {
        let samples = make_emitter().emit(&chrome_result());

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].name, "conviva_experience_insights_attempts");
        assert_eq!(samples[0].label(FILTER_LABEL), Some("myfilter"));
        assert_eq!(samples[0].label(DIMENSION_LABEL), Some("chrome"));
        assert_eq!(samples[0].value, 120.0);
        assert_eq!(samples[1].name, "conviva_experience_insights_plays");
        assert_eq!(samples[1].value, 97.5);
    }

    #[test]
    fn test_emit_uses_export_names() {
        let mut builder = ScrapeResultBuilder::new("Browser");
        builder.push_row(
            "f",
            "chrome".to_string(),
            vec![("bitrate", 3e6), ("exit_before_video_starts", 1.0)],
        );
        let samples = make_emitter().emit(&builder.build());

        assert_eq!(samples[0].name, "conviva_experience_insights_average_bitrate");
        assert_eq!(
            samples[1].name,
            "conviva_experience_insights_exits_before_video_start"
        );
    }

    #[test]
    fn test_emit_keeps_first_of_duplicate_series() {
        let mut builder = ScrapeResultBuilder::new("Browser");
        builder.push_row("f", "Unknown".to_string(), vec![("attempts", 1.0)]);
        builder.push_row("f", "Unknown".to_string(), vec![("attempts", 2.0), ("plays", 3.0)]);
        builder.push_row("g", "Unknown".to_string(), vec![("attempts", 4.0)]);
        let samples = make_emitter().emit(&builder.build());

        let values: Vec<_> = samples.iter().map(|s| (s.name.as_str(), s.value)).collect();
        assert_eq!(
            values,
            vec![
                ("conviva_experience_insights_attempts", 1.0),
                ("conviva_experience_insights_plays", 3.0),
                ("conviva_experience_insights_attempts", 4.0),
            ]
        );
    }

    #[test]
    fn test_exposition_success() {
        let exposition = make_emitter().exposition(&Ok(chrome_result()));

        assert_eq!(exposition.samples().len(), 3);
        assert_eq!(exposition.data_samples().count(), 2);
        let up = exposition.liveness().unwrap();
        assert_eq!(up.name, "conviva_experience_insights_up");
        assert!(up.labels.is_empty());
        assert_eq!(up.value, 1.0);
    }

    #[test]
    fn test_exposition_failure_has_only_liveness() {
        let exposition = make_emitter().exposition(&Err(ScrapeError::upstream(500, "boom")));

        assert_eq!(exposition.samples().len(), 1);
        assert_eq!(exposition.data_samples().count(), 0);
        assert_eq!(exposition.liveness().unwrap().value, 0.0);
    }

    #[test]
    fn test_exposition_empty_result_is_success() {
        let result = ScrapeResultBuilder::new("Browser").build();
        let exposition = make_emitter().exposition(&Ok(result));

        assert_eq!(exposition.data_samples().count(), 0);
        assert_eq!(exposition.liveness().unwrap().value, 1.0);
    }

    #[test]
    fn test_render() {
        let output = make_emitter().exposition(&Ok(chrome_result())).render();

        assert!(output.contains("# TYPE conviva_experience_insights_attempts gauge"));
        assert!(output.contains("# HELP conviva_experience_insights_attempts Attempts counts"));
        assert!(output.contains(
            "conviva_experience_insights_attempts{conviva_filter_id=\"myfilter\",metriclens_dimension_value=\"chrome\"} 120\n"
        ));
        assert!(output.contains(
            "conviva_experience_insights_plays{conviva_filter_id=\"myfilter\",metriclens_dimension_value=\"chrome\"} 97.5\n"
        ));
        assert!(output.contains("conviva_experience_insights_up 1\n"));
    }

    #[test]
    fn test_render_groups_families() {
        let mut builder = ScrapeResultBuilder::new("Browser");
        builder.push_row("f", "chrome".to_string(), vec![("attempts", 1.0), ("plays", 2.0)]);
        builder.push_row("f", "safari".to_string(), vec![("attempts", 3.0), ("plays", 4.0)]);
        let output = make_emitter().exposition(&Ok(builder.build())).render();

        assert_eq!(
            output.matches("# TYPE conviva_experience_insights_attempts gauge").count(),
            1
        );
        let lines: Vec<&str> = output.lines().filter(|l| !l.starts_with('#')).collect();
        assert!(lines[0].contains("attempts") && lines[0].contains("chrome"));
        assert!(lines[1].contains("attempts") && lines[1].contains("safari"));
        assert!(lines[2].contains("plays") && lines[2].contains("chrome"));
    }

    #[test]
    fn test_render_escapes_label_values() {
        let mut builder = ScrapeResultBuilder::new("Player");
        builder.push_row("f", "my \"player\"".to_string(), vec![("attempts", 1.0)]);
        let output = make_emitter().exposition(&Ok(builder.build())).render();

        assert!(output.contains("metriclens_dimension_value=\"my \\\"player\\\"\""));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(120.0), "120");
        assert_eq!(format_value(97.5), "97.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
