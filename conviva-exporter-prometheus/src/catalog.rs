//! Metric registry and extraction rules.
//!
//! The set of exported metrics is fixed at build time. Each API generation
//! nests metric values differently, so the registry is turned into a
//! [`MetricCatalog`] for the configured [`ApiVersion`] once at startup:
//!
//! - v2 returns one array per dimension row, where the Nth element is the
//!   Nth declared metric ([`Selector::PositionalIndex`]).
//! - v3 returns an object per row keyed by metric, each holding its value
//!   under a metric-specific field ([`Selector::NamedField`]).

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::ExtractionError;

/// Supported Conviva API generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    V2,
    V3,
}

impl ApiVersion {
    /// Get a short display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V2 => "v2",
            ApiVersion::V3 => "v3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    /// Detect the generation from a version string such as `2.4`, `3.0` or `v3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let major = trimmed.split('.').next().unwrap_or_default();

        match major {
            "2" => Ok(ApiVersion::V2),
            "3" => Ok(ApiVersion::V3),
            _ => Err(format!("Unsupported API version: {s}")),
        }
    }
}

/// Where a numeric reading lives inside a metric's JSON representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// `metrics[key][field]`, e.g. the `count` of `attempts`.
    NamedField(&'static str),
    /// `metrics[index]`, the position of the metric in the declared list.
    PositionalIndex(usize),
}

impl Selector {
    /// Pull the value of metric `key` out of a row's metric region.
    pub fn extract(&self, key: &str, metrics: &Value) -> Result<f64, ExtractionError> {
        let leaf = match self {
            Selector::NamedField(field) => metrics.get(key).and_then(|m| m.get(*field)),
            Selector::PositionalIndex(index) => metrics.get(*index),
        };

        leaf.ok_or(ExtractionError::Missing)?
            .as_f64()
            .ok_or(ExtractionError::NotNumeric)
    }
}

/// A metric exported by the exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    /// Stable identifier, as used in API responses.
    pub key: &'static str,
    /// Exported name, without namespace prefix.
    pub name: &'static str,
    /// HELP text.
    pub help: &'static str,
    /// How to read the value for the active API generation.
    pub selector: Selector,
}

impl MetricDefinition {
    /// The metric name as the API expects it in a request (`video-start-time`).
    pub fn query_name(&self) -> String {
        self.key.replace('_', "-")
    }
}

struct MetricSpec {
    key: &'static str,
    name: &'static str,
    field: &'static str,
    help: &'static str,
}

// Declaration order is the column order of v2 rows.
const METRICS: [MetricSpec; 10] = [
    MetricSpec {
        key: "attempts",
        name: "attempts",
        field: "count",
        help: "Attempts counts all attempts to play a video which are initiated when a viewer clicks play or a video auto-plays.",
    },
    MetricSpec {
        key: "video_start_failures",
        name: "video_start_failures",
        field: "percentage",
        help: "Video Start Failures (VSF) measures how often Attempts terminated during video startup before the first video frame was played, and a fatal error was reported.",
    },
    MetricSpec {
        key: "exit_before_video_starts",
        name: "exits_before_video_start",
        field: "percentage",
        help: "Exits Before Video Start (EBVS) measures the Attempts that terminated before the video started, without a reported fatal error.",
    },
    MetricSpec {
        key: "plays",
        name: "plays",
        field: "percentage",
        help: "Plays (Successful Attempts) is counted when the viewer sees the first frame of video.",
    },
    MetricSpec {
        key: "video_start_time",
        name: "video_start_time",
        field: "value",
        help: "Video Startup Time (VST) is the number of seconds between when the user clicks play or video auto-starts and when the first frame of a video is rendered.",
    },
    MetricSpec {
        key: "rebuffering_ratio",
        name: "rebuffering_ratio",
        field: "ratio",
        help: "Rebuffering Ratio measures the percentage of total video viewing time (playTime + rebufferingTime) during which viewers experienced rebuffering.",
    },
    MetricSpec {
        key: "bitrate",
        name: "average_bitrate",
        field: "bps",
        help: "Average bitrate calculates the bits played by the player. The bits played do not include bits in buffering or bits passed during paused video.",
    },
    MetricSpec {
        key: "video_playback_failures",
        name: "video_playback_failures",
        field: "percentage",
        help: "Video playback failure occurs when video play terminates due to a playback error, such as video file corruption, insufficient streaming resources, or a sudden interruption in the video stream.",
    },
    MetricSpec {
        key: "ended_plays",
        name: "ended_plays",
        field: "count",
        help: "An ended play is a play that ended during the selected interval. To count as an ended play, the viewing session must have at least one video frame that was viewed.",
    },
    MetricSpec {
        key: "connection_induced_rebuffering_ratio",
        name: "connection_induced_rebuffering_ratio",
        field: "ratio",
        help: "Connection Induced Rebuffering Ratio (CIRR) measures the percentage of total video viewing time (playTime plus all rebuffering) during which viewers experienced nonseek rebuffering.",
    },
];

/// Name of the liveness gauge, without namespace prefix.
pub const UP_METRIC: &str = "up";

/// HELP text of the liveness gauge.
pub const UP_HELP: &str = "Indicates if the scrape is successful. 1=Success, 0=Fail";

/// The metric definitions for one API generation, in declaration order.
///
/// Immutable once built; shared read-only by concurrent scrapes.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCatalog {
    version: ApiVersion,
    definitions: Vec<MetricDefinition>,
}

impl MetricCatalog {
    /// Build the extraction rule table for an API generation.
    pub fn for_version(version: ApiVersion) -> Self {
        let definitions = METRICS
            .iter()
            .enumerate()
            .map(|(index, spec)| MetricDefinition {
                key: spec.key,
                name: spec.name,
                help: spec.help,
                selector: match version {
                    ApiVersion::V2 => Selector::PositionalIndex(index),
                    ApiVersion::V3 => Selector::NamedField(spec.field),
                },
            })
            .collect();

        Self {
            version,
            definitions,
        }
    }

    /// The API generation these rules apply to.
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// Look up a definition by response key.
    pub fn get(&self, key: &str) -> Option<&MetricDefinition> {
        self.definitions.iter().find(|d| d.key == key)
    }

    /// Iterate definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
