//! Prometheus exporter for Conviva Experience Insights.
//!
//! Every scrape of the metrics endpoint triggers one query against the
//! Conviva metrics API. The nested JSON answer is flattened into one gauge
//! per (metric, dimension value), labelled with the filter and the dimension
//! value, plus an `up` gauge telling whether the query succeeded.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ UpstreamQuery│──>│ResponseParser│──>│ ScrapeResult │──>│   Emitter    │
//! │  (request)   │   │  (catalog)   │   │   (model)    │   │  (/metrics)  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! Two API generations are supported. They differ in where values live
//! (named fields in v3, positions in v2), which the [`catalog`] captures as
//! one [`Selector`] per metric.
//!
//! # Usage
//!
//! ```bash
//! conviva-exporter-prometheus --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod catalog;
pub mod config;
pub mod emitter;
pub mod error;
pub mod exporter;
pub mod http;
pub mod mapping;
pub mod model;
pub mod parser;
pub mod request;

pub use catalog::{ApiVersion, MetricCatalog, MetricDefinition, Selector};
pub use config::ExporterConfig;
pub use emitter::{Emitter, Exposition, GaugeSample};
pub use error::{ExtractionError, ScrapeError};
pub use exporter::{Exporter, SharedExporter};
pub use http::HttpServer;
pub use model::{MetricSample, ScrapeResult, ScrapeRow};
pub use parser::ResponseParser;
pub use request::UpstreamQuery;
