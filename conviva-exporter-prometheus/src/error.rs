//! Error types for a scrape of the Conviva API.

use thiserror::Error;

/// Result type alias using [`ScrapeError`].
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Errors that fail a whole scrape.
///
/// Every variant is reported the same way: the liveness gauge drops to 0
/// and no data samples are emitted for that scrape.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The upstream URL could not be assembled from the configuration.
    #[error("Invalid request URL: {0}")]
    Request(String),

    /// The request could not be sent or no response was received.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-200 status.
    #[error("Invalid response from API (status {status}). Reason: {reason}")]
    Upstream { status: u16, reason: String },

    /// The API reports that the requested filters are still warming up.
    #[error("Filters not ready yet (warming up): {}", filters.join(", "))]
    NotReady { filters: Vec<String> },

    /// A successful response whose body is not a JSON document.
    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

impl ScrapeError {
    /// Create an upstream error.
    pub fn upstream(status: u16, reason: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            reason: reason.into(),
        }
    }
}

/// Why a single metric value could not be read from a row.
///
/// Never escalates: the sample is omitted and the rest of the row is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractionError {
    /// The selector path does not exist in the row.
    #[error("value missing")]
    Missing,

    /// The selector path exists but does not hold a number.
    #[error("value is not numeric")]
    NotNumeric,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_message_contains_reason() {
        let err = ScrapeError::upstream(500, "rate_limited");
        let msg = err.to_string();
        assert!(msg.contains("rate_limited"));
        assert!(msg.contains("500"));
    }

    #[test]
    fn test_not_ready_lists_filters() {
        let err = ScrapeError::NotReady {
            filters: vec!["7".to_string(), "9".to_string()],
        };
        assert_eq!(err.to_string(), "Filters not ready yet (warming up): 7, 9");
    }
}
