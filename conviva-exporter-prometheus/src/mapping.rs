//! Naming of exported Prometheus series.

/// Label carrying the Conviva filter a sample was reported under.
pub const FILTER_LABEL: &str = "conviva_filter_id";

/// Label carrying the dimension value (metric lens bucket) of a sample.
pub const DIMENSION_LABEL: &str = "metriclens_dimension_value";

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;

    if name.starts_with(|c: char| c.is_ascii_digit()) {
        result.push('_');
        last_was_underscore = true;
    }

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == ':' {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            // '_' itself and every invalid char
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    if result.is_empty() {
        result.push_str("unnamed");
    }

    result
}

/// Build a full Prometheus metric name.
///
/// Format: `{prefix}_{name}`, or just `{name}` with an empty prefix.
pub fn build_metric_name(prefix: &str, name: &str) -> String {
    let name = sanitize_metric_name(name);

    if prefix.is_empty() {
        name
    } else {
        format!("{}_{}", sanitize_metric_name(prefix), name)
    }
}
