//! Markdown output generation for sweep results.
//!
//! The summary is written next to each record file so a sweep can be read
//! without rendering a chart.

use crate::record::{BenchmarkRecord, Scalar};
use crate::trial::{
    ATTR_CLIENT_NUMBER, ATTR_DURATION_SECONDS, ATTR_MESSAGE_LENGTH, ATTR_TARGET,
    RESULT_REQUEST_PER_SECOND,
};
use std::fmt::Write;

fn cell(record: &BenchmarkRecord, key: &str) -> String {
    record
        .field(key)
        .map(Scalar::to_string)
        .unwrap_or_else(|| "-".to_string())
}

/// Generate a markdown summary table from sweep records.
pub fn generate_summary(records: &[BenchmarkRecord]) -> String {
    let mut output = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(output, "# Benchmark Summary");
    let _ = writeln!(output);
    let _ = writeln!(output, "Generated: {}", chrono::Utc::now().to_rfc3339());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Results");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Target | Clients | Message Length | Duration (s) | Requests/s |");
    let _ = writeln!(output, "|--------|---------|----------------|--------------|------------|");

    for record in records {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            cell(record, ATTR_TARGET),
            cell(record, ATTR_CLIENT_NUMBER),
            cell(record, ATTR_MESSAGE_LENGTH),
            cell(record, ATTR_DURATION_SECONDS),
            cell(record, RESULT_REQUEST_PER_SECOND),
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "---");
    let _ = writeln!(output, "Total trials: {}", records.len());

    output
}
