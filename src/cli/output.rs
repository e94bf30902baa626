//! Output formatting for CLI commands.

use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::ingest::IngestReport;
use crate::storage::{SearchResult, TickerSummary};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name. Unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Serializes `value` as pretty JSON.
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\": \"JSON serialization failed: {e}\"}}"))
    }
}

/// Index statistics shown by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Database path.
    pub path: String,
    /// Indexed chunks.
    pub chunks: usize,
    /// Vector dimensionality, if established.
    pub dimensions: Option<usize>,
    /// Per-ticker breakdown.
    pub tickers: Vec<TickerSummary>,
}

/// Formats index statistics.
#[must_use]
pub fn format_status(stats: &IndexStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Index: {}", stats.path);
            let _ = writeln!(output, "Chunks: {}", stats.chunks);
            let _ = writeln!(
                output,
                "Dimensions: {}",
                stats
                    .dimensions
                    .map_or_else(|| "-".to_string(), |d| d.to_string())
            );

            if stats.tickers.is_empty() {
                output.push_str("\nNo documents indexed.\n");
                return output;
            }

            let _ = writeln!(output, "\n{:<10} {:<10} {:<10}", "Ticker", "Documents", "Chunks");
            output.push_str(&"-".repeat(30));
            output.push('\n');
            for t in &stats.tickers {
                let _ = writeln!(output, "{:<10} {:<10} {:<10}", t.ticker, t.documents, t.chunks);
            }
            output
        }
        OutputFormat::Json => format.to_json(stats),
    }
}

/// Formats an ingest outcome.
#[must_use]
pub fn format_ingest_report(
    report: &IngestReport,
    ticker: &str,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => format!(
            "Indexed {} chunk(s) from {} document(s) for {ticker} ({} dimensions)\n",
            report.chunks,
            report.documents,
            report
                .dimensions
                .map_or_else(|| "-".to_string(), |d| d.to_string())
        ),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "ticker": ticker,
                "documents": report.documents,
                "chunks": report.chunks,
                "dimensions": report.dimensions,
            });
            format.to_json(&json)
        }
    }
}

/// Formats retrieval results.
#[must_use]
pub fn format_search_results(
    results: &[SearchResult],
    query: &str,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            if results.is_empty() {
                return format!("No results found for query: \"{query}\"\n");
            }

            let mut output = String::new();
            let _ = writeln!(
                output,
                "Search results for \"{query}\" ({} results):\n",
                results.len()
            );
            output.push_str(&crate::storage::format_context(results));
            output.push('\n');
            output
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "query": query,
                "count": results.len(),
                "results": results,
            });
            format.to_json(&json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("yaml"), OutputFormat::Text);
    }

    #[test]
    fn test_status_text_lists_tickers() {
        let stats = IndexStats {
            path: "idx.db".to_string(),
            chunks: 3,
            dimensions: Some(256),
            tickers: vec![TickerSummary {
                ticker: "AAPL".to_string(),
                chunks: 3,
                documents: 1,
            }],
        };
        let text = format_status(&stats, OutputFormat::Text);
        assert!(text.contains("Chunks: 3"));
        assert!(text.contains("Dimensions: 256"));
        assert!(text.contains("AAPL"));
    }

    #[test]
    fn test_status_json() {
        let stats = IndexStats {
            path: "idx.db".to_string(),
            chunks: 0,
            dimensions: None,
            tickers: Vec::new(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&format_status(&stats, OutputFormat::Json))
                .unwrap_or_default();
        assert_eq!(json["chunks"], 0);
        assert!(json["dimensions"].is_null());
    }

    #[test]
    fn test_empty_search_results() {
        let text = format_search_results(&[], "revenue", OutputFormat::Text);
        assert_eq!(text, "No results found for query: \"revenue\"\n");
    }
}
