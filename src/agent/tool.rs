//! Tool type definitions for function-calling.
//!
//! Provides provider-agnostic types for tool definitions, calls and results,
//! plus [`ToolRequest`], the closed set of retrieval operations a model may
//! invoke. Raw calls are decoded into a `ToolRequest` once, at the dispatch
//! boundary.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::chunking::normalize_ticker;

/// Broad search across all filings.
pub const SEARCH_FILINGS: &str = "search_financial_filings";
/// Search restricted to one ticker.
pub const SEARCH_TICKER: &str = "search_ticker_specific";
/// Side-by-side search for two tickers.
pub const COMPARE_COMPANIES: &str = "compare_companies";

/// Upper bound on any model-requested `k`.
pub const MAX_TOOL_K: usize = 10;

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match a [`ToolRequest`] variant).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result text (retrieved context on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    #[must_use]
    pub fn ok(tool_call_id: &str, content: String) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content,
            is_error: false,
        }
    }

    /// Error result, returned to the model so it can correct itself.
    #[must_use]
    pub fn error(tool_call_id: &str, message: impl std::fmt::Display) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: format!("Error: {message}"),
            is_error: true,
        }
    }
}

/// A decoded, validated retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    /// Search every indexed filing.
    SearchFilings {
        /// Natural-language query.
        query: String,
        /// Requested result count.
        k: Option<usize>,
    },
    /// Search one company's filings.
    SearchTicker {
        /// Upper-cased ticker.
        ticker: String,
        /// Natural-language query.
        query: String,
        /// Requested result count.
        k: Option<usize>,
    },
    /// Search two companies with the same query.
    CompareCompanies {
        /// First upper-cased ticker.
        ticker_a: String,
        /// Second upper-cased ticker.
        ticker_b: String,
        /// What to compare.
        query: String,
        /// Results per company.
        k_each: Option<usize>,
    },
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Deserialize)]
struct TickerArgs {
    ticker: String,
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Deserialize)]
struct CompareArgs {
    ticker_a: String,
    ticker_b: String,
    query: String,
    #[serde(default)]
    k_each: Option<usize>,
}

impl ToolRequest {
    /// Decodes a raw call.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for the model if the tool is unknown, the
    /// arguments are not valid JSON for that tool, or a required field is
    /// blank.
    pub fn decode(call: &ToolCall) -> Result<Self, String> {
        let request = match call.name.as_str() {
            SEARCH_FILINGS => {
                let args: SearchArgs = parse_args(&call.arguments)?;
                Self::SearchFilings {
                    query: required(args.query, "query")?,
                    k: clamp_k(args.k)?,
                }
            }
            SEARCH_TICKER => {
                let args: TickerArgs = parse_args(&call.arguments)?;
                Self::SearchTicker {
                    ticker: required_ticker(&args.ticker, "ticker")?,
                    query: required(args.query, "query")?,
                    k: clamp_k(args.k)?,
                }
            }
            COMPARE_COMPANIES => {
                let args: CompareArgs = parse_args(&call.arguments)?;
                Self::CompareCompanies {
                    ticker_a: required_ticker(&args.ticker_a, "ticker_a")?,
                    ticker_b: required_ticker(&args.ticker_b, "ticker_b")?,
                    query: required(args.query, "query")?,
                    k_each: clamp_k(args.k_each)?,
                }
            }
            other => return Err(format!("unknown tool: {other}")),
        };
        Ok(request)
    }

    /// Tool name this request was decoded from.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SearchFilings { .. } => SEARCH_FILINGS,
            Self::SearchTicker { .. } => SEARCH_TICKER,
            Self::CompareCompanies { .. } => COMPARE_COMPANIES,
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: &str) -> Result<T, String> {
    let raw = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(raw).map_err(|e| format!("invalid arguments: {e}"))
}

fn required(value: String, field: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("'{field}' must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn required_ticker(value: &str, field: &str) -> Result<String, String> {
    let ticker = normalize_ticker(value);
    if ticker.is_empty() {
        return Err(format!("'{field}' must not be empty"));
    }
    Ok(ticker)
}

fn clamp_k(k: Option<usize>) -> Result<Option<usize>, String> {
    match k {
        Some(0) => Err("'k' must be at least 1".to_string()),
        Some(k) => Ok(Some(k.min(MAX_TOOL_K))),
        None => Ok(None),
    }
}

/// Definitions for every retrieval tool, in a stable order.
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![def_search_filings(), def_search_ticker(), def_compare()]
}

fn def_search_filings() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_FILINGS.to_string(),
        description: "Search across all indexed SEC 10-K filings. Use this for general \
                      financial questions or when no specific company is mentioned. Returns \
                      relevant excerpts labelled with ticker, filing date and relevance."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language query about financial data (e.g. 'total revenue 2022')."
                },
                "k": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TOOL_K,
                    "description": "Number of excerpts to return (default 2)."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_search_ticker() -> ToolDefinition {
    ToolDefinition {
        name: SEARCH_TICKER.to_string(),
        description: "Search the filings of ONE company by ticker symbol. Use this when the \
                      question is about a specific company (e.g. AAPL for Apple, MSFT for \
                      Microsoft, GOOGL for Alphabet, AMZN for Amazon)."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "ticker": {
                    "type": "string",
                    "description": "Ticker symbol, e.g. 'AAPL'."
                },
                "query": {
                    "type": "string",
                    "description": "What to look for in that company's filings."
                },
                "k": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TOOL_K,
                    "description": "Number of excerpts to return (default 2)."
                }
            },
            "required": ["ticker", "query"],
            "additionalProperties": false
        }),
    }
}

fn def_compare() -> ToolDefinition {
    ToolDefinition {
        name: COMPARE_COMPANIES.to_string(),
        description: "Compare TWO companies. Runs the same query against each company's \
                      filings and returns the excerpts side by side under 'Data for <ticker>:' \
                      headers."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "ticker_a": {
                    "type": "string",
                    "description": "First ticker symbol."
                },
                "ticker_b": {
                    "type": "string",
                    "description": "Second ticker symbol."
                },
                "query": {
                    "type": "string",
                    "description": "What to compare (e.g. 'revenue in fiscal 2022')."
                },
                "k_each": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TOOL_K,
                    "description": "Excerpts per company (default 1)."
                }
            },
            "required": ["ticker_a", "ticker_b", "query"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[test]
    fn test_definitions_have_valid_schemas() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 3);
        for def in &defs {
            assert_eq!(def.parameters["type"], "object");
            assert!(def.parameters["required"].is_array());
            assert!(!def.description.is_empty());
        }
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![SEARCH_FILINGS, SEARCH_TICKER, COMPARE_COMPANIES]);
    }

    #[test]
    fn test_decode_search() {
        let req = ToolRequest::decode(&call(SEARCH_FILINGS, r#"{"query":" revenue "}"#))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            req,
            ToolRequest::SearchFilings {
                query: "revenue".to_string(),
                k: None
            }
        );
        assert_eq!(req.name(), SEARCH_FILINGS);
    }

    #[test]
    fn test_decode_ticker_normalizes() {
        let req = ToolRequest::decode(&call(
            SEARCH_TICKER,
            r#"{"ticker":"aapl","query":"net income","k":50}"#,
        ))
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            req,
            ToolRequest::SearchTicker {
                ticker: "AAPL".to_string(),
                query: "net income".to_string(),
                k: Some(MAX_TOOL_K)
            }
        );
    }

    #[test]
    fn test_decode_compare() {
        let req = ToolRequest::decode(&call(
            COMPARE_COMPANIES,
            r#"{"ticker_a":"AAPL","ticker_b":"msft","query":"revenue"}"#,
        ))
        .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            req,
            ToolRequest::CompareCompanies { ref ticker_b, k_each: None, .. } if ticker_b == "MSFT"
        ));
    }

    #[test_case("nope", r#"{"query":"x"}"# ; "unknown tool")]
    #[test_case(SEARCH_FILINGS, "not json" ; "malformed json")]
    #[test_case(SEARCH_FILINGS, "" ; "missing query")]
    #[test_case(SEARCH_FILINGS, r#"{"query":"   "}"# ; "blank query")]
    #[test_case(SEARCH_FILINGS, r#"{"query":"x","k":0}"# ; "zero k")]
    #[test_case(SEARCH_TICKER, r#"{"ticker":" ","query":"x"}"# ; "blank ticker")]
    #[test_case(COMPARE_COMPANIES, r#"{"ticker_a":"AAPL","query":"x"}"# ; "missing second ticker")]
    fn test_decode_rejects(name: &str, arguments: &str) {
        assert!(ToolRequest::decode(&call(name, arguments)).is_err());
    }

    #[test]
    fn test_error_result_is_flagged() {
        let result = ToolResult::error("call_9", "unknown tool: x");
        assert!(result.is_error);
        assert_eq!(result.content, "Error: unknown tool: x");
    }
}
