//! Query enhancement.
//!
//! Appends short retrieval hints (comparison intent, metrics, reporting
//! period) to the user's question. Hints go after a fixed marker and are
//! always recomputed from the text before it, so enhancing twice gives the
//! same result as enhancing once.

use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// Separates the question from generated hints.
pub const HINT_MARKER: &str = "\n\n[query hints]";

const COMPARISON_PATTERN: &str = r"\b(compare|comparison|comparing|versus|vs\.?|difference|differences|better|worse)\b";
const ANNUAL_PATTERN: &str = r"\bfiscal\s+year\b|\bfy\s?\d{0,4}\b|\b(19|20)\d{2}\b|\bannual";
const QUARTERLY_PATTERN: &str = r"\bquarter|\bq[1-4]\b";

const METRIC_PATTERNS: &[(&str, &str)] = &[
    (r"\b(revenue|sales)", "revenue"),
    (r"\b(profit|income|earnings)", "net income"),
    (r"\b(expense|cost)", "expenses"),
    (r"\bmargin", "profit margins"),
    (r"\basset", "assets"),
    (r"\b(liabilit|debt)", "liabilities"),
];

/// Keyword-driven hint generator.
#[derive(Debug, Clone)]
pub struct QueryEnhancer {
    comparison: Regex,
    annual: Regex,
    quarterly: Regex,
    metrics: Vec<(Regex, &'static str)>,
}

impl QueryEnhancer {
    /// Compiles the keyword tables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a pattern fails to compile.
    pub fn new() -> Result<Self, ConfigError> {
        let metrics = METRIC_PATTERNS
            .iter()
            .map(|(pattern, label)| compile(pattern).map(|re| (re, *label)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            comparison: compile(COMPARISON_PATTERN)?,
            annual: compile(ANNUAL_PATTERN)?,
            quarterly: compile(QUARTERLY_PATTERN)?,
            metrics,
        })
    }

    /// Returns `question` with hints appended, or just the trimmed question
    /// when nothing matches.
    #[must_use]
    pub fn enhance(&self, question: &str) -> String {
        let base = strip_hints(question).trim();
        let hints = self.hints(base);
        if hints.is_empty() {
            base.to_string()
        } else {
            format!("{base}{HINT_MARKER} {}", hints.join("; "))
        }
    }

    /// Hints derived from `text`, in a fixed order.
    #[must_use]
    pub fn hints(&self, text: &str) -> Vec<String> {
        let mut hints = Vec::new();

        if self.comparison.is_match(text) {
            hints.push("comparison question".to_string());
        }

        let metrics: Vec<&str> = self
            .metrics
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, label)| *label)
            .collect();
        if !metrics.is_empty() {
            hints.push(format!("metrics: {}", metrics.join(", ")));
        }

        if self.annual.is_match(text) {
            hints.push("period: annual fiscal year data".to_string());
        } else if self.quarterly.is_match(text) {
            hints.push("period: quarterly data".to_string());
        }

        hints
    }
}

/// Text before the hint marker.
#[must_use]
pub fn strip_hints(question: &str) -> &str {
    question
        .find(HINT_MARKER)
        .map_or(question, |pos| &question[..pos])
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "query_enhancer",
            reason: e.to_string(),
        })
}
