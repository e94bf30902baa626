//! Retrieval operations exposed to the model as tools.
//!
//! Every operation returns plain text ready to be placed in a tool-result
//! message. Operations are read-only and idempotent.

use std::sync::Arc;

use tracing::debug;

use super::tool::ToolRequest;
use crate::config::{DEFAULT_COMPARE_K, DEFAULT_TOP_K};
use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::storage::{MetadataFilter, VectorIndex, format_context};

/// Returned by every tool when the index is empty.
pub const NO_DOCUMENTS_MESSAGE: &str =
    "No documents available. Fetch and index SEC 10-K filings before querying.";

/// Retrieval operations over one index.
#[derive(Debug, Clone)]
pub struct ToolSet {
    index: Arc<VectorIndex>,
    embedder: Arc<Embedder>,
    top_k: usize,
    compare_k: usize,
}

impl ToolSet {
    /// Creates a tool set with default result counts.
    #[must_use]
    pub const fn new(index: Arc<VectorIndex>, embedder: Arc<Embedder>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
            compare_k: DEFAULT_COMPARE_K,
        }
    }

    /// Overrides the default result counts (each at least 1).
    #[must_use]
    pub fn with_limits(mut self, top_k: usize, compare_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self.compare_k = compare_k.max(1);
        self
    }

    /// Whether the underlying index holds any chunk.
    #[must_use]
    pub fn has_documents(&self) -> bool {
        self.index.has_documents()
    }

    /// Runs a decoded request.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index failures.
    pub async fn run(&self, request: &ToolRequest) -> Result<String, AgentError> {
        match request {
            ToolRequest::SearchFilings { query, k } => {
                self.search_all(query, k.unwrap_or(self.top_k)).await
            }
            ToolRequest::SearchTicker { ticker, query, k } => {
                self.search_scoped(query, ticker, k.unwrap_or(self.top_k))
                    .await
            }
            ToolRequest::CompareCompanies {
                ticker_a,
                ticker_b,
                query,
                k_each,
            } => {
                self.compare(query, ticker_a, ticker_b, k_each.unwrap_or(self.compare_k))
                    .await
            }
        }
    }

    /// Searches every filing.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index failures.
    pub async fn search_all(&self, query: &str, k: usize) -> Result<String, AgentError> {
        if !self.has_documents() {
            return Ok(NO_DOCUMENTS_MESSAGE.to_string());
        }
        let vector = self.embedder.embed_query(query).await?;
        let results = self.index.search(&vector, k, &MetadataFilter::none())?;
        debug!(tool = "search_all", k, hits = results.len(), "retrieved");

        if results.is_empty() {
            return Ok(format!("No relevant excerpts found for '{query}'."));
        }
        Ok(format_context(&results))
    }

    /// Searches one ticker's filings.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index failures.
    pub async fn search_scoped(
        &self,
        query: &str,
        ticker: &str,
        k: usize,
    ) -> Result<String, AgentError> {
        if !self.has_documents() {
            return Ok(NO_DOCUMENTS_MESSAGE.to_string());
        }
        let vector = self.embedder.embed_query(query).await?;
        let filter = MetadataFilter::ticker(ticker);
        self.scoped_block(&vector, &filter, k)
    }

    /// Runs the same query against two tickers and labels each section.
    ///
    /// # Errors
    ///
    /// Propagates embedding and index failures.
    pub async fn compare(
        &self,
        query: &str,
        ticker_a: &str,
        ticker_b: &str,
        k_each: usize,
    ) -> Result<String, AgentError> {
        if !self.has_documents() {
            return Ok(NO_DOCUMENTS_MESSAGE.to_string());
        }
        let vector = self.embedder.embed_query(query).await?;
        let filter_a = MetadataFilter::ticker(ticker_a);
        let filter_b = MetadataFilter::ticker(ticker_b);
        let data_a = self.scoped_block(&vector, &filter_a, k_each)?;
        let data_b = self.scoped_block(&vector, &filter_b, k_each)?;

        Ok(format!(
            "Data for {}:\n{data_a}\n\nData for {}:\n{data_b}",
            filter_a.ticker.unwrap_or_default(),
            filter_b.ticker.unwrap_or_default(),
        ))
    }

    fn scoped_block(
        &self,
        vector: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<String, AgentError> {
        let results = self.index.search(vector, k, filter)?;
        let ticker = filter.ticker.as_deref().unwrap_or_default();
        debug!(tool = "search_scoped", ticker, k, hits = results.len(), "retrieved");

        if results.is_empty() {
            return Ok(format!(
                "No information found for {ticker}. Ensure this company's filings are indexed."
            ));
        }
        Ok(format_context(&results))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::chunking::{Chunker, Document};
    use crate::embedding::HashEmbedder;
    use crate::ingest::Ingestor;

    async fn seeded() -> ToolSet {
        let index = Arc::new(VectorIndex::in_memory().unwrap_or_else(|_| unreachable!()));
        let embedder = Arc::new(Embedder::new(Box::new(HashEmbedder::new(128)), 8));
        let date = NaiveDate::from_ymd_opt(2022, 10, 28).unwrap_or_else(|| unreachable!());
        let docs = vec![
            Document::new("aapl", "Apple total net sales were $394.3 billion.", "AAPL", date),
            Document::new(
                "msft",
                "Microsoft revenue was $198.3 billion, driven by Azure.",
                "MSFT",
                date,
            ),
        ];
        Ingestor::new(Chunker::default(), Arc::clone(&embedder), Arc::clone(&index))
            .ingest(&docs)
            .await
            .unwrap_or_else(|_| unreachable!());
        ToolSet::new(index, embedder)
    }

    fn empty() -> ToolSet {
        ToolSet::new(
            Arc::new(VectorIndex::in_memory().unwrap_or_else(|_| unreachable!())),
            Arc::new(Embedder::default()),
        )
    }

    #[tokio::test]
    async fn test_search_all_formats_context() {
        let tools = seeded().await;
        let text = tools
            .search_all("net sales", 2)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.starts_with("[Source 1] ticker: "));
        assert!(text.contains("[Source 2]"));
        assert!(text.contains("filing_date: 2022-10-28"));
    }

    #[tokio::test]
    async fn test_search_scoped_filters_ticker() {
        let tools = seeded().await;
        let text = tools
            .search_scoped("revenue", "msft", 5)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.contains("ticker: MSFT"));
        assert!(!text.contains("ticker: AAPL"));
    }

    #[tokio::test]
    async fn test_search_scoped_unknown_ticker() {
        let tools = seeded().await;
        let text = tools
            .search_scoped("revenue", "NVDA", 2)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.starts_with("No information found for NVDA."));
    }

    #[tokio::test]
    async fn test_compare_labels_both_sections() {
        let tools = seeded().await;
        let text = tools
            .compare("revenue", "aapl", "MSFT", 1)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.starts_with("Data for AAPL:\n[Source 1] ticker: AAPL"));
        assert!(text.contains("\n\nData for MSFT:\n[Source 1] ticker: MSFT"));
        assert!(!text.contains("['"));
        assert!(!text.contains("{\""));
    }

    #[tokio::test]
    async fn test_compare_several_per_company_renders_context_blocks() {
        let tools = seeded().await;
        let date = NaiveDate::from_ymd_opt(2023, 11, 3).unwrap_or_else(|| unreachable!());
        let more = vec![
            Document::new("aapl-2023", "Apple services revenue grew to $85.2 billion.", "AAPL", date),
            Document::new("msft-2023", "Microsoft cloud revenue exceeded $111 billion.", "MSFT", date),
        ];
        Ingestor::new(
            Chunker::default(),
            Arc::clone(&tools.embedder),
            Arc::clone(&tools.index),
        )
        .ingest(&more)
        .await
        .unwrap_or_else(|_| unreachable!());

        let text = tools
            .compare("revenue", "AAPL", "MSFT", 2)
            .await
            .unwrap_or_else(|_| unreachable!());
        let (aapl, msft) = text
            .split_once("\n\nData for MSFT:\n")
            .unwrap_or_else(|| unreachable!());

        let aapl = aapl
            .strip_prefix("Data for AAPL:\n")
            .unwrap_or_else(|| unreachable!());
        for section in [aapl, msft] {
            assert!(section.starts_with("[Source 1] ticker: "));
            assert!(section.contains("\n---\n[Source 2] ticker: "));
            assert!(!section.contains("[Source 3]"));
            assert!(!section.contains("SearchResult {"));
            assert!(!section.contains("content:"));
        }
        assert!(!aapl.contains("ticker: MSFT"));
        assert!(!msft.contains("ticker: AAPL"));
        assert!(aapl.contains("filing_date: 2023-11-03"));
        assert!(aapl.contains("filing_date: 2022-10-28"));
    }

    #[tokio::test]
    async fn test_compare_with_missing_company_keeps_labels() {
        let tools = seeded().await;
        let text = tools
            .compare("revenue", "AAPL", "TSLA", 1)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.contains("Data for AAPL:"));
        assert!(text.contains("Data for TSLA:\nNo information found for TSLA."));
    }

    #[tokio::test]
    async fn test_empty_index_short_circuits() {
        let tools = empty();
        for text in [
            tools.search_all("revenue", 2).await,
            tools.search_scoped("revenue", "AAPL", 2).await,
            tools.compare("revenue", "AAPL", "MSFT", 1).await,
        ] {
            assert_eq!(text.unwrap_or_else(|_| unreachable!()), NO_DOCUMENTS_MESSAGE);
        }
    }

    #[tokio::test]
    async fn test_run_dispatches_with_defaults() {
        let tools = seeded().await.with_limits(1, 1);
        let text = tools
            .run(&ToolRequest::SearchFilings {
                query: "revenue".to_string(),
                k: None,
            })
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(text.contains("[Source 1]"));
        assert!(!text.contains("[Source 2]"));
    }
}
