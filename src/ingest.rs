//! Write path: chunk, embed, index.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::chunking::{Chunker, Document};
use crate::embedding::Embedder;
use crate::error::Error;
use crate::storage::VectorIndex;

/// Outcome of one ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Documents processed.
    pub documents: usize,
    /// Chunks written.
    pub chunks: usize,
    /// Vector dimensionality of the index after the write.
    pub dimensions: Option<usize>,
}

/// Chunks documents, embeds the chunks and writes them in one index call.
#[derive(Debug)]
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
}

impl Ingestor {
    /// Creates an ingestor.
    #[must_use]
    pub const fn new(chunker: Chunker, embedder: Arc<Embedder>, index: Arc<VectorIndex>) -> Self {
        Self {
            chunker,
            embedder,
            index,
        }
    }

    /// Ingests `documents`.
    ///
    /// Nothing is written unless every chunk embeds successfully.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Embedding`] or [`Error::Index`] on failure.
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport, Error> {
        let chunks = self.chunker.split_documents(documents);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunker.chunk_size(),
            chunk_overlap = self.chunker.chunk_overlap(),
            backend = self.embedder.backend_name(),
            batch_size = self.embedder.batch_size(),
            "embedding chunks"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        let added = self.index.add(&chunks, &vectors)?;

        info!(added, total = self.index.count(), "ingest complete");
        Ok(IngestReport {
            documents: documents.len(),
            chunks: added,
            dimensions: self.index.dimensions(),
        })
    }
}
