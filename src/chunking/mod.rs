//! Document chunking.
//!
//! Splits filing text into overlapping, size-bounded windows. Window ends
//! prefer natural breaks (paragraph, line, sentence, word) found within a
//! short backtracking budget; otherwise the window is cut hard at
//! `chunk_size` characters.
//!
//! All sizes and offsets are measured in Unicode scalar values (`char`s),
//! never bytes, so multi-byte text is never cut mid-character.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

pub use crate::config::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::error::ConfigError;

/// Fraction of `chunk_size` the chunker may backtrack to find a natural break.
const BACKTRACK_DIVISOR: usize = 5;

/// A source document supplied by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier.
    pub id: String,
    /// Plain-text content.
    pub content: String,
    /// Company ticker (upper-case).
    pub ticker: String,
    /// Filing date.
    pub filing_date: NaiveDate,
    /// Opaque reference to the original source (path, URL, accession number).
    pub source_ref: String,
}

impl Document {
    /// Creates a document. The ticker is normalized to upper case.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        ticker: &str,
        filing_date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            ticker: normalize_ticker(ticker),
            filing_date,
            source_ref: String::new(),
        }
    }

    /// Sets the source reference.
    #[must_use]
    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = source_ref.into();
        self
    }
}

/// Normalizes a ticker for storage and exact-match filtering.
#[must_use]
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

/// A bounded segment of a document with inherited metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based sequence index within the parent document.
    pub chunk_id: usize,
    /// Chunk text.
    pub content: String,
    /// Parent document id.
    pub document_id: String,
    /// Parent ticker.
    pub ticker: String,
    /// Parent filing date.
    pub filing_date: NaiveDate,
    /// Parent source reference.
    pub source_ref: String,
    /// Start offset (chars, inclusive) in the parent content.
    pub start: usize,
    /// End offset (chars, exclusive) in the parent content.
    pub end: usize,
}

/// Fixed-size chunker with overlap and boundary preference.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    /// Creates a chunker.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `chunk_size` is zero and
    /// [`ConfigError::InvalidOverlap`] if `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidOverlap {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Configured chunk size in characters.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Configured overlap in characters.
    #[must_use]
    pub const fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits one document into ordered chunks.
    ///
    /// An empty document yields no chunks; a document no longer than
    /// `chunk_size` yields exactly one chunk equal to its content.
    #[must_use]
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let content = document.content.as_str();
        if content.is_empty() {
            return Vec::new();
        }

        // offsets[i] is the byte offset of char i; offsets[total] == content.len()
        let offsets: Vec<usize> = content
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(content.len()))
            .collect();
        let total = offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end == total {
                total
            } else {
                self.find_break(content, &offsets, start, hard_end)
            };

            chunks.push(Chunk {
                chunk_id: chunks.len(),
                content: content[offsets[start]..offsets[end]].to_string(),
                document_id: document.id.clone(),
                ticker: document.ticker.clone(),
                filing_date: document.filing_date,
                source_ref: document.source_ref.clone(),
                start,
                end,
            });

            if end == total {
                break;
            }
            // find_break never returns an end inside the overlap window
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Splits many documents, concatenating their chunks in input order.
    #[must_use]
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }

    /// Picks the end (exclusive char offset) for a window `[start, hard_end)`.
    ///
    /// Searches `(lo, hard_end]` for a break, where `lo` keeps the result
    /// strictly past `start + chunk_overlap` so every step makes progress.
    fn find_break(&self, content: &str, offsets: &[usize], start: usize, hard_end: usize) -> usize {
        let budget = (self.chunk_size / BACKTRACK_DIVISOR).max(1);
        let lo = hard_end
            .saturating_sub(budget)
            .max(start + self.chunk_overlap + 1);
        if lo >= hard_end {
            return hard_end;
        }

        let window = &content[offsets[lo]..offsets[hard_end]];
        let to_chars = |byte_end: usize| lo + window[..byte_end].chars().count();

        for sep in ["\n\n", "\n"] {
            if let Some(idx) = window.rfind(sep) {
                return to_chars(idx + sep.len());
            }
        }

        if let Some((idx, _)) = window
            .split_sentence_bound_indices()
            .filter(|(idx, _)| *idx > 0)
            .last()
        {
            return to_chars(idx);
        }

        if let Some((idx, ch)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
            return to_chars(idx + ch.len_utf8());
        }

        hard_end
    }
}
