//! Persistent vector index.
//!
//! Chunks and their embeddings are stored in `SQLite` (one row per chunk,
//! vector as a little-endian `f32` BLOB) and mirrored in memory for
//! brute-force cosine search. Reads share a reader lock; writes take the
//! writer lock and commit in a single transaction, so a failed `add`
//! leaves both the database and the cache untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::NaiveDate;
use rayon::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::chunking::{Chunk, normalize_ticker};
use crate::error::IndexError;

/// Default database location, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".finrag/index.db";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DIMENSIONS_KEY: &str = "dimensions";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id  TEXT    NOT NULL,
    chunk_index  INTEGER NOT NULL,
    ticker       TEXT    NOT NULL,
    filing_date  TEXT    NOT NULL,
    source_ref   TEXT    NOT NULL DEFAULT '',
    start_offset INTEGER NOT NULL,
    end_offset   INTEGER NOT NULL,
    content      TEXT    NOT NULL,
    embedding    BLOB    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_ticker ON chunks(ticker);
";

/// Exact-match metadata filter applied before ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    /// Only chunks from this ticker (normalized to upper case).
    pub ticker: Option<String>,
    /// Only chunks from this filing date.
    pub filing_date: Option<NaiveDate>,
}

impl MetadataFilter {
    /// Matches everything.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Matches one ticker.
    #[must_use]
    pub fn ticker(ticker: &str) -> Self {
        Self {
            ticker: Some(normalize_ticker(ticker)),
            filing_date: None,
        }
    }

    /// Additionally restricts to one filing date.
    #[must_use]
    pub const fn with_filing_date(mut self, date: NaiveDate) -> Self {
        self.filing_date = Some(date);
        self
    }

    fn matches(&self, chunk: &Chunk) -> bool {
        self.ticker.as_ref().is_none_or(|t| *t == chunk.ticker)
            && self.filing_date.is_none_or(|d| d == chunk.filing_date)
    }
}

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Stored chunk.
    pub chunk: Chunk,
    /// Raw cosine similarity in `[-1, 1]`.
    pub similarity: f32,
    /// Normalized relevance in `[0, 1]`.
    pub relevance: f32,
}

/// Per-ticker chunk and document counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerSummary {
    /// Ticker symbol.
    pub ticker: String,
    /// Indexed chunks.
    pub chunks: usize,
    /// Distinct documents.
    pub documents: usize,
}

#[derive(Debug)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: Vec<Entry>,
    dimensions: Option<usize>,
}

/// SQLite-backed vector index with an in-memory search cache.
#[derive(Debug)]
pub struct VectorIndex {
    conn: Mutex<Connection>,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Opens (creating if needed) the index at `path` and loads it.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the file cannot be opened or a stored row is
    /// corrupt.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let index = Self::from_connection(conn)?;
        info!(
            path = %path.display(),
            chunks = index.count(),
            "opened vector index"
        );
        Ok(index)
    }

    /// Opens an existing index, failing if it was never created.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NotInitialized`] if `path` does not exist.
    pub fn open_existing(path: &Path) -> Result<Self, IndexError> {
        if !path.exists() {
            return Err(IndexError::NotInitialized);
        }
        Self::open(path)
    }

    /// Creates a non-persistent index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if `SQLite` cannot allocate it.
    pub fn in_memory() -> Result<Self, IndexError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, IndexError> {
        conn.execute_batch(SCHEMA)?;
        let state = load_state(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            state: RwLock::new(state),
        })
    }

    /// Appends chunk/vector pairs.
    ///
    /// The first insert into an empty index fixes its dimensionality. The
    /// call is all-or-nothing.
    ///
    /// # Errors
    ///
    /// - [`IndexError::LengthMismatch`] if the slices differ in length.
    /// - [`IndexError::DimensionMismatch`] if any vector has the wrong length.
    /// - [`IndexError::Database`] if the transaction fails.
    pub fn add(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<usize, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }
        let Some(first) = vectors.first() else {
            return Ok(0);
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let expected = state.dimensions.unwrap_or(first.len());
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        if state.dimensions.is_none() {
            tx.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
                params![DIMENSIONS_KEY, expected.to_string()],
            )?;
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (document_id, chunk_index, ticker, filing_date, source_ref,
                                     start_offset, end_offset, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (chunk, vector) in chunks.iter().zip(vectors) {
                stmt.execute(params![
                    chunk.document_id,
                    sql_int(chunk.chunk_id)?,
                    chunk.ticker,
                    chunk.filing_date.format(DATE_FORMAT).to_string(),
                    chunk.source_ref,
                    sql_int(chunk.start)?,
                    sql_int(chunk.end)?,
                    chunk.content,
                    encode_vector(vector),
                ])?;
            }
        }
        tx.commit()?;

        state.dimensions = Some(expected);
        state.entries.extend(
            chunks
                .iter()
                .cloned()
                .zip(vectors.iter().cloned())
                .map(|(chunk, vector)| Entry { chunk, vector }),
        );

        debug!(added = chunks.len(), dimensions = expected, "indexed chunks");
        Ok(chunks.len())
    }

    /// Returns the `k` most relevant chunks passing `filter`.
    ///
    /// Results are ordered by decreasing relevance; equal scores keep
    /// insertion order.
    ///
    /// # Errors
    ///
    /// - [`IndexError::InvalidTopK`] if `k` is zero.
    /// - [`IndexError::DimensionMismatch`] if the query vector has the wrong
    ///   length for a non-empty index.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchResult>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidTopK { k });
        }

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(expected) = state.dimensions
            && query.len() != expected
        {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }

        // collect() on a rayon iterator keeps source order, so the stable
        // sort below breaks ties by insertion order.
        let mut scored: Vec<(usize, f32)> = state
            .entries
            .par_iter()
            .enumerate()
            .filter(|(_, entry)| filter.matches(&entry.chunk))
            .map(|(pos, entry)| (pos, cosine_similarity(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(pos, similarity)| SearchResult {
                chunk: state.entries[pos].chunk.clone(),
                similarity,
                relevance: relevance(similarity),
            })
            .collect())
    }

    /// Number of indexed chunks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether any chunk is indexed.
    #[must_use]
    pub fn has_documents(&self) -> bool {
        self.count() > 0
    }

    /// Dimensionality fixed by the first insert, if any.
    #[must_use]
    pub fn dimensions(&self) -> Option<usize> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .dimensions
    }

    /// Distinct tickers with chunk and document counts, sorted by ticker.
    #[must_use]
    pub fn tickers(&self) -> Vec<TickerSummary> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut by_ticker: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();
        for entry in &state.entries {
            let slot = by_ticker.entry(entry.chunk.ticker.as_str()).or_default();
            slot.0 += 1;
            slot.1.insert(entry.chunk.document_id.as_str());
        }
        by_ticker
            .into_iter()
            .map(|(ticker, (chunks, docs))| TickerSummary {
                ticker: ticker.to_string(),
                chunks,
                documents: docs.len(),
            })
            .collect()
    }

    /// Removes every chunk and forgets the dimensionality.
    ///
    /// Returns the number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Database`] if the delete fails.
    pub fn clear(&self) -> Result<usize, IndexError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM chunks", [])?;
        tx.execute("DELETE FROM meta WHERE key = ?1", params![DIMENSIONS_KEY])?;
        tx.commit()?;

        let removed = state.entries.len();
        *state = IndexState::default();
        info!(removed, "cleared vector index");
        Ok(removed)
    }
}

/// Renders results as a numbered context block for the language model.
///
/// Each result becomes a header line plus its content; results are
/// separated by a `---` line.
#[must_use]
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[Source {}] ticker: {} | filing_date: {} | relevance: {:.3}\n{}",
                i + 1,
                r.chunk.ticker,
                r.chunk.filing_date.format(DATE_FORMAT),
                r.relevance,
                r.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Cosine similarity; zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Maps cosine similarity onto `[0, 1]`.
#[must_use]
pub fn relevance(similarity: f32) -> f32 {
    f32::midpoint(1.0, similarity).clamp(0.0, 1.0)
}

/// Converts an offset or index for binding as an `INTEGER` column.
fn sql_int(value: usize) -> Result<i64, IndexError> {
    i64::try_from(value)
        .map_err(|e| IndexError::Database(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))
}

/// Converts a stored `INTEGER` column back to an offset or index.
fn column_usize(row_id: i64, column: &str, value: i64) -> Result<usize, IndexError> {
    usize::try_from(value).map_err(|_| IndexError::Corrupt {
        row_id,
        message: format!("{column} {value} is out of range"),
    })
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(row_id: i64, bytes: &[u8]) -> Result<Vec<f32>, IndexError> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Corrupt {
            row_id,
            message: format!("embedding blob length {} is not a multiple of 4", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

struct RawRow {
    row_id: i64,
    document_id: String,
    chunk_index: i64,
    ticker: String,
    filing_date: String,
    source_ref: String,
    start: i64,
    end: i64,
    content: String,
    embedding: Vec<u8>,
}

fn load_state(conn: &Connection) -> Result<IndexState, IndexError> {
    let dimensions = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![DIMENSIONS_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .and_then(|v| v.parse::<usize>().ok());

    let mut stmt = conn.prepare(
        "SELECT id, document_id, chunk_index, ticker, filing_date, source_ref,
                start_offset, end_offset, content, embedding
         FROM chunks ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(RawRow {
            row_id: row.get(0)?,
            document_id: row.get(1)?,
            chunk_index: row.get(2)?,
            ticker: row.get(3)?,
            filing_date: row.get(4)?,
            source_ref: row.get(5)?,
            start: row.get(6)?,
            end: row.get(7)?,
            content: row.get(8)?,
            embedding: row.get(9)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let raw = row?;
        let filing_date = NaiveDate::parse_from_str(&raw.filing_date, DATE_FORMAT).map_err(|e| {
            IndexError::Corrupt {
                row_id: raw.row_id,
                message: format!("bad filing_date '{}': {e}", raw.filing_date),
            }
        })?;
        let vector = decode_vector(raw.row_id, &raw.embedding)?;
        if let Some(expected) = dimensions
            && vector.len() != expected
        {
            return Err(IndexError::Corrupt {
                row_id: raw.row_id,
                message: format!("{}-d vector in {expected}-d index", vector.len()),
            });
        }
        entries.push(Entry {
            chunk: Chunk {
                chunk_id: column_usize(raw.row_id, "chunk_index", raw.chunk_index)?,
                content: raw.content,
                document_id: raw.document_id,
                ticker: raw.ticker,
                filing_date,
                source_ref: raw.source_ref,
                start: column_usize(raw.row_id, "start_offset", raw.start)?,
                end: column_usize(raw.row_id, "end_offset", raw.end)?,
            },
            vector,
        });
    }

    Ok(IndexState {
        entries,
        dimensions,
    })
}
