//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. Async work runs on a
//! tokio runtime created per command.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::agent::{Orchestrator, PromptSet, ToolSet, create_provider};
use crate::chunking::{Chunker, Document, normalize_ticker};
use crate::cli::output::{
    IndexStats, OutputFormat, format_ingest_report, format_search_results, format_status,
};
use crate::cli::parser::{Cli, Commands};
use crate::config::{RagConfig, RagConfigBuilder};
use crate::embedding::create_embedder;
use crate::error::{CommandError, Error, Result};
use crate::ingest::Ingestor;
use crate::io::read_file;
use crate::ratelimit::RateLimiter;
use crate::storage::{MetadataFilter, VectorIndex};

// ==================== Parameter Structs ====================

/// Parameters for the ingest command.
#[derive(Debug, Clone)]
pub struct IngestParams<'a> {
    /// Filing text file.
    pub file: &'a Path,
    /// Company ticker.
    pub ticker: &'a str,
    /// Filing date.
    pub filing_date: chrono::NaiveDate,
    /// Source reference override.
    pub source: Option<&'a str>,
    /// Document identifier override.
    pub id: Option<&'a str>,
    /// Chunk size override.
    pub chunk_size: Option<usize>,
    /// Chunk overlap override.
    pub overlap: Option<usize>,
}

/// Parameters for the query command.
#[derive(Debug, Clone, Default)]
pub struct QueryParams<'a> {
    /// The question.
    pub question: &'a str,
    /// Directory containing prompt overrides.
    pub prompt_dir: Option<&'a Path>,
    /// Disable query hints.
    pub no_enhance: bool,
}

/// Executes the CLI command.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Init { force } => cmd_init(&db_path, *force, format),
        Commands::Ingest {
            file,
            ticker,
            filing_date,
            source,
            id,
            chunk_size,
            overlap,
        } => {
            let params = IngestParams {
                file,
                ticker,
                filing_date: *filing_date,
                source: source.as_deref(),
                id: id.as_deref(),
                chunk_size: *chunk_size,
                overlap: *overlap,
            };
            cmd_ingest(&db_path, &params, format)
        }
        Commands::Search {
            query,
            top_k,
            ticker,
        } => cmd_search(&db_path, query, *top_k, ticker.as_deref(), format),
        Commands::Query {
            question,
            prompt_dir,
            no_enhance,
        } => {
            let params = QueryParams {
                question,
                prompt_dir: prompt_dir.as_deref(),
                no_enhance: *no_enhance,
            };
            cmd_query(&db_path, &params, format)
        }
        Commands::Status => cmd_status(&db_path, format),
        Commands::Clear { yes } => cmd_clear(&db_path, *yes, format),
        Commands::InitPrompts { dir } => cmd_init_prompts(dir.as_deref(), format),
    }
}

/// Opens the index and ensures it's initialized.
fn open_index(db_path: &Path) -> Result<VectorIndex> {
    Ok(VectorIndex::open_existing(db_path)?)
}

/// Builds configuration from the environment plus command overrides.
fn load_config(apply: impl FnOnce(RagConfigBuilder) -> RagConfigBuilder) -> Result<RagConfig> {
    let config = apply(RagConfig::builder().from_env()).build()?;
    debug!(
        embedding_provider = ?config.embedding_provider,
        chat_model = %config.chat_model,
        "configuration loaded"
    );
    Ok(config)
}

/// Creates the tokio runtime used as sync/async bridge.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        Error::from(CommandError::ExecutionFailed(format!(
            "Failed to create async runtime: {e}"
        )))
    })
}

// ==================== Command Implementations ====================

fn cmd_init(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "Database already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if force && db_path.exists() {
        std::fs::remove_file(db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("Failed to remove existing database: {e}"))
        })?;
    }

    VectorIndex::open(db_path)?;

    match format {
        OutputFormat::Text => Ok(format!(
            "Initialized finrag index at: {}\n",
            db_path.display()
        )),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "success": true,
                "path": db_path.to_string_lossy(),
                "force": force
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_ingest(db_path: &Path, params: &IngestParams<'_>, format: OutputFormat) -> Result<String> {
    let ticker = normalize_ticker(params.ticker);
    if ticker.is_empty() {
        return Err(CommandError::InvalidArgument("ticker must not be empty".to_string()).into());
    }

    let index = Arc::new(open_index(db_path)?);
    let config = load_config(|mut builder| {
        if let Some(size) = params.chunk_size {
            builder = builder.chunk_size(size);
        }
        if let Some(overlap) = params.overlap {
            builder = builder.chunk_overlap(overlap);
        }
        builder
    })?;

    let content = read_file(params.file)?;
    let id = params.id.map_or_else(
        || {
            params
                .file
                .file_stem()
                .map_or_else(|| ticker.clone(), |s| s.to_string_lossy().into_owned())
        },
        ToString::to_string,
    );
    let source = params
        .source
        .map_or_else(|| params.file.display().to_string(), ToString::to_string);
    let document = Document::new(id, content, &ticker, params.filing_date).with_source(source);

    let chunker = Chunker::new(config.chunk_size, config.chunk_overlap)?;
    let limiter = Arc::new(RateLimiter::new(config.min_call_spacing));
    let embedder = Arc::new(create_embedder(&config, &limiter)?);
    let ingestor = Ingestor::new(chunker, embedder, index);

    let report = runtime()?.block_on(ingestor.ingest(std::slice::from_ref(&document)))?;
    Ok(format_ingest_report(&report, &ticker, format))
}

fn cmd_search(
    db_path: &Path,
    query: &str,
    top_k: usize,
    ticker: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    if query.trim().is_empty() {
        return Err(CommandError::InvalidArgument("query must not be empty".to_string()).into());
    }

    let index = open_index(db_path)?;
    if !index.has_documents() {
        return Ok(format_search_results(&[], query, format));
    }

    let config = load_config(|builder| builder)?;
    let limiter = Arc::new(RateLimiter::new(config.min_call_spacing));
    let embedder = create_embedder(&config, &limiter)?;
    let vector = runtime()?.block_on(embedder.embed_query(query))?;

    let filter = ticker.map_or_else(MetadataFilter::none, MetadataFilter::ticker);
    let results = index.search(&vector, top_k, &filter)?;
    Ok(format_search_results(&results, query, format))
}

fn cmd_query(db_path: &Path, params: &QueryParams<'_>, format: OutputFormat) -> Result<String> {
    let index = Arc::new(open_index(db_path)?);
    let config = load_config(|mut builder| {
        if let Some(dir) = params.prompt_dir {
            builder = builder.prompt_dir(dir);
        }
        if params.no_enhance {
            builder = builder.enhance_queries(false);
        }
        builder
    })?;

    let provider = create_provider(&config)?;

    // one limiter for chat and embedding calls
    let limiter = Arc::new(RateLimiter::new(config.min_call_spacing));
    let embedder = Arc::new(create_embedder(&config, &limiter)?);
    let tools = ToolSet::new(index, embedder);
    let orchestrator = Orchestrator::new(Arc::from(provider), tools, &config, limiter)?;

    let answer = runtime()?
        .block_on(orchestrator.query(params.question))
        .map_err(|e| CommandError::ExecutionFailed(e.user_message()))?;

    match format {
        OutputFormat::Text => Ok(format!("{answer}\n")),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "question": params.question,
                "answer": answer,
            });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_status(db_path: &Path, format: OutputFormat) -> Result<String> {
    let index = open_index(db_path)?;
    let stats = IndexStats {
        path: db_path.display().to_string(),
        chunks: index.count(),
        dimensions: index.dimensions(),
        tickers: index.tickers(),
    };
    Ok(format_status(&stats, format))
}

fn cmd_clear(db_path: &Path, yes: bool, format: OutputFormat) -> Result<String> {
    if !yes {
        return Err(CommandError::ExecutionFailed(
            "Use --yes to confirm. This deletes every indexed chunk.".to_string(),
        )
        .into());
    }

    let index = open_index(db_path)?;
    let removed = index.clear()?;

    match format {
        OutputFormat::Text => Ok(format!("Removed {removed} chunk(s).\n")),
        OutputFormat::Json => {
            let json = serde_json::json!({ "success": true, "removed": removed });
            Ok(format.to_json(&json))
        }
    }
}

fn cmd_init_prompts(dir: Option<&Path>, format: OutputFormat) -> Result<String> {
    let target_dir = dir
        .map(Path::to_path_buf)
        .or_else(PromptSet::default_dir)
        .ok_or_else(|| {
            CommandError::ExecutionFailed(
                "Could not determine home directory for default prompt path".to_string(),
            )
        })?;

    let written = PromptSet::write_defaults(&target_dir).map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to write prompt templates: {e}"))
    })?;

    match format {
        OutputFormat::Text => {
            if written.is_empty() {
                Ok(format!(
                    "Prompt template already exists in: {}\n",
                    target_dir.display()
                ))
            } else {
                Ok(format!(
                    "Wrote system prompt to: {}\n\nEdit this file to customize the analyst.\n",
                    target_dir.display()
                ))
            }
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "directory": target_dir.to_string_lossy(),
                "written": written
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>(),
            });
            Ok(format.to_json(&json))
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap_or_else(|e| panic!("{e}"));
        let db_path = temp_dir.path().join("test.db");
        (temp_dir, db_path)
    }

    #[test]
    fn test_cmd_init() {
        let (_temp_dir, db_path) = setup();
        let result = cmd_init(&db_path, false, OutputFormat::Text);
        assert!(result.is_ok());
        assert!(db_path.exists());
    }

    #[test]
    fn test_cmd_init_already_exists() {
        let (_temp_dir, db_path) = setup();
        cmd_init(&db_path, false, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));

        assert!(cmd_init(&db_path, false, OutputFormat::Text).is_err());
        assert!(cmd_init(&db_path, true, OutputFormat::Text).is_ok());
    }

    #[test]
    fn test_cmd_status_requires_init() {
        let (_temp_dir, db_path) = setup();
        assert!(cmd_status(&db_path, OutputFormat::Text).is_err());

        cmd_init(&db_path, false, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));
        let text = cmd_status(&db_path, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));
        assert!(text.contains("Chunks: 0"));
        assert!(text.contains("No documents indexed."));
    }

    #[test]
    fn test_cmd_clear_requires_yes() {
        let (_temp_dir, db_path) = setup();
        cmd_init(&db_path, false, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));

        assert!(cmd_clear(&db_path, false, OutputFormat::Text).is_err());
        let text = cmd_clear(&db_path, true, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(text, "Removed 0 chunk(s).\n");
    }

    #[test]
    fn test_cmd_search_empty_index() {
        let (_temp_dir, db_path) = setup();
        cmd_init(&db_path, false, OutputFormat::Text).unwrap_or_else(|e| panic!("{e}"));
        let text = cmd_search(&db_path, "revenue", 2, None, OutputFormat::Text)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(text.starts_with("No results found"));
    }

    #[test]
    fn test_cmd_init_prompts_writes_once() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("{e}"));
        let first = cmd_init_prompts(Some(dir.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(first.starts_with("Wrote system prompt"));
        assert!(dir.path().join(crate::agent::prompt::SYSTEM_FILENAME).exists());

        let second = cmd_init_prompts(Some(dir.path()), OutputFormat::Text)
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(second.starts_with("Prompt template already exists"));
    }

    #[test]
    fn test_cmd_ingest_rejects_blank_ticker() {
        let (_temp_dir, db_path) = setup();
        let params = IngestParams {
            file: Path::new("missing.txt"),
            ticker: "  ",
            filing_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1).unwrap_or_default(),
            source: None,
            id: None,
            chunk_size: None,
            overlap: None,
        };
        assert!(matches!(
            cmd_ingest(&db_path, &params, OutputFormat::Text),
            Err(crate::error::Error::Command(CommandError::InvalidArgument(_)))
        ));
    }
}
