//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_TOP_K;

/// finrag: question answering over SEC 10-K filings.
///
/// Indexes filings into a local vector store and answers questions with a
/// tool-calling language model that retrieves from it.
#[derive(Parser, Debug)]
#[command(name = "finrag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the index database file.
    ///
    /// Defaults to `.finrag/index.db` in the current directory.
    #[arg(short, long, env = "FINRAG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the index database.
    #[command(after_help = r"Examples:
  finrag init                    # Initialize in current directory
  finrag init --force            # Re-initialize (destroys existing data)
  finrag --db-path ./my.db init  # Initialize with custom path
")]
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Chunk, embed and index one filing.
    #[command(after_help = r"Examples:
  finrag ingest aapl-10k-2022.txt --ticker AAPL --filing-date 2022-10-28
  finrag ingest msft.txt -t msft --filing-date 2022-07-28 --source https://www.sec.gov/...
")]
    Ingest {
        /// Path to the plain-text filing.
        file: PathBuf,

        /// Company ticker (stored upper case).
        #[arg(short, long)]
        ticker: String,

        /// Filing date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date)]
        filing_date: NaiveDate,

        /// Source reference stored with every chunk (defaults to the file path).
        #[arg(long)]
        source: Option<String>,

        /// Document identifier (defaults to the file stem).
        #[arg(long)]
        id: Option<String>,

        /// Chunk size in characters.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between consecutive chunks in characters.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Retrieve the most relevant excerpts without calling the model.
    #[command(after_help = r#"Examples:
  finrag search "total net sales"             # Top 2 excerpts across filings
  finrag search "cloud revenue" -k 5 -t MSFT  # Top 5 from one company
  finrag --format json search "net income" | jq '.results[].relevance'
"#)]
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Restrict results to one ticker.
        #[arg(short, long)]
        ticker: Option<String>,
    },

    /// Answer a question with the analyst agent.
    #[command(after_help = r#"Examples:
  finrag query "What was Apple's total revenue in fiscal 2022?"
  finrag query "Compare Microsoft and Alphabet operating income"
"#)]
    Query {
        /// The question.
        question: String,

        /// Directory containing a `system.md` prompt override.
        #[arg(long, env = "FINRAG_PROMPT_DIR")]
        prompt_dir: Option<PathBuf>,

        /// Send the question without keyword hints.
        #[arg(long)]
        no_enhance: bool,
    },

    /// Show index statistics.
    Status,

    /// Delete every indexed chunk.
    Clear {
        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Write the default system prompt to a directory for editing.
    InitPrompts {
        /// Target directory (defaults to `~/.config/finrag/prompts`).
        dir: Option<PathBuf>,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::storage::DEFAULT_DB_PATH))
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_db_path() {
        let cli = Cli {
            db_path: None,
            verbose: false,
            format: "text".to_string(),
            command: Commands::Status,
        };
        assert_eq!(
            cli.get_db_path(),
            PathBuf::from(crate::storage::DEFAULT_DB_PATH)
        );
    }

    #[test]
    fn test_ingest_args() {
        let cli = Cli::try_parse_from([
            "finrag",
            "ingest",
            "aapl.txt",
            "--ticker",
            "aapl",
            "--filing-date",
            "2022-10-28",
        ])
        .unwrap_or_else(|e| unreachable!("{e}"));
        let Commands::Ingest {
            ticker,
            filing_date,
            source,
            ..
        } = cli.command
        else {
            unreachable!()
        };
        assert_eq!(ticker, "aapl");
        assert_eq!(
            filing_date,
            NaiveDate::from_ymd_opt(2022, 10, 28).unwrap_or_default()
        );
        assert!(source.is_none());
    }

    #[test]
    fn test_bad_filing_date_rejected() {
        let result = Cli::try_parse_from([
            "finrag",
            "ingest",
            "aapl.txt",
            "--ticker",
            "AAPL",
            "--filing-date",
            "28/10/2022",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_search_defaults() {
        let cli = Cli::try_parse_from(["finrag", "search", "revenue"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        let Commands::Search { top_k, ticker, .. } = cli.command else {
            unreachable!()
        };
        assert_eq!(top_k, DEFAULT_TOP_K);
        assert!(ticker.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["finrag", "status", "--format", "json", "-v"])
            .unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(cli.format, "json");
        assert!(cli.verbose);
    }
}
