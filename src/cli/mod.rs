//! CLI layer for finrag.
//!
//! Provides the command-line interface using clap, with commands for
//! initializing the index, ingesting filings, searching and querying.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
