//! End-to-end tests for the `finrag` binary using the local hash embedder.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const APPLE_FILING: &str = "Apple Inc. reported total net sales of $394.3 billion for fiscal \
2022, an increase of 8 percent. iPhone net sales were $205.5 billion. Net income was \
$99.8 billion. Services revenue reached a record $78.1 billion.";

const MICROSOFT_FILING: &str = "Microsoft revenue was $198.3 billion, up 18 percent. Operating \
income was $83.4 billion. Intelligent Cloud revenue, driven by Azure, grew to $75.3 billion.";

fn finrag(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("finrag").unwrap();
    cmd.env("FINRAG_DB_PATH", db)
        .env("FINRAG_EMBEDDING_PROVIDER", "hash")
        .env_remove("FINRAG_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("FINRAG_LOG");
    cmd
}

fn setup() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("index.db");
    (dir, db)
}

fn ingest(dir: &TempDir, db: &Path, ticker: &str, text: &str) {
    let file = dir.path().join(format!("{ticker}.txt"));
    std::fs::write(&file, text).unwrap();
    finrag(db)
        .args(["ingest", file.to_str().unwrap(), "--ticker", ticker])
        .args(["--filing-date", "2022-10-28"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "for {}",
            ticker.to_uppercase()
        )));
}

#[test]
fn init_then_status() {
    let (_dir, db) = setup();
    finrag(&db)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized finrag index"));

    finrag(&db)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Chunks: 0"));
}

#[test]
fn commands_require_init() {
    let (_dir, db) = setup();
    finrag(&db)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("finrag init"));
}

#[test]
fn ingest_search_and_filter() {
    let (dir, db) = setup();
    finrag(&db).arg("init").assert().success();
    ingest(&dir, &db, "aapl", APPLE_FILING);
    ingest(&dir, &db, "MSFT", MICROSOFT_FILING);

    finrag(&db)
        .args(["search", "total net sales", "-k", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[Source 1] ticker: "))
        .stdout(predicate::str::contains("filing_date: 2022-10-28"));

    finrag(&db)
        .args(["search", "revenue", "--ticker", "msft", "-k", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ticker: MSFT"))
        .stdout(predicate::str::contains("ticker: AAPL").not());

    finrag(&db)
        .args(["--format", "json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ticker\": \"AAPL\""))
        .stdout(predicate::str::contains("\"ticker\": \"MSFT\""));
}

#[test]
fn clear_empties_index() {
    let (dir, db) = setup();
    finrag(&db).arg("init").assert().success();
    ingest(&dir, &db, "AAPL", APPLE_FILING);

    finrag(&db).arg("clear").assert().failure();
    finrag(&db)
        .args(["clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 chunk(s)."));
    finrag(&db)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No documents indexed."));
}

#[test]
fn query_without_api_key_fails_cleanly() {
    let (dir, db) = setup();
    finrag(&db).arg("init").assert().success();
    ingest(&dir, &db, "AAPL", APPLE_FILING);

    finrag(&db)
        .args(["query", "What was Apple's revenue?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key not set"));
}

#[test]
fn query_on_empty_index_makes_no_model_call() {
    let (_dir, db) = setup();
    finrag(&db).arg("init").assert().success();

    finrag(&db)
        .env("FINRAG_API_KEY", "sk-test")
        .env("FINRAG_BASE_URL", "http://127.0.0.1:9")
        .args(["query", "What was Apple's revenue?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No documents are indexed yet"));
}

#[test]
fn blank_query_rejected() {
    let (dir, db) = setup();
    finrag(&db).arg("init").assert().success();
    ingest(&dir, &db, "AAPL", APPLE_FILING);

    finrag(&db)
        .env("FINRAG_API_KEY", "sk-test")
        .env("FINRAG_BASE_URL", "http://127.0.0.1:9")
        .args(["query", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Please provide a valid query"));
}

#[test]
fn init_prompts_scaffolds_once() {
    let dir = TempDir::new().unwrap();
    let prompts = dir.path().join("prompts");
    let db = dir.path().join("unused.db");

    finrag(&db)
        .args(["init-prompts", prompts.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote system prompt"));
    assert!(prompts.join("system.md").exists());

    finrag(&db)
        .args(["init-prompts", prompts.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}
