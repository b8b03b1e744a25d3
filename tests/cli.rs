//! Tests that drive the built `rag` binary.
//!
//! Snapshots are built through the library with a stub provider, so none of
//! these tests touch the network.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

use ragchat::embedding::EmbeddingProvider;
use ragchat::index::VectorIndex;

fn rag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag");
    path
}

struct LengthProvider;

impl EmbeddingProvider for LengthProvider {
    fn model_name(&self) -> &str {
        "length"
    }
    fn dims(&self) -> usize {
        4
    }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(vec![text.chars().count() as f32; 4])
    }
}

/// A temp dir holding `faiss_index/` (two chunks, dimension 4) and a config
/// pointing at it.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let index = VectorIndex::new(4, Arc::new(LengthProvider)).unwrap();
    index
        .ingest_chunks(vec!["cat".to_string(), "caterpillar".to_string()])
        .unwrap();
    index.save(&root.join("faiss_index")).unwrap();

    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("data").join("doc.txt"), "some text").unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_content = format!(
        r#"[index]
path = "{root}/faiss_index"
dimension = 4

[retrieval]
num_chunks = 2

[ingest]
data_dir = "{root}/data"
"#,
        root = root.display()
    );
    let config_path = config_dir.join("rag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rag(config_path: Option<&Path>, args: &[&str]) -> (String, String, bool) {
    let binary = rag_binary();
    let mut cmd = Command::new(&binary);
    if let Some(config_path) = config_path {
        cmd.arg("--config").arg(config_path);
    }
    let output = cmd
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_help_lists_commands() {
    let (stdout, _, success) = run_rag(None, &["--help"]);
    assert!(success);
    for command in ["ingest", "query", "chat", "stats"] {
        assert!(stdout.contains(command), "missing {} in help", command);
    }
}

#[test]
fn test_stats_with_explicit_path_needs_no_config() {
    let (tmp, _) = setup_test_env();
    let snapshot = tmp.path().join("faiss_index");
    let (stdout, stderr, success) = run_rag(
        Some(Path::new("/nonexistent/rag.toml")),
        &["stats", "--path", snapshot.to_str().unwrap()],
    );
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Vectors:     2"));
    assert!(stdout.contains("Chunks:      2"));
    assert!(stdout.contains("Dimension:   4"));
}

#[test]
fn test_stats_uses_configured_path() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_rag(Some(&config_path), &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Chunk chars: mean 7, max 11"));
}

#[test]
fn test_stats_missing_snapshot_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent");
    let (_, stderr, success) = run_rag(None, &["stats", "--path", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("no snapshot"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_rag(Some(&config_path), &["ingest"]);
    assert!(!success);
    assert!(
        stderr.contains("embedding provider is required"),
        "stderr: {}",
        stderr
    );
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("rag.toml");
    fs::write(&config_path, "[chunking]\nmax_tokens = 10\noverlap_tokens = 20\n").unwrap();
    let (_, stderr, success) = run_rag(Some(&config_path), &["query", "anything"]);
    assert!(!success);
    assert!(stderr.contains("overlap_tokens"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_file() {
    let (_, stderr, success) = run_rag(Some(Path::new("/nonexistent/rag.toml")), &["chat"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}
