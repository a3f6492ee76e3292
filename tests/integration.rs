use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsift_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docsift"))
}

fn setup_test_env(provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join(".hidden")).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(
        files_dir.join(".hidden").join("secret.txt"),
        "This file lives in a hidden directory and must never be indexed.",
    )
    .unwrap();

    let embedding = match provider {
        "hashed" => "[embedding]\nprovider = \"hashed\"\ndims = 64\n".to_string(),
        other => format!("[embedding]\nprovider = \"{}\"\n", other),
    };

    let config_content = format!(
        r#"[db]
path = "{}/data/docsift.sqlite"

[watch]
root = "{}/files"

[chunking]
chunk_size = 400
overlap = 40

{}
[retrieval]
default_limit = 10
similarity_threshold = 0.0
"#,
        root.display(),
        root.display(),
        embedding
    );

    let config_path = config_dir.join("docsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn first_document_id(search_out: &str) -> Option<String> {
    search_out
        .lines()
        .find(|l| l.trim().starts_with("id:"))
        .and_then(|l| l.split("id:").nth(1))
        .map(|s| s.trim().to_string())
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("disabled");

    let (stdout, stderr, success) = run_docsift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/docsift.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("disabled");

    let (_, _, success1) = run_docsift(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docsift(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_scan_skips_hidden_files() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["init"]);
    let (stdout, stderr, success) = run_docsift(&config_path, &["scan"]);
    assert!(success, "scan failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("Scanned 3 file(s): 3 new"),
        "unexpected scan report: {}",
        stdout
    );

    let (docs, _, _) = run_docsift(&config_path, &["docs"]);
    assert!(!docs.contains("secret.txt"), "hidden file indexed: {}", docs);
    assert!(docs.contains("3 document(s)"), "{}", docs);
}

#[test]
fn test_rescan_is_idempotent() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout, _, success) = run_docsift(&config_path, &["scan"]);
    assert!(success);
    assert!(
        stdout.contains("0 new, 0 changed, 3 unchanged"),
        "second scan should change nothing: {}",
        stdout
    );
}

#[test]
fn test_changed_file_is_reindexed() {
    let (tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    fs::write(
        tmp.path().join("files").join("alpha.md"),
        "# Alpha Document Updated\n\nThis file was modified to mention zeppelins.",
    )
    .unwrap();

    let (stdout, _, _) = run_docsift(&config_path, &["scan"]);
    assert!(stdout.contains("1 changed"), "{}", stdout);

    let (search_out, _, _) = run_docsift(&config_path, &["search", "zeppelins"]);
    assert!(search_out.contains("alpha.md"), "{}", search_out);
}

#[test]
fn test_search_keyword_without_embeddings() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout, stderr, success) = run_docsift(&config_path, &["search", "Rust programming"]);
    assert!(success, "search failed: {}", stderr);
    assert!(
        stdout.contains("alpha.md"),
        "Expected alpha.md in results, got: {}",
        stdout
    );
    assert!(stdout.contains("Keyword"), "{}", stdout);
    assert!(
        stderr.contains("keyword results only"),
        "vector failure should be surfaced: {}",
        stderr
    );
}

#[test]
fn test_search_tolerates_typos() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout, _, success) = run_docsift(&config_path, &["search", "kubernetis"]);
    assert!(success);
    assert!(stdout.contains("gamma.txt"), "{}", stdout);
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout, _, success) = run_docsift(&config_path, &["search", "   "]);
    assert!(success);
    assert!(stdout.contains("No results."), "{}", stdout);
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout1, _, _) = run_docsift(&config_path, &["search", "document"]);
    let (stdout2, _, _) = run_docsift(&config_path, &["search", "document"]);
    assert_eq!(stdout1, stdout2, "Search results should be deterministic");
}

#[test]
fn test_hybrid_search_with_hashed_embeddings() {
    let (_tmp, config_path) = setup_test_env("hashed");

    run_docsift(&config_path, &["scan"]);
    let (stdout, stderr, success) = run_docsift(&config_path, &["search", "deep learning"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("beta.md"), "{}", stdout);
    assert!(stdout.contains("Both"), "beta.md should match both channels: {}", stdout);
    assert!(!stderr.contains("keyword results only"), "{}", stderr);
}

#[test]
fn test_context_numbers_sources() {
    let (_tmp, config_path) = setup_test_env("hashed");

    run_docsift(&config_path, &["scan"]);
    let (stdout, _, success) = run_docsift(&config_path, &["context", "Kubernetes", "--max-chunks", "2"]);
    assert!(success);
    assert!(stdout.contains("[1] "), "{}", stdout);
    assert!(stdout.contains("Sources:"), "{}", stdout);
    assert!(stdout.contains("gamma.txt"), "{}", stdout);
}

#[test]
fn test_get_document() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (search_out, _, _) = run_docsift(&config_path, &["search", "Rust programming"]);
    let id = first_document_id(&search_out).expect("search should print a document id");

    let (stdout, _, success) = run_docsift(&config_path, &["get", &id]);
    assert!(success);
    assert!(stdout.contains("Alpha Document"), "{}", stdout);
    assert!(stdout.contains("--- Chunks (1) ---"), "{}", stdout);
    assert!(stdout.contains("file_type:     md"), "{}", stdout);
}

#[test]
fn test_get_unknown_document_fails() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["init"]);
    let (_, stderr, success) = run_docsift(&config_path, &["get", "no-such-id"]);
    assert!(!success);
    assert!(stderr.contains("document not found"), "{}", stderr);
}

#[test]
fn test_remove_document() {
    let (tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let beta = tmp.path().join("files").join("beta.md");
    let (stdout, _, success) = run_docsift(&config_path, &["remove", beta.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Removed"), "{}", stdout);

    let (search_out, _, _) = run_docsift(&config_path, &["search", "PyTorch"]);
    assert!(!search_out.contains("beta.md"), "{}", search_out);

    let (again, _, _) = run_docsift(&config_path, &["remove", beta.to_str().unwrap()]);
    assert!(again.contains("Not indexed"), "{}", again);
}

#[test]
fn test_clear_and_reindex() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (cleared, _, success) = run_docsift(&config_path, &["clear"]);
    assert!(success);
    assert!(cleared.contains("Cleared 3 document(s)."), "{}", cleared);

    let (reindexed, _, success) = run_docsift(&config_path, &["reindex"]);
    assert!(success);
    assert!(reindexed.contains("3 new"), "{}", reindexed);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env("disabled");

    run_docsift(&config_path, &["scan"]);
    let (stdout, _, success) = run_docsift(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   3"), "{}", stdout);
    assert!(stdout.contains("By category:"), "{}", stdout);
}

#[test]
fn test_health() {
    let (_tmp, config_path) = setup_test_env("disabled");
    let (stdout, _, success) = run_docsift(&config_path, &["health"]);
    assert!(success);
    assert!(stdout.contains("embedding: disabled"), "{}", stdout);

    let (_tmp, config_path) = setup_test_env("hashed");
    let (stdout, _, success) = run_docsift(&config_path, &["health"]);
    assert!(success);
    assert!(stdout.contains("embedding: ok (hashed, 64 dims)"), "{}", stdout);
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("docsift.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/db.sqlite\"\n\n[chunking]\nchunk_size = 100\noverlap = 100\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_docsift(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "{}", stderr);
}
