use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let config = root.join("mrag.toml");
        fs::write(
            &config,
            format!(
                r#"[vector_db]
persist_directory = "{data}"
collection_name = "cli_test"

[embedding]
provider = "disabled"

[cache]
directory = "{cache}"
ttl_secs = 60

[logging]
level = "error"
"#,
                data = root.join("data").display(),
                cache = root.join("cache").display(),
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn mrag(&self, args: &[&str]) -> Output {
        run_with_config(&self.config, args)
    }
}

fn run_with_config(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mrag"))
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run mrag")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn init_creates_index_and_cache() {
    let ws = Workspace::new();
    let out = ws.mrag(&["init"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Index initialized at"));
    assert!(ws.path("data/index.sqlite").exists());
    assert!(ws.path("cache").is_dir());

    let again = ws.mrag(&["init"]);
    assert!(again.status.success());
}

#[test]
fn stats_on_fresh_index() {
    let ws = Workspace::new();
    let out = ws.mrag(&["stats"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Messages:          0"));
    assert!(text.contains("Collection:        cli_test"));
    assert!(text.contains("Last updated:      never"));
    assert!(text.contains("Embedding model:   disabled"));
}

#[test]
fn query_on_empty_index_fails() {
    let ws = Workspace::new();
    let out = ws.mrag(&["query", "What about the budget?"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("No messages in the index"));
}

#[test]
fn ingest_skips_invalid_records() {
    let ws = Workspace::new();
    let file = ws.path("messages.json");
    fs::write(
        &file,
        r#"[{"message_id": "1", "author": "Alice"}, {"content": "  "}]"#,
    )
    .unwrap();

    let out = ws.mrag(&["ingest", file.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("Ingested 0 of 2 messages"));
    assert!(text.contains("Skipped: 2 invalid"));
    assert!(text.contains("Total messages in index: 0"));
}

#[test]
fn ingest_rejects_non_message_json() {
    let ws = Workspace::new();
    let file = ws.path("number.json");
    fs::write(&file, "42").unwrap();

    let out = ws.mrag(&["ingest", file.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).starts_with("Error:"));
}

#[test]
fn ingest_missing_file_fails() {
    let ws = Workspace::new();
    let out = ws.mrag(&["ingest", ws.path("absent.json").to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Failed to read messages file"));
}

#[test]
fn cache_clear_counts_entries() {
    let ws = Workspace::new();
    let cache = ws.path("cache");
    fs::create_dir_all(&cache).unwrap();
    let fresh = format!(
        r#"{{"timestamp": {}, "prompt": "p", "model": "m", "response": "r"}}"#,
        chrono::Utc::now().timestamp()
    );
    fs::write(cache.join("fresh.json"), fresh).unwrap();
    fs::write(
        cache.join("stale.json"),
        r#"{"timestamp": 0, "prompt": "p", "model": "m", "response": "r"}"#,
    )
    .unwrap();
    fs::write(cache.join("corrupt.json"), "{not json").unwrap();

    let out = ws.mrag(&["cache", "clear", "--expired"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Removed 2 cache entries."));
    assert!(cache.join("fresh.json").exists());

    let out = ws.mrag(&["cache", "clear"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Removed 1 cache entries."));
    assert!(!cache.join("fresh.json").exists());
}

#[test]
fn clear_requires_confirmation_without_tty() {
    let ws = Workspace::new();
    let out = ws.mrag(&["clear"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("pass --yes"));

    let out = ws.mrag(&["clear", "--yes"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("Cleared 0 messages."));
}

#[test]
fn missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let out = run_with_config(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("Failed to read config file"));
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[rag]\ntop_k = 0\n").unwrap();
    let out = run_with_config(&config, &["stats"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("rag.top_k"));
}

#[test]
fn index_commands_need_no_embedding_backend() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("mrag.toml");
    fs::write(
        &config,
        format!(
            "[vector_db]\npersist_directory = \"{}\"\n\n[cache]\ndirectory = \"{}\"\n",
            tmp.path().join("data").display(),
            tmp.path().join("cache").display(),
        ),
    )
    .unwrap();

    let commands: [&[&str]; 3] = [&["init"], &["stats"], &["delete", "msg-1"]];
    for args in commands {
        let out = run_with_config(&config, args);
        assert!(out.status.success(), "{args:?}: {}", stderr(&out));
    }
    let out = run_with_config(&config, &["stats"]);
    assert!(stdout(&out).contains("Embedding model:   all-minilm-l6-v2"));
}
