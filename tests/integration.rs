use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn hrank_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("hrank");
    path
}

const CORPUS: &str = r#"url,title,meta_description,body_text,depth,last_crawled,out_links,anchor_texts
https://news.com/africa-politics,Africa politics today,No Description,africa politics elections parliament africa politics,1,2024-01-01 10:00:00,"['https://gov.org/']","['Government']"
https://blog.com/africa-trip,Safari diary,A travel diary,africa safari travel diary,2,2024-01-02 10:00:00,"['https://news.com/africa-politics']","['politics']"
https://gov.org/,Government,Official portal,politics policy government,1,2024-01-03 10:00:00,"['https://news.com/africa-politics', 'https://external.net/']","['news', 'ext']"
https://food.com/bread,Bread,Recipes,sourdough bread baking,1,2024-01-04 10:00:00,[],[]
https://NEWS.com/africa-politics/,Africa politics (mirror),Mirror,later copy of the same page,1,2024-02-01 10:00:00,[],[]
,No url,x,body without url,1,2024-01-05 10:00:00,[],[]
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(root.join("crawl.csv"), CORPUS).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/corpus.sqlite"

[index]
dir = "{root}/data/index"

[embedding]
provider = "hash"

[retrieval]
top_k = 10

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("hrank.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_hrank(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = hrank_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run hrank binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn csv_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("crawl.csv")
        .display()
        .to_string()
}

fn ingested(config_path: &Path) {
    let (_, stderr, success) = run_hrank(config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (stdout, stderr, success) = run_hrank(config_path, &["ingest", &csv_path(config_path)]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success1) = run_hrank(&config_path, &["init"]);
    assert!(success1, "First init failed");
    assert!(stdout.contains("initialized"));

    let (_, _, success2) = run_hrank(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_dedups_and_skips() {
    let (_tmp, config_path) = setup_test_env();
    run_hrank(&config_path, &["init"]);

    let (stdout, stderr, success) = run_hrank(&config_path, &["ingest", &csv_path(&config_path)]);
    assert!(success, "ingest failed: {}", stderr);
    assert!(stdout.contains("rows read: 6"), "{}", stdout);
    assert!(stdout.contains("skipped rows: 1"), "{}", stdout);
    assert!(stdout.contains("duplicate url keys: 1"), "{}", stdout);
    assert!(stdout.contains("unique documents: 4"), "{}", stdout);
    assert!(stdout.contains("ok"));

    // Re-ingesting the same file changes nothing.
    let (stdout, _, _) = run_hrank(&config_path, &["ingest", &csv_path(&config_path)]);
    assert!(stdout.contains("stored before: 4"), "{}", stdout);
    assert!(stdout.contains("unique documents: 4"), "{}", stdout);
}

#[test]
fn test_search_before_reindex_is_not_ready() {
    let (_tmp, config_path) = setup_test_env();
    ingested(&config_path);

    let (stdout, stderr, success) = run_hrank(&config_path, &["search", "africa politics"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("index_not_ready"), "{}", stdout);
}

#[test]
fn test_reindex_twice_reuses_everything() {
    let (_tmp, config_path) = setup_test_env();
    ingested(&config_path);

    let (stdout, stderr, success) = run_hrank(&config_path, &["reindex"]);
    assert!(success, "reindex failed: {}", stderr);
    assert!(stdout.contains("dirty: 4"), "{}", stdout);
    assert!(stdout.contains("generation: 1"), "{}", stdout);

    let (stdout, _, success) = run_hrank(&config_path, &["reindex"]);
    assert!(success);
    assert!(stdout.contains("dirty: 0"), "{}", stdout);
    assert!(stdout.contains("reused: 4"), "{}", stdout);
    assert!(stdout.contains("generation: unchanged"), "{}", stdout);

    let (stdout, _, success) = run_hrank(&config_path, &["reindex", "--full", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("reindex (dry-run)"));
    assert!(stdout.contains("dirty: 4"), "{}", stdout);
}

#[test]
fn test_search_modes() {
    let (_tmp, config_path) = setup_test_env();
    ingested(&config_path);
    run_hrank(&config_path, &["reindex"]);

    let (stdout, stderr, success) = run_hrank(
        &config_path,
        &["search", "africa politics", "--mode", "vector", "--top-k", "3"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. ["), "{}", stdout);
    let first = stdout.lines().nth(1).unwrap();
    assert!(first.contains("https://news.com/africa-politics"), "{}", stdout);
    // "No Description" is replaced by the start of the body.
    assert!(stdout.contains("description: \"africa politics elections parliament"));
    assert!(!stdout.contains("4. ["));

    for mode in ["pagerank", "hits", "hybrid"] {
        let (stdout, stderr, success) = run_hrank(
            &config_path,
            &["search", "africa politics", "--mode", mode, "--scope", "query"],
        );
        assert!(success, "{} search failed: {}", mode, stderr);
        assert!(stdout.contains("1. ["), "{}: {}", mode, stdout);
    }

    let (_, stderr, success) = run_hrank(&config_path, &["search", "x", "--mode", "keyword"]);
    assert!(!success);
    assert!(stderr.contains("Unknown search mode"), "{}", stderr);
}

#[test]
fn test_top_and_get() {
    let (_tmp, config_path) = setup_test_env();
    ingested(&config_path);

    let (stdout, stderr, success) =
        run_hrank(&config_path, &["top", "--by", "pagerank", "--limit", "2"]);
    assert!(success, "top failed: {}", stderr);
    assert!(stdout.contains("1. ["));
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));

    let (stdout, _, success) = run_hrank(&config_path, &["get", "https://gov.org/"]);
    assert!(success);
    assert!(stdout.contains("title:        Government"));
    assert!(stdout.contains("https://external.net/  [ext]"));

    let (_, stderr, success) = run_hrank(&config_path, &["get", "https://missing.org/"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "{}", stderr);
}

#[test]
fn test_graph_export_and_stats() {
    let (tmp, config_path) = setup_test_env();
    ingested(&config_path);

    let edges = tmp.path().join("edges.csv");
    let (stdout, stderr, success) =
        run_hrank(&config_path, &["graph", "export", edges.to_str().unwrap()]);
    assert!(success, "export failed: {}", stderr);
    assert!(stdout.contains("edges: 4"), "{}", stdout);

    let content = fs::read_to_string(&edges).unwrap();
    assert!(content.starts_with("source,destination,anchor"));
    assert!(content.contains("https://gov.org/,https://external.net/,ext"));

    let (stdout, _, success) = run_hrank(
        &config_path,
        &["graph", "stats", "--edges", edges.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("edges: 4"), "{}", stdout);
    assert!(stdout.contains("external: 1"), "{}", stdout);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    ingested(&config_path);
    run_hrank(&config_path, &["reindex"]);

    let (stdout, stderr, success) = run_hrank(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Documents:    4"), "{}", stdout);
    assert!(stdout.contains("Generation:   1"), "{}", stdout);
    assert!(stdout.contains("fnv1a-hash"), "{}", stdout);
}
