#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    _dir: TempDir,
    config: PathBuf,
    db: PathBuf,
    graph: PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("rdftab.toml");
    fs::write(&config, "generation = \"per-property\"\ntable_name = \"triples\"\n")
        .expect("write config");
    let db = dir.path().join("store.db");
    let graph = dir.path().join("g1.db");
    Workspace {
        _dir: dir,
        config,
        db,
        graph,
    }
}

fn run(ws: &Workspace, args: &[&str], db: &Path, tail: &[&str]) -> Vec<u8> {
    cargo_bin_cmd!("rdftab")
        .arg("--config")
        .arg(&ws.config)
        .args(args)
        .arg(db)
        .args(tail)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone()
}

fn json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("valid json")
}

fn seeded() -> Workspace {
    let ws = workspace();
    let report = json(&run(&ws, &["--format", "json", "init"], &ws.db, &[]));
    assert_eq!(report["properties"], 0);
    assert_eq!(report["generation"], "per-property");

    run(
        &ws,
        &["query"],
        &ws.db,
        &["INSERT INTO rdf_property VALUES (5, 'http://example.org/size', 'ex:size', 3, 0, NULL)"],
    );
    let report = json(&run(&ws, &["--format", "json", "init"], &ws.db, &[]));
    assert_eq!(report["properties"], 1);

    run(&ws, &["query"], &ws.db, &["INSERT INTO \"ex:size\" VALUES (1, 42)"]);
    ws
}

#[test]
fn triples_are_listed_after_init_and_seed() {
    let ws = seeded();
    let rows = json(&run(
        &ws,
        &["--format", "json", "triples"],
        &ws.db,
        &["--predicate", "5"],
    ));
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["graph"], Value::Null);
    assert_eq!(rows[0]["subject"], 1);
    assert_eq!(rows[0]["object"], "42");
    assert_eq!(rows[0]["object_type"], 3);

    let none = json(&run(
        &ws,
        &["--format", "json", "triples"],
        &ws.db,
        &["--not-predicate", "5"],
    ));
    assert_eq!(none.as_array().map(Vec::len), Some(0));

    let text = run(&ws, &["triples"], &ws.db, &[]);
    assert_eq!(String::from_utf8_lossy(&text), "default\t1\t5\t42\t3\n");
}

#[test]
fn query_reports_columns_and_rows() {
    let ws = seeded();
    let report = json(&run(
        &ws,
        &["--format", "json", "query"],
        &ws.db,
        &["SELECT subject, object FROM triples WHERE object LIKE '4%'"],
    ));
    assert_eq!(report["columns"], serde_json::json!(["subject", "object"]));
    assert_eq!(report["rows"], serde_json::json!([[1, "42"]]));
}

#[test]
fn named_graphs_are_registered_and_scanned() {
    let ws = seeded();
    let attach = format!("g1={}", ws.graph.display());
    let report = json(&run(
        &ws,
        &["--format", "json", "init"],
        &ws.db,
        &["--graph", &attach],
    ));
    assert_eq!(report["graphs"], serde_json::json!(["g1"]));

    run(
        &ws,
        &["query"],
        &ws.db,
        &["--graph", &attach, "INSERT INTO g1.\"ex:size\" VALUES (2, 7)"],
    );
    let rows = json(&run(
        &ws,
        &["--format", "json", "triples"],
        &ws.db,
        &["--graph", &attach, "--in-graph", "1"],
    ));
    assert_eq!(
        rows,
        serde_json::json!([{
            "graph": 1,
            "subject": 2,
            "predicate": 5,
            "object": "7",
            "object_type": 3
        }])
    );

    let default_only = json(&run(
        &ws,
        &["--format", "json", "triples"],
        &ws.db,
        &["--graph", &attach, "--in-graph", "0"],
    ));
    assert_eq!(default_only.as_array().map(Vec::len), Some(1));
    assert_eq!(default_only[0]["subject"], 1);
}

#[test]
fn unsupported_key_operator_fails() {
    let ws = seeded();
    let output = cargo_bin_cmd!("rdftab")
        .arg("--config")
        .arg(&ws.config)
        .arg("query")
        .arg(&ws.db)
        .arg("SELECT * FROM triples WHERE subject > 3")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("unsupported"));
}

#[test]
fn missing_database_is_reported() {
    let ws = workspace();
    let output = cargo_bin_cmd!("rdftab")
        .arg("--config")
        .arg(&ws.config)
        .arg("triples")
        .arg(&ws.db)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("does not exist"));
    assert!(!ws.db.exists());
}

#[test]
fn invalid_config_is_rejected() {
    let ws = workspace();
    fs::write(&ws.config, "module_name = \"bad name\"\n").expect("write config");
    cargo_bin_cmd!("rdftab")
        .arg("--config")
        .arg(&ws.config)
        .arg("init")
        .arg(&ws.db)
        .assert()
        .failure();
}
