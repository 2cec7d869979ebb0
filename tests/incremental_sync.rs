use cpgidx::IndexError;
use cpgidx::indexer::go::GoExtractor;
use cpgidx::indexer::scan::hash_bytes;
use cpgidx::indexer::scip::ScipStrategy;
use cpgidx::indexer::{IndexOptions, Indexer};
use cpgidx::store::{
    GraphStore, NodeId, Properties, Record, RelationshipId, SqliteGraphStore, props,
};
use serde_json::json;
use std::fs;
use std::path::Path;

const A_GO: &str = "package a\n\nfunc F() {}\n";

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn options() -> IndexOptions {
    IndexOptions {
        service: Some("app".to_string()),
        package_version: ".".to_string(),
        ..IndexOptions::default()
    }
}

fn native_indexer(root: &Path) -> Indexer<SqliteGraphStore> {
    Indexer::new_with_options(
        root.to_path_buf(),
        SqliteGraphStore::open_in_memory().unwrap(),
        Box::new(GoExtractor::new().unwrap()),
        options(),
    )
}

fn node_id(store: &SqliteGraphStore, labels: &[&str], key: serde_json::Value) -> NodeId {
    store
        .find_node(labels, &props(key))
        .unwrap()
        .unwrap_or_else(|| panic!("missing node {labels:?}"))
        .0
}

fn file_props(store: &SqliteGraphStore, path: &str) -> Option<Properties> {
    store
        .find_node(&["File"], &props(json!({ "service": "app", "path": path })))
        .unwrap()
        .map(|(_, props)| props)
}

fn definition_ids(store: &SqliteGraphStore, path: &str) -> Vec<NodeId> {
    store
        .nodes_with_label("Definition")
        .unwrap()
        .into_iter()
        .filter(|(_, props)| props.get("path") == Some(&json!(path)))
        .map(|(id, _)| id)
        .collect()
}

#[test]
fn first_run_builds_the_graph() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);

    let mut indexer = native_indexer(dir.path());
    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.definitions, 1);

    let store = indexer.store();
    let counts = store.counts().unwrap();
    assert_eq!(counts.services, 1);
    assert_eq!(counts.files, 1);
    assert_eq!(counts.modules, 1);
    assert_eq!(counts.definitions, 1);
    assert_eq!(counts.symbols, 1);
    assert_eq!(counts.references, 0);
    assert_eq!(store.count_label("Function").unwrap(), 1);
    assert_eq!(store.count_relationships("CONTAINS").unwrap(), 3);
    assert_eq!(store.count_relationships("DEFINES").unwrap(), 1);

    let file = file_props(store, "a.go").unwrap();
    assert_eq!(file.get("hash"), Some(&json!(hash_bytes(A_GO.as_bytes()))));
    assert_eq!(file.get("line_count"), Some(&json!(3)));

    let (_, symbol) = store.nodes_with_label("Symbol").unwrap().remove(0);
    assert_eq!(symbol.get("symbol"), Some(&json!("scip-go gomod app . app/F().")));

    let (_, service) = store.nodes_with_label("Service").unwrap().remove(0);
    assert_eq!(service.get("language"), Some(&json!("go")));
}

#[test]
fn second_run_without_changes_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "util/b.go", "package util\n\nfunc G(x int) int { return x }\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();
    let counts = indexer.store().counts().unwrap();
    let writes = indexer.store().writes();

    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.writes, 0);
    assert_eq!(indexer.store().writes(), writes);
    assert_eq!(indexer.store().counts().unwrap(), counts);
}

#[test]
fn editing_a_file_keeps_service_and_module_identity() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();
    let store = indexer.store();
    let service = node_id(store, &["Service"], json!({ "name": "app" }));
    let module = node_id(store, &["Module"], json!({ "name": "app" }));
    let file = node_id(store, &["File"], json!({ "service": "app", "path": "a.go" }));
    let symbol = node_id(store, &["Symbol"], json!({ "symbol": "scip-go gomod app . app/F()." }));
    let counts = store.counts().unwrap();

    let edited = "package a\n\nfunc F() {\n\tprintln(\"changed\")\n}\n";
    write(dir.path(), "a.go", edited);
    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 1);

    let store = indexer.store();
    assert_eq!(node_id(store, &["Service"], json!({ "name": "app" })), service);
    assert_eq!(node_id(store, &["Module"], json!({ "name": "app" })), module);
    assert_eq!(
        node_id(store, &["File"], json!({ "service": "app", "path": "a.go" })),
        file
    );
    assert_eq!(
        node_id(store, &["Symbol"], json!({ "symbol": "scip-go gomod app . app/F()." })),
        symbol
    );
    assert_eq!(store.counts().unwrap(), counts);

    let file = file_props(store, "a.go").unwrap();
    assert_eq!(file.get("hash"), Some(&json!(hash_bytes(edited.as_bytes()))));
    let (_, def) = store.nodes_with_label("Function").unwrap().remove(0);
    assert_eq!(def.get("end_line"), Some(&json!(5)));
}

#[test]
fn only_the_changed_file_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "util/b.go", "package util\n\nfunc G(x int) int { return x }\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();
    let b_before = definition_ids(indexer.store(), "util/b.go");
    assert_eq!(b_before.len(), 2);

    write(dir.path(), "a.go", "package a\n\nfunc F() {}\n\nfunc H() {}\n");
    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 1);

    assert_eq!(definition_ids(indexer.store(), "util/b.go"), b_before);
    assert_eq!(definition_ids(indexer.store(), "a.go").len(), 2);
}

#[test]
fn deleted_files_lose_their_subgraph() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "util/b.go", "package util\n\nfunc G(x int) int { return x }\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();
    assert_eq!(indexer.store().counts().unwrap().modules, 2);

    fs::remove_file(dir.path().join("util/b.go")).unwrap();
    let report = indexer.run().unwrap();
    assert_eq!(report.deleted, 1);

    let store = indexer.store();
    assert!(file_props(store, "util/b.go").is_none());
    assert!(definition_ids(store, "util/b.go").is_empty());
    let counts = store.counts().unwrap();
    assert_eq!(counts.files, 1);
    assert_eq!(counts.modules, 1);
    assert_eq!(counts.definitions, 1);
    assert_eq!(counts.symbols, 1);
    assert_eq!(store.count_relationships("CONTAINS").unwrap(), 3);
}

#[test]
fn cancelled_run_stops_between_files_and_skips_deletions() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "b.go", "package a\n\nfunc G() {}\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();

    fs::remove_file(dir.path().join("b.go")).unwrap();
    write(dir.path(), "c.go", "package a\n\nfunc K() {}\n");
    let cancel = indexer.cancel_flag();
    cancel.cancel();
    let report = indexer.run().unwrap();
    assert!(report.cancelled);
    assert_eq!(report.indexed, 0);
    assert_eq!(report.deleted, 0);
    assert!(file_props(indexer.store(), "b.go").is_some());
    assert!(file_props(indexer.store(), "c.go").is_none());

    cancel.reset();
    let report = indexer.run().unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.deleted, 1);
    assert!(file_props(indexer.store(), "b.go").is_none());
}

#[test]
fn parse_failures_are_skipped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "broken.go", "package a\n\nfunc (\n");

    let mut indexer = native_indexer(dir.path());
    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].path, "broken.go");
    assert!(report.failures[0].error.contains("syntax error"));
    assert!(file_props(indexer.store(), "broken.go").is_none());

    // A file that breaks keeps its previous entities and stays dirty.
    write(dir.path(), "a.go", "package a\n\nfunc F( {}\n");
    let report = indexer.run().unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(definition_ids(indexer.store(), "a.go").len(), 1);
    let file = file_props(indexer.store(), "a.go").unwrap();
    assert_eq!(file.get("hash"), Some(&json!(hash_bytes(A_GO.as_bytes()))));

    let changed = indexer.changed_files().unwrap();
    assert_eq!(changed.added, vec!["broken.go".to_string()]);
    assert_eq!(changed.modified, vec!["a.go".to_string()]);
}

#[test]
fn missing_tool_aborts_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);

    let mut indexer = Indexer::new_with_options(
        dir.path().to_path_buf(),
        SqliteGraphStore::open_in_memory().unwrap(),
        Box::new(ScipStrategy::new("cpgidx-missing-indexer-binary")),
        options(),
    );
    let err = indexer.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::ToolNotFound(_))
    ));
    assert_eq!(indexer.store().writes(), 0);
    assert_eq!(indexer.store().counts().unwrap().nodes, 0);
}

#[test]
fn unreadable_project_root_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let mut indexer = native_indexer(&missing);
    let err = indexer.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IndexError>(),
        Some(IndexError::ProjectRoot { .. })
    ));
    assert_eq!(indexer.store().writes(), 0);
}

#[test]
fn changed_files_reports_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "b.go", "package a\n\nfunc G() {}\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();

    write(dir.path(), "a.go", "package a\n\nfunc F() { F() }\n");
    fs::remove_file(dir.path().join("b.go")).unwrap();
    write(dir.path(), "c.go", "package a\n");
    let writes = indexer.store().writes();

    let changed = indexer.changed_files().unwrap();
    assert_eq!(changed.added, vec!["c.go".to_string()]);
    assert_eq!(changed.modified, vec!["a.go".to_string()]);
    assert_eq!(changed.deleted, vec!["b.go".to_string()]);
    assert_eq!(indexer.store().writes(), writes);
}

#[test]
fn denied_directories_and_large_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", A_GO);
    write(dir.path(), "vendor/dep/dep.go", "package dep\n\nfunc D() {}\n");
    write(dir.path(), "node_modules/x/x.go", "package x\n");
    write(
        dir.path(),
        "big.go",
        &format!("package a\n\n{}", "// padding\n".repeat(200)),
    );

    let mut indexer = Indexer::new_with_options(
        dir.path().to_path_buf(),
        SqliteGraphStore::open_in_memory().unwrap(),
        Box::new(GoExtractor::new().unwrap()),
        IndexOptions {
            max_file_size_bytes: 1024,
            ..options()
        },
    );
    let report = indexer.run().unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(indexer.store().counts().unwrap().files, 1);

    let changed = indexer.changed_files().unwrap();
    assert!(changed.added.is_empty());
    let writes = indexer.store().writes();
    let report = indexer.run().unwrap();
    assert_eq!(report.writes, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(indexer.store().writes(), writes);
}

#[test]
fn go_mod_module_path_qualifies_symbols() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "go.mod", "module example.com/app\n\ngo 1.22\n");
    write(dir.path(), "internal/db/db.go", "package db\n\nfunc Open() {}\n");

    let mut indexer = native_indexer(dir.path());
    indexer.run().unwrap();
    let store = indexer.store();
    let (_, module) = store.nodes_with_label("Module").unwrap().remove(0);
    assert_eq!(module.get("name"), Some(&json!("example.com/app/internal/db")));
    assert_eq!(module.get("package"), Some(&json!("db")));
    node_id(
        store,
        &["Symbol"],
        json!({ "symbol": "scip-go gomod example.com/app . `example.com/app/internal/db`/Open()." }),
    );
}

/// Delegates to SQLite but rejects the first relationship of one type.
struct FailingStore {
    inner: SqliteGraphStore,
    fail_once: Option<&'static str>,
}

impl GraphStore for FailingStore {
    fn merge_node(
        &mut self,
        labels: &[&str],
        match_props: &Properties,
        set_props: &Properties,
    ) -> anyhow::Result<NodeId> {
        self.inner.merge_node(labels, match_props, set_props)
    }

    fn create_node(&mut self, labels: &[&str], props: &Properties) -> anyhow::Result<NodeId> {
        self.inner.create_node(labels, props)
    }

    fn create_relationship(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        rel_type: &str,
        props: &Properties,
    ) -> anyhow::Result<RelationshipId> {
        if self.fail_once == Some(rel_type) {
            self.fail_once = None;
            anyhow::bail!("store rejected {rel_type}");
        }
        self.inner.create_relationship(from, to, rel_type, props)
    }

    fn execute_query(&mut self, text: &str, params: &Properties) -> anyhow::Result<Vec<Record>> {
        self.inner.execute_query(text, params)
    }
}

#[test]
fn partially_written_file_is_retried_next_run() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.go", "package a\n\nfunc F(x int) {}\n\nfunc G() {}\n");

    let store = FailingStore {
        inner: SqliteGraphStore::open_in_memory().unwrap(),
        fail_once: Some("DEFINES"),
    };
    let mut indexer = Indexer::new_with_options(
        dir.path().to_path_buf(),
        store,
        Box::new(GoExtractor::new().unwrap()),
        options(),
    );

    let report = indexer.run().unwrap();
    assert!(report.entity_errors > 0);
    assert_eq!(report.indexed, 1);
    assert_eq!(report.failed, 0);
    let inner = &indexer.store().inner;
    let file = file_props(inner, "a.go").unwrap();
    assert_eq!(file.get("hash"), Some(&serde_json::Value::Null));
    // The rest of the file still made it in.
    assert_eq!(inner.counts().unwrap().definitions, 3);
    assert_eq!(inner.count_relationships("DEFINES").unwrap(), 2);

    assert_eq!(indexer.changed_files().unwrap().modified, vec!["a.go".to_string()]);
    let report = indexer.run().unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.entity_errors, 0);
    let inner = &indexer.store().inner;
    let expected = hash_bytes(fs::read(dir.path().join("a.go")).unwrap().as_slice());
    let file = file_props(inner, "a.go").unwrap();
    assert_eq!(file.get("hash"), Some(&json!(expected)));
    assert_eq!(inner.counts().unwrap().definitions, 3);
    assert_eq!(inner.count_relationships("DEFINES").unwrap(), 3);

    let report = indexer.run().unwrap();
    assert_eq!(report.writes, 0);
    assert_eq!(report.skipped, 1);
}
