use super::migrations;
use super::{GraphStore, NodeId, Properties, Record, RelationshipId, props};
use crate::config::Config;
use crate::model::{GraphCounts, NodeLabel};
use anyhow::{Context, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Graph store on a single SQLite connection.
///
/// Nodes keep their properties as a JSON document; nodes created through
/// `merge_node` carry a unique merge key derived from labels and match
/// properties, so repeated merges never duplicate a node.
pub struct SqliteGraphStore {
    db_path: Option<PathBuf>,
    conn: Connection,
    writes: u64,
}

impl SqliteGraphStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        conn.busy_timeout(Duration::from_secs(Config::get().busy_timeout_secs))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&conn)?;
        tracing::debug!(path = %db_path.display(), "graph store opened");
        Ok(Self {
            db_path: Some(db_path.to_path_buf()),
            conn,
            writes: 0,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn)?;
        Ok(Self {
            db_path: None,
            conn,
            writes: 0,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Number of statements that changed stored data since the store was opened.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn count_label(&self, label: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE instr(labels, ?1) > 0",
            params![format!(":{label}:")],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_relationships(&self, rel_type: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE rel_type = ?1",
            params![rel_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn counts(&self) -> Result<GraphCounts> {
        let nodes: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        let relationships: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(GraphCounts {
            nodes: nodes as usize,
            relationships: relationships as usize,
            services: self.count_label(NodeLabel::Service.as_str())?,
            files: self.count_label(NodeLabel::File.as_str())?,
            modules: self.count_label(NodeLabel::Module.as_str())?,
            definitions: self.count_label(NodeLabel::Definition.as_str())?,
            symbols: self.count_label(NodeLabel::Symbol.as_str())?,
            references: self.count_label(NodeLabel::Reference.as_str())?,
        })
    }

    /// Looks a node up by the same key `merge_node` would use.
    pub fn find_node(
        &self,
        labels: &[&str],
        match_props: &Properties,
    ) -> Result<Option<(NodeId, Properties)>> {
        let key = merge_key(&label_column(labels), match_props)?;
        let row: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, props FROM nodes WHERE merge_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((id, raw)) => Ok(Some((NodeId::from(id), parse_props(&raw)?))),
            None => Ok(None),
        }
    }

    pub fn nodes_with_label(&self, label: &str) -> Result<Vec<(NodeId, Properties)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, props FROM nodes WHERE instr(labels, ?1) > 0 ORDER BY id")?;
        let rows = stmt.query_map(params![format!(":{label}:")], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row?;
            out.push((NodeId::from(id), parse_props(&raw)?));
        }
        Ok(out)
    }

    /// `(from, to, props)` for every relationship of one type.
    pub fn relationships(&self, rel_type: &str) -> Result<Vec<(NodeId, NodeId, Properties)>> {
        let mut stmt = self.conn.prepare(
            "SELECT from_id, to_id, props FROM relationships WHERE rel_type = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![rel_type], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (from, to, raw) = row?;
            out.push((NodeId::from(from), NodeId::from(to), parse_props(&raw)?));
        }
        Ok(out)
    }
}

impl GraphStore for SqliteGraphStore {
    fn merge_node(
        &mut self,
        labels: &[&str],
        match_props: &Properties,
        set_props: &Properties,
    ) -> Result<NodeId> {
        let labels_col = label_column(labels);
        let key = merge_key(&labels_col, match_props)?;
        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, props FROM nodes WHERE merge_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((id, raw)) = existing {
            let mut current = parse_props(&raw)?;
            let mut changed = false;
            for (name, value) in match_props.iter().chain(set_props.iter()) {
                if current.get(name) != Some(value) {
                    current.insert(name.clone(), value.clone());
                    changed = true;
                }
            }
            if changed {
                self.conn.execute(
                    "UPDATE nodes SET props = ?1 WHERE id = ?2",
                    params![serde_json::to_string(&current)?, id],
                )?;
                self.writes += 1;
            }
            return Ok(NodeId::from(id));
        }

        let mut all = match_props.clone();
        for (name, value) in set_props {
            all.insert(name.clone(), value.clone());
        }
        self.conn
            .execute(
                "INSERT INTO nodes (merge_key, labels, props) VALUES (?1, ?2, ?3)",
                params![key, labels_col, serde_json::to_string(&all)?],
            )
            .with_context(|| format!("merge node {labels_col}"))?;
        self.writes += 1;
        Ok(NodeId::from(self.conn.last_insert_rowid()))
    }

    fn create_node(&mut self, labels: &[&str], props: &Properties) -> Result<NodeId> {
        self.conn.execute(
            "INSERT INTO nodes (merge_key, labels, props) VALUES (NULL, ?1, ?2)",
            params![label_column(labels), serde_json::to_string(props)?],
        )?;
        self.writes += 1;
        Ok(NodeId::from(self.conn.last_insert_rowid()))
    }

    fn create_relationship(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        rel_type: &str,
        props: &Properties,
    ) -> Result<RelationshipId> {
        self.conn
            .execute(
                "INSERT INTO relationships (from_id, to_id, rel_type, props)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    row_id(from)?,
                    row_id(to)?,
                    rel_type,
                    serde_json::to_string(props)?
                ],
            )
            .with_context(|| format!("create {rel_type} {from} -> {to}"))?;
        self.writes += 1;
        Ok(NodeId::from(self.conn.last_insert_rowid()))
    }

    fn execute_query(&mut self, text: &str, params: &Properties) -> Result<Vec<Record>> {
        let mut stmt = self
            .conn
            .prepare(text)
            .with_context(|| format!("prepare query: {}", text.trim()))?;

        let mut names = Vec::new();
        let mut values = Vec::new();
        for (name, value) in params {
            let placeholder = format!(":{name}");
            if stmt.parameter_index(&placeholder)?.is_some() {
                names.push(placeholder);
                values.push(to_sql_value(value));
            }
        }
        let bound: Vec<(&str, &dyn ToSql)> = names
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(|value| value as &dyn ToSql))
            .collect();

        if stmt.column_count() == 0 {
            let affected = stmt.execute(bound.as_slice())?;
            if affected > 0 {
                self.writes += 1;
            }
            return Ok(vec![props(json!({ "affected": affected }))]);
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();
        let mut rows = stmt.query(bound.as_slice())?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (idx, column) in columns.iter().enumerate() {
                record.insert(column.clone(), from_sql_ref(row.get_ref(idx)?));
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn label_column(labels: &[&str]) -> String {
    format!(":{}:", labels.join(":"))
}

fn merge_key(labels: &str, match_props: &Properties) -> Result<String> {
    let sorted: BTreeMap<&String, &Value> = match_props.iter().collect();
    Ok(format!("{labels}{}", serde_json::to_string(&sorted)?))
}

fn parse_props(raw: &str) -> Result<Properties> {
    serde_json::from_str(raw).with_context(|| format!("decode node properties {raw}"))
}

fn row_id(id: &NodeId) -> Result<i64> {
    id.as_str()
        .parse()
        .with_context(|| format!("invalid node id {id}"))
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => number.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => json!(int),
        ValueRef::Real(real) => json!(real),
        ValueRef::Text(text) | ValueRef::Blob(text) => {
            Value::String(String::from_utf8_lossy(text).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_node_is_idempotent() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let key = props(json!({ "service": "svc", "path": "a.go" }));
        let set = props(json!({ "hash": "h1" }));

        let first = store.merge_node(&["File"], &key, &set).unwrap();
        let writes = store.writes();
        let second = store.merge_node(&["File"], &key, &set).unwrap();

        assert_eq!(first, second);
        assert_eq!(store.writes(), writes, "unchanged merge must not write");
        assert_eq!(store.count_label("File").unwrap(), 1);
    }

    #[test]
    fn merge_node_updates_set_properties() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let key = props(json!({ "service": "svc", "path": "a.go" }));
        let id = store
            .merge_node(&["File"], &key, &props(json!({ "hash": "h1" })))
            .unwrap();
        let same = store
            .merge_node(&["File"], &key, &props(json!({ "hash": "h2" })))
            .unwrap();
        assert_eq!(id, same);

        let (_, stored) = store.find_node(&["File"], &key).unwrap().unwrap();
        assert_eq!(stored.get("hash"), Some(&json!("h2")));
        assert_eq!(stored.get("path"), Some(&json!("a.go")));
    }

    #[test]
    fn match_property_order_does_not_matter() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let mut forward = Properties::new();
        forward.insert("a".into(), json!(1));
        forward.insert("b".into(), json!(2));
        let mut backward = Properties::new();
        backward.insert("b".into(), json!(2));
        backward.insert("a".into(), json!(1));

        let first = store.merge_node(&["X"], &forward, &Properties::new()).unwrap();
        let second = store.merge_node(&["X"], &backward, &Properties::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn create_node_never_merges() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let props = props(json!({ "path": "a.go", "line": 3 }));
        let a = store.create_node(&["Reference"], &props).unwrap();
        let b = store.create_node(&["Reference"], &props).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count_label("Reference").unwrap(), 2);
    }

    #[test]
    fn deleting_a_node_drops_its_relationships() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let empty = Properties::new();
        let file = store
            .merge_node(&["File"], &props(json!({ "service": "svc", "path": "a.go" })), &empty)
            .unwrap();
        let module = store
            .merge_node(&["Module"], &props(json!({ "name": "m" })), &empty)
            .unwrap();
        store
            .create_relationship(&file, &module, "CONTAINS", &empty)
            .unwrap();
        assert_eq!(store.count_relationships("CONTAINS").unwrap(), 1);

        let result = store
            .execute_query(
                queries_remove_file(),
                &props(json!({ "service": "svc", "path": "a.go" })),
            )
            .unwrap();
        assert_eq!(result[0].get("affected"), Some(&json!(1)));
        assert_eq!(store.count_relationships("CONTAINS").unwrap(), 0);
        assert_eq!(store.count_label("Module").unwrap(), 1);
    }

    #[test]
    fn execute_query_binds_named_parameters() {
        let mut store = SqliteGraphStore::open_in_memory().unwrap();
        let empty = Properties::new();
        for (path, hash) in [("a.go", "h1"), ("b.go", "h2")] {
            store
                .merge_node(
                    &["File"],
                    &props(json!({ "service": "svc", "path": path })),
                    &props(json!({ "hash": hash })),
                )
                .unwrap();
        }
        store
            .merge_node(
                &["File"],
                &props(json!({ "service": "other", "path": "c.go" })),
                &empty,
            )
            .unwrap();

        let records = store
            .execute_query(
                crate::store::queries::FILE_HASHES,
                &props(json!({ "service": "svc", "unused": true })),
            )
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("path"), Some(&json!("a.go")));
        assert_eq!(records[1].get("hash"), Some(&json!("h2")));
    }

    fn queries_remove_file() -> &'static str {
        crate::store::queries::REMOVE_FILE_NODE
    }
}
