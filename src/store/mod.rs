use anyhow::Result;
use serde_json::{Map, Value};
use std::fmt;

mod migrations;
pub mod queries;
pub mod sqlite;

pub use sqlite::SqliteGraphStore;

pub type Properties = Map<String, Value>;
pub type Record = Map<String, Value>;

/// Opaque identifier handed out by the store. The engine never interprets
/// it; it only passes it back to create relationships.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(raw: impl Into<String>) -> Self {
        NodeId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId(value.to_string())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type RelationshipId = NodeId;

/// Graph storage collaborator.
///
/// `merge_node` must be safe to call repeatedly with the same labels and
/// match properties: it creates the node once and updates it afterwards.
pub trait GraphStore {
    fn merge_node(
        &mut self,
        labels: &[&str],
        match_props: &Properties,
        set_props: &Properties,
    ) -> Result<NodeId>;

    /// For nodes without a natural key.
    fn create_node(&mut self, labels: &[&str], props: &Properties) -> Result<NodeId>;

    fn create_relationship(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        rel_type: &str,
        props: &Properties,
    ) -> Result<RelationshipId>;

    fn execute_query(&mut self, text: &str, params: &Properties) -> Result<Vec<Record>>;
}

/// Turns a `json!({...})` object into a property map.
pub fn props(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}
