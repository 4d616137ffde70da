//! Declarative, format-agnostic flow configuration (spec §6).
//!
//! A `FlowConfig` is a plain serializable data structure; this crate takes
//! no position on whether it arrives as JSON, YAML, or hand-built in code.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Opaque, per-node configuration handed to a process factory. Unknown keys
/// are the factory's concern to tolerate or reject, never this crate's.
pub type ProcessConfig = serde_json::Value;

/// A node's declared initial values, one `serde_json::Value` per port name.
pub type InitialValues = BTreeMap<String, serde_json::Value>;

/// One node in a flow graph: a process type name plus its configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: String,
    #[serde(default)]
    pub config: ProcessConfig,
    #[serde(default)]
    pub initial_values: InitialValues,
}

/// One endpoint of an edge: a node id and one of its port names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRef {
    pub node: String,
    pub port: String,
}

impl PortRef {
    #[must_use]
    pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
        Self { node: node.into(), port: port.into() }
    }
}

/// One connection between an output port and an input port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: PortRef,
    pub to: PortRef,
    #[serde(default)]
    pub capacity: Option<NonZeroUsize>,
}

/// A complete flow graph: nodes, edges, and their initial values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub id: String,
    pub nodes: BTreeMap<String, NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl FlowConfig {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), nodes: BTreeMap::new(), edges: Vec::new() }
    }

    pub fn with_node(mut self, id: impl Into<String>, spec: NodeSpec) -> Self {
        self.nodes.insert(id.into(), spec);
        self
    }

    pub fn with_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }
}

/// Convert a JSON value into the core's format-agnostic [`flow_core::value::DynValue`].
///
/// `flow-core` deliberately carries no `serde` dependency (see
/// `flow_core::value`); this is the one place the JSON boundary is crossed,
/// on behalf of every process implementation that declares initial values.
#[must_use]
pub fn json_to_dyn_value(value: &serde_json::Value) -> flow_core::value::DynValue {
    use flow_core::value::DynValue;
    match value {
        serde_json::Value::Null => DynValue::Null,
        serde_json::Value::Bool(b) => DynValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                DynValue::Integer(i)
            } else {
                DynValue::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => DynValue::Text(s.clone()),
        serde_json::Value::Array(items) => DynValue::List(items.iter().map(json_to_dyn_value).collect()),
        serde_json::Value::Object(_) => DynValue::Text(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_nodes_and_edges() {
        let config = FlowConfig::new("demo")
            .with_node("in", NodeSpec { kind: "emitter".into(), config: serde_json::json!({}), initial_values: BTreeMap::new() })
            .with_edge(EdgeSpec { from: PortRef::new("in", "out"), to: PortRef::new("out", "in"), capacity: None });
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.edges.len(), 1);
    }

    #[test]
    fn json_numbers_prefer_integer_representation() {
        let v = json_to_dyn_value(&serde_json::json!(42));
        assert_eq!(v.as_integer(), Some(42));
    }

    #[test]
    fn json_round_trips_through_serde() {
        let config = FlowConfig::new("demo");
        let text = serde_json::to_string(&config).unwrap();
        let back: FlowConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, "demo");
    }
}
