//! Automation graph model and document loading
//!
//! A graph is a set of trigger and action nodes wired together by edges.
//! Node configuration is carried as opaque template values: the compiler
//! never evaluates `{{path}}` placeholders, it only escapes them into the
//! generated program where they are resolved at run time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// A declarative automation graph: triggers and actions wired by edges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationGraph {
    /// Workflow identifier (generated if absent)
    #[serde(default = "default_workflow_id")]
    pub id: String,

    /// Human-readable workflow name
    pub name: String,

    /// Graph nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Directed edges in declaration order
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_workflow_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier, unique within the graph
    #[serde(default)]
    pub id: String,

    /// Whether this node starts a run or performs work
    pub kind: NodeKind,

    /// Connector name, e.g. `slack`
    #[serde(default)]
    pub app: String,

    /// Operation name within the connector, e.g. `send_message`
    #[serde(default)]
    pub operation: String,

    /// Static configuration; strings may contain `{{path}}` placeholders
    #[serde(default)]
    pub config: BTreeMap<String, TemplateValue>,
}

impl Node {
    /// Registry key for this node: `"<kind>.<app>:<operation>"`
    pub fn operation_key(&self) -> String {
        format!("{}.{}:{}", self.kind.as_str(), self.app, self.operation)
    }
}

/// Node kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point: fires runs
    Trigger,
    /// Performs work within a run
    Action,
}

impl NodeKind {
    /// The lowercase wire name used in registry keys
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Trigger => "trigger",
            NodeKind::Action => "action",
        }
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id
    pub from: String,

    /// Destination node id
    pub to: String,
}

/// A configuration value that may carry run-time template placeholders
///
/// Placeholders are opaque to the compiler; only the generated program
/// resolves them against the live execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    /// Explicit null
    Null,
    /// Boolean literal
    Bool(bool),
    /// Numeric literal
    Number(serde_json::Number),
    /// String literal, possibly containing `{{path}}` placeholders
    String(String),
    /// Array of template values
    Array(Vec<TemplateValue>),
    /// Nested object of template values (ordered for deterministic output)
    Object(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    /// The string content, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TemplateValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// True if this is a string containing at least one `{{path}}` placeholder
    pub fn has_placeholders(&self) -> bool {
        matches!(self, TemplateValue::String(s) if s.contains("{{"))
    }

    /// Look up a key, if this is an object value
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        match self {
            TemplateValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Convert to a plain JSON value, leaving placeholder text untouched
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TemplateValue::Null => serde_json::Value::Null,
            TemplateValue::Bool(b) => serde_json::Value::Bool(*b),
            TemplateValue::Number(n) => serde_json::Value::Number(n.clone()),
            TemplateValue::String(s) => serde_json::Value::String(s.clone()),
            TemplateValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(TemplateValue::to_json).collect())
            }
            TemplateValue::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl AutomationGraph {
    /// Parse a graph from a JSON document
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Parse a graph from a YAML document
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Load a graph document from disk, dispatching on the file extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::GraphNotFound {
                path: path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Err(Error::UnsupportedFormat {
                path: path.display().to_string(),
            }),
        }
    }

    /// Find a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edge targets of a node, in declaration order
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &str> {
        self.edges
            .iter()
            .filter(move |e| e.from == id)
            .map(|e| e.to.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_graph_json() {
        let json = r#"{
            "id": "wf-1",
            "name": "test",
            "nodes": [
                {"id": "t1", "kind": "trigger", "app": "schedule", "operation": "interval"}
            ],
            "edges": []
        }"#;
        let graph = AutomationGraph::from_json_str(json).unwrap();
        assert_eq!(graph.id, "wf-1");
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].kind, NodeKind::Trigger);
    }

    #[test]
    fn test_parse_graph_yaml() {
        let yaml = r##"
id: wf-2
name: yaml graph
nodes:
  - id: t1
    kind: trigger
    app: schedule
    operation: interval
    config:
      every: 15
      unit: minutes
  - id: a1
    kind: action
    app: slack
    operation: send_message
    config:
      channel: "#ops"
      text: "order {{shopify.order.id}} arrived"
edges:
  - from: t1
    to: a1
"##;
        let graph = AutomationGraph::from_yaml_str(yaml).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.nodes[1].operation_key(), "action.slack:send_message");
        assert!(graph.nodes[1].config["text"].has_placeholders());
    }

    #[test]
    fn test_workflow_id_defaults_when_absent() {
        let graph = AutomationGraph::from_json_str(r#"{"name": "no id"}"#).unwrap();
        assert!(!graph.id.is_empty());
    }

    #[test]
    fn test_operation_key_format() {
        let node = Node {
            id: "n1".to_string(),
            kind: NodeKind::Action,
            app: "stripe".to_string(),
            operation: "create_payment".to_string(),
            config: BTreeMap::new(),
        };
        assert_eq!(node.operation_key(), "action.stripe:create_payment");
    }

    #[test]
    fn test_template_value_placeholders() {
        let plain = TemplateValue::String("hello".to_string());
        let templated = TemplateValue::String("hello {{customer.name}}".to_string());
        assert!(!plain.has_placeholders());
        assert!(templated.has_placeholders());
        assert!(!TemplateValue::Bool(true).has_placeholders());
    }

    #[test]
    fn test_template_value_to_json_keeps_placeholder_text() {
        let tv = TemplateValue::Object(
            [(
                "text".to_string(),
                TemplateValue::String("{{a.b}}".to_string()),
            )]
            .into_iter()
            .collect(),
        );
        let json = tv.to_json();
        assert_eq!(json["text"], "{{a.b}}");
    }

    #[test]
    fn test_outgoing_preserves_declaration_order() {
        let graph = AutomationGraph {
            id: "wf".to_string(),
            name: "t".to_string(),
            nodes: vec![],
            edges: vec![
                Edge {
                    from: "t1".to_string(),
                    to: "b".to_string(),
                },
                Edge {
                    from: "t1".to_string(),
                    to: "a".to_string(),
                },
            ],
        };
        let targets: Vec<&str> = graph.outgoing("t1").collect();
        assert_eq!(targets, vec!["b", "a"]);
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = std::env::temp_dir().join("scriptloom_test_graph_ext");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("graph.toml");
        std::fs::write(&path, "name = 'x'").unwrap();

        let result = AutomationGraph::load(&path);
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));

        std::fs::remove_dir_all(&dir).ok();
    }
}
