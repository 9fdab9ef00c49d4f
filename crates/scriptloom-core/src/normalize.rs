//! Graph normalization
//!
//! Validates an automation graph and linearizes it into an ordered step
//! plan: one entry per trigger, each carrying the action steps reachable
//! from it in declaration order. Normalization is pure; identical graphs
//! produce identical plans.

use std::collections::BTreeSet;

use crate::catalog::OperationCatalog;
use crate::error::{Error, Result};
use crate::graph::{AutomationGraph, Node, NodeKind};

/// A planned step: a reachable node plus its generated function name
///
/// Produced once per reachable node, never mutated afterward.
#[derive(Debug, Clone)]
pub struct PlanStep {
    /// The graph node this step was planned from
    pub node: Node,

    /// Deterministic target function name, e.g. `step_1_send_alert`
    pub function_name: String,
}

/// One trigger and the ordered action steps it drives
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    /// Id of the trigger node
    pub trigger_node_id: String,

    /// Logical trigger registry key, `"<workflow_id>:<node_id>"`
    pub trigger_key: String,

    /// Name of the generated handler function the host invokes
    pub handler_name: String,

    /// Node ids of the action steps, in walk order
    pub action_node_ids: Vec<String>,
}

/// A non-fatal normalization finding, returned as data and logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Id of the node the warning concerns
    pub node_id: String,

    /// Human-readable description
    pub message: String,
}

/// The normalized, ordered compilation plan for one graph
#[derive(Debug, Clone)]
pub struct StepPlan {
    /// Workflow identifier carried into the bundle
    pub workflow_id: String,

    /// Workflow name carried into the bundle header
    pub workflow_name: String,

    /// All reachable nodes in first-visit order (triggers first within
    /// their own walk), one entry per node
    pub steps: Vec<PlanStep>,

    /// Per-trigger wiring in trigger declaration order
    pub triggers: Vec<TriggerEntry>,

    /// Dropped-node warnings, in node declaration order
    pub warnings: Vec<Warning>,

    /// Node and edge counts of the input graph
    pub node_count: usize,

    /// Edge count of the input graph
    pub edge_count: usize,
}

impl StepPlan {
    /// Look up a planned step by node id
    pub fn step(&self, node_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.node.id == node_id)
    }

    /// Trigger registry keys of every trigger entry, in order
    pub fn trigger_keys(&self) -> Vec<String> {
        self.triggers.iter().map(|t| t.trigger_key.clone()).collect()
    }
}

/// Normalize a graph into an ordered step plan
///
/// Validation failures are fatal and name the offending node. Nodes
/// unreachable from any trigger are dropped with a warning, not an error.
pub fn normalize(graph: &AutomationGraph, catalog: &dyn OperationCatalog) -> Result<StepPlan> {
    validate_nodes(graph, catalog)?;
    validate_edges(graph)?;

    let mut steps: Vec<PlanStep> = Vec::new();
    let mut triggers: Vec<TriggerEntry> = Vec::new();
    let mut reached: BTreeSet<String> = BTreeSet::new();

    for node in graph.nodes.iter().filter(|n| n.kind == NodeKind::Trigger) {
        let trigger_fn = function_name(steps.len(), node);
        reached.insert(node.id.clone());
        steps.push(PlanStep {
            node: node.clone(),
            function_name: trigger_fn.clone(),
        });

        let action_ids = walk_trigger(graph, node, &mut steps, &mut reached)?;

        triggers.push(TriggerEntry {
            trigger_node_id: node.id.clone(),
            trigger_key: format!("{}:{}", graph.id, node.id),
            handler_name: format!("run_{}", trigger_fn),
            action_node_ids: action_ids,
        });
    }

    let mut warnings = Vec::new();
    for node in &graph.nodes {
        if !reached.contains(&node.id) {
            tracing::warn!(
                node_id = %node.id,
                "node is unreachable from any trigger and was dropped"
            );
            warnings.push(Warning {
                node_id: node.id.clone(),
                message: "unreachable from any trigger, dropped".to_string(),
            });
        }
    }

    Ok(StepPlan {
        workflow_id: graph.id.clone(),
        workflow_name: graph.name.clone(),
        steps,
        triggers,
        warnings,
        node_count: graph.nodes.len(),
        edge_count: graph.edges.len(),
    })
}

/// Depth-first walk from a trigger, following outgoing edges in declaration
/// order. Revisiting a node within the same walk is a cycle.
fn walk_trigger(
    graph: &AutomationGraph,
    trigger: &Node,
    steps: &mut Vec<PlanStep>,
    reached: &mut BTreeSet<String>,
) -> Result<Vec<String>> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    visited.insert(trigger.id.clone());

    let mut ordered: Vec<String> = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    push_children(graph, &trigger.id, &mut stack);

    while let Some(id) = stack.pop() {
        if visited.contains(&id) {
            return Err(Error::CycleDetected { node_id: id });
        }
        visited.insert(id.clone());

        let node = graph.node(&id).ok_or_else(|| Error::UnknownEdgeTarget {
            node_id: id.clone(),
        })?;
        if node.kind == NodeKind::Trigger {
            return Err(Error::MalformedGraph {
                node_id: id,
                message: "trigger node cannot be the target of an edge".to_string(),
            });
        }

        if reached.insert(id.clone()) {
            steps.push(PlanStep {
                node: node.clone(),
                function_name: function_name(steps.len(), node),
            });
        }
        ordered.push(id.clone());

        push_children(graph, &id, &mut stack);
    }

    Ok(ordered)
}

/// Push children in reverse declaration order so they pop in declaration order
fn push_children(graph: &AutomationGraph, id: &str, stack: &mut Vec<String>) {
    let children: Vec<String> = graph.outgoing(id).map(str::to_string).collect();
    for child in children.into_iter().rev() {
        stack.push(child);
    }
}

fn validate_nodes(graph: &AutomationGraph, catalog: &dyn OperationCatalog) -> Result<()> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for node in &graph.nodes {
        if node.id.is_empty() {
            return Err(Error::MalformedGraph {
                node_id: "<unknown>".to_string(),
                message: "node is missing an id".to_string(),
            });
        }
        if node.app.is_empty() || node.operation.is_empty() {
            return Err(Error::MalformedGraph {
                node_id: node.id.clone(),
                message: "node is missing app or operation".to_string(),
            });
        }
        if !seen.insert(node.id.as_str()) {
            return Err(Error::MalformedGraph {
                node_id: node.id.clone(),
                message: "duplicate node id".to_string(),
            });
        }

        let key = node.operation_key();
        if !catalog.supports(&key) {
            return Err(Error::UnsupportedOperation {
                node_id: node.id.clone(),
                key,
            });
        }
    }

    Ok(())
}

fn validate_edges(graph: &AutomationGraph) -> Result<()> {
    for edge in &graph.edges {
        for id in [&edge.from, &edge.to] {
            if graph.node(id).is_none() {
                return Err(Error::UnknownEdgeTarget {
                    node_id: id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Deterministic function name for a step: index plus sanitized node id
fn function_name(index: usize, node: &Node) -> String {
    let mut slug: String = node
        .id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if slug.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        slug.insert(0, '_');
    }
    format!("step_{}_{}", index, slug)
}
