//! Validate a graph without writing a bundle

use anyhow::{Context, Result};
use scriptloom_codegen::Compiler;
use scriptloom_core::{AutomationGraph, normalize};

/// Run the validate command
pub fn run(graph_path: &str) -> Result<()> {
    let graph = AutomationGraph::load(graph_path)
        .with_context(|| format!("failed to load {}", graph_path))?;

    let compiler = Compiler::new();
    let plan = normalize(&graph, compiler.registry())
        .with_context(|| format!("graph '{}' is invalid", graph.name))?;

    tracing::info!(
        "✓ {} ({} steps, {} triggers)",
        graph.name,
        plan.steps.len(),
        plan.triggers.len()
    );
    for warning in &plan.warnings {
        tracing::warn!(node_id = %warning.node_id, "{}", warning.message);
    }

    Ok(())
}
