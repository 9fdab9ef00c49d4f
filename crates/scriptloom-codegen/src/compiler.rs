//! Top-level graph compiler
//!
//! Ties normalizer → builders → assembler into a single call. Compilation
//! is synchronous, single-threaded, and side-effect-free: identical input
//! graphs yield byte-identical bundles, and either a complete bundle or a
//! compile error comes back, never a partial write.

use std::path::Path;

use scriptloom_core::{AutomationGraph, CompiledStep, StepPlan, normalize};

use crate::assembler::assemble;
use crate::builders::{BuildContext, BuilderRegistry};
use crate::error::Result;

/// A finished compile: the bundle plus the plan it was built from
///
/// The plan is kept so callers (the dry-run harness, diagnostics) can
/// execute or inspect the compiled graph without re-normalizing.
#[derive(Debug)]
pub struct CompiledWorkflow {
    /// The output file set
    pub bundle: scriptloom_core::Bundle,

    /// The normalized plan the bundle was generated from
    pub plan: StepPlan,
}

/// Graph-to-bundle compiler
pub struct Compiler {
    registry: BuilderRegistry,
}

impl Compiler {
    /// A compiler over the built-in operation set
    pub fn new() -> Self {
        Self {
            registry: BuilderRegistry::builtin(),
        }
    }

    /// A compiler over a caller-supplied registry
    pub fn with_registry(registry: BuilderRegistry) -> Self {
        Self { registry }
    }

    /// The operation registry this compiler validates against
    pub fn registry(&self) -> &BuilderRegistry {
        &self.registry
    }

    /// Compile a graph into a bundle
    pub fn compile(&self, graph: &AutomationGraph) -> Result<CompiledWorkflow> {
        tracing::info!(workflow_id = %graph.id, name = %graph.name, "compiling graph");

        let plan = normalize(graph, &self.registry)?;

        let mut steps = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let entry = plan
                .triggers
                .iter()
                .find(|t| t.trigger_node_id == step.node.id);
            let ctx = BuildContext {
                workflow_id: &plan.workflow_id,
                node: &step.node,
                function_name: &step.function_name,
                trigger_key: entry.map(|e| e.trigger_key.as_str()),
                handler_name: entry.map(|e| e.handler_name.as_str()),
            };
            steps.push(CompiledStep {
                node: step.node.clone(),
                function_name: step.function_name.clone(),
                emitted_source: self.registry.build_step(&ctx)?,
            });
        }

        let bundle = assemble(&plan, &steps, &self.registry)?;
        tracing::info!(
            workflow_id = %plan.workflow_id,
            steps = steps.len(),
            bytes = bundle.size(),
            "compiled bundle"
        );
        Ok(CompiledWorkflow { bundle, plan })
    }

    /// Load a graph document and compile it
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompiledWorkflow> {
        let graph = AutomationGraph::load(path)?;
        self.compile(&graph)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
