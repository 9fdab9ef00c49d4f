//! Bundle assembly
//!
//! A pure merge: every compiled step's source, one handler per trigger,
//! a `setup()` entry point that self-installs the trigger set, the shared
//! runtime block appended once, and the capability manifest. Failure
//! modes are exactly those already raised upstream; assembly itself
//! cannot fail.

use std::collections::BTreeMap;

use scriptloom_core::{Bundle, CompiledStep, GraphStats, NodeKind, OperationCatalog, StepPlan};
use serde_json::json;

use crate::builders::BuilderRegistry;
use crate::error::Result;
use crate::runtime_block::RUNTIME_BLOCK;

/// Name of the consolidated source file
pub const SOURCE_FILE: &str = "Code.gs";

/// Name of the capability manifest
pub const MANIFEST_FILE: &str = "appsscript.json";

/// Merge compiled steps into the final bundle
pub fn assemble(
    plan: &StepPlan,
    steps: &[CompiledStep],
    registry: &BuilderRegistry,
) -> Result<Bundle> {
    let mut files = BTreeMap::new();
    files.insert(SOURCE_FILE.to_string(), source_file(plan, steps));
    files.insert(MANIFEST_FILE.to_string(), manifest(plan, registry)?);

    Ok(Bundle {
        workflow_id: plan.workflow_id.clone(),
        files,
        stats: GraphStats {
            nodes: plan.node_count,
            edges: plan.edge_count,
        },
    })
}

fn source_file(plan: &StepPlan, steps: &[CompiledStep]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "// {} (workflow {})\n// Generated by scriptloom. Do not edit by hand; recompile the graph instead.\n\n",
        plan.workflow_name, plan.workflow_id,
    ));

    for step in steps {
        out.push_str(&step.emitted_source);
        out.push('\n');
    }

    for entry in &plan.triggers {
        let trigger_fn = plan
            .step(&entry.trigger_node_id)
            .map(|s| s.function_name.clone())
            .unwrap_or_default();

        out.push_str(&format!(
            "function {handler}(e) {{\n  var runs = {trigger_fn}_fire(e);\n  for (var i = 0; i < runs.length; i++) {{\n    var ctx = runs[i];\n    try {{\n",
            handler = entry.handler_name,
            trigger_fn = trigger_fn,
        ));
        for node_id in &entry.action_node_ids {
            if let Some(step) = plan.step(node_id) {
                out.push_str(&format!("      ctx = {}(ctx);\n", step.function_name));
            }
        }
        out.push_str(&format!(
            "    }} catch (err) {{\n      __log('error', 'run.failed', {{ trigger: '{trigger_fn}', error: String(err && err.message) }});\n      throw err;\n    }}\n  }}\n}}\n\n",
            trigger_fn = trigger_fn,
        ));
    }

    out.push_str("function setup() {\n");
    for entry in &plan.triggers {
        if let Some(step) = plan.step(&entry.trigger_node_id) {
            out.push_str(&format!("  {}_install();\n", step.function_name));
        }
    }
    let keys = plan
        .trigger_keys()
        .iter()
        .map(|k| format!("'{}'", k))
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("  __syncTriggerRegistry([{}]);\n", keys));
    out.push_str(&format!(
        "  __log('info', 'setup.complete', {{ triggers: {} }});\n}}\n\n",
        plan.triggers.len(),
    ));

    out.push_str(RUNTIME_BLOCK);
    out
}

fn manifest(plan: &StepPlan, registry: &BuilderRegistry) -> Result<String> {
    let mut scopes: Vec<String> = Vec::new();
    let mut services: Vec<String> = Vec::new();

    for step in &plan.steps {
        if let Some(caps) = registry.capabilities(&step.node.operation_key()) {
            scopes.extend(caps.oauth_scopes);
            services.extend(caps.advanced_services);
        }
    }
    // Every bundle manages its own triggers from setup().
    if plan
        .steps
        .iter()
        .any(|s| s.node.kind == NodeKind::Trigger)
    {
        scopes.push(crate::builders::SCOPE_SCRIPT_APP.to_string());
    }
    scopes.sort();
    scopes.dedup();
    services.sort();
    services.dedup();

    let mut manifest = json!({
        "timeZone": "Etc/UTC",
        "exceptionLogging": "STACKDRIVER",
        "runtimeVersion": "V8",
        "oauthScopes": scopes,
    });
    if !services.is_empty() {
        manifest["dependencies"] = json!({
            "enabledAdvancedServices": services,
        });
    }

    let mut text = serde_json::to_string_pretty(&manifest)?;
    text.push('\n');
    Ok(text)
}
