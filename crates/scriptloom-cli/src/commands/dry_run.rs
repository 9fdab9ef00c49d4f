//! Compile a graph and execute it in the sandbox

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use scriptloom_codegen::Compiler;
use scriptloom_runtime::PropertyStore;
use scriptloom_runtime::sandbox::Sandbox;
use serde::Deserialize;

/// Fixture document: seeded properties plus a FIFO of HTTP responses
#[derive(Debug, Default, Deserialize)]
struct FixtureDoc {
    /// Property-store seed values
    #[serde(default)]
    properties: BTreeMap<String, String>,

    /// Responses replayed in request order
    #[serde(default)]
    responses: Vec<FixtureResponse>,
}

#[derive(Debug, Deserialize)]
struct FixtureResponse {
    status: u16,

    #[serde(default)]
    headers: BTreeMap<String, String>,

    #[serde(default)]
    body: String,
}

/// Run the dry-run command
pub fn run(graph_path: &str, fixtures_path: Option<&str>) -> Result<()> {
    let compiler = Compiler::new();
    let compiled = compiler
        .compile_file(graph_path)
        .with_context(|| format!("failed to compile {}", graph_path))?;

    let fixtures = match fixtures_path {
        Some(path) => load_fixtures(path)?,
        None => FixtureDoc::default(),
    };

    let mut sandbox = Sandbox::new();
    for (key, value) in &fixtures.properties {
        sandbox.store.set(key, value);
    }
    for response in &fixtures.responses {
        sandbox.transport.push_with_headers(
            response.status,
            &response
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect::<Vec<_>>(),
            &response.body,
        );
    }

    let report = sandbox
        .run_plan(&compiled.plan)
        .context("dry run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn load_fixtures(path: &str) -> Result<FixtureDoc> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixtures from {}", path))?;
    let doc = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
        _ => serde_json::from_str(&contents)?,
    };
    Ok(doc)
}
