//! Compile graphs into bundles

use std::path::Path;

use anyhow::{Context, Result};
use scriptloom_codegen::Compiler;

/// Run the compile command
pub fn run(graph_path: &str, out_dir: &str, force: bool) -> Result<()> {
    let graph_path = Path::new(graph_path);
    let compiler = Compiler::new();

    if graph_path.is_dir() {
        let mut compiled_count = 0;
        for entry in walkdir::WalkDir::new(graph_path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "json")
            })
        {
            compile_one(&compiler, entry.path(), out_dir, force)?;
            compiled_count += 1;
        }
        tracing::info!("compiled {} graphs", compiled_count);
    } else {
        compile_one(&compiler, graph_path, out_dir, force)?;
    }

    Ok(())
}

fn compile_one(compiler: &Compiler, path: &Path, out_dir: &str, force: bool) -> Result<()> {
    tracing::info!("compiling {}", path.display());

    let compiled = compiler
        .compile_file(path)
        .with_context(|| format!("failed to compile {}", path.display()))?;

    for warning in &compiled.plan.warnings {
        tracing::warn!(node_id = %warning.node_id, "{}", warning.message);
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle");
    let target = Path::new(out_dir).join(stem);
    let hash = compiled.bundle.content_hash();

    if !force && bundle_unchanged(&compiled.bundle, &target) {
        tracing::info!("  = {} unchanged (hash {}...)", stem, &hash[..8]);
        return Ok(());
    }

    compiled
        .bundle
        .write_to_dir(&target)
        .with_context(|| format!("failed to write bundle to {}", target.display()))?;

    tracing::info!(
        "  ✓ {} ({} files, {} bytes, hash {}...)",
        stem,
        compiled.bundle.files.len(),
        compiled.bundle.size(),
        &hash[..8]
    );
    Ok(())
}

/// True when every bundle file already exists on disk with identical contents
fn bundle_unchanged(bundle: &scriptloom_core::Bundle, target: &Path) -> bool {
    bundle.files.iter().all(|(name, contents)| {
        std::fs::read_to_string(target.join(name))
            .map(|existing| existing == *contents)
            .unwrap_or(false)
    })
}
