//! Compiled bundle types
//!
//! A bundle is the immutable output of one compile: a named set of text
//! files plus workflow statistics. It is produced whole or not at all.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::graph::Node;

/// One generated step function: a reachable node plus its emitted source
///
/// Produced once per compile, never mutated afterward.
#[derive(Debug, Clone)]
pub struct CompiledStep {
    /// The graph node the function was generated from
    pub node: Node,

    /// Name of the generated function
    pub function_name: String,

    /// The generated source text
    pub emitted_source: String,
}

/// Node and edge counts of the compiled graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    /// Number of nodes in the input graph
    pub nodes: usize,

    /// Number of edges in the input graph
    pub edges: usize,
}

/// The compiled output file set for one automation graph
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Workflow identifier the bundle was compiled from
    pub workflow_id: String,

    /// File name → file contents, ordered for deterministic iteration
    pub files: BTreeMap<String, String>,

    /// Input graph statistics
    pub stats: GraphStats,
}

impl Bundle {
    /// Stable SHA-256 over every file name and its contents
    ///
    /// Used to report artifact identity and to skip unchanged writes.
    pub fn content_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        for (name, contents) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(contents.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Write every file into a directory, creating it if needed
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for (name, contents) in &self.files {
            std::fs::write(dir.join(name), contents)?;
        }
        Ok(())
    }

    /// Total size of all files in bytes
    pub fn size(&self) -> usize {
        self.files.values().map(String::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(files: &[(&str, &str)]) -> Bundle {
        Bundle {
            workflow_id: "wf".to_string(),
            files: files
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            stats: GraphStats { nodes: 0, edges: 0 },
        }
    }

    #[test]
    fn test_content_hash_same_for_identical() {
        let a = bundle(&[("Code.gs", "function x() {}")]);
        let b = bundle(&[("Code.gs", "function x() {}")]);
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_changes_with_contents() {
        let a = bundle(&[("Code.gs", "function x() {}")]);
        let b = bundle(&[("Code.gs", "function y() {}")]);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_changes_with_file_name() {
        let a = bundle(&[("Code.gs", "x")]);
        let b = bundle(&[("Main.gs", "x")]);
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_write_to_dir() {
        let dir = std::env::temp_dir().join("scriptloom_test_bundle_write");
        let _ = std::fs::remove_dir_all(&dir);

        let b = bundle(&[("Code.gs", "function x() {}"), ("appsscript.json", "{}")]);
        b.write_to_dir(&dir).unwrap();

        assert!(dir.join("Code.gs").exists());
        assert!(dir.join("appsscript.json").exists());
        assert_eq!(b.size(), "function x() {}".len() + 2);

        std::fs::remove_dir_all(&dir).ok();
    }
}
