//! Scriptloom Code Generation
//!
//! This crate turns a normalized automation graph into a deployable
//! script bundle.
//!
//! # Pipeline Overview
//!
//! ```text
//! ┌─────────┐     ┌───────────┐     ┌──────────┐     ┌──────────┐
//! │  Graph  │────▶│ Normalize │────▶│ Builders │────▶│ Assemble │
//! │  (doc)  │     │  (plan)   │     │  (text)  │     │ (bundle) │
//! └─────────┘     └───────────┘     └──────────┘     └──────────┘
//! ```
//!
//! Every operation builder is a pure function from static node
//! configuration to generated source text; determinism is load-bearing,
//! since the regression strategy for the emitted program is snapshotting
//! builder output. The shared runtime block is appended once, verbatim,
//! to every bundle.
//!
//! # Example
//!
//! ```rust,ignore
//! use scriptloom_codegen::Compiler;
//!
//! let compiler = Compiler::new();
//! let compiled = compiler.compile(&graph)?;
//! compiled.bundle.write_to_dir("./out/order_sync")?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assembler;
pub mod builders;
pub mod compiler;
pub mod emit;
pub mod error;
pub mod runtime_block;

pub use builders::{BuildContext, BuilderRegistry, OperationBuilder};
pub use compiler::{CompiledWorkflow, Compiler};
pub use error::{Error, Result};
pub use runtime_block::RUNTIME_BLOCK;
