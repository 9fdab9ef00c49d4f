//! Scriptloom Core Library
//!
//! This crate provides the core functionality for Scriptloom:
//! - Automation graph model and document loading
//! - Graph normalization into an ordered step plan
//! - Step plan, compiled step, and bundle types
//! - The operation catalog trait the normalizer validates against
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Graph    │────▶│ Normalizer  │────▶│  Step Plan  │
//! │ (JSON/YAML) │     │ (validate)  │     │  (ordered)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use scriptloom_core::{AutomationGraph, normalize};
//!
//! let graph = AutomationGraph::load("./graphs/order_sync.yaml")?;
//! let plan = normalize(&graph, &catalog)?;
//! for step in &plan.steps {
//!     println!("Step: {}", step.function_name);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod catalog;
pub mod error;
pub mod graph;
pub mod normalize;

pub use bundle::{Bundle, CompiledStep, GraphStats};
pub use catalog::{Capabilities, OperationCatalog};
pub use error::{Error, Result};
pub use graph::{AutomationGraph, Edge, Node, NodeKind, TemplateValue};
pub use normalize::{PlanStep, StepPlan, TriggerEntry, Warning, normalize};
