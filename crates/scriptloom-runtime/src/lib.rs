//! Scriptloom Runtime Semantics
//!
//! This crate is the executable specification of the runtime support block
//! that the compiler embeds in every bundle: blocking retry with backoff and
//! rate-limit awareness, alias-aware secret resolution, the sealed-secret
//! codec, and the trigger reconciliation registry.
//!
//! Everything runs behind injected host traits ([`host::PropertyStore`],
//! [`host::TriggerHost`], [`host::Transport`], [`host::Clock`]) so the
//! algorithms are unit-testable without a live host. The [`sandbox`] module
//! wires in-memory implementations of those traits into a dry-run harness
//! that executes compiled step plans against fixture HTTP responses.
//!
//! # Example
//!
//! ```rust,ignore
//! use scriptloom_runtime::sandbox::Sandbox;
//!
//! let mut sandbox = Sandbox::new();
//! sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");
//! sandbox.transport.push_json(200, r#"{"ok": true, "ts": "1.2"}"#);
//! let report = sandbox.run_plan(&plan)?;
//! assert_eq!(report.requests.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod host;
pub mod interp;
pub mod retry;
pub mod sandbox;
pub mod seal;
pub mod secrets;
pub mod triggers;

pub use error::{Error, Result};
pub use host::{Clock, HttpRequest, HttpResponse, PropertyStore, Transport, TriggerHost};
pub use retry::{RetryDecision, RetryOptions, with_retries};
