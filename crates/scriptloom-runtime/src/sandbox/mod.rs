//! Dry-run sandbox harness
//!
//! Executes a compiled step plan against fixture HTTP responses, a seeded
//! property store, a manual clock, and a fake trigger host, then reports
//! the resulting context, structured log entries, and the ordered list of
//! outbound requests actually issued. Log events are first-class data
//! here (not tracing output) because they are part of the harness
//! contract.

mod ops;

use std::collections::{BTreeMap, VecDeque};

use scriptloom_core::{PlanStep, StepPlan};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::host::{
    Clock, HostTrigger, HttpRequest, HttpResponse, PropertyStore, Transport, TriggerHost,
    TriggerSpec,
};
use crate::triggers;

/// In-memory property store
#[derive(Debug, Default, Clone)]
pub struct InMemoryPropertyStore {
    values: BTreeMap<String, String>,
}

impl InMemoryPropertyStore {
    /// Every stored key, for assertions
    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

impl PropertyStore for InMemoryPropertyStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Manual clock: `sleep` advances time and records each wait
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: i64,

    /// Every sleep issued, in order, in milliseconds
    pub sleeps: Vec<u64>,
}

impl ManualClock {
    /// A clock frozen at the given epoch-millisecond instant
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms,
            sleeps: Vec::new(),
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms
    }

    fn sleep(&mut self, ms: u64) {
        self.sleeps.push(ms);
        self.now_ms += ms as i64;
    }
}

/// Fake trigger host backed by a vector of live triggers
#[derive(Debug, Default)]
pub struct FakeTriggerHost {
    triggers: Vec<(HostTrigger, TriggerSpec)>,
    next_id: u64,
}

impl FakeTriggerHost {
    /// The creation parameters a live trigger was built from, for assertions
    pub fn spec(&self, id: &str) -> Option<&TriggerSpec> {
        self.triggers
            .iter()
            .find(|(t, _)| t.id == id)
            .map(|(_, spec)| spec)
    }
}

impl TriggerHost for FakeTriggerHost {
    fn create(&mut self, spec: &TriggerSpec) -> std::result::Result<String, String> {
        self.next_id += 1;
        let id = format!("trg_{}", self.next_id);
        self.triggers.push((
            HostTrigger {
                id: id.clone(),
                handler: spec.handler.clone(),
            },
            spec.clone(),
        ));
        Ok(id)
    }

    fn list(&self) -> Vec<HostTrigger> {
        self.triggers.iter().map(|(t, _)| t.clone()).collect()
    }

    fn delete(&mut self, id: &str) -> bool {
        let before = self.triggers.len();
        self.triggers.retain(|(t, _)| t.id != id);
        self.triggers.len() != before
    }
}

/// Transport that replays a FIFO queue of fixture responses
#[derive(Debug, Default)]
pub struct FixtureTransport {
    fixtures: VecDeque<HttpResponse>,

    /// Every request issued, in order
    pub requests: Vec<HttpRequest>,
}

impl FixtureTransport {
    /// Queue a fixture response
    pub fn push(&mut self, response: HttpResponse) {
        self.fixtures.push_back(response);
    }

    /// Queue a JSON fixture with the given status and no notable headers
    pub fn push_json(&mut self, status: u16, body: &str) {
        self.push(HttpResponse {
            status,
            headers: [(
                "content-type".to_string(),
                "application/json".to_string(),
            )]
            .into_iter()
            .collect(),
            body: body.to_string(),
        });
    }

    /// Queue a fixture with explicit headers
    pub fn push_with_headers(&mut self, status: u16, headers: &[(&str, &str)], body: &str) {
        self.push(HttpResponse {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
        });
    }
}

impl Transport for FixtureTransport {
    fn fetch(&mut self, req: &HttpRequest) -> std::result::Result<HttpResponse, String> {
        self.requests.push(req.clone());
        self.fixtures
            .pop_front()
            .ok_or_else(|| format!("no fixture response queued for {} {}", req.method, req.url))
    }
}

/// Severity of a structured log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational
    Info,
    /// Degraded but continuing
    Warn,
    /// Failure, re-thrown to the host
    Error,
}

/// One structured log event emitted by a step
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    /// Severity
    pub level: LogLevel,

    /// Event name, e.g. `slack.send_message.ok`
    pub event: String,

    /// Structured payload
    pub details: Value,

    /// Event time in epoch milliseconds
    pub timestamp_ms: i64,
}

/// Everything observed during a dry run
#[derive(Debug, Serialize)]
pub struct ExecutionReport {
    /// Final context of each completed run, in firing order
    pub contexts: Vec<Value>,

    /// Structured log events, in emission order
    pub logs: Vec<LogEvent>,

    /// Outbound requests actually issued, in order
    pub requests: Vec<HttpRequest>,
}

/// The dry-run sandbox: in-memory host plus captured observations
pub struct Sandbox {
    /// Seeded property store
    pub store: InMemoryPropertyStore,

    /// Fixture transport
    pub transport: FixtureTransport,

    /// Manual clock (blocking sleeps advance it)
    pub clock: ManualClock,

    /// Fake trigger host
    pub triggers: FakeTriggerHost,

    /// Captured structured log events
    pub logs: Vec<LogEvent>,

    /// Workflow id used for idempotency derivation; set by [`Sandbox::run_plan`]
    pub workflow_id: String,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// A fresh sandbox at a fixed reference instant
    pub fn new() -> Self {
        Self {
            store: InMemoryPropertyStore::default(),
            transport: FixtureTransport::default(),
            clock: ManualClock::new(1_700_000_000_000),
            triggers: FakeTriggerHost::default(),
            logs: Vec::new(),
            workflow_id: "wf-dry-run".to_string(),
        }
    }

    pub(crate) fn log(&mut self, level: LogLevel, event: &str, details: Value) {
        self.logs.push(LogEvent {
            level,
            event: event.to_string(),
            details,
            timestamp_ms: self.clock.now_ms(),
        });
    }

    /// Execute a compiled step plan end to end
    ///
    /// Installs every trigger through the reconciliation registry, syncs
    /// the registry against the plan's trigger keys (mirroring the
    /// bundle's `setup()` entry point), fires each trigger, and runs the
    /// resulting contexts through the action steps in order.
    pub fn run_plan(&mut self, plan: &StepPlan) -> Result<ExecutionReport> {
        self.workflow_id = plan.workflow_id.clone();
        for entry in &plan.triggers {
            let step = plan_step(plan, &entry.trigger_node_id)?;
            ops::install_trigger(self, step, entry)?;
        }
        triggers::sync_trigger_registry(
            &mut self.store,
            &mut self.triggers,
            &plan.trigger_keys(),
        )?;

        let mut contexts = Vec::new();
        for entry in &plan.triggers {
            let trigger_step = plan_step(plan, &entry.trigger_node_id)?;
            let runs = ops::fire_trigger(self, trigger_step, entry)?;

            for mut ctx in runs {
                for node_id in &entry.action_node_ids {
                    let step = plan_step(plan, node_id)?;
                    ctx = ops::execute_action(self, step, ctx)?;
                }
                contexts.push(ctx);
            }
        }

        Ok(ExecutionReport {
            contexts,
            logs: self.logs.clone(),
            requests: self.transport.requests.clone(),
        })
    }

    /// Execute a single action step against a context
    pub fn run_step(&mut self, step: &PlanStep, ctx: Value) -> Result<Value> {
        ops::execute_action(self, step, ctx)
    }
}

fn plan_step<'a>(plan: &'a StepPlan, node_id: &str) -> Result<&'a PlanStep> {
    plan.step(node_id).ok_or_else(|| Error::Trigger {
        message: format!("plan references unknown step '{}'", node_id),
    })
}

/// Map a step-level error into the non-fatal warn-and-skip set, if it is one
///
/// Missing credentials deliberately do not abort a run: one unconfigured
/// integration must not take down an otherwise-healthy automation.
pub(crate) fn is_skippable_auth_failure(err: &Error) -> bool {
    matches!(
        err,
        Error::MissingSecret { .. } | Error::MissingOAuthToken { .. }
    )
}
