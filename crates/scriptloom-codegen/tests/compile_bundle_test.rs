//! End-to-end compile tests: textual properties of the bundle plus
//! behavioral verification of the compiled plan through the sandbox.

use scriptloom_codegen::{Compiler, RUNTIME_BLOCK};
use scriptloom_core::AutomationGraph;
use scriptloom_runtime::sandbox::Sandbox;
use scriptloom_runtime::{PropertyStore, TriggerHost};

fn fixture_graph() -> AutomationGraph {
    let yaml = include_str!("fixtures/order_sync.yaml");
    AutomationGraph::from_yaml_str(yaml).unwrap()
}

#[test]
fn compile_is_byte_identical_across_runs() {
    let compiler = Compiler::new();
    let a = compiler.compile(&fixture_graph()).unwrap();
    let b = compiler.compile(&fixture_graph()).unwrap();

    assert_eq!(a.bundle.files, b.bundle.files);
    assert_eq!(a.bundle.content_hash(), b.bundle.content_hash());
}

#[test]
fn bundle_contains_every_step_and_the_runtime_block_once() {
    let compiler = Compiler::new();
    let compiled = compiler.compile(&fixture_graph()).unwrap();
    let source = &compiled.bundle.files["Code.gs"];

    assert!(source.contains("function step_0_new_order_install()"));
    assert!(source.contains("function step_0_new_order_fire(e)"));
    assert!(source.contains("function step_1_charge(ctx)"));
    assert!(source.contains("function step_2_notify(ctx)"));
    assert!(source.contains("function run_step_0_new_order(e)"));
    assert!(source.contains("function setup() {"));
    assert!(source.ends_with(RUNTIME_BLOCK));
    assert_eq!(source.matches("function __withRetries(").count(), 1);
}

#[test]
fn templates_are_escaped_never_evaluated() {
    let compiler = Compiler::new();
    let compiled = compiler.compile(&fixture_graph()).unwrap();
    let source = &compiled.bundle.files["Code.gs"];

    // Placeholder text survives verbatim inside an __interpolate call.
    assert!(source.contains(r#"__interpolate("order {{shopify.order.id}}", ctx)"#));
    assert!(source.contains(r#"__interpolate("{{shopify.order.total_minor}}", ctx)"#));
}

#[test]
fn manifest_lists_deduplicated_scopes() {
    let compiler = Compiler::new();
    let compiled = compiler.compile(&fixture_graph()).unwrap();
    let manifest: serde_json::Value =
        serde_json::from_str(&compiled.bundle.files["appsscript.json"]).unwrap();

    let scopes = manifest["oauthScopes"].as_array().unwrap();
    assert_eq!(scopes.len(), 2);
    assert!(scopes.iter().any(|s| s.as_str().unwrap().contains("external_request")));
    assert!(scopes.iter().any(|s| s.as_str().unwrap().contains("script.scriptapp")));
}

#[test]
fn compiled_plan_executes_in_the_sandbox() {
    let compiler = Compiler::new();
    let compiled = compiler.compile(&fixture_graph()).unwrap();

    let mut sandbox = Sandbox::new();
    sandbox.store.set("SHOPIFY_ADMIN_TOKEN", "shpat-test");
    sandbox.store.set("SHOPIFY_SHOP_DOMAIN", "example.myshopify.com");
    sandbox.store.set("STRIPE_SECRET_KEY", "sk_test_abc");
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");

    sandbox.transport.push_json(
        200,
        r#"{"orders": [{"id": 7001, "total_minor": 2500, "updated_at": "2026-08-01T09:00:00Z"}]}"#,
    );
    sandbox.transport.push_json(
        200,
        r#"{"id": "pi_777", "status": "requires_payment_method"}"#,
    );
    sandbox.transport.push_json(200, r#"{"ok": true, "ts": "4.2"}"#);

    let report = sandbox.run_plan(&compiled.plan).unwrap();

    assert_eq!(report.contexts.len(), 1);
    let ctx = &report.contexts[0];
    assert_eq!(ctx["stripe"]["payment_intent"]["id"], "pi_777");
    assert_eq!(ctx["slack"]["channel"], "#orders");

    // Poll, charge, notify: exactly three outbound requests in order.
    assert_eq!(report.requests.len(), 3);
    assert!(report.requests[0].url.contains("orders.json"));
    assert!(report.requests[1].url.contains("payment_intents"));
    assert!(report.requests[2].url.contains("chat.postMessage"));

    // The charge interpolated the polled order's amount.
    assert_eq!(
        report.requests[1].body.as_deref(),
        Some("amount=2500&currency=usd&description=order%207001")
    );

    // The trigger self-installed through the registry.
    assert_eq!(sandbox.triggers.list().len(), 1);

    // The notification saw both upstream namespaces.
    let slack_body: serde_json::Value =
        serde_json::from_str(report.requests[2].body.as_deref().unwrap()).unwrap();
    assert_eq!(slack_body["text"], "charged order 7001 (pi_777)");
}

#[test]
fn unreachable_node_warning_is_carried_on_the_plan() {
    let compiler = Compiler::new();
    let graph = AutomationGraph::from_yaml_str(
        r#"
id: wf-warn
name: warn test
nodes:
  - id: t1
    kind: trigger
    app: schedule
    operation: interval
  - id: orphan
    kind: action
    app: slack
    operation: send_message
edges: []
"#,
    )
    .unwrap();

    let compiled = compiler.compile(&graph).unwrap();
    assert_eq!(compiled.plan.warnings.len(), 1);
    assert_eq!(compiled.plan.warnings[0].node_id, "orphan");

    // Dropped means dropped: no function emitted for the orphan.
    assert!(!compiled.bundle.files["Code.gs"].contains("orphan"));
}

#[test]
fn dry_run_with_missing_secrets_issues_no_requests() {
    let compiler = Compiler::new();
    let graph = AutomationGraph::from_yaml_str(
        r##"
id: wf-nosecrets
name: unconfigured
nodes:
  - id: t1
    kind: trigger
    app: schedule
    operation: interval
  - id: a1
    kind: action
    app: slack
    operation: send_message
    config:
      channel: "#ops"
      text: hello
edges:
  - from: t1
    to: a1
"##,
    )
    .unwrap();

    let compiled = compiler.compile(&graph).unwrap();
    let mut sandbox = Sandbox::new();
    let report = sandbox.run_plan(&compiled.plan).unwrap();

    assert_eq!(report.requests.len(), 0);
    assert_eq!(report.contexts.len(), 1);
    assert!(report
        .logs
        .iter()
        .any(|log| log.event == "slack.send_message.skipped"));
}
