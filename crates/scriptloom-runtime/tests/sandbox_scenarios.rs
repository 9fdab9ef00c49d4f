//! Behavioral scenarios run through the dry-run sandbox

use std::collections::BTreeMap;

use scriptloom_core::{Node, NodeKind, PlanStep, StepPlan, TemplateValue, TriggerEntry};
use scriptloom_runtime::error::Error;
use scriptloom_runtime::{PropertyStore, TriggerHost};
use scriptloom_runtime::sandbox::{LogLevel, Sandbox};
use serde_json::json;

fn node(id: &str, kind: NodeKind, app: &str, op: &str, config: serde_json::Value) -> Node {
    let config: BTreeMap<String, TemplateValue> = serde_json::from_value(config).unwrap();
    Node {
        id: id.to_string(),
        kind,
        app: app.to_string(),
        operation: op.to_string(),
        config,
    }
}

fn step(node: Node, function_name: &str) -> PlanStep {
    PlanStep {
        node,
        function_name: function_name.to_string(),
    }
}

#[test]
fn missing_credential_warns_and_leaves_context_unchanged() {
    // A single messaging action against an empty property store: warn
    // logged, zero outbound requests, context returned unmodified.
    let mut sandbox = Sandbox::new();
    let slack = step(
        node(
            "a1",
            NodeKind::Action,
            "slack",
            "send_message",
            json!({"channel": "#ops", "text": "hello"}),
        ),
        "step_1_a1",
    );

    let ctx = json!({"existing": "data"});
    let result = sandbox.run_step(&slack, ctx.clone()).unwrap();

    assert_eq!(result, ctx);
    assert!(sandbox.transport.requests.is_empty());
    assert_eq!(sandbox.logs.len(), 1);
    assert_eq!(sandbox.logs[0].level, LogLevel::Warn);
    assert_eq!(sandbox.logs[0].event, "slack.send_message.skipped");
}

#[test]
fn invalid_line_item_fails_validation_before_any_request() {
    // A line item lacking both an identifier and a price raises a
    // ValidationError naming the item, with nothing sent.
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SHOPIFY_ADMIN_TOKEN", "shpat-test");
    sandbox.store.set("SHOPIFY_SHOP_DOMAIN", "example.myshopify.com");

    let order = step(
        node(
            "a1",
            NodeKind::Action,
            "shopify",
            "create_order",
            json!({"line_items": [{"quantity": 2}]}),
        ),
        "step_1_a1",
    );

    let err = sandbox.run_step(&order, json!({})).unwrap_err();
    match err {
        Error::Validation { step, field, .. } => {
            assert_eq!(step, "step_1_a1");
            assert_eq!(field, "line_items[0]");
        }
        other => panic!("expected Validation, got {:?}", other),
    }
    assert!(sandbox.transport.requests.is_empty());
    assert_eq!(sandbox.logs.last().unwrap().level, LogLevel::Error);
}

#[test]
fn payment_creation_maps_intent_id_and_sends_idempotency_key() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("STRIPE_SECRET_KEY", "sk_test_abc");
    sandbox
        .transport
        .push_json(200, r#"{"id": "pi_123", "status": "requires_payment_method"}"#);

    let payment = step(
        node(
            "a1",
            NodeKind::Action,
            "stripe",
            "create_payment",
            json!({"amount": 2000, "currency": "usd"}),
        ),
        "step_1_a1",
    );

    let result = sandbox.run_step(&payment, json!({})).unwrap();

    assert_eq!(result["stripe"]["payment_intent"]["id"], "pi_123");
    assert_eq!(sandbox.transport.requests.len(), 1);

    let request = &sandbox.transport.requests[0];
    assert_eq!(request.url, "https://api.stripe.com/v1/payment_intents");
    assert_eq!(request.body.as_deref(), Some("amount=2000&currency=usd"));

    let idempotency = request.headers.get("Idempotency-Key").unwrap();
    assert_eq!(idempotency.len(), 64);
    assert!(idempotency.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn payment_idempotency_key_is_stable_across_runs() {
    let mut first = Sandbox::new();
    let mut second = Sandbox::new();
    for sandbox in [&mut first, &mut second] {
        sandbox.store.set("STRIPE_SECRET_KEY", "sk_test_abc");
        sandbox.transport.push_json(200, r#"{"id": "pi_1", "status": "succeeded"}"#);
    }

    let payment = step(
        node(
            "a1",
            NodeKind::Action,
            "stripe",
            "create_payment",
            json!({"amount": 100, "currency": "eur"}),
        ),
        "step_1_a1",
    );

    first.run_step(&payment, json!({})).unwrap();
    second.run_step(&payment, json!({})).unwrap();

    assert_eq!(
        first.transport.requests[0].headers["Idempotency-Key"],
        second.transport.requests[0].headers["Idempotency-Key"]
    );
}

#[test]
fn payment_rejects_unknown_currency_and_bad_amount() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("STRIPE_SECRET_KEY", "sk_test_abc");

    let bad_currency = step(
        node(
            "a1",
            NodeKind::Action,
            "stripe",
            "create_payment",
            json!({"amount": 100, "currency": "xxx"}),
        ),
        "step_1_a1",
    );
    let err = sandbox.run_step(&bad_currency, json!({})).unwrap_err();
    assert!(matches!(err, Error::Validation { field, .. } if field == "currency"));

    let bad_amount = step(
        node(
            "a2",
            NodeKind::Action,
            "stripe",
            "create_payment",
            json!({"amount": "19.99", "currency": "usd"}),
        ),
        "step_2_a2",
    );
    let err = sandbox.run_step(&bad_amount, json!({})).unwrap_err();
    assert!(matches!(err, Error::Validation { field, .. } if field == "amount"));

    assert!(sandbox.transport.requests.is_empty());
}

#[test]
fn slack_message_interpolates_context_paths() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");
    sandbox
        .transport
        .push_json(200, r#"{"ok": true, "ts": "171234.5678"}"#);

    let slack = step(
        node(
            "a1",
            NodeKind::Action,
            "slack",
            "send_message",
            json!({"channel": "#ops", "text": "order {{shopify.order.id}} arrived"}),
        ),
        "step_1_a1",
    );

    let ctx = json!({"shopify": {"order": {"id": 1042}}});
    let result = sandbox.run_step(&slack, ctx).unwrap();

    let request = &sandbox.transport.requests[0];
    let body: serde_json::Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body["text"], "order 1042 arrived");
    assert_eq!(result["slack"]["message_ts"], "171234.5678");
}

#[test]
fn slack_api_level_error_is_fatal_and_logged() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");
    sandbox
        .transport
        .push_json(200, r#"{"ok": false, "error": "channel_not_found"}"#);

    let slack = step(
        node(
            "a1",
            NodeKind::Action,
            "slack",
            "send_message",
            json!({"channel": "#nope", "text": "hi"}),
        ),
        "step_1_a1",
    );

    let err = sandbox.run_step(&slack, json!({})).unwrap_err();
    assert!(matches!(err, Error::Http { .. }));
    assert!(err.to_string().contains("channel_not_found"));
    assert_eq!(sandbox.logs.last().unwrap().event, "slack.send_message.failed");
}

#[test]
fn transient_failure_is_retried_then_succeeds() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");
    sandbox.transport.push_with_headers(429, &[("Retry-After", "1")], "{}");
    sandbox
        .transport
        .push_json(200, r#"{"ok": true, "ts": "1.2"}"#);

    let slack = step(
        node(
            "a1",
            NodeKind::Action,
            "slack",
            "send_message",
            json!({"channel": "#ops", "text": "hi"}),
        ),
        "step_1_a1",
    );

    let result = sandbox.run_step(&slack, json!({})).unwrap();
    assert_eq!(result["slack"]["message_ts"], "1.2");
    assert_eq!(sandbox.transport.requests.len(), 2);
    assert_eq!(sandbox.clock.sleeps, vec![1000]);
}

fn polling_plan() -> StepPlan {
    let trigger = node(
        "t1",
        NodeKind::Trigger,
        "shopify",
        "new_order",
        json!({"poll_minutes": 10}),
    );
    let slack = node(
        "a1",
        NodeKind::Action,
        "slack",
        "send_message",
        json!({"channel": "#orders", "text": "new order {{shopify.order.id}}"}),
    );
    StepPlan {
        workflow_id: "wf-poll".to_string(),
        workflow_name: "order poller".to_string(),
        steps: vec![step(trigger, "step_0_t1"), step(slack, "step_1_a1")],
        triggers: vec![TriggerEntry {
            trigger_node_id: "t1".to_string(),
            trigger_key: "wf-poll:t1".to_string(),
            handler_name: "run_step_0_t1".to_string(),
            action_node_ids: vec!["a1".to_string()],
        }],
        warnings: vec![],
        node_count: 2,
        edge_count: 1,
    }
}

#[test]
fn polling_trigger_installs_advances_cursor_and_dedups() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SHOPIFY_ADMIN_TOKEN", "shpat-test");
    sandbox.store.set("SHOPIFY_SHOP_DOMAIN", "example.myshopify.com");
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");

    sandbox.transport.push_json(
        200,
        r#"{"orders": [
            {"id": 1001, "updated_at": "2026-08-01T10:00:00Z"},
            {"id": 1002, "updated_at": "2026-08-01T11:00:00Z"}
        ]}"#,
    );
    sandbox.transport.push_json(200, r#"{"ok": true, "ts": "1.1"}"#);
    sandbox.transport.push_json(200, r#"{"ok": true, "ts": "1.2"}"#);

    let plan = polling_plan();
    let report = sandbox.run_plan(&plan).unwrap();

    // One poll plus one Slack post per new order.
    assert_eq!(report.contexts.len(), 2);
    assert_eq!(report.requests.len(), 3);
    assert!(report.requests[0].url.contains("/admin/api/"));

    // The host trigger was installed through the registry.
    assert_eq!(sandbox.triggers.list().len(), 1);

    // Second compile cycle: same trigger key, cursor excludes old orders.
    sandbox.transport.push_json(
        200,
        r#"{"orders": [{"id": 1002, "updated_at": "2026-08-01T11:00:00Z"}]}"#,
    );
    let report2 = sandbox.run_plan(&plan).unwrap();
    assert_eq!(report2.contexts.len(), 0, "already-seen order is not re-run");
    assert_eq!(sandbox.triggers.list().len(), 1, "no duplicate trigger");

    let cursor_doc = sandbox.store.get("__poll_cursor_v1:wf-poll:t1").unwrap();
    let cursor: serde_json::Value = serde_json::from_str(&cursor_doc).unwrap();
    assert_eq!(cursor["updated_at_min"], "2026-08-01T11:00:00Z");
}

#[test]
fn schedule_trigger_runs_actions_with_fresh_context() {
    let mut sandbox = Sandbox::new();
    sandbox.store.set("SLACK_BOT_TOKEN", "xoxb-test");
    sandbox.transport.push_json(200, r#"{"ok": true, "ts": "9.9"}"#);

    let trigger = node(
        "t1",
        NodeKind::Trigger,
        "schedule",
        "interval",
        json!({"every": 30, "unit": "minutes"}),
    );
    let slack = node(
        "a1",
        NodeKind::Action,
        "slack",
        "send_message",
        json!({"channel": "#heartbeat", "text": "still alive"}),
    );
    let plan = StepPlan {
        workflow_id: "wf-beat".to_string(),
        workflow_name: "heartbeat".to_string(),
        steps: vec![step(trigger, "step_0_t1"), step(slack, "step_1_a1")],
        triggers: vec![TriggerEntry {
            trigger_node_id: "t1".to_string(),
            trigger_key: "wf-beat:t1".to_string(),
            handler_name: "run_step_0_t1".to_string(),
            action_node_ids: vec!["a1".to_string()],
        }],
        warnings: vec![],
        node_count: 2,
        edge_count: 1,
    };

    let report = sandbox.run_plan(&plan).unwrap();
    assert_eq!(report.contexts.len(), 1);
    assert_eq!(report.contexts[0]["trigger"]["kind"], "schedule");
    assert_eq!(report.contexts[0]["slack"]["channel"], "#heartbeat");
    assert_eq!(report.requests.len(), 1);
}
