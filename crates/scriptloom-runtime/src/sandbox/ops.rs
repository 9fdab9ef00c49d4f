//! Per-operation runtime semantics
//!
//! One execution function per supported (connector, operation) pair,
//! mirroring the behavior of the generated step functions: resolve
//! credentials, interpolate config, validate before any network call,
//! issue the request through the retry library, map the response into
//! namespaced context fields, and emit one structured log event.

use once_cell::sync::Lazy;
use regex::Regex;
use scriptloom_core::{Node, PlanStep, TemplateValue, TriggerEntry};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::host::{Clock, HttpRequest, HttpResponse, PropertyStore, Transport};
use crate::interp::render_template_value;
use crate::retry::{AttemptFailure, RetryOptions, rate_limit_aware};
use crate::secrets::{SecretOptions, get_secret, require_oauth_token};
use crate::triggers::{TimeTriggerConfig, build_time_trigger, ensure_trigger};

use super::{LogLevel, Sandbox, is_skippable_auth_failure};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

/// Currencies accepted by the payment-creation validator
const CURRENCIES: &[&str] = &[
    "aud", "brl", "cad", "chf", "czk", "dkk", "eur", "gbp", "hkd", "inr", "jpy", "mxn", "nok",
    "nzd", "pln", "sek", "sgd", "usd",
];

const SHOPIFY_API_VERSION: &str = "2024-01";

/// Install a trigger through the reconciliation registry
pub(super) fn install_trigger(
    sb: &mut Sandbox,
    step: &PlanStep,
    entry: &TriggerEntry,
) -> Result<()> {
    let node = &step.node;
    let key = entry.trigger_key.as_str();
    let handler = entry.handler_name.as_str();

    let config = match node.operation_key().as_str() {
        "trigger.schedule:interval" => schedule_config(node)?,
        "trigger.shopify:new_order" => TimeTriggerConfig {
            every: Some(cfg_u32(node, "poll_minutes").unwrap_or(5)),
            unit: Some(crate::host::IntervalUnit::Minutes),
            ..Default::default()
        },
        other => {
            return Err(Error::Trigger {
                message: format!("no trigger installer for '{}'", other),
            });
        }
    };

    let description = format!("{} ({})", node.operation_key(), node.id);
    let Sandbox {
        store,
        triggers,
        clock,
        ..
    } = sb;
    ensure_trigger(store, triggers, clock, key, handler, "time", &description, |host| {
        build_time_trigger(host, handler, &description, &config).map_err(|e| e.to_string())
    })?;
    Ok(())
}

/// Fire a trigger, producing the contexts of the runs it starts
pub(super) fn fire_trigger(
    sb: &mut Sandbox,
    step: &PlanStep,
    entry: &TriggerEntry,
) -> Result<Vec<Value>> {
    match step.node.operation_key().as_str() {
        "trigger.schedule:interval" => Ok(vec![json!({
            "trigger": {
                "kind": "schedule",
                "key": entry.trigger_key,
                "fired_at": sb.clock.now_ms(),
            }
        })]),
        "trigger.shopify:new_order" => poll_shopify_orders(sb, step, entry),
        other => Err(Error::Trigger {
            message: format!("no trigger firing path for '{}'", other),
        }),
    }
}

/// Execute one action step, honoring the warn-and-skip auth contract
pub(super) fn execute_action(sb: &mut Sandbox, step: &PlanStep, ctx: Value) -> Result<Value> {
    let outcome = match step.node.operation_key().as_str() {
        "action.slack:send_message" => slack_send_message(sb, step, &ctx),
        "action.shopify:create_order" => shopify_create_order(sb, step, &ctx),
        "action.stripe:create_payment" => stripe_create_payment(sb, step, &ctx),
        other => Err(Error::Trigger {
            message: format!("no action executor for '{}'", other),
        }),
    };

    match outcome {
        Ok(updated) => Ok(updated),
        Err(err) if is_skippable_auth_failure(&err) => {
            sb.log(
                LogLevel::Warn,
                &format!("{}.skipped", event_prefix(&step.node)),
                json!({"step": step.function_name, "reason": err.to_string()}),
            );
            Ok(ctx)
        }
        Err(err) => {
            sb.log(
                LogLevel::Error,
                &format!("{}.failed", event_prefix(&step.node)),
                json!({"step": step.function_name, "error": err.to_string()}),
            );
            Err(err)
        }
    }
}

// ---- slack ----------------------------------------------------------------

fn slack_send_message(sb: &mut Sandbox, step: &PlanStep, ctx: &Value) -> Result<Value> {
    let token = require_oauth_token(&sb.store, &sb.clock, "slack", &["chat:write"])?;

    let channel = rendered_string(&step.node, "channel", ctx);
    let text = rendered_string(&step.node, "text", ctx);
    require_nonempty(step, "channel", &channel)?;
    require_nonempty(step, "text", &text)?;

    let body = serde_json::to_string(&json!({"channel": channel, "text": text}))?;
    let req = HttpRequest::post("https://slack.com/api/chat.postMessage", body)
        .header("Authorization", format!("Bearer {}", token.expose_secret()))
        .header("Content-Type", "application/json");

    let resp = http_call(sb, &req, flatten_slack_error)?;
    let parsed: Value = resp.json().unwrap_or(Value::Null);
    if parsed["ok"] == json!(false) {
        return Err(Error::Http {
            status: resp.status,
            url: req.url.clone(),
            message: parsed["error"].as_str().unwrap_or("unknown_error").to_string(),
            body: resp.body,
        });
    }

    let mut updated = ctx.clone();
    set_path(
        &mut updated,
        "slack",
        json!({"channel": channel, "message_ts": parsed["ts"]}),
    );
    sb.log(
        LogLevel::Info,
        "slack.send_message.ok",
        json!({"step": step.function_name, "channel": channel}),
    );
    Ok(updated)
}

fn flatten_slack_error(body: &Value) -> Option<String> {
    body["error"].as_str().map(str::to_string)
}

// ---- shopify ---------------------------------------------------------------

fn shopify_create_order(sb: &mut Sandbox, step: &PlanStep, ctx: &Value) -> Result<Value> {
    let token = get_secret(
        &sb.store,
        &sb.clock,
        "SHOPIFY_ADMIN_TOKEN",
        &SecretOptions {
            connector_key: Some("shopify".to_string()),
            ..Default::default()
        },
    )?;
    let domain = shop_domain(sb, &step.node, ctx)?;

    let line_items = step
        .node
        .config
        .get("line_items")
        .map(|tv| render_template_value(tv, ctx))
        .unwrap_or(Value::Null);
    validate_line_items(step, &line_items)?;

    let email = optional_rendered_string(&step.node, "customer_email", ctx);
    if let Some(email) = &email {
        require_email(step, "customer_email", email)?;
    }

    let mut order = json!({"line_items": line_items});
    if let Some(email) = &email {
        order["email"] = json!(email);
    }

    let body = serde_json::to_string(&json!({"order": order}))?;
    let url = format!(
        "https://{}/admin/api/{}/orders.json",
        domain, SHOPIFY_API_VERSION
    );
    let req = HttpRequest::post(url, body)
        .header("X-Shopify-Access-Token", token.expose_secret())
        .header("Content-Type", "application/json");

    let resp = http_call(sb, &req, flatten_shopify_error)?;
    let parsed: Value = resp.json().unwrap_or(Value::Null);

    let mut updated = ctx.clone();
    set_path(
        &mut updated,
        "shopify",
        json!({"order": {"id": parsed["order"]["id"], "name": parsed["order"]["name"]}}),
    );
    sb.log(
        LogLevel::Info,
        "shopify.create_order.ok",
        json!({"step": step.function_name, "order_id": parsed["order"]["id"]}),
    );
    Ok(updated)
}

/// Each line item needs a variant id, or a title with a price
fn validate_line_items(step: &PlanStep, line_items: &Value) -> Result<()> {
    let items = match line_items.as_array() {
        Some(items) if !items.is_empty() => items,
        _ => {
            return Err(validation(step, "line_items", "must be a non-empty array"));
        }
    };

    for (i, item) in items.iter().enumerate() {
        let has_variant = !item["variant_id"].is_null() && item["variant_id"] != json!("");
        let has_title = item["title"].as_str().is_some_and(|t| !t.is_empty());
        let has_price = match &item["price"] {
            Value::Number(_) => true,
            Value::String(s) => s.parse::<f64>().is_ok(),
            _ => false,
        };
        if !has_variant && !(has_title && has_price) {
            return Err(validation(
                step,
                &format!("line_items[{}]", i),
                "needs a variant_id, or a title with a price",
            ));
        }
    }
    Ok(())
}

fn shop_domain(sb: &Sandbox, node: &Node, ctx: &Value) -> Result<String> {
    if let Some(domain) = optional_rendered_string_node(node, "shop_domain", ctx) {
        return Ok(domain);
    }
    let secret = get_secret(
        &sb.store,
        &sb.clock,
        "SHOPIFY_SHOP_DOMAIN",
        &SecretOptions {
            aliases: vec!["SHOPIFY_STORE_DOMAIN".to_string()],
            ..Default::default()
        },
    )?;
    Ok(secret.expose_secret().to_string())
}

fn flatten_shopify_error(body: &Value) -> Option<String> {
    match &body["errors"] {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(field, msgs)| format!("{}: {}", field, flatten_error_value(msgs)))
                .collect();
            Some(parts.join("; "))
        }
        _ => None,
    }
}

fn flatten_error_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(flatten_error_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn poll_shopify_orders(
    sb: &mut Sandbox,
    step: &PlanStep,
    entry: &TriggerEntry,
) -> Result<Vec<Value>> {
    let creds = (|| -> Result<(String, String)> {
        let token = get_secret(
            &sb.store,
            &sb.clock,
            "SHOPIFY_ADMIN_TOKEN",
            &SecretOptions {
                connector_key: Some("shopify".to_string()),
                ..Default::default()
            },
        )?;
        let domain = shop_domain(sb, &step.node, &Value::Null)?;
        Ok((token.expose_secret().to_string(), domain))
    })();

    let (token, domain) = match creds {
        Ok(pair) => pair,
        Err(err) if is_skippable_auth_failure(&err) => {
            sb.log(
                LogLevel::Warn,
                "shopify.new_order.skipped",
                json!({"step": step.function_name, "reason": err.to_string()}),
            );
            return Ok(vec![]);
        }
        Err(err) => return Err(err),
    };

    let cursor_key = format!("__poll_cursor_v1:{}", entry.trigger_key);
    let cursor: Value = sb
        .store
        .get(&cursor_key)
        .and_then(|doc| serde_json::from_str(&doc).ok())
        .unwrap_or(json!({"updated_at_min": null, "seen": []}));

    let mut url = format!(
        "https://{}/admin/api/{}/orders.json?status=any&limit=50",
        domain, SHOPIFY_API_VERSION
    );
    if let Some(min) = cursor["updated_at_min"].as_str() {
        url.push_str("&updated_at_min=");
        url.push_str(min);
    }

    let req = HttpRequest::get(url).header("X-Shopify-Access-Token", token);
    let resp = http_call(sb, &req, flatten_shopify_error)?;
    let parsed: Value = resp.json().unwrap_or(Value::Null);
    let orders = parsed["orders"].as_array().cloned().unwrap_or_default();

    let seen: Vec<String> = cursor["seen"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let mut contexts = Vec::new();
    let mut new_seen = seen.clone();
    let mut max_updated: Option<String> = cursor["updated_at_min"].as_str().map(str::to_string);

    for order in &orders {
        let id = order_id_string(order);
        if let Some(updated_at) = order["updated_at"].as_str() {
            if max_updated.as_deref().is_none_or(|m| updated_at > m) {
                max_updated = Some(updated_at.to_string());
            }
        }
        if seen.contains(&id) {
            continue;
        }
        new_seen.push(id);
        contexts.push(json!({"shopify": {"order": order}}));
    }

    // Cap the dedup window; the advancing cursor bounds what can reappear.
    if new_seen.len() > 200 {
        new_seen.drain(..new_seen.len() - 200);
    }
    sb.store.set(
        &cursor_key,
        &serde_json::to_string(&json!({"updated_at_min": max_updated, "seen": new_seen}))?,
    );

    sb.log(
        LogLevel::Info,
        "shopify.new_order.polled",
        json!({"step": step.function_name, "fetched": orders.len(), "new": contexts.len()}),
    );
    Ok(contexts)
}

fn order_id_string(order: &Value) -> String {
    match &order["id"] {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---- stripe ----------------------------------------------------------------

fn stripe_create_payment(sb: &mut Sandbox, step: &PlanStep, ctx: &Value) -> Result<Value> {
    let key = get_secret(
        &sb.store,
        &sb.clock,
        "STRIPE_SECRET_KEY",
        &SecretOptions {
            connector_key: Some("stripe".to_string()),
            ..Default::default()
        },
    )?;

    let amount = rendered_string(&step.node, "amount", ctx);
    let currency = rendered_string(&step.node, "currency", ctx).to_lowercase();
    let description = optional_rendered_string(&step.node, "description", ctx);
    let receipt_email = optional_rendered_string(&step.node, "receipt_email", ctx);

    let amount_minor = amount.parse::<u64>().map_err(|_| {
        validation(
            step,
            "amount",
            "must be a positive integer in minor currency units",
        )
    })?;
    if amount_minor == 0 {
        return Err(validation(step, "amount", "must be greater than zero"));
    }
    if !CURRENCIES.contains(&currency.as_str()) {
        return Err(validation(
            step,
            "currency",
            &format!("'{}' is not a supported ISO 4217 code", currency),
        ));
    }
    if let Some(email) = &receipt_email {
        require_email(step, "receipt_email", email)?;
    }

    let mut pairs: Vec<(&str, String)> = vec![
        ("amount", amount_minor.to_string()),
        ("currency", currency.clone()),
    ];
    if let Some(description) = &description {
        pairs.push(("description", description.clone()));
    }
    if let Some(email) = &receipt_email {
        pairs.push(("receipt_email", email.clone()));
    }
    let body = form_encode(&pairs);

    let idempotency = idempotency_key(&sb.workflow_id, &step.function_name, &body);
    let req = HttpRequest::post("https://api.stripe.com/v1/payment_intents", body)
        .header("Authorization", format!("Bearer {}", key.expose_secret()))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("Idempotency-Key", idempotency);

    let resp = http_call(sb, &req, flatten_stripe_error)?;
    let parsed: Value = resp.json().unwrap_or(Value::Null);

    let mut updated = ctx.clone();
    set_path(
        &mut updated,
        "stripe",
        json!({"payment_intent": {"id": parsed["id"], "status": parsed["status"]}}),
    );
    sb.log(
        LogLevel::Info,
        "stripe.create_payment.ok",
        json!({"step": step.function_name, "payment_intent_id": parsed["id"]}),
    );
    Ok(updated)
}

fn flatten_stripe_error(body: &Value) -> Option<String> {
    body["error"]["message"].as_str().map(str::to_string)
}

/// Deterministic idempotency identifier from workflow, step, and payload
pub fn idempotency_key(workflow_id: &str, step: &str, payload: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(workflow_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(step.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn form_encode(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

// ---- shared helpers --------------------------------------------------------

/// Issue a request through the rate-limit-aware retry wrapper
fn http_call(
    sb: &mut Sandbox,
    req: &HttpRequest,
    flatten: fn(&Value) -> Option<String>,
) -> Result<HttpResponse> {
    let Sandbox {
        transport, clock, ..
    } = sb;

    rate_limit_aware(clock, &RetryOptions::default(), None, |_attempt| {
        match transport.fetch(req) {
            Ok(resp) if resp.status < 400 => Ok(resp),
            Ok(resp) => {
                let message = resp
                    .json()
                    .ok()
                    .and_then(|body| flatten(&body))
                    .unwrap_or_else(|| format!("HTTP {}", resp.status));
                Err(AttemptFailure {
                    status: Some(resp.status),
                    headers: resp.headers.clone(),
                    body: resp.body.clone(),
                    url: req.url.clone(),
                    message,
                })
            }
            Err(message) => Err(AttemptFailure::network(req.url.clone(), message)),
        }
    })
}

fn schedule_config(node: &Node) -> Result<TimeTriggerConfig> {
    let unit = match node.config.get("unit").and_then(TemplateValue::as_str) {
        None | Some("minutes") => crate::host::IntervalUnit::Minutes,
        Some("hours") => crate::host::IntervalUnit::Hours,
        Some("days") => crate::host::IntervalUnit::Days,
        Some(other) => {
            return Err(Error::Trigger {
                message: format!("unknown schedule unit '{}'", other),
            });
        }
    };
    Ok(TimeTriggerConfig {
        every: Some(cfg_u32(node, "every").unwrap_or(15)),
        unit: Some(unit),
        at_hour: cfg_u32(node, "at_hour").map(|h| h as u8),
        ..Default::default()
    })
}

fn cfg_u32(node: &Node, key: &str) -> Option<u32> {
    match node.config.get(key)? {
        TemplateValue::Number(n) => n.as_u64().map(|v| v as u32),
        TemplateValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn rendered_string(node: &Node, key: &str, ctx: &Value) -> String {
    optional_rendered_string_node(node, key, ctx).unwrap_or_default()
}

fn optional_rendered_string(node: &Node, key: &str, ctx: &Value) -> Option<String> {
    optional_rendered_string_node(node, key, ctx)
}

fn optional_rendered_string_node(node: &Node, key: &str, ctx: &Value) -> Option<String> {
    let tv = node.config.get(key)?;
    match render_template_value(tv, ctx) {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn require_nonempty(step: &PlanStep, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(validation(step, field, "is required"));
    }
    Ok(())
}

fn require_email(step: &PlanStep, field: &str, value: &str) -> Result<()> {
    if !EMAIL_RE.is_match(value) {
        return Err(validation(
            step,
            field,
            &format!("'{}' is not a valid e-mail address", value),
        ));
    }
    Ok(())
}

fn validation(step: &PlanStep, field: &str, message: &str) -> Error {
    Error::Validation {
        step: step.function_name.clone(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn event_prefix(node: &Node) -> String {
    format!("{}.{}", node.app, node.operation)
}

fn set_path(ctx: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = ctx {
        match map.get_mut(key) {
            Some(Value::Object(existing)) => {
                if let Value::Object(new_fields) = value {
                    for (k, v) in new_fields {
                        existing.insert(k, v);
                    }
                }
            }
            _ => {
                map.insert(key.to_string(), value);
            }
        }
    }
}
