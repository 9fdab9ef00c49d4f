//! Shopify trigger and action codegen

use crate::builders::BuildContext;
use crate::builders::schedule::config_number;
use crate::emit::{js_str, js_template_expr};

const API_VERSION: &str = "2024-01";

/// Emit the install/fire pair for `trigger.shopify:new_order`
///
/// A polling trigger: a time-driven host trigger fires the poll, which
/// reads an `updated_at_min` cursor from the property store, dedups by
/// order id, advances the cursor, and starts one run per new order.
pub(crate) fn build_new_order_trigger(ctx: &BuildContext<'_>) -> String {
    let key = ctx.trigger_key.unwrap_or("");
    let handler = ctx.handler_name.unwrap_or("");
    let poll_minutes = config_number(ctx, "poll_minutes").unwrap_or(5);
    let description = format!("trigger.shopify:new_order ({})", ctx.node.id);

    let mut code = String::new();
    code.push_str(&format!(
        "function {name}_install() {{\n  return __ensureTrigger({key}, {handler}, 'time', function () {{\n    return __buildTimeTrigger({{ handler: {handler}, every: {poll}, unit: 'minutes' }});\n  }}, {desc});\n}}\n\n",
        name = ctx.function_name,
        key = js_str(key),
        handler = js_str(handler),
        poll = poll_minutes,
        desc = js_str(&description),
    ));

    code.push_str(&format!(
        "function {name}_fire(e) {{\n  var step = {step};\n",
        name = ctx.function_name,
        step = js_str(ctx.function_name),
    ));
    code.push_str(
        "  var token;\n  var domain;\n  try {\n    token = __getSecret('SHOPIFY_ADMIN_TOKEN', { connectorKey: 'shopify' });\n",
    );
    code.push_str(&format!("    domain = {};\n", domain_expr(ctx)));
    code.push_str(
        "  } catch (err) {\n    if (err && err.name === 'MissingSecretError') {\n      __log('warn', 'shopify.new_order.skipped', { step: step, reason: String(err && err.message) });\n      return [];\n    }\n    throw err;\n  }\n",
    );
    code.push_str(&format!(
        "  var props = PropertiesService.getScriptProperties();\n  var cursorKey = {};\n",
        js_str(&format!("__poll_cursor_v1:{}", key)),
    ));
    code.push_str(
        "  var cursor = { updated_at_min: null, seen: [] };\n  var cursorDoc = props.getProperty(cursorKey);\n  if (cursorDoc !== null) {\n    try { cursor = JSON.parse(cursorDoc) || cursor; } catch (e2) {}\n  }\n",
    );
    code.push_str(&format!(
        "  var url = 'https://' + domain + '/admin/api/{}/orders.json?status=any&limit=50';\n",
        API_VERSION,
    ));
    code.push_str(
        "  if (cursor.updated_at_min) { url = url + '&updated_at_min=' + cursor.updated_at_min; }\n",
    );
    code.push_str(
        "  var response = __rateLimitAware(function (attempt) {\n    return __fetch('get', url, { 'X-Shopify-Access-Token': token });\n  }, { attempts: 3 });\n",
    );
    code.push_str(
        "  var parsed = {};\n  try { parsed = JSON.parse(response.body) || {}; } catch (e3) { parsed = {}; }\n  var orders = parsed.orders || [];\n  var seen = cursor.seen || [];\n  var newSeen = seen.slice();\n  var maxUpdated = cursor.updated_at_min || null;\n  var runs = [];\n",
    );
    code.push_str(
        "  for (var i = 0; i < orders.length; i++) {\n    var order = orders[i];\n    var id = String(order.id);\n    if (order.updated_at && (maxUpdated === null || order.updated_at > maxUpdated)) {\n      maxUpdated = order.updated_at;\n    }\n    if (seen.indexOf(id) !== -1) { continue; }\n    newSeen.push(id);\n    runs.push({ shopify: { order: order } });\n  }\n",
    );
    code.push_str(
        "  if (newSeen.length > 200) { newSeen = newSeen.slice(newSeen.length - 200); }\n  props.setProperty(cursorKey, JSON.stringify({ updated_at_min: maxUpdated, seen: newSeen }));\n  __log('info', 'shopify.new_order.polled', { step: step, fetched: orders.length, new: runs.length });\n  return runs;\n}\n",
    );
    code
}

/// Emit the step function for `action.shopify:create_order`
pub(crate) fn build_create_order(ctx: &BuildContext<'_>) -> String {
    let line_items = ctx
        .node
        .config
        .get("line_items")
        .map(js_template_expr)
        .unwrap_or_else(|| "null".to_string());
    let email = ctx.node.config.get("customer_email").map(js_template_expr);

    let mut code = String::new();
    code.push_str(&format!(
        "function {name}(ctx) {{\n  var step = {step};\n",
        name = ctx.function_name,
        step = js_str(ctx.function_name),
    ));
    code.push_str(
        "  var token;\n  var domain;\n  try {\n    token = __getSecret('SHOPIFY_ADMIN_TOKEN', { connectorKey: 'shopify' });\n",
    );
    code.push_str(&format!("    domain = {};\n", domain_expr(ctx)));
    code.push_str(
        "  } catch (err) {\n    if (err && err.name === 'MissingSecretError') {\n      __log('warn', 'shopify.create_order.skipped', { step: step, reason: String(err && err.message) });\n      return ctx;\n    }\n    throw err;\n  }\n",
    );
    code.push_str("  try {\n");
    code.push_str(&format!("    var lineItems = {};\n", line_items));
    code.push_str(
        "    if (!Array.isArray(lineItems) || lineItems.length === 0) {\n      throw __validationError(step, 'line_items', 'must be a non-empty array');\n    }\n    for (var i = 0; i < lineItems.length; i++) {\n      var item = lineItems[i] || {};\n      var hasVariant = item.variant_id !== undefined && item.variant_id !== null && item.variant_id !== '';\n      var hasTitle = typeof item.title === 'string' && item.title !== '';\n      var hasPrice = typeof item.price === 'number' ||\n        (typeof item.price === 'string' && item.price !== '' && !isNaN(Number(item.price)));\n      if (!hasVariant && !(hasTitle && hasPrice)) {\n        throw __validationError(step, 'line_items[' + i + ']', 'needs a variant_id, or a title with a price');\n      }\n    }\n",
    );
    if let Some(email) = &email {
        code.push_str(&format!("    var email = {};\n", email));
        code.push_str(
            "    if (email && !/^[^@\\s]+@[^@\\s]+\\.[^@\\s]+$/.test(String(email))) {\n      throw __validationError(step, 'customer_email', String(email) + ' is not a valid e-mail address');\n    }\n",
        );
        code.push_str("    var order = { line_items: lineItems };\n    if (email) { order.email = email; }\n");
    } else {
        code.push_str("    var order = { line_items: lineItems };\n");
    }
    code.push_str(&format!(
        "    var response = __rateLimitAware(function (attempt) {{\n      return __fetch('post', 'https://' + domain + '/admin/api/{}/orders.json', {{\n        'X-Shopify-Access-Token': token,\n        'Content-Type': 'application/json'\n      }}, JSON.stringify({{ order: order }}));\n    }}, {{ attempts: 3 }});\n",
        API_VERSION,
    ));
    code.push_str(
        "    var body = {};\n    try { body = JSON.parse(response.body) || {}; } catch (e) { body = {}; }\n    var created = body.order || {};\n    ctx.shopify = ctx.shopify || {};\n    ctx.shopify.order = { id: created.id, name: created.name };\n    __log('info', 'shopify.create_order.ok', { step: step, order_id: created.id });\n    return ctx;\n",
    );
    code.push_str(
        "  } catch (err) {\n    __log('error', 'shopify.create_order.failed', { step: step, error: String(err && err.message) });\n    throw err;\n  }\n}\n",
    );
    code
}

/// Shop domain: an explicit config value wins, else the property store
fn domain_expr(ctx: &BuildContext<'_>) -> String {
    match ctx.node.config.get("shop_domain") {
        Some(tv) => js_template_expr(tv),
        None => "__getSecret('SHOPIFY_SHOP_DOMAIN', { aliases: ['SHOPIFY_STORE_DOMAIN'] })"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::{action_ctx, node, trigger_ctx};
    use scriptloom_core::{NodeKind, TemplateValue};

    #[test]
    fn test_new_order_trigger_persists_cursor() {
        let n = node("t1", NodeKind::Trigger, "shopify", "new_order", &[]);
        let ctx = trigger_ctx(&n, "step_0_t1");
        let code = build_new_order_trigger(&ctx);

        assert!(code.contains("function step_0_t1_install()"));
        assert!(code.contains("function step_0_t1_fire(e)"));
        assert!(code.contains(r#""__poll_cursor_v1:wf-test:t1""#));
        assert!(code.contains("updated_at_min"));
        assert!(code.contains("every: 5, unit: 'minutes'"));
        assert!(code.contains("seen.indexOf(id)"));
    }

    #[test]
    fn test_create_order_validates_line_items_before_fetch() {
        let n = node(
            "a1",
            NodeKind::Action,
            "shopify",
            "create_order",
            &[(
                "line_items",
                TemplateValue::Array(vec![TemplateValue::Object(
                    [(
                        "variant_id".to_string(),
                        TemplateValue::String("{{shopify.order.variant}}".to_string()),
                    )]
                    .into_iter()
                    .collect(),
                )]),
            )],
        );
        let ctx = action_ctx(&n, "step_1_a1");
        let code = build_create_order(&ctx);

        let validate_pos = code.find("__validationError(step, 'line_items'").unwrap();
        let fetch_pos = code.find("__fetch('post'").unwrap();
        assert!(validate_pos < fetch_pos);
        assert!(code.contains("needs a variant_id, or a title with a price"));
        assert!(code.contains(r#"__interpolate("{{shopify.order.variant}}", ctx)"#));
    }

    #[test]
    fn test_create_order_email_validation_present_only_when_configured() {
        let without = node("a1", NodeKind::Action, "shopify", "create_order", &[]);
        let ctx = action_ctx(&without, "step_1_a1");
        assert!(!build_create_order(&ctx).contains("customer_email"));

        let with = node(
            "a1",
            NodeKind::Action,
            "shopify",
            "create_order",
            &[(
                "customer_email",
                TemplateValue::String("{{customer.email}}".to_string()),
            )],
        );
        let ctx = action_ctx(&with, "step_1_a1");
        let code = build_create_order(&ctx);
        assert!(code.contains("customer_email"));
        assert!(code.contains("is not a valid e-mail address"));
    }

    #[test]
    fn test_explicit_shop_domain_skips_secret_lookup() {
        let n = node(
            "a1",
            NodeKind::Action,
            "shopify",
            "create_order",
            &[(
                "shop_domain",
                TemplateValue::String("example.myshopify.com".to_string()),
            )],
        );
        let ctx = action_ctx(&n, "step_1_a1");
        let code = build_create_order(&ctx);
        assert!(code.contains(r#"domain = "example.myshopify.com";"#));
        assert!(!code.contains("SHOPIFY_SHOP_DOMAIN"));
    }
}
