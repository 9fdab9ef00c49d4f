//! Stripe action codegen

use crate::builders::BuildContext;
use crate::emit::{js_str, js_template_expr};

/// Currencies the payment validator accepts, kept in lockstep with the
/// runtime crate's list
const CURRENCIES: &[&str] = &[
    "aud", "brl", "cad", "chf", "czk", "dkk", "eur", "gbp", "hkd", "inr", "jpy", "mxn", "nok",
    "nzd", "pln", "sek", "sgd", "usd",
];

/// Emit the step function for `action.stripe:create_payment`
///
/// Form-encoded body, deterministic idempotency key derived from
/// workflow, step, and payload, amount in integer minor units.
pub(crate) fn build_create_payment(ctx: &BuildContext<'_>) -> String {
    let amount = config_expr(ctx, "amount");
    let currency = config_expr(ctx, "currency");
    let description = ctx.node.config.get("description").map(js_template_expr);
    let receipt_email = ctx.node.config.get("receipt_email").map(js_template_expr);

    let currency_list = CURRENCIES
        .iter()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut code = String::new();
    code.push_str(&format!(
        "function {name}(ctx) {{\n  var step = {step};\n",
        name = ctx.function_name,
        step = js_str(ctx.function_name),
    ));
    code.push_str(
        "  var apiKey;\n  try {\n    apiKey = __getSecret('STRIPE_SECRET_KEY', { connectorKey: 'stripe' });\n  } catch (err) {\n    if (err && err.name === 'MissingSecretError') {\n      __log('warn', 'stripe.create_payment.skipped', { step: step, reason: String(err && err.message) });\n      return ctx;\n    }\n    throw err;\n  }\n",
    );
    code.push_str("  try {\n");
    code.push_str(&format!("    var amountText = String({}).trim();\n", amount));
    code.push_str(&format!(
        "    var currency = String({}).toLowerCase();\n",
        currency
    ));
    code.push_str(
        "    if (!/^[0-9]+$/.test(amountText)) {\n      throw __validationError(step, 'amount', 'must be a positive integer in minor currency units');\n    }\n    var amount = parseInt(amountText, 10);\n    if (amount === 0) {\n      throw __validationError(step, 'amount', 'must be greater than zero');\n    }\n",
    );
    code.push_str(&format!(
        "    if ([{list}].indexOf(currency) === -1) {{\n      throw __validationError(step, 'currency', currency + ' is not a supported ISO 4217 code');\n    }}\n",
        list = currency_list,
    ));
    code.push_str("    var pairs = [];\n    pairs.push('amount=' + encodeURIComponent(amountText));\n    pairs.push('currency=' + encodeURIComponent(currency));\n");
    if let Some(description) = &description {
        code.push_str(&format!("    var description = {};\n", description));
        code.push_str(
            "    if (description) { pairs.push('description=' + encodeURIComponent(description)); }\n",
        );
    }
    if let Some(receipt_email) = &receipt_email {
        code.push_str(&format!("    var receiptEmail = {};\n", receipt_email));
        code.push_str(
            "    if (receiptEmail && !/^[^@\\s]+@[^@\\s]+\\.[^@\\s]+$/.test(String(receiptEmail))) {\n      throw __validationError(step, 'receipt_email', String(receiptEmail) + ' is not a valid e-mail address');\n    }\n    if (receiptEmail) { pairs.push('receipt_email=' + encodeURIComponent(receiptEmail)); }\n",
        );
    }
    code.push_str("    var payload = pairs.join('&');\n");
    code.push_str(&format!(
        "    var idempotencyKey = __idempotencyKey({workflow}, step, payload);\n",
        workflow = js_str(ctx.workflow_id),
    ));
    code.push_str(
        "    var response = __rateLimitAware(function (attempt) {\n      return __fetch('post', 'https://api.stripe.com/v1/payment_intents', {\n        'Authorization': 'Bearer ' + apiKey,\n        'Content-Type': 'application/x-www-form-urlencoded',\n        'Idempotency-Key': idempotencyKey\n      }, payload);\n    }, { attempts: 3 });\n",
    );
    code.push_str(
        "    var body = {};\n    try { body = JSON.parse(response.body) || {}; } catch (e) { body = {}; }\n    ctx.stripe = ctx.stripe || {};\n    ctx.stripe.payment_intent = { id: body.id, status: body.status };\n    __log('info', 'stripe.create_payment.ok', { step: step, payment_intent_id: body.id });\n    return ctx;\n",
    );
    code.push_str(
        "  } catch (err) {\n    __log('error', 'stripe.create_payment.failed', { step: step, error: String(err && err.message) });\n    throw err;\n  }\n}\n",
    );
    code
}

fn config_expr(ctx: &BuildContext<'_>, key: &str) -> String {
    ctx.node
        .config
        .get(key)
        .map(js_template_expr)
        .unwrap_or_else(|| js_str(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::{action_ctx, node};
    use scriptloom_core::{NodeKind, TemplateValue};

    fn payment_node() -> scriptloom_core::Node {
        node(
            "a1",
            NodeKind::Action,
            "stripe",
            "create_payment",
            &[
                (
                    "amount",
                    TemplateValue::Number(serde_json::Number::from(2000)),
                ),
                ("currency", TemplateValue::String("usd".to_string())),
                (
                    "receipt_email",
                    TemplateValue::String("{{customer.email}}".to_string()),
                ),
            ],
        )
    }

    #[test]
    fn test_create_payment_derives_idempotency_from_workflow_and_step() {
        let n = payment_node();
        let ctx = action_ctx(&n, "step_2_a1");
        let code = build_create_payment(&ctx);
        assert!(code.contains(r#"__idempotencyKey("wf-test", step, payload)"#));
        assert!(code.contains("'Idempotency-Key': idempotencyKey"));
    }

    #[test]
    fn test_validation_precedes_fetch() {
        let n = payment_node();
        let ctx = action_ctx(&n, "step_2_a1");
        let code = build_create_payment(&ctx);

        let amount_check = code.find("must be a positive integer").unwrap();
        let currency_check = code.find("is not a supported ISO 4217 code").unwrap();
        let fetch_pos = code.find("__fetch('post'").unwrap();
        assert!(amount_check < fetch_pos);
        assert!(currency_check < fetch_pos);
    }

    #[test]
    fn test_form_body_is_built_in_fixed_order() {
        let n = payment_node();
        let ctx = action_ctx(&n, "step_2_a1");
        let code = build_create_payment(&ctx);

        let amount_pos = code.find("pairs.push('amount=").unwrap();
        let currency_pos = code.find("pairs.push('currency=").unwrap();
        let email_pos = code.find("pairs.push('receipt_email=").unwrap();
        assert!(amount_pos < currency_pos);
        assert!(currency_pos < email_pos);
    }

    #[test]
    fn test_optional_fields_absent_when_unconfigured() {
        let n = node(
            "a1",
            NodeKind::Action,
            "stripe",
            "create_payment",
            &[
                (
                    "amount",
                    TemplateValue::Number(serde_json::Number::from(500)),
                ),
                ("currency", TemplateValue::String("eur".to_string())),
            ],
        );
        let ctx = action_ctx(&n, "step_2_a1");
        let code = build_create_payment(&ctx);
        assert!(!code.contains("receipt_email"));
        assert!(!code.contains("var description"));
    }
}
