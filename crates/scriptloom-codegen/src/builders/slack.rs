//! Slack action codegen

use scriptloom_core::TemplateValue;

use crate::builders::BuildContext;
use crate::emit::{js_str, js_template_expr};

/// Emit the step function for `action.slack:send_message`
pub(crate) fn build_send_message(ctx: &BuildContext<'_>) -> String {
    let channel = config_expr(ctx, "channel");
    let text = config_expr(ctx, "text");

    let mut code = String::new();
    code.push_str(&format!(
        "function {name}(ctx) {{\n  var step = {step};\n",
        name = ctx.function_name,
        step = js_str(ctx.function_name),
    ));
    code.push_str(
        "  var token;\n  try {\n    token = __requireOAuthToken('slack', { scopes: ['chat:write'] });\n  } catch (err) {\n    if (err && err.name === 'MissingSecretError') {\n      __log('warn', 'slack.send_message.skipped', { step: step, reason: String(err && err.message) });\n      return ctx;\n    }\n    throw err;\n  }\n",
    );
    code.push_str("  try {\n");
    code.push_str(&format!("    var channel = {};\n", channel));
    code.push_str(&format!("    var text = {};\n", text));
    code.push_str(
        "    if (!channel || String(channel).trim() === '') {\n      throw __validationError(step, 'channel', 'is required');\n    }\n    if (!text || String(text).trim() === '') {\n      throw __validationError(step, 'text', 'is required');\n    }\n",
    );
    code.push_str(
        "    var response = __rateLimitAware(function (attempt) {\n      return __fetch('post', 'https://slack.com/api/chat.postMessage', {\n        'Authorization': 'Bearer ' + token,\n        'Content-Type': 'application/json'\n      }, JSON.stringify({ channel: channel, text: text }));\n    }, { attempts: 3 });\n",
    );
    code.push_str(
        "    var body = {};\n    try { body = JSON.parse(response.body) || {}; } catch (e) { body = {}; }\n    if (body.ok === false) {\n      var apiErr = new Error('slack error: ' + (body.error || 'unknown_error'));\n      apiErr.status = response.status;\n      apiErr.body = response.body;\n      throw apiErr;\n    }\n",
    );
    code.push_str(
        "    ctx.slack = ctx.slack || {};\n    ctx.slack.channel = channel;\n    ctx.slack.message_ts = body.ts;\n    __log('info', 'slack.send_message.ok', { step: step, channel: channel });\n    return ctx;\n",
    );
    code.push_str(
        "  } catch (err) {\n    __log('error', 'slack.send_message.failed', { step: step, error: String(err && err.message) });\n    throw err;\n  }\n}\n",
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
