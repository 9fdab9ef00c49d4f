//! Time-driven trigger codegen

use scriptloom_core::TemplateValue;

use crate::builders::BuildContext;
use crate::emit::js_str;

/// Emit the install/fire pair for `trigger.schedule:interval`
///
/// The install function goes through the trigger registry ensure-path so
/// recompiles never duplicate the host trigger; the fire function starts
/// exactly one run with an empty context.
pub(crate) fn build_interval_trigger(ctx: &BuildContext<'_>) -> String {
    let key = ctx.trigger_key.unwrap_or("");
    let handler = ctx.handler_name.unwrap_or("");
    let every = config_number(ctx, "every").unwrap_or(15);
    let unit = match ctx.node.config.get("unit").and_then(TemplateValue::as_str) {
        Some("hours") => "hours",
        Some("days") => "days",
        _ => "minutes",
    };
    let description = format!("trigger.schedule:interval ({})", ctx.node.id);

    let mut trigger_config = format!(
        "{{ handler: {handler}, every: {every}, unit: {unit} }}",
        handler = js_str(handler),
        every = every,
        unit = js_str(unit),
    );
    if let Some(at_hour) = config_number(ctx, "at_hour") {
        trigger_config = format!(
            "{{ handler: {handler}, every: {every}, unit: {unit}, atHour: {at_hour} }}",
            handler = js_str(handler),
            every = every,
            unit = js_str(unit),
            at_hour = at_hour,
        );
    }

    let mut code = String::new();
    code.push_str(&format!(
        "function {name}_install() {{\n  return __ensureTrigger({key}, {handler}, 'time', function () {{\n    return __buildTimeTrigger({config});\n  }}, {desc});\n}}\n\n",
        name = ctx.function_name,
        key = js_str(key),
        handler = js_str(handler),
        config = trigger_config,
        desc = js_str(&description),
    ));
    code.push_str(&format!(
        "function {name}_fire(e) {{\n  return [{{ trigger: {{ kind: 'schedule', key: {key}, fired_at: Date.now() }} }}];\n}}\n",
        name = ctx.function_name,
        key = js_str(key),
    ));
    code
}

pub(crate) fn config_number(ctx: &BuildContext<'_>, key: &str) -> Option<u64> {
    match ctx.node.config.get(key)? {
        TemplateValue::Number(n) => n.as_u64(),
        TemplateValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::testing::{node, trigger_ctx};
    use scriptloom_core::NodeKind;

    #[test]
    fn test_interval_trigger_emits_install_and_fire() {
        let n = node(
            "t1",
            NodeKind::Trigger,
            "schedule",
            "interval",
            &[
                ("every", TemplateValue::Number(serde_json::Number::from(30))),
                ("unit", TemplateValue::String("minutes".to_string())),
            ],
        );
        let ctx = trigger_ctx(&n, "step_0_t1");
        let code = build_interval_trigger(&ctx);

        assert!(code.contains("function step_0_t1_install()"));
        assert!(code.contains("function step_0_t1_fire(e)"));
        assert!(code.contains(r#"__ensureTrigger("wf-test:t1", "run_step_0_t1", 'time'"#));
        assert!(code.contains("every: 30"));
        assert!(code.contains(r#"unit: "minutes""#));
    }

    #[test]
    fn test_daily_anchor_hour() {
        let n = node(
            "t1",
            NodeKind::Trigger,
            "schedule",
            "interval",
            &[
                ("every", TemplateValue::Number(serde_json::Number::from(1))),
                ("unit", TemplateValue::String("days".to_string())),
                ("at_hour", TemplateValue::Number(serde_json::Number::from(6))),
            ],
        );
        let ctx = trigger_ctx(&n, "step_0_t1");
        let code = build_interval_trigger(&ctx);
        assert!(code.contains("atHour: 6"));
        assert!(code.contains(r#"unit: "days""#));
    }

    #[test]
    fn test_defaults_apply_with_empty_config() {
        let n = node("t1", NodeKind::Trigger, "schedule", "interval", &[]);
        let ctx = trigger_ctx(&n, "step_0_t1");
        let code = build_interval_trigger(&ctx);
        assert!(code.contains("every: 15"));
        assert!(code.contains(r#"unit: "minutes""#));
    }
}
