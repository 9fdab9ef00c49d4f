//! Operation builder registry
//!
//! One pure text-generating function per supported (connector, operation)
//! pair, registered under `"<kind>.<app>:<operation>"`. Builders share no
//! mutable state and are independently snapshot-testable with an empty or
//! partial config; calling one twice with the same config yields
//! byte-identical source.

mod schedule;
mod shopify;
mod slack;
mod stripe;

use std::collections::BTreeMap;

use scriptloom_core::{Capabilities, Node, OperationCatalog};

use crate::error::{Error, Result};

/// Host OAuth scope for outbound HTTP
pub const SCOPE_EXTERNAL_REQUEST: &str = "https://www.googleapis.com/auth/script.external_request";

/// Host OAuth scope for trigger management
pub const SCOPE_SCRIPT_APP: &str = "https://www.googleapis.com/auth/script.scriptapp";

/// Everything a builder may reference while emitting a step function
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Workflow id (idempotency derivation, trigger keys)
    pub workflow_id: &'a str,

    /// The node being compiled
    pub node: &'a Node,

    /// Name of the function to emit
    pub function_name: &'a str,

    /// Trigger registry key; present only for trigger nodes
    pub trigger_key: Option<&'a str>,

    /// Generated handler function name; present only for trigger nodes
    pub handler_name: Option<&'a str>,
}

/// A pure function from build context to generated source text
pub type BuildFn = fn(&BuildContext<'_>) -> String;

/// One registered operation: key, capability declarations, builder
pub struct OperationBuilder {
    /// Registry key, `"<kind>.<app>:<operation>"`
    pub key: &'static str,

    /// Scopes and advanced services the emitted code needs
    pub capabilities: Capabilities,

    /// The text-generating function
    pub build: BuildFn,
}

/// The catalog of supported operations
pub struct BuilderRegistry {
    builders: BTreeMap<&'static str, OperationBuilder>,
}

impl BuilderRegistry {
    /// The built-in operation set
    pub fn builtin() -> Self {
        let mut registry = Self {
            builders: BTreeMap::new(),
        };
        registry.register(OperationBuilder {
            key: "trigger.schedule:interval",
            capabilities: Capabilities {
                oauth_scopes: vec![SCOPE_SCRIPT_APP.to_string()],
                advanced_services: vec![],
            },
            build: schedule::build_interval_trigger,
        });
        registry.register(OperationBuilder {
            key: "trigger.shopify:new_order",
            capabilities: Capabilities {
                oauth_scopes: vec![
                    SCOPE_SCRIPT_APP.to_string(),
                    SCOPE_EXTERNAL_REQUEST.to_string(),
                ],
                advanced_services: vec![],
            },
            build: shopify::build_new_order_trigger,
        });
        registry.register(OperationBuilder {
            key: "action.slack:send_message",
            capabilities: Capabilities {
                oauth_scopes: vec![SCOPE_EXTERNAL_REQUEST.to_string()],
                advanced_services: vec![],
            },
            build: slack::build_send_message,
        });
        registry.register(OperationBuilder {
            key: "action.shopify:create_order",
            capabilities: Capabilities {
                oauth_scopes: vec![SCOPE_EXTERNAL_REQUEST.to_string()],
                advanced_services: vec![],
            },
            build: shopify::build_create_order,
        });
        registry.register(OperationBuilder {
            key: "action.stripe:create_payment",
            capabilities: Capabilities {
                oauth_scopes: vec![SCOPE_EXTERNAL_REQUEST.to_string()],
                advanced_services: vec![],
            },
            build: stripe::build_create_payment,
        });
        registry
    }

    fn register(&mut self, builder: OperationBuilder) {
        self.builders.insert(builder.key, builder);
    }

    /// Look up a builder by key
    pub fn get(&self, key: &str) -> Option<&OperationBuilder> {
        self.builders.get(key)
    }

    /// Every registered key, sorted
    pub fn keys(&self) -> Vec<&'static str> {
        self.builders.keys().copied().collect()
    }

    /// Emit the source for one step
    pub fn build_step(&self, ctx: &BuildContext<'_>) -> Result<String> {
        let key = ctx.node.operation_key();
        let builder = self.get(&key).ok_or_else(|| Error::UnknownOperation {
            key: key.clone(),
        })?;
        Ok((builder.build)(ctx))
    }
}

impl OperationCatalog for BuilderRegistry {
    fn supports(&self, key: &str) -> bool {
        self.builders.contains_key(key)
    }

    fn capabilities(&self, key: &str) -> Option<Capabilities> {
        self.get(key).map(|b| b.capabilities.clone())
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
