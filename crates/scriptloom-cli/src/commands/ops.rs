//! List supported operations

use anyhow::Result;
use scriptloom_codegen::BuilderRegistry;
use scriptloom_core::OperationCatalog;

/// Run the ops command
pub fn run() -> Result<()> {
    let registry = BuilderRegistry::builtin();

    for key in registry.keys() {
        println!("{}", key);
        if let Some(caps) = registry.capabilities(key) {
            for scope in &caps.oauth_scopes {
                println!("  scope: {}", scope);
            }
            for service in &caps.advanced_services {
                println!("  service: {}", service);
            }
        }
    }

    Ok(())
}
