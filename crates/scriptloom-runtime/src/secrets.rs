//! Alias-aware secret resolution
//!
//! Secrets live in the host property store under connector-conventional
//! names. Resolution tries a deduplicated candidate list (requested name,
//! any redirect, built-in per-connector aliases, caller aliases) against
//! the store, then a bulk secret-export document, then a default. Values
//! carrying the sealed-token prefix are transparently decoded; decode
//! failures are fatal, never swallowed.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::host::{Clock, PropertyStore};
use crate::seal;

/// Property key of the bulk secret-export document (a JSON object)
pub const EXPORT_DOC_KEY: &str = "__secret_export_v1";

/// Built-in property-name aliases per connector; the first entry is the
/// connector's canonical OAuth property
static BUILTIN_ALIASES: Lazy<BTreeMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    let mut map: BTreeMap<&'static str, &'static [&'static str]> = BTreeMap::new();
    map.insert(
        "slack",
        &["SLACK_BOT_TOKEN", "SLACK_TOKEN", "SLACK_OAUTH_TOKEN"][..],
    );
    map.insert(
        "shopify",
        &[
            "SHOPIFY_ADMIN_TOKEN",
            "SHOPIFY_ACCESS_TOKEN",
            "SHOPIFY_API_PASSWORD",
        ][..],
    );
    map.insert("stripe", &["STRIPE_SECRET_KEY", "STRIPE_API_KEY"][..]);
    map
});

/// Built-in aliases for a connector, canonical property first
pub fn builtin_aliases(connector_key: &str) -> &'static [&'static str] {
    BUILTIN_ALIASES
        .get(connector_key)
        .copied()
        .unwrap_or_default()
}

/// Options for [`get_secret`]
#[derive(Debug, Clone, Default)]
pub struct SecretOptions {
    /// Connector whose built-in aliases to merge in
    pub connector_key: Option<String>,

    /// Caller aliases; these augment, never replace, the built-in set
    pub aliases: Vec<String>,

    /// Redirect: try this key right after the requested name
    pub map_to: Option<String>,

    /// Fallback value when nothing resolves
    pub default_value: Option<String>,

    /// Emit a debug log naming the key (never the value) that resolved
    pub log_resolved: bool,
}

/// Resolve a secret by name
///
/// Tries every candidate key against the property store in order, then
/// the bulk export document, then the default. Raises
/// [`Error::MissingSecret`] naming every tried key if nothing resolves.
pub fn get_secret(
    store: &dyn PropertyStore,
    clock: &dyn Clock,
    name: &str,
    opts: &SecretOptions,
) -> Result<SecretString> {
    let candidates = candidate_keys(name, opts);

    for key in &candidates {
        if let Some(value) = store.get(key) {
            return finish(clock, key, &value, opts);
        }
    }

    if let Some(doc) = store.get(EXPORT_DOC_KEY) {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&doc) {
            for key in &candidates {
                if let Some(value) = map.get(key.as_str()).and_then(|v| v.as_str()) {
                    return finish(clock, key, value, opts);
                }
            }
        }
    }

    if let Some(default) = &opts.default_value {
        return Ok(SecretString::from(default.clone()));
    }

    Err(Error::MissingSecret {
        name: name.to_string(),
        tried: candidates,
    })
}

/// Resolve a connector's canonical OAuth token
///
/// On failure the error is rewritten into an actionable message naming
/// the property, its aliases, and the required scopes.
pub fn require_oauth_token(
    store: &dyn PropertyStore,
    clock: &dyn Clock,
    connector_key: &str,
    scopes: &[&str],
) -> Result<SecretString> {
    let aliases = builtin_aliases(connector_key);
    let property = aliases
        .first()
        .copied()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_OAUTH_TOKEN", connector_key.to_ascii_uppercase()));

    let opts = SecretOptions {
        connector_key: Some(connector_key.to_string()),
        ..Default::default()
    };

    get_secret(store, clock, &property, &opts).map_err(|err| match err {
        Error::MissingSecret { .. } => Error::MissingOAuthToken {
            connector: connector_key.to_string(),
            property,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        },
        other => other,
    })
}

/// Build the deduplicated candidate-key list, in resolution order
fn candidate_keys(name: &str, opts: &SecretOptions) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |key: &str| {
        if !key.is_empty() && !candidates.iter().any(|c| c == key) {
            candidates.push(key.to_string());
        }
    };

    push(name);
    if let Some(redirect) = &opts.map_to {
        push(redirect);
    }
    if let Some(connector) = &opts.connector_key {
        for alias in builtin_aliases(connector) {
            push(alias);
        }
    }
    for alias in &opts.aliases {
        push(alias);
    }

    candidates
}

fn finish(
    clock: &dyn Clock,
    key: &str,
    value: &str,
    opts: &SecretOptions,
) -> Result<SecretString> {
    if opts.log_resolved {
        tracing::debug!(key, "secret resolved");
    }
    if seal::is_sealed(value) {
        let decoded = seal::decode(value, clock.now_ms())?;
        return Ok(decoded.payload);
    }
    Ok(SecretString::from(value.to_string()))
}
