//! Trigger reconciliation registry
//!
//! One JSON document in the property store maps logical trigger keys to
//! live host trigger ids. Recompiling an unchanged workflow must not
//! create duplicate triggers: `ensure` is idempotent against the host's
//! live trigger list, and `sync` deletes everything the current graph no
//! longer declares. The store offers no locking, so correctness relies on
//! these operations being idempotent rather than mutually excluded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::host::{Clock, IntervalUnit, PropertyStore, Schedule, TriggerHost, TriggerSpec};

/// Property key of the registry document
pub const REGISTRY_PROPERTY: &str = "__trigger_registry_v1";

/// One registry entry: a logical key bound to a live host trigger id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerRegistryEntry {
    /// Logical trigger key, `"<workflow_id>:<node_id>"`
    pub key: String,

    /// Host-assigned trigger id
    pub id: String,

    /// Handler function name the trigger invokes
    pub handler: String,

    /// Trigger kind, e.g. `time`
    pub kind: String,

    /// Human-readable description
    pub description: String,

    /// RFC 3339 timestamp of the last write
    pub updated_at: String,
}

/// Result of [`ensure_trigger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The registered trigger is still live; nothing was created
    Existing(String),

    /// A trigger was (re)built and registered under this id
    Created(String),
}

impl EnsureOutcome {
    /// The host trigger id, whichever way it was obtained
    pub fn id(&self) -> &str {
        match self {
            EnsureOutcome::Existing(id) | EnsureOutcome::Created(id) => id,
        }
    }
}

/// Load the registry document; an absent or unparsable document is empty
pub fn load_registry(store: &dyn PropertyStore) -> BTreeMap<String, TriggerRegistryEntry> {
    store
        .get(REGISTRY_PROPERTY)
        .and_then(|doc| serde_json::from_str(&doc).ok())
        .unwrap_or_default()
}

fn save_registry(
    store: &mut dyn PropertyStore,
    registry: &BTreeMap<String, TriggerRegistryEntry>,
) -> Result<()> {
    store.set(REGISTRY_PROPERTY, &serde_json::to_string(registry)?);
    Ok(())
}

/// Ensure a host trigger exists for a logical key
///
/// If the registry holds an entry whose id is still in the host's live
/// trigger list, this is a no-op. Otherwise the entry is stale (or absent)
/// and `build` is invoked to create a fresh host trigger, which replaces
/// the entry. Stale ids are rebuilt, never reused.
pub fn ensure_trigger(
    store: &mut dyn PropertyStore,
    host: &mut dyn TriggerHost,
    clock: &dyn Clock,
    key: &str,
    handler: &str,
    kind: &str,
    description: &str,
    build: impl FnOnce(&mut dyn TriggerHost) -> std::result::Result<String, String>,
) -> Result<EnsureOutcome> {
    let mut registry = load_registry(store);

    if let Some(entry) = registry.get(key) {
        let live = host.list().iter().any(|t| t.id == entry.id);
        if live {
            tracing::debug!(key, id = %entry.id, "trigger already live");
            return Ok(EnsureOutcome::Existing(entry.id.clone()));
        }
        tracing::info!(key, stale_id = %entry.id, "registered trigger is gone, rebuilding");
    }

    let id = build(host).map_err(|message| Error::Trigger { message })?;
    registry.insert(
        key.to_string(),
        TriggerRegistryEntry {
            key: key.to_string(),
            id: id.clone(),
            handler: handler.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            updated_at: timestamp(clock),
        },
    );
    save_registry(store, &registry)?;
    Ok(EnsureOutcome::Created(id))
}

/// Delete every registered trigger whose key is not in `active_keys`
///
/// After a recompile this guarantees the host's trigger set exactly
/// matches the current graph. Returns the removed keys.
pub fn sync_trigger_registry(
    store: &mut dyn PropertyStore,
    host: &mut dyn TriggerHost,
    active_keys: &[String],
) -> Result<Vec<String>> {
    let mut registry = load_registry(store);
    let stale: Vec<String> = registry
        .keys()
        .filter(|key| !active_keys.contains(key))
        .cloned()
        .collect();

    for key in &stale {
        if let Some(entry) = registry.remove(key) {
            let deleted = host.delete(&entry.id);
            tracing::info!(key, id = %entry.id, deleted, "removed trigger no longer in graph");
        }
    }

    if !stale.is_empty() {
        save_registry(store, &registry)?;
    }
    Ok(stale)
}

/// Remove one entry and its host trigger unconditionally
pub fn clear_trigger_by_key(
    store: &mut dyn PropertyStore,
    host: &mut dyn TriggerHost,
    key: &str,
) -> Result<bool> {
    let mut registry = load_registry(store);
    match registry.remove(key) {
        Some(entry) => {
            host.delete(&entry.id);
            save_registry(store, &registry)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Declarative interval/anchor description of a time trigger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TimeTriggerConfig {
    /// Interval count for a recurring trigger
    pub every: Option<u32>,

    /// Interval unit for a recurring trigger
    pub unit: Option<IntervalUnit>,

    /// Anchor hour (0-23) for daily triggers
    pub at_hour: Option<u8>,

    /// Firing instant in epoch milliseconds for a one-shot trigger
    pub at_ms: Option<i64>,
}

/// Create a time-based host trigger from a declarative description
///
/// This is the ephemeral path: no registry bookkeeping. Persistent
/// installs go through [`ensure_trigger`] with a builder that calls this.
pub fn build_time_trigger(
    host: &mut dyn TriggerHost,
    handler: &str,
    description: &str,
    config: &TimeTriggerConfig,
) -> Result<String> {
    let schedule = match (config.every, config.at_ms) {
        (Some(every), None) => {
            if every == 0 {
                return Err(Error::Trigger {
                    message: "interval count must be at least 1".to_string(),
                });
            }
            let unit = config.unit.unwrap_or(IntervalUnit::Minutes);
            if let Some(hour) = config.at_hour {
                if hour > 23 {
                    return Err(Error::Trigger {
                        message: format!("anchor hour {} is out of range", hour),
                    });
                }
                if unit != IntervalUnit::Days {
                    return Err(Error::Trigger {
                        message: "anchor hour is only valid for daily triggers".to_string(),
                    });
                }
            }
            Schedule::Recurring {
                every,
                unit,
                at_hour: config.at_hour,
            }
        }
        (None, Some(at_ms)) => Schedule::Once { at_ms },
        _ => {
            return Err(Error::Trigger {
                message: "exactly one of 'every' or 'at_ms' must be set".to_string(),
            });
        }
    };

    host.create(&TriggerSpec {
        handler: handler.to_string(),
        schedule,
        description: description.to_string(),
    })
    .map_err(|message| Error::Trigger { message })
}

fn timestamp(clock: &dyn Clock) -> String {
    chrono::DateTime::from_timestamp_millis(clock.now_ms())
        .unwrap_or_default()
        .to_rfc3339()
}
