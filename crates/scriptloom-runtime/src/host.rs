//! Injected host capability traits
//!
//! The deployment host exposes global mutable state (a property store, a
//! live trigger list) and blocking primitives (outbound fetch, sleep).
//! These traits model that contract so every runtime algorithm can run
//! against in-memory fakes.

use std::collections::BTreeMap;

/// String key-value property store with last-writer-wins document semantics
pub trait PropertyStore {
    /// Read a property
    fn get(&self, key: &str) -> Option<String>;

    /// Write a property
    fn set(&mut self, key: &str, value: &str);

    /// Delete a property
    fn delete(&mut self, key: &str);
}

/// A live trigger known to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTrigger {
    /// Opaque host-assigned trigger id
    pub id: String,

    /// Name of the function the trigger invokes
    pub handler: String,
}

/// Declarative description of a time-driven trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSpec {
    /// Handler function name
    pub handler: String,

    /// When the trigger fires
    pub schedule: Schedule,

    /// Human-readable description stored alongside the registry entry
    pub description: String,
}

/// Firing schedule for a time-driven trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fires every `every` units, optionally anchored to an hour for daily runs
    Recurring {
        /// Interval count, e.g. `15` for every 15 minutes
        every: u32,
        /// Interval unit
        unit: IntervalUnit,
        /// Anchor hour (0-23) for daily triggers
        at_hour: Option<u8>,
    },
    /// Fires once at the given instant
    Once {
        /// Firing time in epoch milliseconds
        at_ms: i64,
    },
}

/// Unit for time-driven trigger intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    /// Every N minutes
    Minutes,
    /// Every N hours
    Hours,
    /// Every N days, optionally anchored to an hour
    Days,
}

/// Trigger management API: create, list, delete by opaque id
pub trait TriggerHost {
    /// Create a trigger and return its host-assigned id
    fn create(&mut self, spec: &TriggerSpec) -> Result<String, String>;

    /// Every live trigger the host knows
    fn list(&self) -> Vec<HostTrigger>;

    /// Delete a trigger by id; false if the id was not live
    fn delete(&mut self, id: &str) -> bool;
}

/// An outbound HTTP request
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HttpRequest {
    /// HTTP method
    pub method: String,

    /// Absolute URL
    pub url: String,

    /// Request headers
    pub headers: BTreeMap<String, String>,

    /// Request body, if any
    pub body: Option<String>,
}

impl HttpRequest {
    /// Convenience constructor for a POST with a body
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: Some(body.into()),
        }
    }

    /// Convenience constructor for a GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Add a header, returning self for chaining
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// An HTTP response as the host surfaces it: status, headers, body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,

    /// Response headers
    pub headers: BTreeMap<String, String>,

    /// Response body text
    pub body: String,
}

impl HttpResponse {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Blocking outbound request primitive
pub trait Transport {
    /// Issue a request; `Err` is a network failure with no response
    fn fetch(&mut self, req: &HttpRequest) -> Result<HttpResponse, String>;
}

/// Time source and blocking sleep
///
/// The host offers no asynchronous primitive: waits genuinely block and
/// consume the per-invocation time budget.
pub trait Clock {
    /// Current time in epoch milliseconds
    fn now_ms(&self) -> i64;

    /// Block for the given number of milliseconds
    fn sleep(&mut self, ms: u64);
}

/// Wall-clock implementation backed by std
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn sleep(&mut self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let req = HttpRequest::post("https://api.example.com/x", "{}")
            .header("Authorization", "Bearer t");
        assert_eq!(req.method, "POST");
        assert_eq!(req.headers["Authorization"], "Bearer t");
        assert_eq!(req.body.as_deref(), Some("{}"));

        let get = HttpRequest::get("https://api.example.com/y");
        assert_eq!(get.method, "GET");
        assert!(get.body.is_none());
    }

    #[test]
    fn test_response_header_case_insensitive() {
        let mut headers = BTreeMap::new();
        headers.insert("Retry-After".to_string(), "5".to_string());
        let resp = HttpResponse {
            status: 429,
            headers,
            body: String::new(),
        };
        assert_eq!(resp.header("retry-after"), Some("5"));
        assert_eq!(resp.header("RETRY-AFTER"), Some("5"));
        assert_eq!(resp.header("x-other"), None);
    }
}
