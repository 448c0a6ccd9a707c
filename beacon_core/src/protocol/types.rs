/**
 * Core type definitions for the delivery engine.
 *
 * `Event` is what the package queue hands us, `Outcome` is what we hand
 * back after a round trip. `Attribution` and `DeepLink` are decoded out of
 * the server's JSON answer and travel inside the `Outcome`.
 */
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

// ---------------------------------------------------------------------------
// ActivityKind
// ---------------------------------------------------------------------------

/**
 * What a package tracks. The kind of the package decides the flavour of
 * the `Outcome` built for it; the attribution poller only accepts outcomes
 * of kind `Attribution`.
 *
 * Serialized as lowercase strings: `"session"`, `"event"`, ...
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    #[default]
    Unknown,
    Session,
    Event,
    Click,
    Attribution,
    Info,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Unknown => "unknown",
            ActivityKind::Session => "session",
            ActivityKind::Event => "event",
            ActivityKind::Click => "click",
            ActivityKind::Attribution => "attribution",
            ActivityKind::Info => "info",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Event — one package waiting in the queue
// ---------------------------------------------------------------------------

/**
 * A trackable package, fully encoded by the time it reaches the engine.
 *
 * Owned by the package queue and shared with the dispatcher / poller as
 * `Arc<Event>` for the duration of a single send.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Request path appended to the endpoint, e.g. `"/session"`.
    pub path: String,

    pub kind: ActivityKind,

    /// Client-SDK tag sent as the `Client-SDK` header.
    pub client_sdk: String,

    /// Request parameters, kept in key order.
    pub parameters: BTreeMap<String, String>,

    /// Free-form detail appended to the failure message, e.g. `" 'abc123'"`.
    #[serde(default)]
    pub suffix: String,
}

impl Event {
    pub fn new(kind: ActivityKind, path: impl Into<String>, client_sdk: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            client_sdk: client_sdk.into(),
            parameters: BTreeMap::new(),
            suffix: String::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Leading part of every failure message logged for this package.
    pub fn failure_message(&self) -> String {
        format!("Failed to track {}{}", self.kind, self.suffix)
    }

    /// Multi-line description used in verbose logs.
    pub fn extended_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Path:      {}", self.path);
        let _ = writeln!(out, "ClientSdk: {}", self.client_sdk);
        out.push_str("Parameters:");
        for (key, value) in &self.parameters {
            let _ = write!(out, "\n\t{key:<22} {value}");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Attribution
// ---------------------------------------------------------------------------

/**
 * Campaign data decoded from the response body's `attribution` object.
 *
 * Every field is optional: the server omits what it does not know.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracker_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adgroup: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_label: Option<String>,
}

// ---------------------------------------------------------------------------
// DeepLink
// ---------------------------------------------------------------------------

/// A URI taken from `attribution.deeplink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepLink(Url);

impl DeepLink {
    /// Returns `None` when the string is not an absolute URI.
    pub fn parse(raw: &str) -> Option<Self> {
        Url::parse(raw).ok().map(DeepLink)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for DeepLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outcome — result of one round trip
// ---------------------------------------------------------------------------

/**
 * Structured result of one attempt to deliver a package.
 *
 * Built fresh for every attempt, either by the response interpreter (the
 * server replied) or by the dispatcher (the round trip never completed).
 * Collaborators receive it by value.
 */
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub kind: ActivityKind,

    /// HTTP 200 with a JSON object body.
    pub success: bool,

    /// Set when the package is routed back to the queue for a later retry.
    pub will_retry: bool,

    /// `true` when the server answered, `false` when the transport failed.
    pub responded: bool,

    pub status: Option<u16>,

    /// The body, when it parsed as a JSON object.
    pub json_response: Option<Map<String, Value>>,

    pub message: Option<String>,
    pub timestamp: Option<String>,
    pub adid: Option<String>,

    pub attribution: Option<Attribution>,
    pub deep_link: Option<DeepLink>,
}

impl Outcome {
    /// Empty, unsuccessful outcome of the flavour matching `event`.
    pub fn for_event(event: &Event) -> Self {
        Self {
            kind: event.kind,
            ..Default::default()
        }
    }
}
