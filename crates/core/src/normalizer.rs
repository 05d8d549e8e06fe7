//! Source normalization: arbitrary `(headers, body)` pairs into [`NormalizedEvent`]s.
//!
//! Each external system gets a [`SourceNormalizer`] implementation registered
//! in a [`NormalizerRegistry`] keyed by source name. The registry owns the
//! dispatch order and never fails: input that no rule recognises degrades to
//! the [`UNKNOWN_EVENT_TYPE`] event type.
//!
//! Event-type detection order:
//!
//! 1. source-specific header markers ([`SourceNormalizer::event_type_from_headers`])
//! 2. source-specific body envelopes ([`SourceNormalizer::event_type_from_body`])
//! 3. explicit body fields (`event`, `eventType`, `event_type`, `type`)
//! 4. structural inference over the payload shape ([`InferenceRules`])
//! 5. [`UNKNOWN_EVENT_TYPE`]

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::classifier::Intelligence;
use crate::types::{HeaderPairs, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Event type assigned when nothing in the input identifies the event.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// Source name used for events emitted inside the platform.
pub const INTERNAL_SOURCE: &str = "internal";

/// Body fields inspected for an explicit event type, in order.
const EXPLICIT_EVENT_FIELDS: [&str; 4] = ["event", "eventType", "event_type", "type"];

/// Body fields inspected for an event timestamp, in order.
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "createdAt", "created_at"];

/// Maximum accepted length of a source name.
pub const MAX_SOURCE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// NormalizedEvent
// ---------------------------------------------------------------------------

/// Canonical in-memory representation of an inbound or internal event.
///
/// `intelligence` is `None` until the classifier has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: Timestamp,
    pub payload: Value,
    pub intelligence: Option<Intelligence>,
}

impl NormalizedEvent {
    /// Build an event directly, bypassing adapter dispatch.
    ///
    /// An empty `event_type` is replaced with [`UNKNOWN_EVENT_TYPE`].
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, payload: Value) -> Self {
        let event_type = event_type.into();
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            event_type: canonical_event_type(&event_type)
                .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string()),
            timestamp: extract_timestamp(&payload).unwrap_or_else(chrono::Utc::now),
            payload,
            intelligence: None,
        }
    }

    /// Return a copy of this event carrying the given intelligence.
    pub fn with_intelligence(mut self, intelligence: Intelligence) -> Self {
        self.intelligence = Some(intelligence);
        self
    }

    /// Whether any rule identified the event type.
    pub fn is_identified(&self) -> bool {
        self.event_type != UNKNOWN_EVENT_TYPE
    }
}

// ---------------------------------------------------------------------------
// Canonical event types
// ---------------------------------------------------------------------------

/// Canonicalize a raw event name into dot-namespaced lower-case form.
///
/// `_`, `-`, `:`, `/` and whitespace become `.`; repeated separators
/// collapse. Returns `None` when nothing remains.
pub fn canonical_event_type(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if matches!(c, '.' | '_' | '-' | ':' | '/') || c.is_whitespace() {
            if !out.is_empty() && !out.ends_with('.') {
                out.push('.');
            }
        } else {
            out.extend(c.to_lowercase());
        }
    }
    while out.ends_with('.') {
        out.pop();
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Canonicalize `raw` and namespace it under `source` unless already there.
pub fn source_event_type(source: &str, raw: &str) -> Option<String> {
    let canonical = canonical_event_type(raw)?;
    let prefix = format!("{source}.");
    if canonical.starts_with(&prefix) {
        Some(canonical)
    } else {
        Some(format!("{prefix}{canonical}"))
    }
}

/// Validate and canonicalize a source name taken from a request path.
///
/// Sources are lower-case and limited to ASCII alphanumerics, `-` and `_`.
pub fn canonical_source(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_SOURCE_LENGTH {
        return None;
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Case-insensitive header lookup returning a trimmed non-empty value.
pub fn header_value<'a>(headers: &'a HeaderPairs, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

/// First explicit event-type field present in `body` as a non-empty string.
pub fn explicit_event_type(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    EXPLICIT_EVENT_FIELDS
        .iter()
        .filter_map(|field| obj.get(*field).and_then(Value::as_str))
        .find_map(canonical_event_type)
}

/// Parse an RFC 3339 string or a UNIX-seconds integer timestamp field.
pub fn extract_timestamp(body: &Value) -> Option<Timestamp> {
    let obj = body.as_object()?;
    TIMESTAMP_FIELDS.iter().find_map(|field| match obj.get(*field)? {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&chrono::Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0)),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Structural inference
// ---------------------------------------------------------------------------

type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// A single `(predicate, eventType)` pair.
pub struct InferenceRule {
    predicate: Predicate,
    event_type: String,
}

/// Ordered list of shape-based inference rules. First match wins.
pub struct InferenceRules {
    rules: Vec<InferenceRule>,
}

impl InferenceRules {
    /// An empty rule list (infers nothing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule evaluated after all existing rules.
    pub fn with_rule(
        mut self,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        event_type: impl Into<String>,
    ) -> Self {
        self.rules.push(InferenceRule {
            predicate: Box::new(predicate),
            event_type: event_type.into(),
        });
        self
    }

    /// Append a rule matching bodies that contain `key` at the top level.
    pub fn with_key_rule(self, key: &'static str, event_type: impl Into<String>) -> Self {
        self.with_rule(move |body| has_key(body, key), event_type)
    }

    /// Evaluate the rules in order against `body`.
    pub fn infer(&self, body: &Value) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(body))
            .map(|rule| rule.event_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for InferenceRules {
    fn default() -> Self {
        Self::empty()
            .with_key_rule("alert", "security.alert")
            .with_key_rule("securityEvent", "security.alert")
            .with_key_rule("verification", "verification.created")
            .with_key_rule("trustScore", "trust.score.updated")
            .with_key_rule("nft", "nft.minted")
            .with_key_rule("transaction", "transaction.created")
            .with_key_rule("page", "workspace.page.updated")
            .with_key_rule("user", "user.updated")
    }
}

fn has_key(body: &Value, key: &str) -> bool {
    body.as_object()
        .and_then(|obj| obj.get(key))
        .is_some_and(|v| !v.is_null())
}

// ---------------------------------------------------------------------------
// SourceNormalizer
// ---------------------------------------------------------------------------

/// Capability interface implemented once per external source.
///
/// Every method has a conservative default so an adapter only overrides
/// what its source actually provides.
pub trait SourceNormalizer: Send + Sync {
    /// Registry key for this adapter.
    fn source(&self) -> &str;

    /// Header carrying an HMAC signature of the raw body, if the source signs.
    fn signature_header(&self) -> Option<&str> {
        None
    }

    /// Canonical event type from source-specific header markers.
    fn event_type_from_headers(&self, _headers: &HeaderPairs) -> Option<String> {
        None
    }

    /// Canonical event type from a source-specific body envelope.
    fn event_type_from_body(&self, _body: &Value) -> Option<String> {
        None
    }

    /// Refine a header-derived event type with details from the body.
    fn refine(&self, event_type: String, _body: &Value) -> String {
        event_type
    }

    /// The event payload carried by `body`.
    fn payload(&self, body: &Value) -> Value {
        body.clone()
    }
}

/// Adapter used for any source without a registered implementation.
#[derive(Debug, Default)]
pub struct GenericNormalizer;

impl SourceNormalizer for GenericNormalizer {
    fn source(&self) -> &str {
        "generic"
    }

    fn signature_header(&self) -> Option<&str> {
        Some("x-webhook-signature")
    }

    fn event_type_from_headers(&self, headers: &HeaderPairs) -> Option<String> {
        header_value(headers, "x-event-type")
            .or_else(|| header_value(headers, "x-webhook-event"))
            .and_then(canonical_event_type)
    }
}

/// Workspace-sync provider (Notion).
#[derive(Debug, Default)]
pub struct NotionNormalizer;

impl SourceNormalizer for NotionNormalizer {
    fn source(&self) -> &str {
        "notion"
    }

    fn signature_header(&self) -> Option<&str> {
        Some("x-notion-signature")
    }

    fn event_type_from_headers(&self, headers: &HeaderPairs) -> Option<String> {
        header_value(headers, "x-notion-event-type").and_then(|v| source_event_type("notion", v))
    }

    fn event_type_from_body(&self, body: &Value) -> Option<String> {
        body.get("type")
            .and_then(Value::as_str)
            .and_then(|v| source_event_type("notion", v))
    }
}

/// GitHub repository webhooks; the `action` field refines the event name.
#[derive(Debug, Default)]
pub struct GithubNormalizer;

impl SourceNormalizer for GithubNormalizer {
    fn source(&self) -> &str {
        "github"
    }

    fn signature_header(&self) -> Option<&str> {
        Some("x-hub-signature-256")
    }

    fn event_type_from_headers(&self, headers: &HeaderPairs) -> Option<String> {
        let event = header_value(headers, "x-github-event")?;
        source_event_type("github", event)
    }

    fn refine(&self, base: String, body: &Value) -> String {
        match body
            .get("action")
            .and_then(Value::as_str)
            .and_then(canonical_event_type)
        {
            Some(action) => format!("{base}.{action}"),
            None => base,
        }
    }
}

/// Identity-verification provider callbacks.
#[derive(Debug, Default)]
pub struct IdentityProviderNormalizer;

impl SourceNormalizer for IdentityProviderNormalizer {
    fn source(&self) -> &str {
        "identity"
    }

    fn signature_header(&self) -> Option<&str> {
        Some("x-idv-signature")
    }

    fn event_type_from_headers(&self, headers: &HeaderPairs) -> Option<String> {
        // Provider events are already in the platform's verification namespace.
        header_value(headers, "x-idv-event").and_then(|v| source_event_type("verification", v))
    }

    fn event_type_from_body(&self, body: &Value) -> Option<String> {
        let status = body
            .get("verification")
            .and_then(|v| v.get("status"))
            .and_then(Value::as_str)?;
        source_event_type("verification", status)
    }
}

/// Cloud pub/sub push envelopes: `{ message: { data, attributes }, subscription }`.
#[derive(Debug, Default)]
pub struct PubSubNormalizer;

impl SourceNormalizer for PubSubNormalizer {
    fn source(&self) -> &str {
        "pubsub"
    }

    fn event_type_from_body(&self, body: &Value) -> Option<String> {
        let attributes = body.get("message")?.get("attributes")?;
        explicit_event_type(attributes)
    }

    fn payload(&self, body: &Value) -> Value {
        let Some(message) = body.get("message") else {
            return body.clone();
        };
        let Some(encoded) = message.get("data").and_then(Value::as_str) else {
            return message.clone();
        };
        match BASE64.decode(encoded) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::json!({ "data": String::from_utf8_lossy(&bytes) })
            }),
            Err(e) => {
                tracing::debug!(error = %e, "Pub/sub message data is not base64");
                message.clone()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// NormalizerRegistry
// ---------------------------------------------------------------------------

/// Explicitly constructed registry of source adapters and inference rules.
///
/// Constructed once at startup and shared via `Arc`; tests build a fresh
/// registry per case.
pub struct NormalizerRegistry {
    adapters: HashMap<String, Arc<dyn SourceNormalizer>>,
    fallback: Arc<dyn SourceNormalizer>,
    inference: InferenceRules,
}

impl NormalizerRegistry {
    /// A registry with only the generic fallback and the given rules.
    pub fn new(inference: InferenceRules) -> Self {
        Self {
            adapters: HashMap::new(),
            fallback: Arc::new(GenericNormalizer),
            inference,
        }
    }

    /// A registry with all built-in adapters and default inference rules.
    pub fn with_builtin_sources() -> Self {
        let mut registry = Self::new(InferenceRules::default());
        registry.register(Arc::new(NotionNormalizer));
        registry.register(Arc::new(GithubNormalizer));
        registry.register(Arc::new(IdentityProviderNormalizer));
        registry.register(Arc::new(PubSubNormalizer));
        registry
    }

    /// Register an adapter under its [`SourceNormalizer::source`] name.
    ///
    /// Returns the adapter previously registered for that source, if any.
    pub fn register(
        &mut self,
        adapter: Arc<dyn SourceNormalizer>,
    ) -> Option<Arc<dyn SourceNormalizer>> {
        let key = adapter.source().to_ascii_lowercase();
        self.adapters.insert(key, adapter)
    }

    /// Registered source names, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    /// The adapter for `source`, falling back to the generic adapter.
    pub fn adapter_for(&self, source: &str) -> &dyn SourceNormalizer {
        self.adapters
            .get(&source.to_ascii_lowercase())
            .map(|a| a.as_ref())
            .unwrap_or_else(|| self.fallback.as_ref())
    }

    /// Signature header declared by the adapter for `source`.
    pub fn signature_header(&self, source: &str) -> Option<&str> {
        self.adapter_for(source).signature_header()
    }

    /// Normalize an inbound `(headers, body)` pair. Never fails.
    pub fn normalize(&self, source: &str, headers: &HeaderPairs, body: &Value) -> NormalizedEvent {
        let source = canonical_source(source).unwrap_or_else(|| "unknown".to_string());
        let adapter = self.adapter_for(&source);
        let payload = adapter.payload(body);

        let event_type = self.detect_event_type(adapter, headers, body, &payload);

        if event_type == UNKNOWN_EVENT_TYPE {
            tracing::debug!(source = %source, "No rule identified the inbound event type");
        }

        NormalizedEvent {
            id: Uuid::new_v4(),
            timestamp: extract_timestamp(&payload)
                .or_else(|| extract_timestamp(body))
                .unwrap_or_else(chrono::Utc::now),
            source,
            event_type,
            payload,
            intelligence: None,
        }
    }

    fn detect_event_type(
        &self,
        adapter: &dyn SourceNormalizer,
        headers: &HeaderPairs,
        body: &Value,
        payload: &Value,
    ) -> String {
        if let Some(from_headers) = adapter.event_type_from_headers(headers) {
            return adapter.refine(from_headers, body);
        }
        adapter
            .event_type_from_body(body)
            .or_else(|| explicit_event_type(body))
            .or_else(|| explicit_event_type(payload))
            .or_else(|| self.inference.infer(payload).map(str::to_string))
            .or_else(|| self.inference.infer(body).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_EVENT_TYPE.to_string())
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::with_builtin_sources()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
