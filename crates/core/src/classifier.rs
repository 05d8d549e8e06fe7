//! Event intelligence: priority, category, confidence, and suggested actions.
//!
//! [`EventClassifier`] owns an ordered rule table and a bounded in-memory
//! history of classified events used for diagnostics. The history is not the
//! delivery ledger and is lost on restart.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;
use crate::normalizer::{NormalizedEvent, UNKNOWN_EVENT_TYPE};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Number of classified events retained in the diagnostic history.
pub const HISTORY_CAPACITY: usize = 1000;

/// Category assigned when no rule matches.
pub const DEFAULT_CATEGORY: &str = "general";

/// Actions suggested for event types no keyword recognises.
pub const GENERIC_ACTIONS: [&str; 2] = ["Process event", "Log activity"];

/// Payload fields that count as an identifier.
const ID_FIELDS: [&str; 3] = ["id", "userId", "user_id"];

/// Payload fields that count as a timestamp.
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "createdAt", "created_at"];

/// Keyword-driven priority precedence, evaluated top to bottom.
const PRIORITY_KEYWORDS: [(&[&str], Priority); 3] = [
    (&["security", "alert"], Priority::Critical),
    (&["verification", "trust"], Priority::High),
    (&["nft", "transaction"], Priority::Medium),
];

/// Suggested actions keyed by event-type substring, in output order.
const ACTION_TABLE: [(&str, &[&str]); 9] = [
    (
        "security",
        &["Escalate to security team", "Lock affected account", "Create incident report"],
    ),
    ("alert", &["Escalate to security team", "Create incident report"]),
    (
        "verification",
        &["Update trust score", "Send verification notification", "Log verification event"],
    ),
    ("trust", &["Recalculate trust tier", "Notify case manager"]),
    ("nft", &["Update NFT registry", "Notify holder"]),
    ("transaction", &["Reconcile transaction", "Update financial records"]),
    ("user", &["Sync user profile", "Log activity"]),
    ("page", &["Sync workspace content"]),
    ("workspace", &["Sync workspace content"]),
];

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Urgency assigned to a classified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Intelligence
// ---------------------------------------------------------------------------

/// Advisory metadata attached to a normalized event.
///
/// `confidence` is always within `[0.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intelligence {
    pub priority: Priority,
    pub category: String,
    pub confidence: f64,
    pub suggested_actions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Category rules
// ---------------------------------------------------------------------------

/// How a category rule matches an event type.
#[derive(Debug, Clone)]
pub enum EventPattern {
    Contains(String),
    Regex(Regex),
}

impl EventPattern {
    pub fn matches(&self, event_type: &str) -> bool {
        match self {
            Self::Contains(needle) => event_type.contains(needle.as_str()),
            Self::Regex(re) => re.is_match(event_type),
        }
    }
}

/// A `(pattern, category)` pair with a sort priority (higher first).
#[derive(Debug, Clone)]
pub struct CategoryRule {
    pub pattern: EventPattern,
    pub category: String,
    pub priority: i32,
}

impl CategoryRule {
    /// Rule matching event types containing `needle`.
    pub fn contains(needle: &str, category: &str, priority: i32) -> Self {
        Self {
            pattern: EventPattern::Contains(needle.to_ascii_lowercase()),
            category: category.to_string(),
            priority,
        }
    }

    /// Rule matching event types against a regular expression.
    pub fn regex(pattern: &str, category: &str, priority: i32) -> Result<Self, CoreError> {
        let re = Regex::new(pattern).map_err(|e| {
            CoreError::Validation(format!("Invalid category pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern: EventPattern::Regex(re),
            category: category.to_string(),
            priority,
        })
    }
}

/// The built-in category table.
pub fn default_category_rules() -> Vec<CategoryRule> {
    let mut rules = vec![
        CategoryRule::contains("security", "security", 100),
        CategoryRule::contains("alert", "security", 100),
        CategoryRule::contains("verification", "identity_verification", 90),
        CategoryRule::contains("trust", "trust_management", 80),
        CategoryRule::contains("payment", "financial", 60),
        CategoryRule::contains("invoice", "financial", 60),
        CategoryRule::contains("user", "user_management", 50),
        CategoryRule::contains("notion", "workspace_sync", 40),
        CategoryRule::contains("page", "workspace_sync", 40),
        CategoryRule::contains("github", "development", 30),
    ];
    // A literal pattern; compilation cannot fail.
    if let Ok(rule) = CategoryRule::regex(r"^(nft|transaction)(\.|$)", "blockchain", 70) {
        rules.push(rule);
    }
    rules
}

// ---------------------------------------------------------------------------
// Pure scoring functions
// ---------------------------------------------------------------------------

/// Keyword-driven priority. First matching keyword group wins.
pub fn priority_for(event_type: &str) -> Priority {
    let lowered = event_type.to_ascii_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, priority)| *priority)
        .unwrap_or(Priority::Low)
}

/// Confidence score in `[0.0, 1.0]`, computed in tenths to stay exact.
pub fn confidence_for(event_type: &str, payload: &Value) -> f64 {
    let mut tenths: u8 = 5;
    if event_type != UNKNOWN_EVENT_TYPE && !event_type.is_empty() {
        tenths += 2;
    }
    if let Some(obj) = payload.as_object().filter(|o| !o.is_empty()) {
        tenths += 1;
        if ID_FIELDS.iter().any(|f| obj.get(*f).is_some_and(|v| !v.is_null())) {
            tenths += 1;
        }
        if TIMESTAMP_FIELDS
            .iter()
            .any(|f| obj.get(*f).is_some_and(|v| !v.is_null()))
        {
            tenths += 1;
        }
    }
    f64::from(tenths.min(10)) / 10.0
}

/// Deterministic advisory actions derived from event-type substrings.
pub fn suggested_actions_for(event_type: &str) -> Vec<String> {
    let lowered = event_type.to_ascii_lowercase();
    let mut actions: Vec<String> = Vec::new();
    for (needle, entries) in ACTION_TABLE.iter() {
        if !lowered.contains(needle) {
            continue;
        }
        for entry in entries.iter() {
            if !actions.iter().any(|a| a == entry) {
                actions.push((*entry).to_string());
            }
        }
    }
    if actions.is_empty() {
        actions = GENERIC_ACTIONS.iter().map(|a| (*a).to_string()).collect();
    }
    actions
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One entry in the classifier's diagnostic ring buffer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecord {
    pub event_id: Option<Uuid>,
    pub source: Option<String>,
    pub event_type: String,
    pub intelligence: Intelligence,
    pub classified_at: Timestamp,
}

// ---------------------------------------------------------------------------
// EventClassifier
// ---------------------------------------------------------------------------

/// Rule-driven classifier with a bounded history (oldest evicted first).
pub struct EventClassifier {
    rules: Vec<CategoryRule>,
    history: Mutex<VecDeque<ClassificationRecord>>,
    capacity: usize,
}

impl EventClassifier {
    /// Build a classifier; rules are stably sorted by descending priority.
    pub fn new(mut rules: Vec<CategoryRule>) -> Self {
        rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        Self {
            rules,
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            capacity: HISTORY_CAPACITY,
        }
    }

    /// Classifier with [`default_category_rules`].
    pub fn with_default_rules() -> Self {
        Self::new(default_category_rules())
    }

    /// Override the history capacity (at least 1).
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// First matching category, or [`DEFAULT_CATEGORY`].
    pub fn category_for(&self, event_type: &str) -> String {
        let lowered = event_type.to_ascii_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(&lowered))
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    /// Classify an event type and payload, recording it in the history.
    pub fn classify(&self, event_type: &str, payload: &Value) -> Intelligence {
        let intelligence = self.evaluate(event_type, payload);
        self.record(ClassificationRecord {
            event_id: None,
            source: None,
            event_type: event_type.to_string(),
            intelligence: intelligence.clone(),
            classified_at: chrono::Utc::now(),
        });
        intelligence
    }

    /// Classify a normalized event, returning it with intelligence attached.
    pub fn classify_event(&self, event: NormalizedEvent) -> NormalizedEvent {
        let intelligence = self.evaluate(&event.event_type, &event.payload);
        self.record(ClassificationRecord {
            event_id: Some(event.id),
            source: Some(event.source.clone()),
            event_type: event.event_type.clone(),
            intelligence: intelligence.clone(),
            classified_at: chrono::Utc::now(),
        });
        event.with_intelligence(intelligence)
    }

    /// Most recent history entries first, at most `limit`.
    pub fn history(&self, limit: usize) -> Vec<ClassificationRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn evaluate(&self, event_type: &str, payload: &Value) -> Intelligence {
        Intelligence {
            priority: priority_for(event_type),
            category: self.category_for(event_type),
            confidence: confidence_for(event_type, payload),
            suggested_actions: suggested_actions_for(event_type),
        }
    }

    fn record(&self, entry: ClassificationRecord) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
