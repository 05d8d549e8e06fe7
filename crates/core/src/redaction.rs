//! Trust-tier redaction of outbound payloads.
//!
//! A recipient's trust level selects a [`TrustTier`]; lower tiers lose whole
//! sections of the payload and middle tiers see masked values. Redaction
//! never mutates its input and tolerates absent fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::DbId;

/// Replacement for address values.
pub const REDACTED: &str = "[REDACTED]";

/// Mask used when an SSN has fewer than four digits to preserve.
pub const SSN_FULL_MASK: &str = "***-**-****";

/// Mask applied to dates of birth.
pub const DOB_MASK: &str = "****-**-**";

/// Sections removed for [`TrustTier::Restricted`] recipients.
const RESTRICTED_STRIPPED: [&str; 6] = [
    "personalData",
    "biometricResults",
    "financialData",
    "securityDetails",
    "medicalInfo",
    "detailedHistory",
];

/// Sections removed for [`TrustTier::Basic`] recipients.
const BASIC_STRIPPED: [&str; 2] = ["biometricResults", "financialData"];

/// Date-of-birth field spellings.
const DOB_FIELDS: [&str; 2] = ["dob", "dateOfBirth"];

/// Access tier derived from a numeric trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Levels 0-3, or unknown.
    Restricted,
    /// Levels 4-7.
    Basic,
    /// Levels 8-12.
    Elevated,
    /// Levels 13 and above.
    Full,
}

impl TrustTier {
    /// Map a trust level to its tier. An unknown level is the lowest tier.
    pub fn from_level(level: Option<u32>) -> Self {
        match level {
            None | Some(0..=3) => Self::Restricted,
            Some(4..=7) => Self::Basic,
            Some(8..=12) => Self::Elevated,
            Some(_) => Self::Full,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restricted => "restricted",
            Self::Basic => "basic",
            Self::Elevated => "elevated",
            Self::Full => "full",
        }
    }

    /// Top-level sections stripped for this tier.
    pub fn stripped_sections(&self) -> &'static [&'static str] {
        match self {
            Self::Restricted => &RESTRICTED_STRIPPED,
            Self::Basic => &BASIC_STRIPPED,
            Self::Elevated | Self::Full => &[],
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return a redacted copy of `payload` for a recipient at `trust_level`.
///
/// Non-object payloads are returned unchanged.
pub fn redact(payload: &Value, trust_level: Option<u32>) -> Value {
    redact_for_tier(payload, TrustTier::from_level(trust_level))
}

/// Return a redacted copy of `payload` for the given tier.
pub fn redact_for_tier(payload: &Value, tier: TrustTier) -> Value {
    let Value::Object(source) = payload else {
        return payload.clone();
    };
    if tier == TrustTier::Full {
        return payload.clone();
    }

    let mut out: Map<String, Value> = source
        .iter()
        .filter(|(key, _)| !tier.stripped_sections().contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    match tier {
        TrustTier::Basic => {
            if let Some(Value::Object(personal)) = out.get_mut("personalData") {
                mask_personal_data(personal);
            }
        }
        TrustTier::Elevated => {
            if let Some(Value::Object(financial)) = out.get_mut("financialData") {
                if let Some(account) = financial.get_mut("accountNumber") {
                    *account = Value::String(mask_account_number(account));
                }
            }
        }
        TrustTier::Restricted | TrustTier::Full => {}
    }
    Value::Object(out)
}

fn mask_personal_data(personal: &mut Map<String, Value>) {
    if let Some(ssn) = personal.get_mut("ssn") {
        *ssn = Value::String(mask_ssn(ssn));
    }
    for field in DOB_FIELDS {
        if let Some(dob) = personal.get_mut(field) {
            *dob = Value::String(DOB_MASK.to_string());
        }
    }
    if let Some(address) = personal.get_mut("address") {
        *address = Value::String(REDACTED.to_string());
    }
}

/// `***-**-` followed by the last four digits, or a full mask.
pub fn mask_ssn(value: &Value) -> String {
    match last_four_digits(value) {
        Some(tail) => format!("***-**-{tail}"),
        None => SSN_FULL_MASK.to_string(),
    }
}

/// `****` followed by the last four digits, or `****` alone.
pub fn mask_account_number(value: &Value) -> String {
    match last_four_digits(value) {
        Some(tail) => format!("****{tail}"),
        None => "****".to_string(),
    }
}

fn last_four_digits(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }
    Some(digits[digits.len() - 4..].iter().collect())
}

/// Identify the user a payload is about, for trust-level lookup.
///
/// Checks `userId`, `user_id`, `user.id`, then `subjectId`. Accepts numeric
/// values and numeric strings.
pub fn subject_user_id(payload: &Value) -> Option<DbId> {
    let candidates = [
        payload.get("userId"),
        payload.get("user_id"),
        payload.get("user").and_then(|u| u.get("id")),
        payload.get("subjectId"),
    ];
    candidates.into_iter().flatten().find_map(as_db_id)
}

fn as_db_id(value: &Value) -> Option<DbId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
