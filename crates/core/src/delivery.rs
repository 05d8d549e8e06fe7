//! Delivery status lifecycle and retry backoff.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of attempts before a failed delivery becomes terminal.
pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Upper bound on a single backoff delay (one hour).
pub const MAX_BACKOFF_SECS: i64 = 3600;

/// Maximum stored length of a subscriber's response body, in characters.
pub const MAX_RESPONSE_CHARS: usize = 5000;

/// Status of a delivery record.
///
/// `pending -> success | failed`; `failed` returns to `pending` while a retry
/// is in flight. `skipped` is terminal and marks an event nobody subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse from the stored string form.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(CoreError::Validation(format!(
                "Invalid delivery status: '{s}'. Must be one of: pending, success, failed, skipped"
            ))),
        }
    }

    /// Whether no further attempt may change this record.
    pub fn is_final(&self, attempts: i32, max_retries: i32) -> bool {
        match self {
            Self::Success | Self::Skipped => true,
            Self::Failed => attempts >= max_retries,
            Self::Pending => false,
        }
    }
}

impl TryFrom<String> for DeliveryStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay before the next attempt: `base * 2^attempts` seconds, capped at
/// [`MAX_BACKOFF_SECS`].
pub fn retry_delay_secs(attempts: i32, base_secs: i64) -> i64 {
    let exponent = attempts.clamp(0, 30) as u32;
    base_secs
        .max(0)
        .saturating_mul(2i64.pow(exponent))
        .min(MAX_BACKOFF_SECS)
}

/// Truncate a response body to [`MAX_RESPONSE_CHARS`] characters.
pub fn truncate_response(body: &str) -> String {
    body.chars().take(MAX_RESPONSE_CHARS).collect()
}
