//! Subscription interest matching and field validation.

use std::collections::BTreeMap;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Event filter entry that matches every event type.
pub const WILDCARD_EVENT: &str = "*";

/// Maximum length of a subscription name.
pub const MAX_NAME_LENGTH: usize = 200;

/// Maximum length of a subscriber URL.
pub const MAX_URL_LENGTH: usize = 2048;

/// Headers the delivery engine sets itself; subscriptions may not override them.
pub const RESERVED_HEADERS: [&str; 5] = [
    "content-type",
    "user-agent",
    "x-webhook-signature",
    "x-webhook-delivery-id",
    "x-webhook-event-type",
];

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Whether a subscription with the given filter receives `event_type`.
///
/// Inactive subscriptions never match.
pub fn matches_event(is_active: bool, events: &[String], event_type: &str) -> bool {
    is_active
        && events
            .iter()
            .any(|e| e == WILDCARD_EVENT || e == event_type)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a subscription name (may be empty; bounded length).
pub fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.len() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Subscription name exceeds maximum length of {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Validate a subscriber URL: `http` or `https` with a host.
pub fn validate_url(url: &str) -> Result<(), CoreError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Subscription url must not be empty".to_string()));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(CoreError::Validation(format!(
            "Subscription url exceeds maximum length of {MAX_URL_LENGTH} characters"
        )));
    }
    let rest = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .ok_or_else(|| {
            CoreError::Validation(format!("Subscription url must use http or https: '{trimmed}'"))
        })?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(CoreError::Validation(format!(
            "Subscription url has no valid host: '{trimmed}'"
        )));
    }
    Ok(())
}

/// Validate the event filter: non-empty, no blank entries.
pub fn validate_events(events: &[String]) -> Result<(), CoreError> {
    if events.is_empty() {
        return Err(CoreError::Validation(
            "Subscription must list at least one event type (or \"*\")".to_string(),
        ));
    }
    if events.iter().any(|e| e.trim().is_empty()) {
        return Err(CoreError::Validation(
            "Subscription event types must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Validate static headers: RFC 7230 token names, printable values, and no
/// reserved names.
pub fn validate_headers(headers: &BTreeMap<String, String>) -> Result<(), CoreError> {
    for (name, value) in headers {
        let valid_name = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
        if !valid_name {
            return Err(CoreError::Validation(format!("Invalid header name: '{name}'")));
        }
        if RESERVED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            return Err(CoreError::Validation(format!(
                "Header '{name}' is set by the delivery engine and cannot be overridden"
            )));
        }
        if value.bytes().any(|b| b.is_ascii_control() && b != b'\t') {
            return Err(CoreError::Validation(format!(
                "Header '{name}' contains control characters"
            )));
        }
    }
    Ok(())
}

/// Split a comma-joined event list, trimming and dropping blanks.
pub fn parse_event_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn events(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // -- matching -------------------------------------------------------------

    #[test]
    fn exact_event_matches() {
        assert!(matches_event(true, &events(&["verification.verified"]), "verification.verified"));
        assert!(!matches_event(true, &events(&["verification.verified"]), "verification.created"));
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(matches_event(true, &events(&["*"]), "anything.at.all"));
        assert!(matches_event(true, &events(&["user.created", "*"]), "unknown"));
    }

    #[test]
    fn inactive_never_matches() {
        assert!(!matches_event(false, &events(&["*"]), "user.created"));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        assert!(!matches_event(true, &[], "user.created"));
    }

    // -- validation -------------------------------------------------------------

    #[test]
    fn url_scheme_is_enforced() {
        assert!(validate_url("https://example.com/hook").is_ok());
        assert!(validate_url("http://localhost:8080").is_ok());
        assert_matches!(validate_url(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_url("ftp://example.com"), Err(CoreError::Validation(_)));
        assert_matches!(validate_url("https://"), Err(CoreError::Validation(_)));
        assert_matches!(validate_url("example.com"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn events_must_be_non_empty() {
        assert!(validate_events(&events(&["*"])).is_ok());
        assert_matches!(validate_events(&[]), Err(CoreError::Validation(_)));
        assert_matches!(validate_events(&events(&[" "])), Err(CoreError::Validation(_)));
    }

    #[test]
    fn header_names_are_tokens() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Partner-Key".to_string(), "abc".to_string());
        assert!(validate_headers(&headers).is_ok());

        headers.insert("Bad Header".to_string(), "v".to_string());
        assert_matches!(validate_headers(&headers), Err(CoreError::Validation(_)));
    }

    #[test]
    fn reserved_headers_cannot_be_overridden() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Webhook-Signature".to_string(), "forged".to_string());
        let err = validate_headers(&headers).unwrap_err();
        assert!(err.to_string().contains("cannot be overridden"));
    }

    #[test]
    fn header_values_reject_newlines() {
        let mut headers = BTreeMap::new();
        headers.insert("X-Ok".to_string(), "line\r\nInjected: 1".to_string());
        assert_matches!(validate_headers(&headers), Err(CoreError::Validation(_)));
    }

    #[test]
    fn name_length_is_bounded() {
        assert!(validate_name("").is_ok());
        assert!(validate_name(&"a".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn event_list_parsing_trims_and_drops_blanks() {
        assert_eq!(
            parse_event_list(" user.created, ,verification.verified "),
            events(&["user.created", "verification.verified"])
        );
        assert!(parse_event_list("").is_empty());
    }
}
