//! Quota / rate-limit detection
//!
//! Gemini reports exhausted quotas as HTTP 429 with a `RESOURCE_EXHAUSTED`
//! body whose message embeds the retry delay ("Please retry in 46.69s."),
//! the model and the limit. This module recognises those failures and pulls
//! the metadata out of the text so callers can render "try again in N
//! seconds" instead of a generic error.

use regex::Regex;
use sdk::types::QuotaInfo;
use std::sync::OnceLock;

/// Phrases that mark an error text as a quota failure (matched lower-case)
const QUOTA_MARKERS: &[&str] = &[
    "quota exceeded",
    "resource_exhausted",
    "rate limit",
    "generate_content_free_tier_requests",
    "retry in",
];

struct Patterns {
    status_429: Regex,
    retry_in: Regex,
    after_seconds: Regex,
    retry_delay: Regex,
    model: Regex,
    limit: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        status_429: Regex::new(r"\b429\b").expect("Invalid status pattern"),
        retry_in: Regex::new(r"retry in ([\d.]+)s").expect("Invalid retry pattern"),
        after_seconds: Regex::new(r"after ([\d.]+) seconds").expect("Invalid after pattern"),
        retry_delay: Regex::new(r#""retrydelay"\s*:\s*"([\d.]+)s""#)
            .expect("Invalid retryDelay pattern"),
        model: Regex::new(r"model: ([\w.-]+)").expect("Invalid model pattern"),
        limit: Regex::new(r"limit: (\d+)").expect("Invalid limit pattern"),
    })
}

/// True if `text` looks like a quota / rate-limit failure.
pub fn is_quota_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    QUOTA_MARKERS.iter().any(|marker| lower.contains(marker))
        || patterns().status_429.is_match(&lower)
}

/// Extract the retry delay in seconds from an error text.
///
/// Tries "retry in Ns", then "after N seconds", then a JSON `retryDelay`.
pub fn parse_retry_after(text: &str) -> Option<f64> {
    let lower = text.to_lowercase();
    let p = patterns();
    [&p.retry_in, &p.after_seconds, &p.retry_delay]
        .iter()
        .find_map(|re| re.captures(&lower))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().trim_end_matches('.').parse::<f64>().ok())
}

/// Build [`QuotaInfo`] from an upstream error text.
///
/// `retry_after_header` is the HTTP `Retry-After` header value, used only
/// when the body names no delay.
pub fn quota_info_from_text(text: &str, retry_after_header: Option<&str>) -> QuotaInfo {
    let p = patterns();
    let lower = text.to_lowercase();

    let retry_after_secs = parse_retry_after(text)
        .or_else(|| retry_after_header.and_then(|h| h.trim().parse::<f64>().ok()));

    let model = p
        .model
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string());

    let limit = p
        .limit
        .captures(&lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());

    QuotaInfo {
        retry_after_secs,
        model,
        limit,
        details: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GEMINI_429: &str = "You exceeded your current quota, please check your plan and billing details. \
        * Quota exceeded for metric: generativelanguage.googleapis.com/generate_content_free_tier_requests, \
        limit: 20, model: gemini-2.5-flash\nPlease retry in 46.69s.";

    #[test]
    fn test_detects_quota_markers() {
        assert!(is_quota_error(GEMINI_429));
        assert!(is_quota_error("HTTP 429 Too Many Requests"));
        assert!(is_quota_error("status: RESOURCE_EXHAUSTED"));
        assert!(is_quota_error("Rate limit reached"));
        assert!(!is_quota_error("invalid API key"));
    }

    #[test]
    fn test_429_only_as_a_whole_number() {
        assert!(is_quota_error("upstream said 429"));
        assert!(is_quota_error("status=429,"));
        assert!(!is_quota_error("request id 84291 failed"));
        assert!(!is_quota_error("field 'x4290' is invalid"));
    }

    #[test]
    fn test_extracts_retry_model_and_limit() {
        let info = quota_info_from_text(GEMINI_429, None);
        let retry = info.retry_after_secs.unwrap();
        assert!((retry - 46.69).abs() < 1e-9);
        assert_eq!(info.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(info.limit, Some(20));
        assert_eq!(info.details, GEMINI_429);
    }

    #[test]
    fn test_alternative_retry_formats() {
        assert_eq!(parse_retry_after("try again after 30 seconds"), Some(30.0));
        assert_eq!(
            parse_retry_after(r#"{"@type": "RetryInfo", "retryDelay": "17s"}"#),
            Some(17.0)
        );
        assert_eq!(parse_retry_after("no hint here"), None);
    }

    #[test]
    fn test_header_fallback() {
        let info = quota_info_from_text("Too Many Requests", Some("5"));
        assert_eq!(info.retry_after_secs, Some(5.0));
        assert_eq!(info.model, None);
        assert_eq!(info.limit, None);

        let info = quota_info_from_text("Please retry in 2.5s", Some("5"));
        assert_eq!(info.retry_after_secs, Some(2.5));
    }
}
