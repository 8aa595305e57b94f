//! Response inspection helpers and domain normalization.
//!
//! Provides the building blocks the classifier and the cookie store rely on to
//! read identifiers out of Cloudflare pages and to key credentials by host.

use http::HeaderMap;
use http::header::{RETRY_AFTER, SERVER};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use url::Url;

/// Header Cloudflare uses to tag every response with its ray identifier.
pub const CF_RAY_HEADER: &str = "cf-ray";

/// Canonicalize a URL or host into the key used for clearance credentials.
///
/// Strips the scheme, userinfo, port, path, query and fragment, lowercases the
/// host and removes a single leading `www.` label. The same host always maps
/// to the same key regardless of how it was spelled.
pub fn normalize_domain(url_or_domain: &str) -> String {
    let trimmed = url_or_domain.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let host = parse_host(trimmed).unwrap_or_else(|| split_host(trimmed));
    let host = host.to_lowercase();
    match host.strip_prefix("www.") {
        Some(stripped) => stripped.to_string(),
        None => host,
    }
}

fn parse_host(input: &str) -> Option<String> {
    let candidate = if input.contains("://") {
        Url::parse(input).ok()?
    } else {
        Url::parse(&format!("http://{input}")).ok()?
    };
    candidate
        .host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|host| !host.is_empty())
}

fn split_host(input: &str) -> String {
    let without_scheme = input
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(input);
    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    host_port
        .split(':')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Detect whether the response was served by Cloudflare.
pub fn is_cloudflare_response(headers: &HeaderMap) -> bool {
    let server = headers
        .get(SERVER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().starts_with("cloudflare"))
        .unwrap_or(false);
    server || headers.contains_key(CF_RAY_HEADER)
}

/// Pull the ray identifier from the `CF-RAY` header or the page body.
pub fn extract_ray_id(headers: &HeaderMap, body: &str) -> Option<String> {
    if let Some(raw) = headers
        .get(CF_RAY_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        // The header carries a `-COLO` suffix the page itself never shows.
        let id = raw.trim().split('-').next().unwrap_or_default();
        if !id.is_empty() {
            return Some(id.to_ascii_lowercase());
        }
    }

    RAY_ID_BODY_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

/// Extract the Turnstile/CAPTCHA site key, if the widget exposes one.
pub fn extract_site_key(body: &str) -> Option<String> {
    SITE_KEY_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|key| !key.is_empty())
}

/// Seconds advertised by a numeric `Retry-After` header.
///
/// HTTP-date values are ignored so classification stays independent of the
/// current time.
pub fn retry_after_from_header(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| seconds.ceil() as u64)
}

/// Seconds mentioned in a rate-limit page ("try again in 10 minutes").
pub fn retry_after_from_body(body: &str) -> Option<u64> {
    let caps = RETRY_DELAY_BODY_RE.captures(body)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "minute" | "minutes" => 60,
        "hour" | "hours" => 3600,
        _ => 1,
    };
    Some(amount.saturating_mul(multiplier))
}

static RAY_ID_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(
        r#"(?:ray\s+id:?\s*(?:<[^>]+>\s*)*|data-ray=["']|cRay:\s*["'])([0-9a-f]{8,32})"#,
    )
    .case_insensitive(true)
    .build()
    .expect("invalid ray id regex")
});

static SITE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r#"data-sitekey\s*=\s*["']([^"']*)["']"#)
        .case_insensitive(true)
        .build()
        .expect("invalid site key regex")
});

static RETRY_DELAY_BODY_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"(\d+)\s*(seconds?|minutes?|hours?)\b")
        .case_insensitive(true)
        .build()
        .expect("invalid delay regex")
});
