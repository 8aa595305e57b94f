//! Challenge classification.
//!
//! Maps raw response signals onto a [`Challenge`]. Signals overlap between
//! challenge families (a Turnstile page also says "Just a moment"), so the
//! signature groups are evaluated in a fixed order and the first hit wins:
//! rate limit, CAPTCHA, JavaScript challenge, block, none.

use http::HeaderMap;
use http::header::RETRY_AFTER;

use crate::challenges::core::{
    Challenge, ChallengeResponse, extract_ray_id, extract_site_key, retry_after_from_body,
    retry_after_from_header,
};

/// Status Cloudflare (and most origins) use for rate limiting.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Back-off assumed when a rate-limited response gives no usable hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

const CAPTCHA_MARKERS: &[&str] = &[
    "cf-turnstile",
    "turnstile",
    "challenges.cloudflare.com/turnstile",
];

const JS_CHALLENGE_MARKERS: &[&str] = &[
    "Just a moment",
    "Checking your browser",
    "cf-browser-verification",
    "_cf_chl_opt",
    "challenge-platform",
];

const BLOCK_MARKERS: &[&str] = &["Access denied", "cf-error-details"];

/// Matched without regard to case.
const BLOCK_MARKERS_CASELESS: &[&str] = &["you have been blocked"];

/// Stateless classifier for hostile responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChallengeClassifier;

impl ChallengeClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a response. Unmatched input always yields [`Challenge::None`].
    pub fn classify(&self, status: u16, body: &str, headers: &HeaderMap) -> Challenge {
        let ray_id = || extract_ray_id(headers, body);

        if status == RATE_LIMIT_STATUS || headers.contains_key(RETRY_AFTER) {
            let retry_after_seconds = retry_after_from_header(headers)
                .or_else(|| retry_after_from_body(body))
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Challenge::RateLimited {
                retry_after_seconds,
                ray_id: ray_id(),
            };
        }

        if contains_any(body, CAPTCHA_MARKERS) {
            return Challenge::CaptchaChallenge {
                site_key: extract_site_key(body).unwrap_or_default(),
                ray_id: ray_id(),
            };
        }

        if contains_any(body, JS_CHALLENGE_MARKERS) {
            return Challenge::JsChallenge { ray_id: ray_id() };
        }

        if contains_any(body, BLOCK_MARKERS) || contains_any_caseless(body, BLOCK_MARKERS_CASELESS)
        {
            return Challenge::BlockedIp { ray_id: ray_id() };
        }

        Challenge::None
    }

    pub fn classify_response(&self, response: &ChallengeResponse<'_>) -> Challenge {
        self.classify(response.status, response.body, response.headers)
    }
}

fn contains_any(body: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| body.contains(marker))
}

fn contains_any_caseless(body: &str, markers: &[&str]) -> bool {
    let lowered = body.to_lowercase();
    markers.iter().any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::CF_RAY_HEADER;
    use http::HeaderValue;

    fn classify(status: u16, body: &str) -> Challenge {
        ChallengeClassifier::new().classify(status, body, &HeaderMap::new())
    }

    #[test]
    fn detects_turnstile_with_site_key() {
        let html = r#"
			<html><head><title>Just a moment...</title></head>
			<body>
				<div class="cf-turnstile" data-sitekey="0x4AAAAAAADnPIDROrmt1Wwj"></div>
				<script src="https://challenges.cloudflare.com/turnstile/v0/api.js"></script>
			</body>
			</html>
		"#;

        assert_eq!(
            classify(403, html),
            Challenge::CaptchaChallenge {
                site_key: "0x4AAAAAAADnPIDROrmt1Wwj".into(),
                ray_id: None,
            }
        );
    }

    #[test]
    fn captcha_without_site_key_uses_empty_key() {
        assert_eq!(
            classify(403, "<div class=\"cf-turnstile\"></div>"),
            Challenge::captcha("", None)
        );
    }

    #[test]
    fn rate_limit_wins_over_body_signals() {
        let challenge = classify(429, "<title>Just a moment...</title> wait 2 minutes");
        assert_eq!(challenge, Challenge::rate_limited(120, None));
    }

    #[test]
    fn retry_after_header_marks_rate_limit_on_any_status() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        let challenge = ChallengeClassifier::new().classify(503, "", &headers);
        assert_eq!(challenge, Challenge::rate_limited(30, None));
    }

    #[test]
    fn rate_limit_defaults_backoff() {
        assert_eq!(
            classify(429, "Too Many Requests"),
            Challenge::rate_limited(DEFAULT_RETRY_AFTER_SECS, None)
        );
    }

    #[test]
    fn js_challenge_markers() {
        for body in [
            "<title>Just a moment...</title>",
            "Checking your browser before accessing",
            "<div id=\"cf-browser-verification\">",
            "window._cf_chl_opt={cType: 'non-interactive'}",
            "/cdn-cgi/challenge-platform/h/b/orchestrate/jsch/v1",
        ] {
            assert_eq!(classify(503, body), Challenge::js(None), "body: {body}");
        }
    }

    #[test]
    fn block_markers() {
        assert_eq!(classify(403, "Access denied"), Challenge::blocked(None));
        assert_eq!(classify(403, "Sorry, You have been BLOCKED"), Challenge::blocked(None));
        assert_eq!(classify(403, "<div id=\"cf-error-details\">"), Challenge::blocked(None));
    }

    #[test]
    fn unrelated_body_is_none() {
        assert_eq!(classify(200, "<html><body>Chapter 1</body></html>"), Challenge::None);
        assert_eq!(classify(404, ""), Challenge::None);
    }

    #[test]
    fn attaches_ray_id_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert(CF_RAY_HEADER, HeaderValue::from_static("7f00aa11bb22cc33-FRA"));
        let challenge =
            ChallengeClassifier::new().classify(403, "<title>Just a moment...</title>", &headers);
        assert_eq!(challenge.ray_id(), Some("7f00aa11bb22cc33"));
    }

    #[test]
    fn classify_response_delegates() {
        let headers = HeaderMap::new();
        let response = ChallengeResponse::new(403, &headers, "Access denied");
        assert_eq!(
            ChallengeClassifier::new().classify_response(&response),
            Challenge::blocked(None)
        );
    }
}
