//! Core utilities shared by the classifier, strategies, and the bypass manager.

pub mod analysis;
pub mod cookie;
pub mod types;

pub use analysis::{
    CF_RAY_HEADER, extract_ray_id, extract_site_key, is_cloudflare_response, normalize_domain,
    retry_after_from_body, retry_after_from_header,
};
pub use cookie::{CF_BM_COOKIE, CF_CLEARANCE_COOKIE, ClearanceCookie, now_millis};
pub use types::{Challenge, ChallengeResponse};
