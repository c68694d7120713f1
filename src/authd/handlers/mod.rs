pub mod health;
pub use self::health::health;

pub mod user;
pub use self::user::{create_user, login_history, patch_user, user_info};

pub mod token;
pub use self::token::{refresh_token, revoke_refresh_token, revoke_token, token_grant};

// common functions for the handlers
use axum::http::{header::USER_AGENT, HeaderMap};
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

pub fn valid_password(password: &str) -> bool {
    (8..=100).contains(&password.chars().count())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Raw user-agent string; missing or non-UTF8 headers map to one shared
/// "unknown" device slot.
pub fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

/// First hop of X-Forwarded-For, for the login audit record.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
