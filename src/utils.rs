use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::NaiveDate;
use rand::{Rng, distr::Alphanumeric};
use reqwest::Url;
use sha2::{Digest, Sha256};

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Anti-CSRF value round-tripped through the provider's authorize redirect.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

pub fn generate_session_id() -> String {
    random_alphanumeric(32)
}

/// Normalises a provider release date to `YYYY-MM-DD`.
///
/// Dates with month or year precision are pinned to the first day of the
/// period. Unparseable values yield `None`.
pub fn normalize_release_date(date: Option<&str>, precision: Option<&str>) -> Option<String> {
    let date = date?.trim();
    if date.is_empty() {
        return None;
    }

    let parsed = match precision.unwrap_or("day") {
        "year" => date
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        "month" => NaiveDate::parse_from_str(&format!("{date}-01"), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
    };

    parsed.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Quotes a CSV field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Only relative paths on this host are accepted as post-login redirect targets.
///
/// Backslashes and control characters are refused outright since user agents
/// treat `/\host` like `//host`. What remains must resolve to the same origin.
pub fn sanitize_next_url(next_url: Option<&str>) -> Option<String> {
    let url = next_url?.trim();
    if !url.starts_with('/')
        || url.starts_with("//")
        || url.contains('\\')
        || url.chars().any(char::is_control)
    {
        return None;
    }

    let base = Url::parse("http://localhost/").ok()?;
    let resolved = base.join(url).ok()?;
    (resolved.origin() == base.origin()).then(|| url.to_string())
}
