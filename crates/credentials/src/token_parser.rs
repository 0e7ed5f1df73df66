//! Extract an upstream bearer token from operator input.
//!
//! Operators either paste the token itself or a whole `curl` command copied
//! from the browser's network tab. For curl input the token is looked up in
//! order: the `puter_auth_token` cookie, an `auth_token` field in the request
//! body, a `Bearer` authorization header, and finally any JWT-shaped run.

use regex_lite::Regex;
use std::sync::LazyLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("empty input")]
    Empty,

    #[error("no auth token found in curl command")]
    NotFound,

    #[error("invalid token format")]
    InvalidFormat,
}

static COOKIE_HEADERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r#"(?i)-H\s+['"]Cookie:\s*([^'"]+)['"]"#,
        r#"(?i)--cookie\s+['"]([^'"]+)['"]"#,
        r#"(?i)-b\s+['"]([^'"]+)['"]"#,
    ])
});

static COOKIE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"puter_auth_token=([^;\s]+)").expect("valid regex"));

static BODY_FLAGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r#"(?i)-d\s+'(.+?)'"#,
        r#"(?i)--data\s+'(.+?)'"#,
        r#"(?i)--data-raw\s+'(.+?)'"#,
        r#"(?i)--data-binary\s+'(.+?)'"#,
    ])
});

static BODY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""auth_token"\s*:\s*"([^"]+)""#).expect("valid regex"));

static BEARER_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)-H\s+['"]Authorization:\s*Bearer\s+([^'"]+)['"]"#).expect("valid regex")
});

static JWT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+").expect("valid regex")
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
}

/// Turn operator input into a bearer secret.
pub fn parse_credential(input: &str) -> Result<String, TokenParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TokenParseError::Empty);
    }

    if input.to_ascii_lowercase().starts_with("curl ") {
        return from_curl(input).ok_or(TokenParseError::NotFound);
    }

    if input.starts_with("eyJ") && input.matches('.').count() == 2 {
        return Ok(input.to_string());
    }

    JWT.find(input)
        .map(|m| m.as_str().to_string())
        .ok_or(TokenParseError::InvalidFormat)
}

fn from_curl(command: &str) -> Option<String> {
    from_cookie(command)
        .or_else(|| from_body(command))
        .or_else(|| first_capture(&BEARER_HEADER, command).map(|t| t.trim().to_string()))
        .or_else(|| JWT.find(command).map(|m| m.as_str().to_string()))
}

fn from_cookie(command: &str) -> Option<String> {
    COOKIE_HEADERS
        .iter()
        .filter_map(|re| first_capture(re, command))
        .find_map(|cookies| first_capture(&COOKIE_TOKEN, cookies))
        .map(|t| t.trim().to_string())
}

fn from_body(command: &str) -> Option<String> {
    BODY_FLAGS
        .iter()
        .filter_map(|re| first_capture(re, command))
        .find_map(token_from_json)
}

fn token_from_json(body: &str) -> Option<String> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        if let Some(serde_json::Value::String(token)) = map.get("auth_token") {
            return Some(token.clone());
        }
    }
    first_capture(&BODY_TOKEN, body).map(str::to_string)
}

fn first_capture<'a>(re: &Regex, haystack: &'a str) -> Option<&'a str> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}
