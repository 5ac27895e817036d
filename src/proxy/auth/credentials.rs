//! Credential extraction from the request's header and cookie surface.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACCESS_COOKIE_NAME: &str = "timbal_access_token";
pub const REFRESH_COOKIE_NAME: &str = "timbal_refresh_token";

/// A caller-supplied proof of identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
    SessionCookie(String),
    RefreshCookie(String),
}

impl Credential {
    pub fn value(&self) -> &str {
        match self {
            Self::ApiKey(v) | Self::Bearer(v) | Self::SessionCookie(v) | Self::RefreshCookie(v) => v,
        }
    }

    /// Header credentials are exclusive: a rejection never falls back to cookies.
    pub fn is_header(&self) -> bool {
        matches!(self, Self::ApiKey(_) | Self::Bearer(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::Bearer(_) => "bearer",
            Self::SessionCookie(_) => "session_cookie",
            Self::RefreshCookie(_) => "refresh_cookie",
        }
    }
}

/// Trimmed header value, `Some("")` when the header is sent blank.
fn header_present<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .map(|v| v.to_str().unwrap_or_default().trim())
}

fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Ordered candidate list, highest priority first.
///
/// `x-api-key` wins outright, then `Authorization: Bearer`. A present header is
/// exclusive even when its value is blank. Only when neither header is present
/// are the session and refresh cookies considered, in that order.
pub fn extract_credentials(headers: &HeaderMap, jar: &CookieJar) -> Vec<Credential> {
    if let Some(key) = header_present(headers, API_KEY_HEADER) {
        return vec![Credential::ApiKey(key.to_string())];
    }

    if let Some(token) = header_present(headers, header::AUTHORIZATION)
        .and_then(|v| v.strip_prefix("Bearer").filter(|t| t.is_empty() || t.starts_with(' ')))
        .map(str::trim)
    {
        return vec![Credential::Bearer(token.to_string())];
    }

    let mut candidates = Vec::with_capacity(2);
    if let Some(access) = cookie_value(jar, ACCESS_COOKIE_NAME) {
        candidates.push(Credential::SessionCookie(access));
    }
    if let Some(refresh) = cookie_value(jar, REFRESH_COOKIE_NAME) {
        candidates.push(Credential::RefreshCookie(refresh));
    }
    candidates
}
