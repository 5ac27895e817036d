//! Client-held session cookies.
//!
//! The gateway never stores sessions itself; the access/refresh pair lives in
//! two cookies and every mutation is confined to the response being built.

use axum::http::{header, HeaderMap, Uri};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::credentials::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};
use super::identity::Session;

const ACCESS_COOKIE_MAX_AGE: time::Duration = time::Duration::hours(1);
const REFRESH_COOKIE_MAX_AGE: time::Duration = time::Duration::days(7);

/// Public origin of the request as the client sees it.
///
/// `X-Forwarded-Proto`/`X-Forwarded-Host` win over the request URL. Plain
/// `http` is only kept for loopback hosts.
pub fn request_origin(headers: &HeaderMap, uri: &Uri) -> String {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let protocol = forwarded("x-forwarded-proto")
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    let host = forwarded("x-forwarded-host")
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());

    let protocol = if protocol == "http" && !is_loopback_host(&host) {
        "https".to_string()
    } else {
        protocol
    };

    format!("{}://{}", protocol, host)
}

/// `localhost` or `127.0.0.1`, with or without a port.
pub fn is_loopback_host(host: &str) -> bool {
    let hostname = host.split(':').next().unwrap_or(host);
    hostname == "localhost" || hostname == "127.0.0.1"
}

/// Cookie attributes decided once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    /// When false a companion single-page client can read the access cookie.
    pub access_http_only: bool,
}

impl CookiePolicy {
    pub fn for_request(headers: &HeaderMap, uri: &Uri, access_http_only: bool) -> Self {
        let origin = request_origin(headers, uri);
        let host = origin.split("://").nth(1).unwrap_or_default();
        Self {
            secure: !is_loopback_host(host),
            access_http_only,
        }
    }
}

pub struct SessionStore {
    jar: CookieJar,
    policy: CookiePolicy,
}

impl SessionStore {
    pub fn new(jar: CookieJar, policy: CookiePolicy) -> Self {
        Self { jar, policy }
    }

    /// Current access token, if any.
    pub fn get(&self) -> Option<String> {
        self.cookie(ACCESS_COOKIE_NAME)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.cookie(REFRESH_COOKIE_NAME)
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.jar
            .get(name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Write (or rotate) both cookies. An empty refresh token leaves the
    /// refresh cookie untouched.
    pub fn set(&mut self, session: &Session) {
        let access = Cookie::build((ACCESS_COOKIE_NAME, session.access_token.clone()))
            .path("/")
            .http_only(self.policy.access_http_only)
            .secure(self.policy.secure)
            .same_site(SameSite::Lax)
            .max_age(ACCESS_COOKIE_MAX_AGE)
            .build();
        self.add(access);

        if !session.refresh_token.is_empty() {
            let refresh = Cookie::build((REFRESH_COOKIE_NAME, session.refresh_token.clone()))
                .path("/")
                .http_only(true)
                .secure(self.policy.secure)
                .same_site(SameSite::Lax)
                .max_age(REFRESH_COOKIE_MAX_AGE)
                .build();
            self.add(refresh);
        }
    }

    /// Expire both cookies.
    pub fn clear(&mut self) {
        for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
            let cookie = Cookie::build((name, ""))
                .path("/")
                .max_age(time::Duration::ZERO)
                .build();
            self.add(cookie);
        }
    }

    fn add(&mut self, cookie: Cookie<'static>) {
        self.jar = std::mem::take(&mut self.jar).add(cookie);
    }

    /// Jar carrying only the cookie changes made during this request.
    pub fn into_jar(self) -> CookieJar {
        self.jar
    }
}
