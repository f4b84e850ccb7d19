//! Session cookie minted from a verified bridge token.
//!
//! The cookie is `HttpOnly`, `SameSite=Strict`, scoped to `Path=/`, and
//! `Secure` whenever the request arrived over TLS.

use axum::http::{header::COOKIE, HeaderMap};

/// Cookie settings for one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    max_age_seconds: u64,
}

impl SessionCookie {
    #[must_use]
    pub fn new(name: impl Into<String>, max_age_seconds: u64) -> Self {
        Self {
            name: name.into(),
            max_age_seconds,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Set-Cookie` value carrying `token`.
    #[must_use]
    pub fn issue(&self, token: &str, secure: bool) -> String {
        let secure_flag = if secure { "; Secure" } else { "" };
        format!(
            "{}={token}; HttpOnly{secure_flag}; SameSite=Strict; Path=/; Max-Age={}",
            self.name, self.max_age_seconds
        )
    }

    /// `Set-Cookie` value that expires the cookie immediately.
    #[must_use]
    pub fn clear(&self, secure: bool) -> String {
        let secure_flag = if secure { "; Secure" } else { "" };
        format!(
            "{}=; HttpOnly{secure_flag}; SameSite=Strict; Path=/; Max-Age=0",
            self.name
        )
    }

    /// Read the cookie's value from request headers. Empty values count as absent.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Option<String> {
        let prefix = format!("{}=", self.name);
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|part| part.trim().strip_prefix(prefix.as_str()))
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(ToString::to_string)
    }
}
