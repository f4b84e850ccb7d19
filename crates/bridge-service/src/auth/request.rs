//! Reading credentials and transport facts off an incoming request.

use axum::http::{header::AUTHORIZATION, header::HOST, HeaderMap, Uri};

const FORWARDED_PROTO: &str = "x-forwarded-proto";
const FORWARDED_HOST: &str = "x-forwarded-host";

/// What the `Authorization` header holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerHeader {
    Absent,
    /// Present but not a `Bearer` credential (or not valid UTF-8).
    NotBearer,
    /// `Bearer` with nothing after it.
    Empty,
    Token(String),
}

/// Classify the `Authorization` header.
#[must_use]
pub fn bearer_header(headers: &HeaderMap) -> BearerHeader {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return BearerHeader::Absent;
    };
    let Ok(value) = value.to_str() else {
        return BearerHeader::NotBearer;
    };
    let Some(token) = value.strip_prefix("Bearer ") else {
        return if value.trim() == "Bearer" {
            BearerHeader::Empty
        } else {
            BearerHeader::NotBearer
        };
    };
    match token.trim() {
        "" => BearerHeader::Empty,
        token => BearerHeader::Token(token.to_string()),
    }
}

fn first_forwarded_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn scheme(headers: &HeaderMap, uri: &Uri) -> String {
    first_forwarded_value(headers, FORWARDED_PROTO)
        .map(str::to_ascii_lowercase)
        .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
        .unwrap_or_else(|| "http".to_string())
}

/// Whether the request reached us over TLS, directly or via a proxy.
#[must_use]
pub fn is_secure(headers: &HeaderMap, uri: &Uri) -> bool {
    scheme(headers, uri) == "https"
}

/// The origin the request was addressed to (`scheme://host[:port]`).
#[must_use]
pub fn request_origin(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let host = first_forwarded_value(headers, FORWARDED_HOST)
        .or_else(|| headers.get(HOST).and_then(|h| h.to_str().ok()))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(ToString::to_string)
        .or_else(|| uri.authority().map(ToString::to_string))?;

    Some(format!("{}://{host}", scheme(headers, uri)))
}
