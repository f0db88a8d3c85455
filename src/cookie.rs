//! Cookie header reading and `Set-Cookie` formatting.

use std::time::Duration;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};

/// Find the value of cookie `name` in the request's `Cookie` headers.
///
/// Returns the first occurrence. Values wrapped in double quotes are
/// unquoted.
pub fn find(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// An outbound cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// `None` leaves the attribute out, making it a browser-session cookie.
    pub max_age: Option<Duration>,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: "/".to_string(),
            max_age: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Render the header value, or `None` when the name is not a valid
    /// cookie name.
    ///
    /// Bytes that may not appear in a cookie value are dropped, so a value
    /// can never add attributes of its own. Values containing a space or a
    /// comma are quoted. A domain that is not a plain host name is left out.
    pub fn format(&self) -> Option<String> {
        if !is_valid_name(&self.name) {
            return None;
        }

        let mut out = format!("{}={}", self.name, sanitize_value(&self.value));
        let path = sanitize_path(&self.path);
        if !path.is_empty() {
            out.push_str("; Path=");
            out.push_str(&path);
        }
        if !self.domain.is_empty() {
            if is_valid_domain(&self.domain) {
                out.push_str("; Domain=");
                out.push_str(self.domain.trim_start_matches('.'));
            } else {
                tracing::warn!(
                    cookie = %self.name,
                    domain = %self.domain,
                    "ignoring invalid cookie domain"
                );
            }
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        out.push_str("; HttpOnly");
        Some(out)
    }

    /// Append this cookie to a response header map.
    ///
    /// Cookies with an invalid name are dropped with a warning.
    pub fn append_to(&self, headers: &mut HeaderMap) {
        let value = self
            .format()
            .and_then(|line| HeaderValue::from_str(&line).ok());
        match value {
            Some(value) => {
                headers.append(SET_COOKIE, value);
            }
            None => tracing::warn!(cookie = %self.name, "dropping cookie with invalid name"),
        }
    }
}

/// RFC 7230 token characters.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

fn is_cookie_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}

fn sanitize_value(value: &str) -> String {
    let cleaned: String = value
        .bytes()
        .filter(|b| is_cookie_value_byte(*b))
        .map(char::from)
        .collect();
    if cleaned.contains(' ') || cleaned.contains(',') {
        format!("\"{}\"", cleaned)
    } else {
        cleaned
    }
}

fn sanitize_path(path: &str) -> String {
    path.bytes()
        .filter(|b| (0x20..0x7f).contains(b) && *b != b';')
        .map(char::from)
        .collect()
}

fn is_valid_domain(domain: &str) -> bool {
    let host = domain.trim_start_matches('.');
    !host.is_empty()
        && host.len() <= 255
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}
