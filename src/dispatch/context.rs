//! Request, response and the per-request context handed to targets.

use std::fmt::Display;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::header::{CONTENT_TYPE, HOST, LOCATION, X_CONTENT_TYPE_OPTIONS};
use axum::http::{request, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use percent_encoding::percent_decode_str;
use serde_json::Value;

use super::RequestHandle;
use crate::cookie::{self, SetCookie};
use crate::routing::Control;
use crate::session::Session;

/// Content type used by [`Context::print`].
pub const CONTENT_TYPE_PLAIN_TEXT: &str = "text/plain; charset=utf-8";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An inbound request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct Request {
    handle: RequestHandle,
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    /// Create a bodiless request. A fresh correlation handle is assigned.
    ///
    /// The matching path is the URI path percent-decoded once.
    pub fn new(method: Method, uri: Uri) -> Self {
        let path = percent_decode_str(uri.path())
            .decode_utf8_lossy()
            .into_owned();
        Self {
            handle: RequestHandle::new(),
            method,
            uri,
            path,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Build from `http` request parts and an already collected body.
    pub fn from_parts(parts: request::Parts, body: Bytes) -> Self {
        let mut request = Self::new(parts.method, parts.uri);
        request.headers = parts.headers;
        request.body = body;
        request
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Correlation handle for in-flight introspection.
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Decoded path the route patterns are matched against, with the
    /// dispatcher prefix already stripped.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Host from the `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| self.uri.authority().map(|authority| authority.as_str()))
    }

    /// Look up a form argument: query string first, then an urlencoded body.
    pub fn argument(&self, key: &str) -> Option<String> {
        let from_query = self.query().and_then(|query| form_value(query.as_bytes(), key));
        from_query.or_else(|| {
            let is_form = self
                .headers
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE));
            if is_form {
                form_value(&self.body, key)
            } else {
                None
            }
        })
    }

    pub(crate) fn strip_prefix(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        if let Some(rest) = self.path.strip_prefix(prefix) {
            self.path = rest.to_string();
        }
    }
}

fn form_value(input: &[u8], key: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(name, value)| name == key && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// The response a pipeline builds up.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Append bytes to the body.
    pub fn write(&mut self, data: &[u8]) {
        self.body.extend_from_slice(data);
    }

    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Set `Content-Type`. Invalid values are ignored.
    pub fn set_content_type(&mut self, content_type: &str) {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    /// Replace the response with the standard not-found reply.
    pub fn not_found(&mut self) {
        self.status = StatusCode::NOT_FOUND;
        self.set_content_type(CONTENT_TYPE_PLAIN_TEXT);
        self.headers
            .insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        self.body.clear();
        self.write_str("404 page not found\n");
    }

    /// Convert into an `http` response for the hosting server.
    pub fn into_http(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Domain and path applied to cookies set from handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieScope {
    pub domain: String,
    pub path: String,
}

impl Default for CookieScope {
    fn default() -> Self {
        Self {
            domain: String::new(),
            path: "/".to_string(),
        }
    }
}

/// Everything a filter or handler sees: the bound session, the request and
/// the response being built.
#[derive(Debug)]
pub struct Context {
    session: Arc<Session>,
    request: Request,
    response: Response,
    cookie_scope: Arc<CookieScope>,
}

impl Context {
    pub fn new(
        session: Arc<Session>,
        request: Request,
        response: Response,
        cookie_scope: Arc<CookieScope>,
    ) -> Self {
        Self {
            session,
            request,
            response,
            cookie_scope,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Shorthand for `session().value(key)`.
    pub fn value(&self, key: &str) -> Option<Value> {
        self.session.value(key)
    }

    /// Shorthand for `session().str_value(key)`.
    pub fn str_value(&self, key: &str) -> Option<String> {
        self.session.str_value(key)
    }

    /// Shorthand for `session().set_value(key, value)`.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.session.set_value(key, value)
    }

    /// Write `text` as plain text and end the pipeline.
    pub fn print(&mut self, text: impl Display) -> Control {
        self.response.set_content_type(CONTENT_TYPE_PLAIN_TEXT);
        self.response.write_str(&text.to_string());
        Control::Return
    }

    /// Answer with a temporary redirect and end the pipeline.
    pub fn redirect(&mut self, location: &str) -> Control {
        self.response.set_status(StatusCode::TEMPORARY_REDIRECT);
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.response.headers_mut().insert(LOCATION, value);
            }
            Err(_) => tracing::warn!(location, "redirect target is not a valid header value"),
        }
        Control::Return
    }

    /// Set a browser-session cookie scoped to the dispatcher's domain and
    /// path.
    pub fn set_cookie(&mut self, name: &str, value: &str) {
        SetCookie::new(name, value)
            .domain(self.cookie_scope.domain.clone())
            .path(self.cookie_scope.path.clone())
            .append_to(self.response.headers_mut());
    }

    /// Cookie value sent with the request.
    pub fn cookie(&self, name: &str) -> Option<String> {
        cookie::find(self.request.headers(), name)
    }

    /// See [`Request::argument`].
    pub fn argument(&self, key: &str) -> Option<String> {
        self.request.argument(key)
    }

    pub fn host(&self) -> Option<&str> {
        self.request.host()
    }

    pub(crate) fn split_mut(&mut self) -> (&Request, &mut Response) {
        (&self.request, &mut self.response)
    }

    pub(crate) fn into_response(self) -> Response {
        self.response
    }
}
