//! The inbound request as delivered by the transport layer.
//!
//! Parsing the wire format is the transport's job; by the time a request
//! reaches the dispatcher its method, target, and headers are already split
//! out and its body is an unread byte stream.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes};
use url::form_urlencoded;

use super::{Headers, Method};

/// A request ready to be dispatched.
///
/// The body is kept as a reader so units can stream it; [`Context::read_body`]
/// buffers it on demand.
///
/// [`Context::read_body`]: crate::Context::read_body
///
/// # Examples
///
/// ```
/// use waypoint::http::{Method, Request};
///
/// let request = Request::new("GET", "/hello?name=world")
///     .header("Host", "localhost");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    params: HashMap<String, String>,
    headers: Headers,
    body: Box<dyn Read + Send>,
}

impl Request {
    /// Creates a request for `target`, a path optionally followed by `?query`.
    ///
    /// Unknown method strings are kept as [`Method::Custom`]; the dispatcher
    /// reports them as unsupported instead of routing them.
    pub fn new(method: impl AsRef<str>, target: &str) -> Self {
        let Ok(method) = method.as_ref().parse::<Method>();
        let (path, query) = match target.find('?') {
            Some(pos) => (
                target[..pos].to_owned(),
                Some(target[pos + 1..].to_owned()),
            ),
            None => (target.to_owned(), None),
        };
        let params = query.as_deref().map(parse_query_string).unwrap_or_default();

        Self {
            method,
            path,
            query,
            params,
            headers: Headers::new(),
            body: Box::new(io::empty()),
        }
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces all request headers.
    #[must_use]
    pub fn headers_from(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Uses an in-memory buffer as the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Box::new(body.into().reader());
        self
    }

    /// Uses an arbitrary stream as the request body.
    #[must_use]
    pub fn body_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Box::new(reader);
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns a parsed query parameter value by key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    pub(crate) fn body_mut(&mut self) -> &mut (dyn Read + Send) {
        self.body.as_mut()
    }

    pub(crate) fn replace_body(&mut self, body: Box<dyn Read + Send>) {
        self.body = body;
    }
}

impl Default for Request {
    fn default() -> Self {
        Self {
            method: Method::Get,
            path: String::new(),
            query: None,
            params: HashMap::new(),
            headers: Headers::new(),
            body: Box::new(io::empty()),
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Decodes an `application/x-www-form-urlencoded` query string.
///
/// `+` and percent escapes are decoded; a repeated key keeps its last value.
/// The raw string stays available through `query_string`.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_path_and_query() {
        let req = Request::new("GET", "/search?q=rust+lang&page=2");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=rust+lang&page=2"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("page"), Some("2"));
    }

    #[test]
    fn query_values_are_percent_decoded() {
        let req = Request::new("GET", "/s?q=a%20b&city=K%C3%B6ln&empty=&flag");
        assert_eq!(req.query_param("q"), Some("a b"));
        assert_eq!(req.query_param("city"), Some("Köln"));
        assert_eq!(req.query_param("empty"), Some(""));
        assert_eq!(req.query_param("flag"), Some(""));
        assert_eq!(req.query_string(), Some("q=a%20b&city=K%C3%B6ln&empty=&flag"));
    }

    #[test]
    fn no_query() {
        let req = Request::new("POST", "/users");
        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.query_string(), None);
        assert_eq!(req.query_param("q"), None);
    }

    #[test]
    fn custom_method_is_kept() {
        let req = Request::new("BREW", "/pot");
        assert_eq!(req.method(), &Method::Custom("BREW".into()));
    }

    #[test]
    fn body_is_readable() {
        let mut req = Request::new("POST", "/").body("hello");
        let mut buf = String::new();
        req.body_mut().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "hello");
    }

    #[test]
    fn content_length() {
        let req = Request::new("POST", "/").header("Content-Length", "5");
        assert_eq!(req.content_length(), Some(5));
    }
}
