//! Ordered, case-insensitive header fields.
//!
//! One type serves both directions: the transport hands request headers in
//! through [`Request`](super::Request), and units build up response headers on
//! the context until the finalizer replays them onto the sink.

use std::fmt;

/// Header fields in arrival order, compared by name without regard to case.
///
/// A name may repeat (`Set-Cookie`, `Vary`); [`insert`](Self::insert) keeps
/// every value, [`set`](Self::set) collapses them to one.
///
/// # Examples
///
/// ```
/// use waypoint::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "text/html; charset=utf-8");
/// headers.insert("Vary", "Accept");
/// headers.insert("Vary", "Cookie");
///
/// assert_eq!(headers.get("content-type"), Some("text/html; charset=utf-8"));
/// assert_eq!(headers.get_all("vary").collect::<Vec<_>>(), ["Accept", "Cookie"]);
///
/// headers.set("VARY", "*");
/// assert_eq!(headers.get_all("Vary").count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds a field, keeping any existing values of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Leaves exactly one `name` field holding `value`.
    ///
    /// An existing field keeps its position; later duplicates are dropped.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let Some(first) = self.entries.iter().position(|(k, _)| same_name(k, &name)) else {
            self.entries.push((name, value.into()));
            return;
        };

        self.entries[first].1 = value.into();
        let tail = self.entries.split_off(first + 1);
        self.entries
            .extend(tail.into_iter().filter(|(k, _)| !same_name(k, &name)));
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| same_name(k, name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| same_name(k, name))
            .map(|(_, v)| v.as_str())
    }

    /// Drops every `name` field; `true` if there was one.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !same_name(k, name));
        self.entries.len() != before
    }

    /// Empties the map but keeps its allocation, for pooled contexts.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of fields, counting repeated names separately.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

impl fmt::Display for Headers {
    /// Renders the fields as HTTP/1.1 header lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.iter()
            .try_for_each(|(name, value)| write!(f, "{name}: {value}\r\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let headers: Headers = [("Accept-Encoding", "gzip")].into_iter().collect();
        for name in ["accept-encoding", "ACCEPT-ENCODING", "Accept-Encoding"] {
            assert_eq!(headers.get(name), Some("gzip"));
        }
        assert!(headers.contains("accept-encoding"));
        assert!(!headers.contains("accept"));
    }

    #[test]
    fn get_outlives_the_name_it_was_asked_for() {
        let headers: Headers = [("Content-Type", "text/plain")].into_iter().collect();
        let value = {
            let name = String::from("content-type");
            headers.get(&name)
        };
        assert_eq!(value, Some("text/plain"));
    }

    #[test]
    fn repeated_names_keep_every_value() {
        let mut headers = Headers::new();
        headers.insert("Set-Cookie", "session=1");
        headers.insert("set-cookie", "theme=dark");
        assert_eq!(
            headers.get_all("SET-COOKIE").collect::<Vec<_>>(),
            ["session=1", "theme=dark"]
        );
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn set_collapses_duplicates_at_first_position() {
        let mut headers: Headers = [
            ("Cache-Control", "no-cache"),
            ("Vary", "Accept"),
            ("ETag", "\"v1\""),
            ("vary", "Cookie"),
        ]
        .into_iter()
        .collect();
        headers.set("VARY", "*");

        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            [("Cache-Control", "no-cache"), ("Vary", "*"), ("ETag", "\"v1\"")]
        );
    }

    #[test]
    fn set_on_missing_name_appends() {
        let mut headers = Headers::new();
        headers.set("Location", "/next");
        assert_eq!(headers.get("location"), Some("/next"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut headers: Headers = [("X-Trace", "a"), ("x-trace", "b")].into_iter().collect();
        assert!(headers.remove("X-TRACE"));
        assert!(headers.is_empty());
        assert!(!headers.remove("x-trace"));
    }

    #[test]
    fn clear_keeps_allocation() {
        let mut headers = Headers::with_capacity(8);
        headers.insert("Server", "waypoint");
        headers.clear();
        assert!(headers.is_empty());
        assert!(headers.entries.capacity() >= 8);
    }

    #[test]
    fn display_renders_header_lines() {
        let headers: Headers = [("Content-Length", "2"), ("Connection", "close")]
            .into_iter()
            .collect();
        assert_eq!(headers.to_string(), "Content-Length: 2\r\nConnection: close\r\n");
    }
}
