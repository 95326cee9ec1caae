//! Route patterns: compile human-written path patterns into anchored matchers.
//!
//! A pattern is a sequence of `/`-delimited chunks:
//!
//! | Chunk         | Meaning                                          | Example            |
//! |---------------|--------------------------------------------------|--------------------|
//! | `users`       | static text, matched literally                   | `/users`           |
//! | `:id`         | named parameter, one non-slash run               | `/users/:id`       |
//! | `*`           | unnamed wildcard, one non-slash run              | `/files/*`         |
//! | `(\d+)`       | unnamed inline sub-pattern                       | `/orders/(\d+)`    |
//! | `:id(\d+)`    | named parameter with an inline sub-pattern       | `/users/:id(\d+)`  |
//!
//! A trailing `?`, `+`, or `*` on a chunk makes it optional, one-or-more, or
//! zero-or-more. Repeated named chunks capture the whole slash-joined run, so
//! `/a/:rest+/c` binds `rest` to `1/2/3` for `/a/1/2/3/c`. Every pattern is
//! anchored at both ends and tolerates exactly one trailing slash.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use crate::context::Params;

/// Sub-pattern used by chunks that do not carry an inline one.
const DEFAULT_SUB_PATTERN: &str = "[^/]+";

/// Reasons a route pattern fails to compile.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("route pattern `{0}` must start with a leading slash")]
    MissingLeadingSlash(String),

    #[error("route pattern `{0}` has a dynamic chunk without a name")]
    UnnamedDynamicChunk(String),

    #[error("route pattern `{0}` has a chunk with more than one sub-pattern")]
    MultipleSubPatterns(String),

    #[error("route pattern `{0}` has an unterminated sub-pattern")]
    UnterminatedSubPattern(String),

    #[error("route pattern `{pattern}` names parameter `{name}` more than once")]
    DuplicateParameter { pattern: String, name: String },

    #[error("route pattern `{pattern}` is not a valid matcher: {source}")]
    InvalidMatcher {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ChunkKind {
    // Nothing seen yet; an empty chunk contributes nothing to the matcher.
    #[default]
    Empty,
    Static,
    Dynamic,
    Wildcard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Modifier {
    #[default]
    Single,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

impl Modifier {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '?' => Some(Self::Optional),
            '+' => Some(Self::OneOrMore),
            '*' => Some(Self::ZeroOrMore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Chunk {
    kind: ChunkKind,
    modifier: Modifier,
    name: String,
    literal: String,
    sub_pattern: Option<String>,
}

impl Chunk {
    // The regex fragment one repetition of this chunk must match.
    fn body(&self) -> String {
        match (&self.sub_pattern, self.kind) {
            (Some(sub_pattern), _) => sub_pattern.clone(),
            (None, ChunkKind::Static) if !self.literal.is_empty() => regex::escape(&self.literal),
            _ => DEFAULT_SUB_PATTERN.to_owned(),
        }
    }

    fn write_regex(&self, out: &mut String) {
        let body = self.body();
        let one = format!("(?:{body})");
        match self.kind {
            ChunkKind::Empty => {}
            ChunkKind::Static | ChunkKind::Wildcard => match self.modifier {
                Modifier::Single => out.push_str(&format!("/{one}")),
                Modifier::Optional => out.push_str(&format!("(?:/{one})?")),
                Modifier::OneOrMore => out.push_str(&format!("/{one}(?:/{one})*")),
                Modifier::ZeroOrMore => out.push_str(&format!("(?:/{one}(?:/{one})*)?")),
            },
            ChunkKind::Dynamic => {
                let name = &self.name;
                match self.modifier {
                    Modifier::Single => out.push_str(&format!("/(?P<{name}>{one})")),
                    Modifier::Optional => out.push_str(&format!("(?:/(?P<{name}>{one}))?")),
                    Modifier::OneOrMore => {
                        out.push_str(&format!("/(?P<{name}>{one}(?:/{one})*)"));
                    }
                    Modifier::ZeroOrMore => {
                        out.push_str(&format!("(?:/(?P<{name}>{one}(?:/{one})*))?"));
                    }
                }
            }
        }
    }
}

fn reject_duplicate_names(pattern: &str, chunks: &[Chunk]) -> Result<(), PatternError> {
    let mut seen = HashSet::new();
    for chunk in chunks.iter().filter(|chunk| chunk.kind == ChunkKind::Dynamic) {
        if !seen.insert(chunk.name.as_str()) {
            return Err(PatternError::DuplicateParameter {
                pattern: pattern.to_owned(),
                name: chunk.name.clone(),
            });
        }
    }
    Ok(())
}

// Splits a pattern into chunks, scanning left to right.
fn parse_chunks(pattern: &str) -> Result<Vec<Chunk>, PatternError> {
    let Some(rest) = pattern.strip_prefix('/') else {
        return Err(PatternError::MissingLeadingSlash(pattern.to_owned()));
    };

    let close = |chunk: Chunk| {
        if chunk.kind == ChunkKind::Dynamic && chunk.name.is_empty() {
            Err(PatternError::UnnamedDynamicChunk(pattern.to_owned()))
        } else {
            Ok(chunk)
        }
    };

    let mut chunks = Vec::new();
    let mut chunk = Chunk::default();
    let mut chars = rest.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c == '/' {
            chunks.push(close(std::mem::take(&mut chunk))?);
            continue;
        }

        if chunk.kind == ChunkKind::Empty {
            match c {
                ':' => {
                    chunk.kind = ChunkKind::Dynamic;
                    continue;
                }
                '*' => {
                    chunk.kind = ChunkKind::Wildcard;
                    continue;
                }
                '(' => chunk.kind = ChunkKind::Wildcard,
                _ => chunk.kind = ChunkKind::Static,
            }
        }

        if c == '(' {
            if chunk.kind == ChunkKind::Dynamic && chunk.name.is_empty() {
                return Err(PatternError::UnnamedDynamicChunk(pattern.to_owned()));
            }
            if chunk.sub_pattern.is_some() || !chunk.literal.is_empty() {
                return Err(PatternError::MultipleSubPatterns(pattern.to_owned()));
            }

            let start = offset + 1;
            let mut depth = 1usize;
            let mut escaped = false;
            let mut end = None;
            for (inner_offset, inner) in chars.by_ref() {
                match inner {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(inner_offset);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            let end = end.ok_or_else(|| PatternError::UnterminatedSubPattern(pattern.to_owned()))?;
            chunk.sub_pattern = Some(rest[start..end].to_owned());
            continue;
        }

        let ends_chunk = chars.peek().is_none_or(|&(_, next)| next == '/');
        if ends_chunk {
            if let Some(modifier) = Modifier::from_char(c) {
                chunk.modifier = modifier;
                continue;
            }
        }

        match chunk.kind {
            ChunkKind::Dynamic => chunk.name.push(c),
            ChunkKind::Static => chunk.literal.push(c),
            ChunkKind::Wildcard | ChunkKind::Empty => {}
        }
    }
    chunks.push(close(chunk)?);

    Ok(chunks)
}

fn regex_source(chunks: &[Chunk]) -> String {
    let mut out = String::from("^");
    for chunk in chunks {
        chunk.write_regex(&mut out);
    }
    out.push_str("/?$");
    out
}

/// A compiled route pattern.
///
/// Patterns are immutable once built and cheap to clone; one compiled
/// pattern is shared by every request that reaches its binding.
///
/// # Examples
///
/// ```
/// use waypoint::router::Pattern;
///
/// let pattern = Pattern::new("/users/:id(\\d+)/:tab?").unwrap();
///
/// let params = pattern.matches("/users/42").unwrap();
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.get("tab"), Some(""));
///
/// assert!(pattern.matches("/users/abc").is_none());
/// assert!(Pattern::new("users").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    // (capture index, parameter name) for every named chunk.
    names: Vec<(usize, String)>,
}

impl Pattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// - [`PatternError::MissingLeadingSlash`]: the pattern does not start with `/`.
    /// - [`PatternError::UnnamedDynamicChunk`]: a `:` chunk has no name.
    /// - [`PatternError::MultipleSubPatterns`]: a chunk carries two sub-patterns.
    /// - [`PatternError::UnterminatedSubPattern`]: a `(` is never closed.
    /// - [`PatternError::DuplicateParameter`]: two dynamic chunks share a name.
    /// - [`PatternError::InvalidMatcher`]: the assembled matcher does not compile.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let chunks = parse_chunks(pattern)?;
        reject_duplicate_names(pattern, &chunks)?;
        let regex = Regex::new(&regex_source(&chunks)).map_err(|source| {
            PatternError::InvalidMatcher {
                pattern: pattern.to_owned(),
                source,
            }
        })?;
        let names = regex
            .capture_names()
            .enumerate()
            .filter_map(|(index, name)| name.map(|name| (index, name.to_owned())))
            .collect();

        Ok(Self {
            source: pattern.to_owned(),
            regex,
            names,
        })
    }

    /// Matches `path`, returning the bound parameters on success.
    ///
    /// Every named chunk appears in the result; optional and zero-or-more
    /// chunks that did not participate bind to the empty string.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        self.match_into(path, &mut params).then_some(params)
    }

    /// Matches `path`, binding parameters into a caller-owned map.
    ///
    /// On success `params` is cleared and refilled; on failure it is left
    /// untouched. Behaves exactly like [`matches`](Self::matches) otherwise.
    pub fn match_into(&self, path: &str, params: &mut Params) -> bool {
        let Some(captures) = self.regex.captures(path) else {
            return false;
        };

        params.clear();
        for (index, name) in &self.names {
            let value = captures.get(*index).map_or("", |m| m.as_str());
            params.insert(name, value);
        }
        true
    }

    /// Returns the pattern exactly as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, path: &str) -> Option<Params> {
        Pattern::new(pattern).unwrap().matches(path)
    }

    // ── parse_chunks ──────────────────────────────────────────────────────────

    #[test]
    fn parse_static_chunks() {
        let chunks = parse_chunks("/a/bc").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].kind, ChunkKind::Static);
        assert_eq!(chunks[1].literal, "bc");
        assert_eq!(chunks[1].modifier, Modifier::Single);
    }

    #[test]
    fn parse_dynamic_with_modifier_and_sub_pattern() {
        let chunks = parse_chunks("/:id(\\d+)?").unwrap();
        assert_eq!(chunks[0].kind, ChunkKind::Dynamic);
        assert_eq!(chunks[0].name, "id");
        assert_eq!(chunks[0].sub_pattern.as_deref(), Some("\\d+"));
        assert_eq!(chunks[0].modifier, Modifier::Optional);
    }

    #[test]
    fn parse_double_star_is_zero_or_more_wildcard() {
        let chunks = parse_chunks("/**").unwrap();
        assert_eq!(chunks[0].kind, ChunkKind::Wildcard);
        assert_eq!(chunks[0].modifier, Modifier::ZeroOrMore);
    }

    #[test]
    fn parse_nested_and_escaped_parens() {
        let chunks = parse_chunks("/:v((a|b)\\)x)").unwrap();
        assert_eq!(chunks[0].sub_pattern.as_deref(), Some("(a|b)\\)x"));
    }

    #[test]
    fn parse_root_is_one_empty_chunk() {
        let chunks = parse_chunks("/").unwrap();
        assert_eq!(chunks, vec![Chunk::default()]);
    }

    // ── compile errors ────────────────────────────────────────────────────────

    #[test]
    fn error_without_leading_slash() {
        assert!(matches!(
            Pattern::new("a/b/c"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
        assert!(matches!(Pattern::new(""), Err(PatternError::MissingLeadingSlash(_))));
    }

    #[test]
    fn error_on_unnamed_dynamic_chunk() {
        assert!(matches!(
            Pattern::new("/a/:(\\d+)/c"),
            Err(PatternError::UnnamedDynamicChunk(_))
        ));
        assert!(matches!(
            Pattern::new("/a/:"),
            Err(PatternError::UnnamedDynamicChunk(_))
        ));
    }

    #[test]
    fn error_on_unterminated_sub_pattern() {
        assert!(matches!(
            Pattern::new("/a/:b(\\d+/c"),
            Err(PatternError::UnterminatedSubPattern(_))
        ));
        assert!(matches!(
            Pattern::new("/a/b/c("),
            Err(PatternError::MultipleSubPatterns(_))
        ));
    }

    #[test]
    fn error_on_second_sub_pattern() {
        assert!(matches!(
            Pattern::new("/:a(x)(y)"),
            Err(PatternError::MultipleSubPatterns(_))
        ));
    }

    #[test]
    fn error_on_invalid_sub_pattern() {
        assert!(matches!(
            Pattern::new("/:a([)"),
            Err(PatternError::InvalidMatcher { .. })
        ));
    }

    #[test]
    fn error_on_repeated_parameter_name() {
        match Pattern::new("/:a/x/:a") {
            Err(PatternError::DuplicateParameter { pattern, name }) => {
                assert_eq!(pattern, "/:a/x/:a");
                assert_eq!(name, "a");
            }
            other => panic!("expected DuplicateParameter, got {other:?}"),
        }
        assert!(matches!(
            Pattern::new("/:id(\\d+)/:id?"),
            Err(PatternError::DuplicateParameter { .. })
        ));
        assert!(Pattern::new("/:a/:b").is_ok());
    }

    // ── static ────────────────────────────────────────────────────────────────

    #[test]
    fn static_matches_exactly_with_optional_trailing_slash() {
        assert!(matches("/users", "/users").is_some());
        assert!(matches("/users", "/users/").is_some());
        assert!(matches("/users", "/Users").is_none());
        assert!(matches("/users", "/users//").is_none());
        assert!(matches("/users", "/users/1").is_none());
        assert!(matches("/users", "/prefix/users").is_none());
    }

    #[test]
    fn static_text_is_literal() {
        assert!(matches("/a.b", "/a.b").is_some());
        assert!(matches("/a.b", "/axb").is_none());
    }

    #[test]
    fn root_matches_root_only() {
        assert!(matches("/", "/").is_some());
        assert!(matches("/", "").is_some());
        assert!(matches("/", "/a").is_none());
    }

    #[test]
    fn static_modifiers() {
        assert!(matches("/a/b?/c", "/a/c").is_some());
        assert!(matches("/a/b?/c", "/a/b/c").is_some());
        assert!(matches("/a/b?/c", "/a/d").is_none());
        assert!(matches("/a/b+/c", "/a/b/b/c/").is_some());
        assert!(matches("/a/b+/c", "/a/c").is_none());
        assert!(matches("/a/b*/c", "/a/c").is_some());
        assert!(matches("/a/b*/c", "/a/b/b/c").is_some());
        assert!(matches("/a/b*/c", "/a/d").is_none());
    }

    // ── dynamic ───────────────────────────────────────────────────────────────

    #[test]
    fn dynamic_binds_value() {
        let params = matches("/a/:b/c", "/a/123/c/").unwrap();
        assert_eq!(params.get("b"), Some("123"));
        assert_eq!(params.len(), 1);
        assert!(matches("/a/:b/c", "/a/123/d").is_none());
    }

    #[test]
    fn optional_dynamic_binds_empty_string() {
        let params = matches("/a/:b?/c", "/a/c").unwrap();
        assert_eq!(params.get("b"), Some(""));
        let params = matches("/a/:b*/c", "/a/c/").unwrap();
        assert_eq!(params.get("b"), Some(""));
    }

    #[test]
    fn repeated_dynamic_captures_joined_run() {
        let params = matches("/a/:b+/c", "/a/1/2/3/c").unwrap();
        assert_eq!(params.get("b"), Some("1/2/3"));
        let params = matches("/a/:b*/c", "/a/1/2/c").unwrap();
        assert_eq!(params.get("b"), Some("1/2"));
        assert!(matches("/a/:b+/c", "/a/c").is_none());
    }

    #[test]
    fn dynamic_sub_pattern() {
        let params = matches("/a/:b(\\d+)/c", "/a/123/c").unwrap();
        assert_eq!(params.get("b"), Some("123"));
        assert!(matches("/a/:b(\\d+)/c", "/a/abc/c").is_none());
    }

    #[test]
    fn sub_pattern_alternation_stays_inside_chunk() {
        assert!(matches("/:kind(cat|dog)/x", "/dog/x").is_some());
        assert!(matches("/:kind(cat|dog)/x", "/cat").is_none());
    }

    #[test]
    fn multiple_params() {
        let params = matches("/users/:id/posts/:post_id", "/users/7/posts/99").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("post_id"), Some("99"));
    }

    // ── wildcard ──────────────────────────────────────────────────────────────

    #[test]
    fn wildcards() {
        assert!(matches("/a/*/c", "/a/123/c").is_some());
        assert!(matches("/a/*/c", "/a/123/d").is_none());
        assert!(matches("/a/*?/c", "/a/c").is_some());
        assert!(matches("/a/*(\\d+)/c", "/a/123/c").is_some());
        assert!(matches("/a/*(\\d+)/c", "/a/abc/c").is_none());
        assert!(matches("/a/(\\d+)/c", "/a/123/c").is_some());
        assert!(matches("/a/*/c", "/a/123/c").unwrap().is_empty());
    }

    #[test]
    fn mount_pattern_matches_everything_below() {
        assert!(matches("/**", "/").is_some());
        assert!(matches("/**", "/a/b/c").is_some());
        assert!(matches("/api/**", "/api").is_some());
        assert!(matches("/api/**", "/api/v1/users").is_some());
        assert!(matches("/api/**", "/apix").is_none());
    }

    // ── match_into ────────────────────────────────────────────────────────────

    #[test]
    fn match_into_leaves_params_on_miss() {
        let pattern = Pattern::new("/users/:id").unwrap();
        let mut params = Params::new();
        params.insert("keep", "me");
        assert!(!pattern.match_into("/posts/1", &mut params));
        assert_eq!(params.get("keep"), Some("me"));

        assert!(pattern.match_into("/users/9", &mut params));
        assert_eq!(params.get("keep"), None);
        assert_eq!(params.get("id"), Some("9"));
    }

    #[test]
    fn display_returns_source() {
        let pattern: Pattern = "/a/:b".parse().unwrap();
        assert_eq!(pattern.to_string(), "/a/:b");
        assert_eq!(pattern.as_str(), "/a/:b");
    }
}
