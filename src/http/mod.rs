//! HTTP vocabulary shared by the router and the request context.
//!
//! This module provides the core primitives:
//! [`Method`], [`MethodFilter`], [`StatusCode`], [`Headers`], [`Request`],
//! [`Body`], [`Cookie`], and the [`ResponseSink`] the finalized response is
//! written into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;

pub mod body;
pub mod cookie;
pub mod headers;
pub mod request;
pub mod response;

pub use body::{Body, Redirect};
pub use cookie::{Cookie, SameSite};
pub use headers::Headers;
pub use request::Request;
pub use response::{Recorder, ResponseSink};

/// An HTTP response status code.
///
/// Any three-digit code is representable so application code can answer with
/// statuses the crate has no constant for; the common ones are provided as
/// associated constants.
///
/// # Examples
///
/// ```
/// use waypoint::http::StatusCode;
///
/// let status = StatusCode::OK;
/// assert_eq!(status.as_u16(), 200);
/// assert_eq!(status.canonical_reason(), Some("OK"));
/// assert!(status.is_success());
/// assert_eq!(StatusCode::from_u16(418).map(StatusCode::as_u16), Some(418));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    // 1xx Informational
    pub const CONTINUE: Self = Self(100);
    pub const SWITCHING_PROTOCOLS: Self = Self(101);

    // 2xx Success
    pub const OK: Self = Self(200);
    pub const CREATED: Self = Self(201);
    pub const ACCEPTED: Self = Self(202);
    pub const NO_CONTENT: Self = Self(204);
    pub const PARTIAL_CONTENT: Self = Self(206);

    // 3xx Redirection
    pub const MOVED_PERMANENTLY: Self = Self(301);
    pub const FOUND: Self = Self(302);
    pub const SEE_OTHER: Self = Self(303);
    pub const NOT_MODIFIED: Self = Self(304);
    pub const TEMPORARY_REDIRECT: Self = Self(307);
    pub const PERMANENT_REDIRECT: Self = Self(308);

    // 4xx Client Error
    pub const BAD_REQUEST: Self = Self(400);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const FORBIDDEN: Self = Self(403);
    pub const NOT_FOUND: Self = Self(404);
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    pub const CONFLICT: Self = Self(409);
    pub const GONE: Self = Self(410);
    pub const PAYLOAD_TOO_LARGE: Self = Self(413);
    pub const UNSUPPORTED_MEDIA_TYPE: Self = Self(415);
    pub const UNPROCESSABLE_ENTITY: Self = Self(422);
    pub const TOO_MANY_REQUESTS: Self = Self(429);

    // 5xx Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const NOT_IMPLEMENTED: Self = Self(501);
    pub const BAD_GATEWAY: Self = Self(502);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);
    pub const GATEWAY_TIMEOUT: Self = Self(504);

    /// Builds a status from its numeric code, accepting `100..=999`.
    pub fn from_u16(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(Self(code))
    }

    /// Returns the numeric status code as a `u16`.
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for the 1xx range.
    pub fn is_informational(self) -> bool {
        (100..200).contains(&self.0)
    }

    /// Returns `true` for the 2xx range.
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Returns `true` for the 3xx range.
    pub fn is_redirection(self) -> bool {
        (300..400).contains(&self.0)
    }

    /// Returns `false` for statuses whose responses must not carry content:
    /// every 1xx, `204 No Content`, and `304 Not Modified` (RFC 9110 §6.4.1).
    pub fn allows_body(self) -> bool {
        !(self.is_informational() || self == Self::NO_CONTENT || self == Self::NOT_MODIFIED)
    }

    /// Returns the canonical reason phrase, if the code is a well-known one.
    pub fn canonical_reason(self) -> Option<&'static str> {
        let reason = match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            410 => "Gone",
            413 => "Payload Too Large",
            415 => "Unsupported Media Type",
            418 => "I'm a teapot",
            422 => "Unprocessable Entity",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => return None,
        };
        Some(reason)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_reason() {
            Some(reason) => write!(f, "{} {}", self.0, reason),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// An HTTP request method.
///
/// Standard methods are represented as unit variants for zero-cost comparison.
/// Anything else is captured in the `Custom` variant, which the dispatcher
/// rejects with [`Error::UnsupportedMethod`] before traversal starts.
///
/// # Examples
///
/// ```
/// use waypoint::http::Method;
///
/// let method: Method = "GET".parse().unwrap();
/// assert_eq!(method, Method::Get);
/// assert_eq!(method.as_str(), "GET");
/// assert!(method.is_safe());
/// assert!(!Method::Custom("BREW".into()).is_supported());
/// assert!(!Method::Trace.is_supported());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET: Retrieve a representation of the target resource.
    Get,
    /// POST: Perform resource-specific processing on the request payload.
    Post,
    /// PUT: Replace the target resource's current representation.
    Put,
    /// DELETE: Remove the association between the target resource and its functionality.
    Delete,
    /// HEAD: Identical to GET but without a response body.
    Head,
    /// OPTIONS: Describe the communication options for the target resource.
    Options,
    /// PATCH: Apply partial modifications to a resource.
    Patch,
    /// CONNECT: Establish a tunnel to the server identified by the target resource.
    Connect,
    /// TRACE: Perform a message loop-back test along the path to the target resource.
    Trace,
    /// A non-standard extension method.
    Custom(String),
}

impl Method {
    /// Returns the method as a string slice.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Connect => "CONNECT",
            Self::Trace => "TRACE",
            Self::Custom(s) => s.as_str(),
        }
    }

    /// Returns `true` if this method is considered "safe" (no side effects per RFC 9110 §9.2.1).
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }

    /// Returns `true` for the methods routes can be bound to.
    ///
    /// `CONNECT`, `TRACE` and extension methods parse, but a request carrying
    /// one is answered with [`Error::UnsupportedMethod`].
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Get
                | Self::Post
                | Self::Put
                | Self::Patch
                | Self::Delete
                | Self::Options
                | Self::Head
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "DELETE" => Self::Delete,
            "HEAD" => Self::Head,
            "OPTIONS" => Self::Options,
            "PATCH" => Self::Patch,
            "CONNECT" => Self::Connect,
            "TRACE" => Self::Trace,
            other => Self::Custom(other.to_owned()),
        })
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// The method half of a binding: either one specific verb or every verb.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodFilter {
    /// Matches any request method.
    All,
    /// Matches exactly one method.
    Only(Method),
}

impl MethodFilter {
    /// Returns `true` if a request with `method` passes this filter.
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == method,
        }
    }

    /// Returns the filter as it appears in route descriptors (`ALL` for any).
    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "ALL",
            Self::Only(method) => method.as_str(),
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        Self::Only(method)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MethodFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ALL") || s == "*" {
            return Ok(Self::All);
        }
        let Ok(method) = s.to_ascii_uppercase().parse::<Method>();
        if method.is_supported() {
            Ok(Self::Only(method))
        } else {
            Err(Error::UnsupportedMethod(s.to_owned()))
        }
    }
}

impl Serialize for MethodFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MethodFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
