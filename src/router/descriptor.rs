//! Route descriptors: the public method + pattern pairs a router serves.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::http::MethodFilter;

use super::Pattern;

/// A method and pattern a router exposes, for listings such as API docs or
/// client generators.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDescriptor {
    method: MethodFilter,
    pattern: Pattern,
}

impl RouteDescriptor {
    pub fn new(method: MethodFilter, pattern: Pattern) -> Self {
        Self { method, pattern }
    }

    pub fn method(&self) -> &MethodFilter {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    // Identity used to skip duplicate registrations.
    pub(crate) fn key(&self) -> (MethodFilter, String) {
        (self.method.clone(), self.pattern.as_str().to_owned())
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

impl Serialize for RouteDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RouteDescriptor", 2)?;
        state.serialize_field("method", &self.method)?;
        state.serialize_field("pattern", self.pattern.as_str())?;
        state.end()
    }
}

#[derive(Deserialize)]
struct RawDescriptor {
    method: MethodFilter,
    pattern: String,
}

impl<'de> Deserialize<'de> for RouteDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDescriptor::deserialize(deserializer)?;
        let pattern = Pattern::new(&raw.pattern).map_err(de::Error::custom)?;
        Ok(Self::new(raw.method, pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    fn descriptor(method: MethodFilter, pattern: &str) -> RouteDescriptor {
        RouteDescriptor::new(method, Pattern::new(pattern).unwrap())
    }

    #[test]
    fn serializes_as_method_and_pattern_strings() {
        let json = serde_json::to_value(descriptor(Method::Get.into(), "/users/:id")).unwrap();
        assert_eq!(json, serde_json::json!({ "method": "GET", "pattern": "/users/:id" }));

        let json = serde_json::to_value(descriptor(MethodFilter::All, "/**")).unwrap();
        assert_eq!(json["method"], "ALL");
    }

    #[test]
    fn deserializing_recompiles_the_pattern() {
        let parsed: RouteDescriptor =
            serde_json::from_str(r#"{ "method": "POST", "pattern": "/items/:id" }"#).unwrap();
        assert_eq!(parsed.method(), &MethodFilter::Only(Method::Post));
        let params = parsed.pattern().matches("/items/9").unwrap();
        assert_eq!(params.get("id"), Some("9"));
    }

    #[test]
    fn malformed_pattern_fails_to_deserialize() {
        let result = serde_json::from_str::<RouteDescriptor>(r#"{ "method": "GET", "pattern": "nope" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn display() {
        assert_eq!(descriptor(Method::Delete.into(), "/a").to_string(), "DELETE /a");
    }
}
