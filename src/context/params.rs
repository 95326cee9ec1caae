//! Path parameters and the per-request association table.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Path parameters bound by the most recent pattern match.
///
/// Names are compared case-insensitively. Clearing keeps the storage of every
/// slot so a context reused from the pool rebinds parameters without
/// allocating.
#[derive(Clone, Default)]
pub struct Params {
    slots: Vec<(String, String)>,
    len: usize,
}

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries()
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Binds `name` to `value`, replacing any previous binding.
    pub fn insert(&mut self, name: &str, value: &str) {
        if let Some((_, slot)) = self.slots[..self.len]
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            slot.clear();
            slot.push_str(value);
            return;
        }

        if let Some((key, slot)) = self.slots.get_mut(self.len) {
            key.clear();
            key.push_str(name);
            slot.clear();
            slot.push_str(value);
        } else {
            self.slots.push((name.to_owned(), value.to_owned()));
        }
        self.len += 1;
    }

    /// Removes the binding for `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let position = self.entries()
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        self.len -= 1;
        Some(self.slots.remove(position).1)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every binding.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries()
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    fn entries(&self) -> &[(String, String)] {
        &self.slots[..self.len]
    }
}

impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

impl Eq for Params {}

impl fmt::Debug for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Params {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}

/// String-keyed, type-erased values shared by every unit of one request.
///
/// Nested dispatchers see the same table as the chain that invoked them.
#[derive(Default)]
pub struct Values {
    map: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, replacing whatever was there.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.map.insert(key.into(), Box::new(value));
    }

    /// Returns the value under `key` if it has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.map.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn get_mut<T>(&mut self, key: &str) -> Option<&mut T>
    where
        T: Send + Sync + 'static,
    {
        self.map
            .get_mut(key)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Removes the value under `key`, returning it if it has type `T`.
    pub fn remove<T>(&mut self, key: &str) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        let value = self.map.remove(key)?;
        value.downcast::<T>().ok().map(|value| *value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.map.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_lookup_is_case_insensitive() {
        let mut params = Params::new();
        params.insert("userId", "7");
        assert_eq!(params.get("userid"), Some("7"));
        assert_eq!(params.get("USERID"), Some("7"));
    }

    #[test]
    fn params_insert_replaces() {
        let mut params = Params::new();
        params.insert("id", "1");
        params.insert("ID", "2");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("2"));
    }

    #[test]
    fn params_clear_then_reuse() {
        let mut params: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        params.clear();
        assert!(params.is_empty());
        assert_eq!(params.get("a"), None);

        params.insert("c", "3");
        assert_eq!(params.len(), 1);
        assert_eq!(params.get("c"), Some("3"));
        assert_eq!(params.get("b"), None);
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("c", "3")]);
    }

    #[test]
    fn params_remove() {
        let mut params: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(params.remove("A").as_deref(), Some("1"));
        assert_eq!(params.remove("a"), None);
        assert_eq!(params.get("b"), Some("2"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn params_equality_ignores_stale_slots() {
        let mut reused: Params = [("a", "1"), ("b", "2")].into_iter().collect();
        reused.clear();
        reused.insert("a", "1");
        let fresh: Params = [("a", "1")].into_iter().collect();
        assert_eq!(reused, fresh);
    }

    #[test]
    fn values_typed_access() {
        let mut values = Values::new();
        values.insert("count", 3u32);
        values.insert("name", String::from("waypoint"));

        assert_eq!(values.get::<u32>("count"), Some(&3));
        assert_eq!(values.get::<String>("name").map(String::as_str), Some("waypoint"));
        assert_eq!(values.get::<i64>("count"), None);

        *values.get_mut::<u32>("count").unwrap() += 1;
        assert_eq!(values.remove::<u32>("count"), Some(4));
        assert!(!values.contains("count"));
        assert_eq!(values.len(), 1);
    }
}
