//! Case-insensitive header view with mutation
//!
//! Both the request and the response side of a record expose their headers
//! through the same pipe: case-insensitive lookup, last-write-wins on set,
//! insertion order preserved on iteration.

use serde::{Deserialize, Serialize};

/// Ordered, case-insensitive header multimap.
///
/// Lookups ignore case; the original spelling of each name is kept for
/// serialization so the wire sees what the caller wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderPipe {
    entries: Vec<(String, String)>,
}

impl HeaderPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set `name` to `value`, replacing an existing entry in place so the
    /// header keeps its position in iteration order. Extra duplicates of the
    /// same name are removed; a missing name is appended.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(idx) => {
                self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
                self.entries.insert(idx, (name.to_string(), value));
            }
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Add another value under `name` without touching existing entries.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every entry stored under `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// All values stored under `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into a JSON object for CDP frames. Repeated names are joined
    /// with `\n`, which is how DevTools expects multi-value headers.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.entries {
            match map.get_mut(name.as_str()) {
                Some(serde_json::Value::String(existing)) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                _ => {
                    map.insert(name.clone(), serde_json::Value::String(value.clone()));
                }
            }
        }
        map
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for HeaderPipe {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_is_case_insensitive() {
        let mut headers = HeaderPipe::new();
        headers.set("Content-Type", "text/plain");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(headers.get("Content-Type"), Some("text/plain"));
        assert_eq!(headers.get("x-missing"), None);
    }

    #[test]
    fn test_set_is_last_write_wins() {
        let mut headers = HeaderPipe::new();
        headers.set("Accept", "text/html");
        headers.set("accept", "application/json");

        assert_eq!(headers.get("Accept"), Some("application/json"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_delete_then_set_yields_new_value() {
        let mut headers = HeaderPipe::new();
        headers.set("X-Token", "old");
        headers.remove("x-token");
        assert_eq!(headers.get("X-Token"), None);

        headers.set("X-Token", "new");
        assert_eq!(headers.get("x-token"), Some("new"));
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let mut headers = HeaderPipe::new();
        headers.set("First", "1");
        headers.set("Second", "2");
        headers.set("Third", "3");
        headers.set("second", "2b");

        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["First", "second", "Third"]);
    }

    #[test]
    fn test_append_keeps_duplicates() {
        let mut headers = HeaderPipe::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");

        assert_eq!(headers.get("set-cookie"), Some("a=1"));
        assert_eq!(headers.get_all("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_set_collapses_duplicates() {
        let mut headers = HeaderPipe::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        headers.set("set-cookie", "c=3");

        assert_eq!(headers.get_all("set-cookie"), vec!["c=3"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_json_map_joins_duplicates() {
        let mut headers = HeaderPipe::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");
        headers.set("Host", "example.com");

        let map = headers.to_json_map();
        assert_eq!(map["Set-Cookie"], "a=1\nb=2");
        assert_eq!(map["Host"], "example.com");
    }

    #[test]
    fn test_serde_round_trip() {
        let mut headers = HeaderPipe::new();
        headers.set("Content-Type", "application/json");
        headers.append("Accept", "*/*");

        let json = serde_json::to_string(&headers).unwrap();
        let parsed: HeaderPipe = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, headers);
    }
}
