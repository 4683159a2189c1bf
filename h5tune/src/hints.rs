//! Process-group hint map passed to the MPI-IO driver.

use std::collections::BTreeMap;

use serde::Serialize;

/// String-keyed performance hints for a distributed I/O backend.
///
/// Keys are unique: setting an existing key replaces its value. Iteration is
/// in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintMap {
    entries: BTreeMap<String, String>,
}

impl HintMap {
    /// Creates an empty hint map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HintMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_existing_key() {
        let mut hints = HintMap::new();
        assert!(hints.is_empty());

        assert_eq!(hints.set("striping_factor", "4"), None);
        assert_eq!(hints.set("striping_factor", "7"), Some("4".to_string()));

        assert_eq!(hints.len(), 1);
        assert_eq!(hints.get("striping_factor"), Some("7"));
        assert_eq!(hints.get("cb_nodes"), None);
    }

    #[test]
    fn test_iter_in_key_order() {
        let hints: HintMap = [("striping_unit", "65536"), ("cb_nodes", "2")]
            .into_iter()
            .collect();
        let keys: Vec<_> = hints.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["cb_nodes", "striping_unit"]);
    }
}
