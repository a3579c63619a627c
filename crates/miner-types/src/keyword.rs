//! Case-insensitive, multi-valued keyword storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{MinerError, Result};

/// Literal values treated as "no value" by `is_null`.
const NULL_SENTINELS: &[&str] = &["", "null", "n/a", "unk", "none"];

/// Returns `true` if the value is one of the null sentinels.
pub fn is_null_value(value: &str) -> bool {
    let trimmed = value.trim().to_ascii_lowercase();
    NULL_SENTINELS.contains(&trimmed.as_str())
}

/// A named keyword holding one or more values in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    /// Name as first written; lookups ignore case.
    pub name: String,
    pub values: Vec<String>,
}

impl Keyword {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    pub fn with_values(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Keyword storage keyed by lowercase name.
///
/// Keys are unique regardless of case. Iteration is in lowercase-key order,
/// so output built from a map is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordMap {
    entries: BTreeMap<String, Keyword>,
}

impl KeywordMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn norm(key: &str) -> String {
        key.trim().to_ascii_lowercase()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(&Self::norm(key))
    }

    /// Number of values stored under `key` (0 if absent).
    pub fn count(&self, key: &str) -> usize {
        self.entries
            .get(&Self::norm(key))
            .map_or(0, Keyword::count)
    }

    /// Value at `index`, failing with `NotFound` if the key or index is absent.
    pub fn get(&self, key: &str, index: usize) -> Result<String> {
        let keyword = self
            .entries
            .get(&Self::norm(key))
            .ok_or_else(|| MinerError::NotFound(format!("keyword \"{key}\" does not exist")))?;
        keyword.values.get(index).cloned().ok_or_else(|| {
            MinerError::NotFound(format!(
                "index {index} of keyword \"{key}\" does not exist ({} values)",
                keyword.count()
            ))
        })
    }

    /// Value at `index`, or `default` if absent.
    pub fn get_or(&self, key: &str, default: &str, index: usize) -> String {
        self.get(key, index).unwrap_or_else(|_| default.to_string())
    }

    /// First value of `key`, or `default`.
    pub fn value_or(&self, key: &str, default: &str) -> String {
        self.get_or(key, default, 0)
    }

    /// Every value of `key`, empty if absent.
    pub fn all_values(&self, key: &str) -> Vec<String> {
        self.entries
            .get(&Self::norm(key))
            .map(|k| k.values.clone())
            .unwrap_or_default()
    }

    pub fn keyword(&self, key: &str) -> Option<&Keyword> {
        self.entries.get(&Self::norm(key))
    }

    /// True if the key is absent, the index is absent, or the value is a null sentinel.
    pub fn is_null(&self, key: &str, index: usize) -> bool {
        match self.get(key, index) {
            Ok(value) => is_null_value(&value),
            Err(_) => true,
        }
    }

    /// Insert `key`, replacing all existing values.
    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(Self::norm(key), Keyword::new(key.trim(), value));
    }

    /// Insert a whole keyword, replacing any existing one of the same name.
    pub fn add_keyword(&mut self, keyword: Keyword) {
        self.entries.insert(Self::norm(&keyword.name), keyword);
    }

    /// Add one more value to `key`, creating it if absent.
    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(Self::norm(key))
            .or_insert_with(|| Keyword::with_values(key.trim(), Vec::new()))
            .values
            .push(value.into());
    }

    /// Remove `key`, returning the number of keywords removed (0 or 1).
    pub fn erase(&mut self, key: &str) -> usize {
        usize::from(self.entries.remove(&Self::norm(key)).is_some())
    }

    /// Merge every keyword of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &KeywordMap) {
        for keyword in other.iter() {
            self.add_keyword(keyword.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.entries.values()
    }

    /// Keyword names as originally written.
    pub fn names(&self) -> Vec<String> {
        self.entries.values().map(|k| k.name.clone()).collect()
    }
}

impl FromIterator<Keyword> for KeywordMap {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        let mut map = KeywordMap::new();
        for keyword in iter {
            map.add_keyword(keyword);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_replaces_existing_values() {
        let mut map = KeywordMap::new();
        map.add("Key", "v1");
        map.add("KEY", "v2");
        assert_eq!(map.all_values("key"), vec!["v2"]);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn append_preserves_order() {
        let mut map = KeywordMap::new();
        map.add("Key", "v1");
        map.append("key", "v2");
        map.append("Other", "x");
        assert_eq!(map.all_values("KEY"), vec!["v1", "v2"]);
        assert_eq!(map.count("other"), 1);
    }

    #[test]
    fn get_missing_is_not_found() {
        let mut map = KeywordMap::new();
        map.add("Key", "v1");
        assert!(matches!(map.get("nope", 0), Err(MinerError::NotFound(_))));
        assert!(matches!(map.get("key", 1), Err(MinerError::NotFound(_))));
        assert_eq!(map.get_or("key", "dflt", 1), "dflt");
        assert_eq!(map.value_or("Key", "dflt"), "v1");
    }

    #[test]
    fn null_sentinels() {
        let mut map = KeywordMap::new();
        map.add("a", "NULL");
        map.add("b", "N/A");
        map.add("c", "12");
        map.add("d", "");
        assert!(map.is_null("a", 0));
        assert!(map.is_null("b", 0));
        assert!(!map.is_null("c", 0));
        assert!(map.is_null("d", 0));
        assert!(map.is_null("missing", 0));
    }

    #[test]
    fn erase_counts() {
        let mut map = KeywordMap::new();
        map.add("a", "1");
        assert_eq!(map.erase("A"), 1);
        assert_eq!(map.erase("a"), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn name_case_preserved() {
        let mut map = KeywordMap::new();
        map.add("CenterLatitude", "10");
        assert_eq!(map.keyword("centerlatitude").unwrap().name, "CenterLatitude");
        assert_eq!(map.names(), vec!["CenterLatitude"]);
    }
}
