//! Key-lookup data sources
//!
//! Lookup executors read raw values (form fields, query parameters, CLI
//! `--set` pairs) through this capability; they never see the transport.

use std::collections::{BTreeMap, HashMap};

/// Multi-valued key/value lookup.
pub trait Source: Send + Sync {
    /// All values stored under `key`.
    fn lookup(&self, key: &str) -> Option<Vec<String>>;

    /// First value stored under `key`.
    fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).and_then(|values| values.into_iter().next())
    }
}

/// In-memory source; insertion appends to the key's value list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSource {
    entries: BTreeMap<String, Vec<String>>,
}

impl MapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Parse a `key=value` pair (the demo binary's `--set` syntax).
    pub fn insert_pair(&mut self, pair: &str) -> Option<&mut Self> {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(self.insert(key, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MapSource
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut source = MapSource::new();
        for (key, value) in iter {
            source.insert(key, value);
        }
        source
    }
}

impl Source for MapSource {
    fn lookup(&self, key: &str) -> Option<Vec<String>> {
        self.entries.get(key).cloned()
    }
}

impl Source for HashMap<String, Vec<String>> {
    fn lookup(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).cloned()
    }
}

impl Source for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<Vec<String>> {
        HashMap::get(self, key).map(|value| vec![value.clone()])
    }
}
