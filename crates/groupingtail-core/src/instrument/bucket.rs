//! Per-group accumulation storage shared by all instruments.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Accumulated values keyed by group, plus the last time each group was
/// touched. `groups` is the authority on which keys survive a read.
#[derive(Debug, Clone)]
pub struct Bucket<T> {
    data: HashMap<String, T>,
    groups: HashMap<String, DateTime<Utc>>,
    max_groups: usize,
}

impl<T> Bucket<T> {
    pub fn new(max_groups: usize) -> Self {
        Self {
            data: HashMap::new(),
            groups: HashMap::new(),
            max_groups,
        }
    }

    /// Drop all accumulated state, touched groups included.
    pub fn reset(&mut self) {
        self.data.clear();
        self.groups.clear();
    }

    pub fn touch(&mut self, group: &str, now: DateTime<Utc>) {
        self.groups.insert(group.to_string(), now);
    }

    pub fn get(&self, group: &str) -> Option<&T> {
        self.data.get(group)
    }

    pub fn insert(&mut self, group: &str, value: T) {
        self.data.insert(group.to_string(), value);
    }

    /// Keep at most `max_groups` touched groups.
    ///
    /// Entries are ordered by group key, then by timestamp, and the first
    /// `max_groups` survive. Under sustained over-cardinality this retains the
    /// alphabetically-first keys, not the most recently active ones.
    pub fn trim(&mut self) {
        if self.groups.len() <= self.max_groups {
            return;
        }
        let mut entries: Vec<(String, DateTime<Utc>)> = self.groups.drain().collect();
        entries.sort();
        let dropped = entries.len() - self.max_groups;
        entries.truncate(self.max_groups);
        debug!(dropped, kept = entries.len(), "trimmed groups");
        self.groups = entries.into_iter().collect();
    }

    /// Restrict `data` to the touched groups, mapping each retained value.
    pub fn normalize(&mut self, cast: impl Fn(&T) -> T) {
        let groups = &self.groups;
        let mut data = std::mem::take(&mut self.data);
        data.retain(|group, _| groups.contains_key(group));
        for value in data.values_mut() {
            *value = cast(value);
        }
        self.data = data;
    }

    /// Current `(group, value)` pairs, ordered by group key.
    pub fn snapshot<V>(&self, view: impl Fn(&T) -> V) -> Vec<(String, V)> {
        let mut out: Vec<(String, V)> = self
            .data
            .iter()
            .map(|(group, value)| (group.clone(), view(value)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Apply `f` to every stored value, keeping keys and touched groups.
    pub fn for_each_value(&mut self, f: impl Fn(&mut T)) {
        for value in self.data.values_mut() {
            f(value);
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_trim_keeps_alphabetical_first() {
        let mut bucket: Bucket<f64> = Bucket::new(2);
        // "c" is the most recently touched but sorts last
        for (i, g) in ["b", "a", "c"].iter().enumerate() {
            bucket.insert(g, 1.0);
            bucket.touch(g, at(100 + i as i64));
        }
        bucket.trim();
        bucket.normalize(|v| *v);
        let keys: Vec<String> = bucket.snapshot(|v| *v).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_normalize_drops_untouched_data() {
        let mut bucket: Bucket<f64> = Bucket::new(8);
        bucket.insert("orphan", 5.0);
        bucket.insert("live", 2.0);
        bucket.touch("live", at(1));
        bucket.normalize(|v| v * 10.0);
        assert_eq!(bucket.snapshot(|v| *v), vec![("live".to_string(), 20.0)]);
    }

    #[test]
    fn test_reset_clears_groups() {
        let mut bucket: Bucket<f64> = Bucket::new(8);
        bucket.insert("g", 1.0);
        bucket.touch("g", at(1));
        bucket.reset();
        assert_eq!(bucket.group_count(), 0);
        assert!(bucket.get("g").is_none());
    }
}
